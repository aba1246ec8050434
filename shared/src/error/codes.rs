//! Unified error codes for the fiscal backend
//!
//! This module defines all error codes used across fiscal-server and operator tooling.
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Fiscal device errors
//! - 2xxx: Signature chain (ledger) errors
//! - 3xxx: Closing errors
//! - 4xxx: Compliance submission errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Device ====================
    /// No provisioned device with this serial number
    DeviceNotFound = 1001,
    /// Device is not connected (or not able to sign)
    DeviceUnavailable = 1002,
    /// Device signing certificate has expired
    CertificateExpired = 1003,
    /// Device did not answer within its timeout
    SignatureTimeout = 1004,
    /// Device signature memory is full
    DeviceMemoryFull = 1005,
    /// Device is bound to another register
    DeviceNotBound = 1006,
    /// Certificate is expiring or its status is unknown
    CertificateNotValid = 1007,

    // ==================== 2xxx: Ledger ====================
    /// Signature chain conflict, register frozen
    ChainConflict = 2001,
    /// Signed record not found
    RecordNotFound = 2002,
    /// Credit note references an unknown or non-invoice record
    OriginalInvoiceInvalid = 2003,
    /// Chain verification found a broken link
    ChainBroken = 2004,

    // ==================== 3xxx: Closing ====================
    /// Closing already performed for this period
    CloseAlreadyPerformed = 3001,
    /// Another closing for this period is running
    CloseAlreadyInProgress = 3002,
    /// In-window records fail chain verification
    PendingChainGap = 3003,
    /// Closing period not found
    ClosingNotFound = 3004,

    // ==================== 4xxx: Compliance ====================
    /// Tax authority endpoint unreachable
    SubmissionNetwork = 4001,
    /// Tax authority rejected credentials
    SubmissionAuthenticationFailure = 4002,
    /// Tax authority rejected the payload
    SubmissionValidationRejected = 4003,
    /// Tax authority server error
    SubmissionServerError = 4004,
    /// Compliance error not found
    ComplianceErrorNotFound = 4005,
    /// Compliance error already resolved
    ComplianceErrorAlreadyResolved = 4006,
    /// Tax authority reporting disabled for this device
    ReportingDisabled = 4007,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,

    // ==================== 94xx: Storage ====================
    /// Storage full (disk space insufficient)
    StorageFull = 9401,
    /// Storage corrupted (data file damaged)
    StorageCorrupted = 9403,
    /// System busy (IO error, retry later)
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Device
            ErrorCode::DeviceNotFound => "Fiscal device not found",
            ErrorCode::DeviceUnavailable => "Fiscal device is not available",
            ErrorCode::CertificateExpired => "Fiscal device certificate has expired",
            ErrorCode::SignatureTimeout => "Fiscal device did not respond in time",
            ErrorCode::DeviceMemoryFull => "Fiscal device memory is full",
            ErrorCode::DeviceNotBound => "Fiscal device is bound to another register",
            ErrorCode::CertificateNotValid => "Fiscal device certificate must be renewed",

            // Ledger
            ErrorCode::ChainConflict => "Signature chain conflict, register is frozen",
            ErrorCode::RecordNotFound => "Signed record not found",
            ErrorCode::OriginalInvoiceInvalid => "Original invoice is missing or not an invoice",
            ErrorCode::ChainBroken => "Signature chain verification failed",

            // Closing
            ErrorCode::CloseAlreadyPerformed => "Closing already performed for this period",
            ErrorCode::CloseAlreadyInProgress => "Closing already in progress",
            ErrorCode::PendingChainGap => "Records in the closing window fail chain verification",
            ErrorCode::ClosingNotFound => "Closing period not found",

            // Compliance
            ErrorCode::SubmissionNetwork => "Tax authority is unreachable",
            ErrorCode::SubmissionAuthenticationFailure => "Tax authority rejected credentials",
            ErrorCode::SubmissionValidationRejected => "Tax authority rejected the record",
            ErrorCode::SubmissionServerError => "Tax authority server error",
            ErrorCode::ComplianceErrorNotFound => "Compliance error not found",
            ErrorCode::ComplianceErrorAlreadyResolved => "Compliance error already resolved",
            ErrorCode::ReportingDisabled => "Tax authority reporting is disabled",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",

            // Storage
            ErrorCode::StorageFull => "Storage full (disk space insufficient)",
            ErrorCode::StorageCorrupted => "Storage corrupted (data file damaged)",
            ErrorCode::SystemBusy => "System busy, please retry later",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Device
            1001 => Ok(ErrorCode::DeviceNotFound),
            1002 => Ok(ErrorCode::DeviceUnavailable),
            1003 => Ok(ErrorCode::CertificateExpired),
            1004 => Ok(ErrorCode::SignatureTimeout),
            1005 => Ok(ErrorCode::DeviceMemoryFull),
            1006 => Ok(ErrorCode::DeviceNotBound),
            1007 => Ok(ErrorCode::CertificateNotValid),

            // Ledger
            2001 => Ok(ErrorCode::ChainConflict),
            2002 => Ok(ErrorCode::RecordNotFound),
            2003 => Ok(ErrorCode::OriginalInvoiceInvalid),
            2004 => Ok(ErrorCode::ChainBroken),

            // Closing
            3001 => Ok(ErrorCode::CloseAlreadyPerformed),
            3002 => Ok(ErrorCode::CloseAlreadyInProgress),
            3003 => Ok(ErrorCode::PendingChainGap),
            3004 => Ok(ErrorCode::ClosingNotFound),

            // Compliance
            4001 => Ok(ErrorCode::SubmissionNetwork),
            4002 => Ok(ErrorCode::SubmissionAuthenticationFailure),
            4003 => Ok(ErrorCode::SubmissionValidationRejected),
            4004 => Ok(ErrorCode::SubmissionServerError),
            4005 => Ok(ErrorCode::ComplianceErrorNotFound),
            4006 => Ok(ErrorCode::ComplianceErrorAlreadyResolved),
            4007 => Ok(ErrorCode::ReportingDisabled),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            // Storage
            9401 => Ok(ErrorCode::StorageFull),
            9403 => Ok(ErrorCode::StorageCorrupted),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
