//! 签名设备错误

use crate::storage::StorageError;
use shared::error::{AppError, ErrorCode};
use shared::fiscal::CertificateStatus;
use thiserror::Error;

/// 驱动层错误（硬件协议）
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// 驱动不认识这个序列号
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    /// 设备拒绝签名（内部错误）
    #[error("Device rejected request: {0}")]
    Rejected(String),

    #[error("Signature memory full")]
    MemoryFull,
}

pub type DriverResult<T> = Result<T, DriverError>;

/// 设备网关错误
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("No fiscal device provisioned for register {0}")]
    NotProvisioned(String),

    #[error("Fiscal device {0} not found")]
    NotFound(String),

    #[error("Fiscal device {serial} is bound to register {register_id}")]
    NotBound { serial: String, register_id: String },

    #[error("Register {0} already has a fiscal device")]
    AlreadyProvisioned(String),

    #[error("Fiscal device {serial} unavailable: {reason}")]
    Unavailable { serial: String, reason: String },

    #[error("Certificate of fiscal device {0} has expired")]
    CertificateExpired(String),

    /// 证书即将过期或状态未知，需要续期后才能签名
    #[error("Certificate of fiscal device {serial} is not valid for signing ({status:?})")]
    CertificateNotValid {
        serial: String,
        status: CertificateStatus,
    },

    #[error("Signature memory of fiscal device {0} is full")]
    MemoryFull(String),

    #[error("Fiscal device {serial} did not respond within {seconds}s")]
    SignatureTimeout { serial: String, seconds: u64 },

    #[error("Invalid device data: {0}")]
    Invalid(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

impl From<DeviceError> for AppError {
    fn from(err: DeviceError) -> Self {
        let code = match err {
            DeviceError::Storage(e) => return e.into(),
            DeviceError::NotProvisioned(_) | DeviceError::NotFound(_) => ErrorCode::DeviceNotFound,
            DeviceError::NotBound { .. } => ErrorCode::DeviceNotBound,
            DeviceError::AlreadyProvisioned(_) => ErrorCode::AlreadyExists,
            DeviceError::Unavailable { .. } => ErrorCode::DeviceUnavailable,
            DeviceError::CertificateExpired(_) => ErrorCode::CertificateExpired,
            DeviceError::CertificateNotValid { .. } => ErrorCode::CertificateNotValid,
            DeviceError::MemoryFull(_) => ErrorCode::DeviceMemoryFull,
            DeviceError::SignatureTimeout { .. } => ErrorCode::SignatureTimeout,
            DeviceError::Invalid(_) => ErrorCode::ValidationFailed,
        };
        AppError::with_message(code, err.to_string())
    }
}
