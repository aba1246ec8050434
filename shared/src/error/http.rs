//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::DeviceNotFound
            | Self::RecordNotFound
            | Self::ClosingNotFound
            | Self::ComplianceErrorNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists
            | Self::ChainConflict
            | Self::CloseAlreadyPerformed
            | Self::CloseAlreadyInProgress
            | Self::ComplianceErrorAlreadyResolved => StatusCode::CONFLICT,

            // 422 Unprocessable (integrity checks)
            Self::PendingChainGap | Self::ChainBroken | Self::OriginalInvoiceInvalid => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            // 503 Service Unavailable (device or upstream not ready, client can retry)
            Self::DeviceUnavailable
            | Self::CertificateExpired
            | Self::CertificateNotValid
            | Self::DeviceMemoryFull
            | Self::DeviceNotBound
            | Self::NetworkError
            | Self::SystemBusy => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            Self::SignatureTimeout | Self::TimeoutError => StatusCode::GATEWAY_TIMEOUT,

            // 502 Bad Gateway (tax authority)
            Self::SubmissionNetwork
            | Self::SubmissionAuthenticationFailure
            | Self::SubmissionValidationRejected
            | Self::SubmissionServerError => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            Self::InternalError
            | Self::DatabaseError
            | Self::ConfigError
            | Self::StorageFull
            | Self::StorageCorrupted => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_status() {
        assert_eq!(ErrorCode::Success.http_status(), StatusCode::OK);
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::DeviceNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::ComplianceErrorNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_conflict_status() {
        assert_eq!(ErrorCode::ChainConflict.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::CloseAlreadyPerformed.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::CloseAlreadyInProgress.http_status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_device_statuses() {
        assert_eq!(
            ErrorCode::DeviceUnavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::SignatureTimeout.http_status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_bad_request_status() {
        assert_eq!(
            ErrorCode::ValidationFailed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::ReportingDisabled.http_status(),
            StatusCode::BAD_REQUEST
        );
    }
}
