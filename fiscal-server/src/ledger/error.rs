//! 签名链错误

use crate::device::DeviceError;
use crate::storage::StorageError;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// 收银机已冻结，需人工调查
    #[error("Signature chain conflict on register {register_id}: {reason}")]
    ChainConflict { register_id: String, reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Original invoice invalid: {0}")]
    OriginalInvoiceInvalid(String),

    #[error("Signed record not found: {0}")]
    RecordNotFound(String),

    #[error("No active chain conflict on register {0}")]
    NoActiveConflict(String),

    #[error("Failed to encode signing payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let code = match err {
            LedgerError::Device(e) => return e.into(),
            LedgerError::Storage(e) => return e.into(),
            LedgerError::ChainConflict { ref register_id, .. } => {
                return AppError::with_message(ErrorCode::ChainConflict, err.to_string())
                    .with_detail("register_id", register_id.clone());
            }
            LedgerError::Validation(_) => ErrorCode::ValidationFailed,
            LedgerError::OriginalInvoiceInvalid(_) => ErrorCode::OriginalInvoiceInvalid,
            LedgerError::RecordNotFound(_) => ErrorCode::RecordNotFound,
            LedgerError::NoActiveConflict(_) => ErrorCode::NotFound,
            LedgerError::Payload(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::error::UserAction;

    #[test]
    fn test_error_mapping() {
        let err: AppError = LedgerError::ChainConflict {
            register_id: "REG-1".into(),
            reason: "head moved".into(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::ChainConflict);
        assert_eq!(err.user_action(), UserAction::ContactSupport);
        assert_eq!(err.details.unwrap().get("register_id").unwrap(), "REG-1");

        let err: AppError = LedgerError::Device(DeviceError::CertificateExpired("SN".into())).into();
        assert_eq!(err.code, ErrorCode::CertificateExpired);
        assert_eq!(err.user_action(), UserAction::ServiceDevice);

        let err: AppError = LedgerError::OriginalInvoiceInvalid("x".into()).into();
        assert_eq!(err.code, ErrorCode::OriginalInvoiceInvalid);
    }
}
