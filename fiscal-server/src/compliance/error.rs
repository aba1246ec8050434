//! 申报队列错误

use crate::device::DeviceError;
use crate::storage::StorageError;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Signed record not found: {0}")]
    RecordNotFound(String),

    #[error("Compliance error {0} not found")]
    ErrorNotFound(i64),

    #[error("Compliance error {0} already resolved")]
    AlreadyResolved(i64),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to encode submission payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type SubmissionResult<T> = Result<T, SubmissionError>;

impl From<SubmissionError> for AppError {
    fn from(err: SubmissionError) -> Self {
        let code = match err {
            SubmissionError::Device(e) => return e.into(),
            SubmissionError::Storage(e) => return e.into(),
            SubmissionError::RecordNotFound(_) => ErrorCode::RecordNotFound,
            SubmissionError::ErrorNotFound(_) => ErrorCode::ComplianceErrorNotFound,
            SubmissionError::AlreadyResolved(_) => ErrorCode::ComplianceErrorAlreadyResolved,
            SubmissionError::Validation(_) => ErrorCode::ValidationFailed,
            SubmissionError::Payload(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}
