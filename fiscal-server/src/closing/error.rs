//! 结账错误

use crate::ledger::LedgerError;
use crate::storage::StorageError;
use shared::error::{AppError, ErrorCode};
use shared::fiscal::PeriodType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClosingError {
    #[error("{period_type} closing for register {register_id} already performed")]
    AlreadyPerformed {
        register_id: String,
        period_type: PeriodType,
        period_start: i64,
    },

    #[error("{period_type} closing for register {register_id} already in progress")]
    InProgress {
        register_id: String,
        period_type: PeriodType,
    },

    /// 窗口内记录未通过链校验
    #[error("Pending chain gap on register {register_id}: {reason}")]
    PendingChainGap { register_id: String, reason: String },

    #[error("Invalid closing period: {0}")]
    InvalidPeriod(String),

    #[error("Closing aggregation failed: {0}")]
    Aggregation(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ClosingResult<T> = Result<T, ClosingError>;

impl From<ClosingError> for AppError {
    fn from(err: ClosingError) -> Self {
        let code = match err {
            ClosingError::Ledger(e) => return e.into(),
            ClosingError::Storage(e) => return e.into(),
            ClosingError::AlreadyPerformed { .. } => ErrorCode::CloseAlreadyPerformed,
            ClosingError::InProgress { .. } => ErrorCode::CloseAlreadyInProgress,
            ClosingError::PendingChainGap { .. } => ErrorCode::PendingChainGap,
            ClosingError::InvalidPeriod(_) => ErrorCode::ValidationFailed,
            ClosingError::Aggregation(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}
