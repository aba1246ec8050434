//! redb-based storage layer for the fiscal backend
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `devices` | `register_id` | `FiscalDevice` | Device per register |
//! | `device_serials` | `serial_number` | `register_id` | Serial binding |
//! | `records` | `(register_id, counter)` | `SignedRecord` | Signature chain (append-only) |
//! | `record_index` | `record_id` | `(register_id, counter)` | Lookup by id |
//! | `correlations` | `(register_id, correlation_id)` | `counter` | Idempotency |
//! | `chain_heads` | `register_id` | `ChainHead` | Head cross-check |
//! | `credited_totals` | `original_invoice_id` | `Decimal` | Refunded amount per invoice |
//! | `chain_conflicts` | `register_id` | `ChainConflictMarker` | Frozen registers |
//! | `closings` | `closing_id` | `ClosingPeriod` | Closing history |
//! | `completed_closings` | `(register_id, period_type, start)` | `closing_id` | Uniqueness |
//! | `closing_by_record` | `record_id` | `closing_id` | Compliance status update |
//! | `submission_queue` | `record_id` | `PendingSubmission` | Due-at queue |
//! | `submission_index` | `record_id` | state | Enqueue idempotency |
//! | `submission_attempts` | `(record_id, attempt)` | `SubmissionAttempt` | Verbatim audit |
//! | `compliance_errors` | `error_id` | `ComplianceError` | Manual resolution |
//! | `device_audit` | `sequence` | `DeviceAuditEntry` | Hash-chained device log |
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`: a commit is persistent as soon
//! as `commit()` returns. Every multi-row mutation is one write transaction.

mod audit;
mod closings;
mod devices;
mod records;
mod submissions;

pub use audit::AUDIT_GENESIS_HASH;
pub use records::ChainHead;
pub use submissions::{AttemptOutcome, ResolveOutcome};

use redb::{Database, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const DEVICES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");
const DEVICE_SERIALS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("device_serials");

const RECORDS_TABLE: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("records");
const RECORD_INDEX_TABLE: TableDefinition<&str, (&str, u64)> =
    TableDefinition::new("record_index");
const CORRELATIONS_TABLE: TableDefinition<(&str, &str), u64> =
    TableDefinition::new("correlations");
const CHAIN_HEADS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chain_heads");
const CHAIN_CONFLICTS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("chain_conflicts");
const CREDITED_TOTALS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("credited_totals");

const CLOSINGS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("closings");
const COMPLETED_CLOSINGS_TABLE: TableDefinition<(&str, &str, i64), i64> =
    TableDefinition::new("completed_closings");
const CLOSING_BY_RECORD_TABLE: TableDefinition<&str, i64> =
    TableDefinition::new("closing_by_record");

const SUBMISSION_QUEUE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("submission_queue");
const SUBMISSION_INDEX_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("submission_index");
const SUBMISSION_ATTEMPTS_TABLE: TableDefinition<(&str, u32), &[u8]> =
    TableDefinition::new("submission_attempts");
const COMPLIANCE_ERRORS_TABLE: TableDefinition<i64, &[u8]> =
    TableDefinition::new("compliance_errors");

const DEVICE_AUDIT_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("device_audit");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 存储的链头与最新记录不一致，或写入位置已被占用
    #[error("Chain head mismatch for register {register_id}: {reason}")]
    ChainHeadMismatch { register_id: String, reason: String },

    /// 同一周期已有完成的结账
    #[error("Closing already completed: {0}")]
    ClosingExists(String),

    #[error("Device serial {serial} already bound to register {register_id}")]
    SerialAlreadyBound { serial: String, register_id: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// 将 redb 错误归类为错误码
fn classify_storage_error(e: &StorageError) -> shared::error::ErrorCode {
    use shared::error::ErrorCode;

    match e {
        StorageError::Serialization(_) => return ErrorCode::InternalError,
        StorageError::ChainHeadMismatch { .. } => return ErrorCode::ChainConflict,
        StorageError::ClosingExists(_) => return ErrorCode::CloseAlreadyPerformed,
        StorageError::SerialAlreadyBound { .. } => return ErrorCode::DeviceNotBound,
        _ => {}
    }

    // redb 错误通过字符串匹配分类
    let err_str = e.to_string().to_lowercase();

    if err_str.contains("no space") || err_str.contains("disk full") || err_str.contains("enospc")
    {
        return ErrorCode::StorageFull;
    }

    if err_str.contains("corrupt") || err_str.contains("invalid database") {
        return ErrorCode::StorageCorrupted;
    }

    // 默认：系统繁忙（Database/Transaction/Table/Storage/Commit 错误）
    ErrorCode::SystemBusy
}

impl From<StorageError> for shared::error::AppError {
    fn from(err: StorageError) -> Self {
        let code = classify_storage_error(&err);
        if code.category() == shared::error::ErrorCategory::System {
            tracing::error!(error = %err, error_code = %code, "Storage error occurred");
        }
        shared::error::AppError::with_message(code, err.to_string())
    }
}

/// Fiscal storage backed by redb
#[derive(Clone)]
pub struct FiscalStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for FiscalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiscalStorage").finish_non_exhaustive()
    }
}

impl FiscalStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and tooling)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Create all tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DEVICES_TABLE)?;
            let _ = write_txn.open_table(DEVICE_SERIALS_TABLE)?;
            let _ = write_txn.open_table(RECORDS_TABLE)?;
            let _ = write_txn.open_table(RECORD_INDEX_TABLE)?;
            let _ = write_txn.open_table(CORRELATIONS_TABLE)?;
            let _ = write_txn.open_table(CHAIN_HEADS_TABLE)?;
            let _ = write_txn.open_table(CHAIN_CONFLICTS_TABLE)?;
            let _ = write_txn.open_table(CREDITED_TOTALS_TABLE)?;
            let _ = write_txn.open_table(CLOSINGS_TABLE)?;
            let _ = write_txn.open_table(COMPLETED_CLOSINGS_TABLE)?;
            let _ = write_txn.open_table(CLOSING_BY_RECORD_TABLE)?;
            let _ = write_txn.open_table(SUBMISSION_QUEUE_TABLE)?;
            let _ = write_txn.open_table(SUBMISSION_INDEX_TABLE)?;
            let _ = write_txn.open_table(SUBMISSION_ATTEMPTS_TABLE)?;
            let _ = write_txn.open_table(COMPLIANCE_ERRORS_TABLE)?;
            let _ = write_txn.open_table(DEVICE_AUDIT_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}
