//! Fiscal domain model
//!
//! 签名设备、签名链记录、结账周期与税务申报的共享数据类型。
//! 服务端 (fiscal-server) 负责行为，这里只定义数据与少量派生逻辑。

pub mod closing;
pub mod compliance;
pub mod device;
pub mod record;
pub mod totals;

pub use closing::{ClosingCheck, ClosingPeriod, ClosingStatus, ComplianceStatus, PeriodType};
pub use compliance::{
    ComplianceError, EnqueueOutcome, PendingSubmission, ResolveRequest, SubmissionAttempt,
    SubmissionClaim, SubmissionErrorType, SubmissionState,
};
pub use device::{
    CertificateStatus, ConnectionState, FiscalDevice, FiscalDeviceStatus, MemoryStatus,
    ProvisionDeviceRequest, TaxAuthorityCredentials,
};
pub use record::{
    ChainBreak, ChainConflictMarker, ChainVerification, CreateRecordRequest, CreditNoteRef,
    GENESIS_SIGNATURE, RecordPeriod, RecordType, SignatureScheme, SignedRecord,
};
pub use totals::{TaxBracket, TaxTotals};
