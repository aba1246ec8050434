//! 税务局申报：待提交队列、提交尝试、合规错误

use super::record::RecordType;
use serde::{Deserialize, Serialize};

/// 提交失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionErrorType {
    Network,
    AuthenticationFailure,
    /// 税务局拒收，不自动重试
    ValidationRejected,
    ServerError,
}

impl SubmissionErrorType {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ValidationRejected)
    }
}

/// 记录在申报索引中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Pending,
    Submitted,
    Failed,
    Resolved,
}

/// 认领标记，防止两个 worker 重复提交
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionClaim {
    pub token: String,
    pub claimed_at: i64,
}

/// 持久化的待提交行（带到期时间）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub record_id: String,
    pub cash_register_id: String,
    pub record_type: RecordType,
    pub retry_count: u32,
    pub next_retry_at: i64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub claim: Option<SubmissionClaim>,
    pub enqueued_at: i64,
}

/// 单次提交尝试（请求/响应原文留档）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAttempt {
    pub id: i64,
    pub record_id: String,
    pub cash_register_id: String,
    pub attempt_number: u32,
    pub request_payload: String,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub success: bool,
    pub error_type: Option<SubmissionErrorType>,
    pub error_message: Option<String>,
    pub attempted_at: i64,
}

/// 需要人工处理的申报失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceError {
    pub id: i64,
    pub record_id: String,
    pub cash_register_id: String,
    pub record_type: RecordType,
    pub error_type: SubmissionErrorType,
    pub error_message: String,
    pub retry_count: u32,
    pub last_attempt_at: i64,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<i64>,
    pub notes: Option<String>,
    pub created_at: i64,
}

/// 人工关闭合规错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// enqueue 结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Queued,
    AlreadyQueued,
    /// 该设备未启用税务申报
    ReportingDisabled,
}
