//! SubmissionQueue - 税务申报队列
//!
//! 签名流程只发出事件，从不同步调用这里；
//! 待提交行持久化在 redb，重启后继续处理。
//!
//! ```text
//! enqueue(record) ─→ submission_queue (next_retry_at = now)
//! claim_due(now)  ─→ 认领到期行（token）
//! submit(entry)   ─→ 调用税务局（不持有任何锁）
//!                 ─→ finalize_attempt(token)
//!                      ├─ 2xx              → Submitted
//!                      ├─ 可重试且未达上限 → Retry(next_retry_at)
//!                      └─ 否则             → ComplianceError
//! ```

use std::sync::Arc;

use shared::fiscal::{
    ComplianceError, ComplianceStatus, EnqueueOutcome, PendingSubmission, SignedRecord,
    SubmissionAttempt, SubmissionErrorType, SubmissionState,
};

use super::client::{AuthorityRequest, TaxAuthorityClient};
use super::error::{SubmissionError, SubmissionResult};
use super::payload::SubmissionPayload;
use super::policy::{FailureDecision, RetryPolicy, classify_status};
use crate::device::DeviceRegistry;
use crate::storage::{AttemptOutcome, FiscalStorage, ResolveOutcome};

/// 一批认领
#[derive(Debug, Clone)]
pub struct ClaimedBatch {
    pub token: String,
    pub entries: Vec<PendingSubmission>,
}

pub struct SubmissionQueue {
    storage: FiscalStorage,
    devices: DeviceRegistry,
    client: Arc<dyn TaxAuthorityClient>,
    policy: RetryPolicy,
    claim_timeout_ms: i64,
}

impl std::fmt::Debug for SubmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionQueue")
            .field("policy", &self.policy)
            .field("claim_timeout_ms", &self.claim_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl SubmissionQueue {
    pub fn new(
        storage: FiscalStorage,
        devices: DeviceRegistry,
        client: Arc<dyn TaxAuthorityClient>,
        policy: RetryPolicy,
        claim_timeout_ms: i64,
    ) -> Self {
        Self {
            storage,
            devices,
            client,
            policy,
            claim_timeout_ms,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    // ========== Enqueue ==========

    /// 按记录 ID 入队
    pub fn enqueue(&self, record_id: &str) -> SubmissionResult<EnqueueOutcome> {
        let record = self
            .storage
            .get_record(record_id)?
            .ok_or_else(|| SubmissionError::RecordNotFound(record_id.to_string()))?;
        self.enqueue_record(&record)
    }

    /// 入队（幂等）；未启用申报的收银机跳过
    pub fn enqueue_record(&self, record: &SignedRecord) -> SubmissionResult<EnqueueOutcome> {
        let gateway = self.devices.get(&record.cash_register_id)?;
        if !gateway.device().tax_authority.enabled {
            tracing::debug!(
                register_id = %record.cash_register_id,
                record_id = %record.id,
                "Tax authority reporting disabled, record not queued"
            );
            return Ok(EnqueueOutcome::ReportingDisabled);
        }

        let now = shared::util::now_millis();
        let pending = PendingSubmission {
            record_id: record.id.clone(),
            cash_register_id: record.cash_register_id.clone(),
            record_type: record.record_type,
            retry_count: 0,
            next_retry_at: now,
            last_error: None,
            claim: None,
            enqueued_at: now,
        };
        if !self.storage.enqueue_submission(&pending)? {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        tracing::debug!(
            register_id = %record.cash_register_id,
            record_id = %record.id,
            "Record queued for submission"
        );
        self.refresh_pending_counts(&record.cash_register_id);
        Ok(EnqueueOutcome::Queued)
    }

    /// 补齐没有申报状态的记录，返回新入队数量
    pub fn reconcile(&self) -> SubmissionResult<usize> {
        let mut queued = 0;
        for record in self.storage.records_without_submission()? {
            match self.enqueue_record(&record) {
                Ok(EnqueueOutcome::Queued) => queued += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(record_id = %record.id, error = %e, "Failed to reconcile record");
                }
            }
        }
        if queued > 0 {
            tracing::info!(count = queued, "Reconciled records into submission queue");
        }
        Ok(queued)
    }

    // ========== Claim / Submit ==========

    pub fn claim_due(&self, now: i64, limit: usize) -> SubmissionResult<ClaimedBatch> {
        let token = uuid::Uuid::new_v4().to_string();
        let entries = self
            .storage
            .claim_due_submissions(now, limit, self.claim_timeout_ms, &token)?;
        Ok(ClaimedBatch { token, entries })
    }

    /// 提交一条已认领的记录
    ///
    /// 返回 None 表示认领已失效，结果被丢弃。
    pub async fn submit(
        &self,
        entry: &PendingSubmission,
        token: &str,
    ) -> SubmissionResult<Option<AttemptOutcome>> {
        let record = self
            .storage
            .get_record(&entry.record_id)?
            .ok_or_else(|| SubmissionError::RecordNotFound(entry.record_id.clone()))?;
        let device = self.devices.get(&record.cash_register_id)?.device();

        let body = serde_json::to_string(&SubmissionPayload::new(&device.kassen_id, &record))?;
        let request = AuthorityRequest {
            kassen_id: device.kassen_id.clone(),
            body,
        };
        let attempt_number = entry.retry_count + 1;

        let result = self.client.submit(&request, &device.tax_authority).await;
        let attempted_at = shared::util::now_millis();

        let (response_status, response_body, failure) = match result {
            Ok(response) => {
                let failure = classify_status(response.status).map(|error_type| {
                    (error_type, format!("tax authority returned HTTP {}", response.status))
                });
                (Some(response.status), Some(response.body), failure)
            }
            Err(e) => (None, None, Some((SubmissionErrorType::Network, e.to_string()))),
        };

        let attempt = SubmissionAttempt {
            id: shared::util::snowflake_id(),
            record_id: record.id.clone(),
            cash_register_id: record.cash_register_id.clone(),
            attempt_number,
            request_payload: request.body,
            response_status,
            response_body,
            success: failure.is_none(),
            error_type: failure.as_ref().map(|(t, _)| *t),
            error_message: failure.as_ref().map(|(_, m)| m.clone()),
            attempted_at,
        };

        let outcome = match failure {
            None => AttemptOutcome::Submitted,
            Some((error_type, message)) => match self.policy.decide(error_type, attempt_number) {
                FailureDecision::RetryAfter(delay) => AttemptOutcome::Retry {
                    next_retry_at: attempted_at + delay.as_millis() as i64,
                },
                FailureDecision::GiveUp => AttemptOutcome::Failed(ComplianceError {
                    id: shared::util::snowflake_id(),
                    record_id: record.id.clone(),
                    cash_register_id: record.cash_register_id.clone(),
                    record_type: record.record_type,
                    error_type,
                    error_message: message,
                    retry_count: attempt_number,
                    last_attempt_at: attempted_at,
                    resolved: false,
                    resolved_by: None,
                    resolved_at: None,
                    notes: None,
                    created_at: attempted_at,
                }),
            },
        };

        if !self
            .storage
            .finalize_attempt(&record.id, token, &attempt, &outcome)?
        {
            tracing::warn!(
                record_id = %record.id,
                attempt = attempt_number,
                "Submission claim lost before finalize, attempt discarded"
            );
            return Ok(None);
        }

        match &outcome {
            AttemptOutcome::Submitted => {
                tracing::info!(record_id = %record.id, attempt = attempt_number, "Record submitted to tax authority");
                if record.record_type.is_closing() {
                    self.storage
                        .set_closing_compliance_status(&record.id, ComplianceStatus::Reported)?;
                }
            }
            AttemptOutcome::Retry { next_retry_at } => {
                tracing::warn!(
                    record_id = %record.id,
                    attempt = attempt_number,
                    next_retry_at = *next_retry_at,
                    error = ?attempt.error_message,
                    "Submission failed, will retry"
                );
            }
            AttemptOutcome::Failed(error) => {
                tracing::error!(
                    record_id = %record.id,
                    error_type = ?error.error_type,
                    retry_count = error.retry_count,
                    "Submission failed permanently, moved to compliance errors"
                );
                if record.record_type.is_closing() {
                    self.storage
                        .set_closing_compliance_status(&record.id, ComplianceStatus::Failed)?;
                }
            }
        }

        self.refresh_pending_counts(&record.cash_register_id);
        Ok(Some(outcome))
    }

    /// 认领并依次提交所有到期行，返回处理数量
    pub async fn process_due(&self, now: i64, limit: usize) -> SubmissionResult<usize> {
        let batch = self.claim_due(now, limit)?;
        let mut processed = 0;
        for entry in &batch.entries {
            match self.submit(entry, &batch.token).await {
                Ok(Some(_)) => processed += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(record_id = %entry.record_id, error = %e, "Submission processing failed");
                }
            }
        }
        Ok(processed)
    }

    // ========== Resolution ==========

    /// 人工关闭，不触发重新提交
    pub fn resolve(
        &self,
        error_id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> SubmissionResult<ComplianceError> {
        if resolved_by.trim().is_empty() {
            return Err(SubmissionError::Validation("resolved_by is required".into()));
        }
        let resolved = match self.storage.resolve_compliance_error(
            error_id,
            resolved_by,
            notes,
            shared::util::now_millis(),
        )? {
            ResolveOutcome::Resolved(error) => error,
            ResolveOutcome::AlreadyResolved => return Err(SubmissionError::AlreadyResolved(error_id)),
            ResolveOutcome::NotFound => return Err(SubmissionError::ErrorNotFound(error_id)),
        };

        tracing::info!(
            error_id,
            record_id = %resolved.record_id,
            resolved_by = %resolved_by,
            "Compliance error resolved"
        );
        self.refresh_pending_counts(&resolved.cash_register_id);
        Ok(resolved)
    }

    /// 刷新设备上的待申报计数
    pub fn refresh_pending_counts(&self, register_id: &str) {
        let result = self
            .storage
            .count_open_submissions(register_id)
            .map_err(SubmissionError::from)
            .and_then(|(invoices, reports)| {
                let gateway = self.devices.get(register_id)?;
                gateway.update_pending_counts(invoices, reports)?;
                Ok(())
            });
        if let Err(e) = result {
            tracing::warn!(register_id = %register_id, error = %e, "Failed to refresh pending counts");
        }
    }

    // ========== Reads ==========

    pub fn pending_compliance_errors(
        &self,
        register_id: Option<&str>,
    ) -> SubmissionResult<Vec<ComplianceError>> {
        Ok(self.storage.list_compliance_errors(register_id, false)?)
    }

    pub fn submission_attempts(&self, record_id: &str) -> SubmissionResult<Vec<SubmissionAttempt>> {
        Ok(self.storage.list_attempts(record_id)?)
    }

    pub fn pending_submissions(&self) -> SubmissionResult<Vec<PendingSubmission>> {
        Ok(self.storage.list_pending_submissions()?)
    }

    pub fn submission_state(&self, record_id: &str) -> SubmissionResult<Option<SubmissionState>> {
        Ok(self.storage.get_submission_state(record_id)?)
    }
}
