//! 税务申报队列表
//!
//! - `submission_queue`: 待提交行（带到期时间和认领标记）
//! - `submission_index`: 每条记录的申报状态，保证 enqueue 幂等
//! - `submission_attempts`: 每次尝试的请求/响应原文
//! - `compliance_errors`: 需要人工处理的失败

use super::{
    COMPLIANCE_ERRORS_TABLE, FiscalStorage, RECORDS_TABLE, StorageResult,
    SUBMISSION_ATTEMPTS_TABLE, SUBMISSION_INDEX_TABLE, SUBMISSION_QUEUE_TABLE,
};
use redb::{ReadableDatabase, ReadableTable};
use shared::fiscal::{
    ComplianceError, PendingSubmission, SignedRecord, SubmissionAttempt, SubmissionClaim,
    SubmissionState,
};

/// 一次提交尝试的结局
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// 税务局已接收
    Submitted,
    /// 失败，稍后重试
    Retry { next_retry_at: i64 },
    /// 失败，转入人工处理
    Failed(ComplianceError),
}

/// 人工关闭结果
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Resolved(ComplianceError),
    AlreadyResolved,
    NotFound,
}

fn state_str(state: SubmissionState) -> &'static str {
    match state {
        SubmissionState::Pending => "pending",
        SubmissionState::Submitted => "submitted",
        SubmissionState::Failed => "failed",
        SubmissionState::Resolved => "resolved",
    }
}

fn parse_state(s: &str) -> Option<SubmissionState> {
    match s {
        "pending" => Some(SubmissionState::Pending),
        "submitted" => Some(SubmissionState::Submitted),
        "failed" => Some(SubmissionState::Failed),
        "resolved" => Some(SubmissionState::Resolved),
        _ => None,
    }
}

impl FiscalStorage {
    /// 加入待提交队列；记录已有申报状态时返回 false
    pub fn enqueue_submission(&self, pending: &PendingSubmission) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        let queued = {
            let mut index = txn.open_table(SUBMISSION_INDEX_TABLE)?;
            if index.get(pending.record_id.as_str())?.is_some() {
                false
            } else {
                let mut queue = txn.open_table(SUBMISSION_QUEUE_TABLE)?;
                let value = serde_json::to_vec(pending)?;
                queue.insert(pending.record_id.as_str(), value.as_slice())?;
                index.insert(
                    pending.record_id.as_str(),
                    state_str(SubmissionState::Pending),
                )?;
                true
            }
        };
        txn.commit()?;
        Ok(queued)
    }

    pub fn get_submission_state(&self, record_id: &str) -> StorageResult<Option<SubmissionState>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUBMISSION_INDEX_TABLE)?;
        Ok(table.get(record_id)?.and_then(|g| parse_state(g.value())))
    }

    /// 认领到期的待提交行
    ///
    /// 未认领或认领已超时（`claim_timeout_ms`）的行才会被认领。
    /// 认领在同一个写事务内完成，两个 worker 不会拿到同一行。
    pub fn claim_due_submissions(
        &self,
        now: i64,
        limit: usize,
        claim_timeout_ms: i64,
        token: &str,
    ) -> StorageResult<Vec<PendingSubmission>> {
        let txn = self.db.begin_write()?;
        let claimed = {
            let mut queue = txn.open_table(SUBMISSION_QUEUE_TABLE)?;

            let mut due: Vec<PendingSubmission> = Vec::new();
            for result in queue.iter()? {
                let (_key, value) = result?;
                let pending: PendingSubmission = serde_json::from_slice(value.value())?;
                let claim_free = match &pending.claim {
                    None => true,
                    Some(claim) => claim.claimed_at + claim_timeout_ms <= now,
                };
                if pending.next_retry_at <= now && claim_free {
                    due.push(pending);
                }
            }
            due.sort_by_key(|p| (p.next_retry_at, p.enqueued_at));
            due.truncate(limit);

            for pending in due.iter_mut() {
                pending.claim = Some(SubmissionClaim {
                    token: token.to_string(),
                    claimed_at: now,
                });
                let value = serde_json::to_vec(&*pending)?;
                queue.insert(pending.record_id.as_str(), value.as_slice())?;
            }
            due
        };
        txn.commit()?;
        Ok(claimed)
    }

    /// 落地一次提交尝试
    ///
    /// 认领标记不匹配（已被他人重新认领或已完成）时不写入任何数据，返回 false。
    pub fn finalize_attempt(
        &self,
        record_id: &str,
        token: &str,
        attempt: &SubmissionAttempt,
        outcome: &AttemptOutcome,
    ) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        {
            let mut queue = txn.open_table(SUBMISSION_QUEUE_TABLE)?;
            let pending_opt = match queue.get(record_id)? {
                Some(value) => Some(serde_json::from_slice::<PendingSubmission>(value.value())?),
                None => None,
            };
            let mut pending = match pending_opt {
                Some(p) if p.claim.as_ref().is_some_and(|c| c.token == token) => p,
                _ => return Ok(false),
            };

            let mut attempts = txn.open_table(SUBMISSION_ATTEMPTS_TABLE)?;
            let attempt_value = serde_json::to_vec(attempt)?;
            attempts.insert((record_id, attempt.attempt_number), attempt_value.as_slice())?;

            let mut index = txn.open_table(SUBMISSION_INDEX_TABLE)?;
            match outcome {
                AttemptOutcome::Submitted => {
                    queue.remove(record_id)?;
                    index.insert(record_id, state_str(SubmissionState::Submitted))?;
                }
                AttemptOutcome::Retry { next_retry_at } => {
                    pending.retry_count += 1;
                    pending.next_retry_at = *next_retry_at;
                    pending.last_error = attempt.error_message.clone();
                    pending.claim = None;
                    let value = serde_json::to_vec(&pending)?;
                    queue.insert(record_id, value.as_slice())?;
                }
                AttemptOutcome::Failed(error) => {
                    queue.remove(record_id)?;
                    index.insert(record_id, state_str(SubmissionState::Failed))?;
                    let mut errors = txn.open_table(COMPLIANCE_ERRORS_TABLE)?;
                    let error_value = serde_json::to_vec(error)?;
                    errors.insert(error.id, error_value.as_slice())?;
                }
            }
        }
        txn.commit()?;
        Ok(true)
    }

    /// 所有待提交行（按到期时间）
    pub fn list_pending_submissions(&self) -> StorageResult<Vec<PendingSubmission>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUBMISSION_QUEUE_TABLE)?;

        let mut entries: Vec<PendingSubmission> = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        entries.sort_by_key(|p| p.next_retry_at);
        Ok(entries)
    }

    /// 某条记录的全部提交尝试（按尝试序号）
    pub fn list_attempts(&self, record_id: &str) -> StorageResult<Vec<SubmissionAttempt>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUBMISSION_ATTEMPTS_TABLE)?;

        let mut attempts = Vec::new();
        for result in table.range((record_id, 0u32)..=(record_id, u32::MAX))? {
            let (_key, value) = result?;
            attempts.push(serde_json::from_slice(value.value())?);
        }
        Ok(attempts)
    }

    // ========== Compliance Errors ==========

    pub fn get_compliance_error(&self, error_id: i64) -> StorageResult<Option<ComplianceError>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COMPLIANCE_ERRORS_TABLE)?;
        match table.get(error_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// 合规错误列表（最早在前）
    pub fn list_compliance_errors(
        &self,
        register_id: Option<&str>,
        include_resolved: bool,
    ) -> StorageResult<Vec<ComplianceError>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COMPLIANCE_ERRORS_TABLE)?;

        let mut errors: Vec<ComplianceError> = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let error: ComplianceError = serde_json::from_slice(value.value())?;
            if !include_resolved && error.resolved {
                continue;
            }
            if register_id.is_some_and(|r| r != error.cash_register_id) {
                continue;
            }
            errors.push(error);
        }
        errors.sort_by_key(|e| e.created_at);
        Ok(errors)
    }

    /// 人工关闭合规错误，不会重新入队
    pub fn resolve_compliance_error(
        &self,
        error_id: i64,
        resolved_by: &str,
        notes: Option<&str>,
        resolved_at: i64,
    ) -> StorageResult<ResolveOutcome> {
        let txn = self.db.begin_write()?;
        let outcome = {
            let mut errors = txn.open_table(COMPLIANCE_ERRORS_TABLE)?;
            let error_opt = match errors.get(error_id)? {
                Some(value) => Some(serde_json::from_slice::<ComplianceError>(value.value())?),
                None => None,
            };
            match error_opt {
                None => ResolveOutcome::NotFound,
                Some(error) if error.resolved => ResolveOutcome::AlreadyResolved,
                Some(mut error) => {
                    error.resolved = true;
                    error.resolved_by = Some(resolved_by.to_string());
                    error.resolved_at = Some(resolved_at);
                    error.notes = notes.map(str::to_string);
                    let value = serde_json::to_vec(&error)?;
                    errors.insert(error_id, value.as_slice())?;

                    let mut index = txn.open_table(SUBMISSION_INDEX_TABLE)?;
                    index.insert(
                        error.record_id.as_str(),
                        state_str(SubmissionState::Resolved),
                    )?;
                    ResolveOutcome::Resolved(error)
                }
            }
        };
        txn.commit()?;
        Ok(outcome)
    }

    /// 收银机的未完成申报数：(普通票据, 结账报告)
    ///
    /// 包括队列中的行和未关闭的合规错误。
    pub fn count_open_submissions(&self, register_id: &str) -> StorageResult<(u32, u32)> {
        let read_txn = self.db.begin_read()?;
        let queue = read_txn.open_table(SUBMISSION_QUEUE_TABLE)?;
        let errors = read_txn.open_table(COMPLIANCE_ERRORS_TABLE)?;

        let mut invoices = 0u32;
        let mut reports = 0u32;
        for result in queue.iter()? {
            let (_key, value) = result?;
            let pending: PendingSubmission = serde_json::from_slice(value.value())?;
            if pending.cash_register_id != register_id {
                continue;
            }
            if pending.record_type.is_closing() {
                reports += 1;
            } else {
                invoices += 1;
            }
        }
        for result in errors.iter()? {
            let (_key, value) = result?;
            let error: ComplianceError = serde_json::from_slice(value.value())?;
            if error.resolved || error.cash_register_id != register_id {
                continue;
            }
            if error.record_type.is_closing() {
                reports += 1;
            } else {
                invoices += 1;
            }
        }
        Ok((invoices, reports))
    }

    /// 没有申报状态的签名记录（进程崩溃丢失的事件）
    pub fn records_without_submission(&self) -> StorageResult<Vec<SignedRecord>> {
        let read_txn = self.db.begin_read()?;
        let records = read_txn.open_table(RECORDS_TABLE)?;
        let index = read_txn.open_table(SUBMISSION_INDEX_TABLE)?;

        let mut missing = Vec::new();
        for result in records.iter()? {
            let (_key, value) = result?;
            let record: SignedRecord = serde_json::from_slice(value.value())?;
            if index.get(record.id.as_str())?.is_none() {
                missing.push(record);
            }
        }
        Ok(missing)
    }
}
