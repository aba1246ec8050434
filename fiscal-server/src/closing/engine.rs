//! ClosingEngine - 日/月/年结账
//!
//! # 结账流程
//!
//! ```text
//! perform_closing(register, period_type)
//!     ├─ 1. 计算窗口 [start, end)
//!     ├─ 2. 设置进行中标记（并发第二次直接 InProgress）
//!     ├─ 3. 已完成检查 (AlreadyPerformed)
//!     ├─ 4. 获取收银机锁
//!     ├─ 5. 窗口内记录链校验 (PendingChainGap)
//!     ├─ 6. 汇总 Sale / CreditNote
//!     └─ 7. 签发结账记录，与 Completed 周期同一事务写入
//! ```
//!
//! 第 4 步之后的任何失败都会写入一行 Failed 周期。

use std::sync::Arc;

use chrono_tz::Tz;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::fiscal::{
    ClosingCheck, ClosingPeriod, ClosingStatus, ComplianceStatus, PeriodType, RecordPeriod,
    RecordType, SignedRecord, TaxTotals,
};

use super::error::{ClosingError, ClosingResult};
use super::period::{PeriodWindow, period_window};
use crate::device::DeviceRegistry;
use crate::ledger::{LedgerError, RecordDraft, SignatureLedger};
use crate::storage::{FiscalStorage, StorageError};

type FlagKey = (String, PeriodType);

/// 结账进行中标记，离开作用域自动清除
struct InProgressGuard {
    flags: Arc<DashMap<FlagKey, ()>>,
    key: FlagKey,
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.flags.remove(&self.key);
    }
}

/// 窗口内记录的汇总结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClosingAggregate {
    pub totals: TaxTotals,
    pub transaction_count: u64,
}

/// 汇总销售与红冲（红冲金额本身为负）；结账记录只参与链校验
pub fn aggregate(records: &[SignedRecord]) -> ClosingResult<ClosingAggregate> {
    let mut aggregate = ClosingAggregate::default();
    for record in records {
        if !matches!(record.record_type, RecordType::Sale | RecordType::CreditNote) {
            continue;
        }
        aggregate.totals = aggregate
            .totals
            .checked_add(&record.totals)
            .ok_or_else(|| ClosingError::Aggregation(format!("overflow at record {}", record.id)))?;
        aggregate.transaction_count += 1;
    }
    Ok(aggregate)
}

/// 结账签名记录的 correlation_id，崩溃重试时复用同一记录
pub fn closing_correlation_id(register_id: &str, period_type: PeriodType, start: i64) -> String {
    format!("closing:{register_id}:{period_type}:{start}")
}

pub struct ClosingEngine {
    ledger: Arc<SignatureLedger>,
    devices: DeviceRegistry,
    storage: FiscalStorage,
    tz: Tz,
    in_progress: Arc<DashMap<FlagKey, ()>>,
}

impl std::fmt::Debug for ClosingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosingEngine")
            .field("tz", &self.tz)
            .field("in_progress", &self.in_progress.len())
            .finish_non_exhaustive()
    }
}

impl ClosingEngine {
    pub fn new(ledger: Arc<SignatureLedger>, devices: DeviceRegistry, tz: Tz) -> Self {
        let storage = ledger.storage().clone();
        Self {
            ledger,
            devices,
            storage,
            tz,
            in_progress: Arc::new(DashMap::new()),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    fn begin(&self, register_id: &str, period_type: PeriodType) -> ClosingResult<InProgressGuard> {
        let key = (register_id.to_string(), period_type);
        match self.in_progress.entry(key.clone()) {
            Entry::Occupied(_) => Err(ClosingError::InProgress {
                register_id: register_id.to_string(),
                period_type,
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InProgressGuard {
                    flags: self.in_progress.clone(),
                    key,
                })
            }
        }
    }

    fn is_in_progress(&self, register_id: &str, period_type: PeriodType) -> bool {
        self.in_progress
            .contains_key(&(register_id.to_string(), period_type))
    }

    pub async fn perform_closing(
        &self,
        register_id: &str,
        period_type: PeriodType,
    ) -> ClosingResult<ClosingPeriod> {
        self.perform_closing_at(register_id, period_type, shared::util::now_millis())
            .await
    }

    /// 以 `now` 计算窗口执行结账
    pub async fn perform_closing_at(
        &self,
        register_id: &str,
        period_type: PeriodType,
        now: i64,
    ) -> ClosingResult<ClosingPeriod> {
        let window = period_window(period_type, now, self.tz)?;

        let _flag = self.begin(register_id, period_type)?;
        if self
            .storage
            .find_completed_closing(register_id, period_type, window.start)?
            .is_some()
        {
            return Err(ClosingError::AlreadyPerformed {
                register_id: register_id.to_string(),
                period_type,
                period_start: window.start,
            });
        }

        let _lock = self.ledger.lock_register(register_id).await;

        match self.run_locked(register_id, period_type, window).await {
            Ok(closing) => {
                tracing::info!(
                    register_id = %register_id,
                    period_type = %period_type,
                    period_start = window.start,
                    transactions = closing.transaction_count,
                    gross_total = %closing.gross_total,
                    "Closing completed"
                );
                Ok(closing)
            }
            Err(err @ ClosingError::AlreadyPerformed { .. }) => Err(err),
            Err(err) => {
                tracing::error!(
                    register_id = %register_id,
                    period_type = %period_type,
                    error = %err,
                    "Closing failed"
                );
                self.record_failure(register_id, period_type, window, &err);
                Err(err)
            }
        }
    }

    async fn run_locked(
        &self,
        register_id: &str,
        period_type: PeriodType,
        window: PeriodWindow,
    ) -> ClosingResult<ClosingPeriod> {
        let records = self
            .storage
            .list_records_between(register_id, window.start, window.end)?;

        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            let verification = self.ledger.verify_chain(
                register_id,
                first.signature_counter,
                last.signature_counter,
            )?;
            if let Some(chain_break) = verification.first_break {
                return Err(ClosingError::PendingChainGap {
                    register_id: register_id.to_string(),
                    reason: format!("counter {}: {}", chain_break.counter, chain_break.reason),
                });
            }
        }

        let aggregate = aggregate(&records)?;
        let now = shared::util::now_millis();
        let closing = ClosingPeriod {
            id: shared::util::snowflake_id(),
            cash_register_id: register_id.to_string(),
            period_type,
            period_start: window.start,
            period_end: window.end,
            totals: aggregate.totals,
            gross_total: aggregate.totals.gross_total(),
            tax_total: aggregate.totals.tax_total(),
            transaction_count: aggregate.transaction_count,
            status: ClosingStatus::Completed,
            signed_record_id: None,
            compliance_status: ComplianceStatus::Pending,
            failure_reason: None,
            created_at: now,
            completed_at: Some(now),
        };
        let draft = RecordDraft {
            cash_register_id: register_id.to_string(),
            record_type: period_type.record_type(),
            totals: aggregate.totals,
            correlation_id: closing_correlation_id(register_id, period_type, window.start),
            credit_note: None,
            period: Some(RecordPeriod {
                start: window.start,
                end: window.end,
            }),
        };

        let appended = match self.ledger.append_locked(draft, Some(closing.clone())).await {
            Ok(appended) => appended,
            Err(LedgerError::Storage(StorageError::ClosingExists(_))) => {
                return Err(ClosingError::AlreadyPerformed {
                    register_id: register_id.to_string(),
                    period_type,
                    period_start: window.start,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !appended.created {
            // 结账记录已签发：返回与之同事务写入的周期
            return self
                .storage
                .find_completed_closing(register_id, period_type, window.start)?
                .ok_or_else(|| {
                    ClosingError::Aggregation(format!(
                        "closing record {} exists without a completed period",
                        appended.record.id
                    ))
                });
        }

        Ok(ClosingPeriod {
            signed_record_id: Some(appended.record.id),
            ..closing
        })
    }

    fn record_failure(
        &self,
        register_id: &str,
        period_type: PeriodType,
        window: PeriodWindow,
        err: &ClosingError,
    ) {
        let failed = ClosingPeriod {
            id: shared::util::snowflake_id(),
            cash_register_id: register_id.to_string(),
            period_type,
            period_start: window.start,
            period_end: window.end,
            totals: TaxTotals::default(),
            gross_total: Default::default(),
            tax_total: Default::default(),
            transaction_count: 0,
            status: ClosingStatus::Failed,
            signed_record_id: None,
            compliance_status: ComplianceStatus::Pending,
            failure_reason: Some(err.to_string()),
            created_at: shared::util::now_millis(),
            completed_at: None,
        };
        if let Err(e) = self.storage.put_closing(&failed) {
            tracing::error!(register_id = %register_id, error = %e, "Failed to persist failed closing");
        }
    }

    /// 只读预检（运维工具）
    pub fn can_perform_closing(
        &self,
        register_id: &str,
        period_type: PeriodType,
    ) -> ClosingResult<ClosingCheck> {
        let window = period_window(period_type, shared::util::now_millis(), self.tz)?;
        let reason = self.blocking_reason(register_id, period_type, window)?;
        Ok(ClosingCheck {
            can_perform: reason.is_none(),
            reason,
            period_start: window.start,
            period_end: window.end,
        })
    }

    fn blocking_reason(
        &self,
        register_id: &str,
        period_type: PeriodType,
        window: PeriodWindow,
    ) -> ClosingResult<Option<String>> {
        if self.is_in_progress(register_id, period_type) {
            return Ok(Some("closing already in progress".into()));
        }
        if self
            .storage
            .find_completed_closing(register_id, period_type, window.start)?
            .is_some()
        {
            return Ok(Some("closing already performed for this period".into()));
        }
        if let Some(marker) = self.ledger.active_conflict(register_id)? {
            return Ok(Some(format!("register frozen: {}", marker.reason)));
        }

        let records = self
            .storage
            .list_records_between(register_id, window.start, window.end)?;
        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            let inspection = self.ledger.inspect_chain(
                register_id,
                first.signature_counter,
                last.signature_counter,
            )?;
            if let Some(chain_break) = inspection.first_break {
                return Ok(Some(format!(
                    "chain verification failed at counter {}: {}",
                    chain_break.counter, chain_break.reason
                )));
            }
        }

        let device_ready = self
            .devices
            .get(register_id)
            .and_then(|gateway| gateway.ensure_can_sign());
        if let Err(e) = device_ready {
            return Ok(Some(e.to_string()));
        }
        Ok(None)
    }

    /// 结账历史（最新在前）
    pub fn get_closing_history(
        &self,
        register_id: &str,
        period_type: Option<PeriodType>,
        limit: usize,
    ) -> ClosingResult<Vec<ClosingPeriod>> {
        Ok(self.storage.list_closings(register_id, period_type, limit)?)
    }
}
