//! SignatureLedger - 签名链的唯一写入者
//!
//! # 签名流程
//!
//! ```text
//! create_signed_record(req)
//!     ├─ 1. 请求校验（金额符号、必填字段）
//!     ├─ 2. 获取收银机锁
//!     ├─ 3. 幂等检查 (correlation_id)
//!     ├─ 4. 冻结检查 (chain conflict marker)
//!     ├─ 5. 红冲原票校验
//!     ├─ 6. 设备可签名检查
//!     ├─ 7. 读取链头，构建规范化载荷
//!     ├─ 8. 设备签名
//!     ├─ 9. 单事务持久化（写入前复核链头）
//!     └─ 10. 发出记录事件（申报队列异步消费）
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use shared::fiscal::{
    ChainBreak, ChainConflictMarker, ChainVerification, ClosingPeriod, CreateRecordRequest,
    CreditNoteRef, GENESIS_SIGNATURE, RecordPeriod, RecordType, SignatureScheme, SignedRecord,
    TaxTotals,
};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

use super::error::{LedgerError, LedgerResult};
use super::payload::{CanonicalPayload, payload_hash, recompute_hash};
use crate::device::DeviceRegistry;
use crate::storage::{ChainHead, FiscalStorage, StorageError};

/// 待签名记录（签名前的内容）
#[derive(Debug, Clone)]
pub(crate) struct RecordDraft {
    pub cash_register_id: String,
    pub record_type: RecordType,
    pub totals: TaxTotals,
    pub correlation_id: String,
    pub credit_note: Option<CreditNoteRef>,
    pub period: Option<RecordPeriod>,
}

/// 签名结果
#[derive(Debug, Clone)]
pub(crate) struct Appended {
    pub record: SignedRecord,
    /// false 表示 correlation_id 重放，返回的是原记录
    pub created: bool,
}

/// 签名链账本
pub struct SignatureLedger {
    storage: FiscalStorage,
    devices: DeviceRegistry,
    locks: DashMap<String, Arc<Mutex<()>>>,
    event_tx: mpsc::UnboundedSender<SignedRecord>,
}

impl std::fmt::Debug for SignatureLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureLedger")
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

/// 上游请求的字段与金额符号校验
fn validate_request(req: &CreateRecordRequest) -> LedgerResult<()> {
    if req.cash_register_id.trim().is_empty() {
        return Err(LedgerError::Validation("cash_register_id is required".into()));
    }
    if req.correlation_id.trim().is_empty() {
        return Err(LedgerError::Validation("correlation_id is required".into()));
    }

    match req.record_type {
        RecordType::Sale => {
            if !req.totals.all_non_negative() {
                return Err(LedgerError::Validation(
                    "sale totals must not be negative".into(),
                ));
            }
            if req.credit_note.is_some() {
                return Err(LedgerError::Validation(
                    "sale must not carry a credit note reference".into(),
                ));
            }
        }
        RecordType::CreditNote => {
            let Some(credit_note) = &req.credit_note else {
                return Err(LedgerError::Validation(
                    "credit note requires original_invoice_id".into(),
                ));
            };
            if credit_note.original_invoice_id.trim().is_empty() {
                return Err(LedgerError::Validation(
                    "credit note requires original_invoice_id".into(),
                ));
            }
            if credit_note.reason_code.trim().is_empty() {
                return Err(LedgerError::Validation("credit note requires reason_code".into()));
            }
            if req.totals.is_zero() || !req.totals.all_non_positive() {
                return Err(LedgerError::Validation(
                    "credit note totals must be negative".into(),
                ));
            }
        }
        closing => {
            return Err(LedgerError::Validation(format!(
                "{closing} records are created by the closing engine"
            )));
        }
    }
    Ok(())
}

/// 按计数器顺序检查一段记录
///
/// `previous` 为区间前一条记录的签名（区间从 1 开始时为空链哨兵）。
fn check_records(
    records: &[SignedRecord],
    from_counter: u64,
    to_counter: u64,
    previous: &str,
) -> (u64, Option<ChainBreak>) {
    let mut expected_prev = previous.to_string();
    let mut expected_counter = from_counter;
    let mut checked = 0u64;

    for record in records {
        if record.signature_counter != expected_counter {
            return (
                checked,
                Some(ChainBreak {
                    counter: expected_counter,
                    record_id: None,
                    reason: format!("missing record at counter {expected_counter}"),
                }),
            );
        }
        checked += 1;

        let broken = |reason: String| ChainBreak {
            counter: record.signature_counter,
            record_id: Some(record.id.clone()),
            reason,
        };

        if !record.is_valid {
            let reason = record
                .validation_error
                .clone()
                .unwrap_or_else(|| "record flagged invalid".to_string());
            return (checked, Some(broken(format!("previously flagged: {reason}"))));
        }
        if record.previous_signature_value != expected_prev {
            return (
                checked,
                Some(broken("previous signature does not link to predecessor".into())),
            );
        }
        match recompute_hash(record) {
            Ok(hash) if hash == record.payload_hash => {}
            Ok(_) => return (checked, Some(broken("payload hash mismatch".into()))),
            Err(e) => {
                return (checked, Some(broken(format!("payload not encodable: {e}"))));
            }
        }

        expected_prev = record.signature_value.clone();
        expected_counter += 1;
    }

    if expected_counter <= to_counter {
        return (
            checked,
            Some(ChainBreak {
                counter: expected_counter,
                record_id: None,
                reason: format!("missing record at counter {expected_counter}"),
            }),
        );
    }
    (checked, None)
}

impl SignatureLedger {
    /// 创建账本，返回记录事件的接收端
    pub fn new(
        storage: FiscalStorage,
        devices: DeviceRegistry,
    ) -> (Self, mpsc::UnboundedReceiver<SignedRecord>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let ledger = Self {
            storage,
            devices,
            locks: DashMap::new(),
            event_tx,
        };
        (ledger, event_rx)
    }

    pub fn storage(&self) -> &FiscalStorage {
        &self.storage
    }

    /// 收银机级互斥（读链头、签名、持久化）
    pub(crate) async fn lock_register(&self, register_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(register_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// 签发销售 / 红冲记录
    ///
    /// 同一 correlation_id 重复调用返回原记录，不推进计数器。
    pub async fn create_signed_record(&self, req: CreateRecordRequest) -> LedgerResult<SignedRecord> {
        validate_request(&req)?;

        let _guard = self.lock_register(&req.cash_register_id).await;
        let draft = RecordDraft {
            cash_register_id: req.cash_register_id,
            record_type: req.record_type,
            totals: req.totals,
            correlation_id: req.correlation_id,
            credit_note: req.credit_note,
            period: None,
        };
        let appended = self.append_locked(draft, None).await?;
        Ok(appended.record)
    }

    /// 在已持有收银机锁的前提下签名并追加
    ///
    /// `closing` 与记录在同一事务中写入（结账路径）。
    pub(crate) async fn append_locked(
        &self,
        draft: RecordDraft,
        closing: Option<ClosingPeriod>,
    ) -> LedgerResult<Appended> {
        let register_id = draft.cash_register_id.clone();

        // 1. 幂等
        if let Some(existing) = self
            .storage
            .find_by_correlation(&register_id, &draft.correlation_id)?
        {
            if existing.record_type != draft.record_type
                || existing.totals.normalized() != draft.totals.normalized()
            {
                tracing::warn!(
                    register_id = %register_id,
                    correlation_id = %draft.correlation_id,
                    record_id = %existing.id,
                    "Replayed correlation id with different content, returning original record"
                );
            } else {
                tracing::debug!(
                    register_id = %register_id,
                    correlation_id = %draft.correlation_id,
                    "Duplicate signing request"
                );
            }
            return Ok(Appended {
                record: existing,
                created: false,
            });
        }

        // 2. 冻结
        if let Some(marker) = self.storage.get_active_conflict(&register_id)? {
            return Err(LedgerError::ChainConflict {
                register_id,
                reason: marker.reason,
            });
        }

        // 3. 红冲原票
        if let Some(credit_note) = &draft.credit_note {
            self.check_original_invoice(&register_id, credit_note, &draft.totals)?;
        }

        // 4. 设备
        let gateway = self.devices.get(&register_id)?;
        gateway.ensure_can_sign()?;
        let device = gateway.device();

        // 5. 链头 + 载荷
        let head = self.storage.get_chain_head(&register_id)?;
        let mut record = SignedRecord {
            id: shared::util::record_id(),
            cash_register_id: register_id.clone(),
            record_type: draft.record_type,
            totals: draft.totals,
            signature_value: String::new(),
            previous_signature_value: ChainHead::previous_signature(head.as_ref()).to_string(),
            signature_counter: head.as_ref().map(|h| h.counter).unwrap_or(0) + 1,
            signature_scheme: SignatureScheme::Raw {
                provider: String::new(),
            },
            correlation_id: draft.correlation_id,
            created_at: shared::util::now_millis(),
            device_serial: device.serial_number,
            device_counter: 0,
            payload_hash: String::new(),
            credit_note: draft.credit_note,
            period: draft.period,
            is_valid: true,
            validation_error: None,
        };
        let payload = CanonicalPayload::of(&record).to_bytes()?;
        record.payload_hash = payload_hash(&payload);

        // 6. 签名（超时/失败不会留下任何链状态）
        let signature = gateway.sign_operation(&payload).await?;
        record.signature_value = signature.signature_value;
        record.signature_scheme = signature.scheme;
        record.device_counter = signature.counter;

        // 7. 持久化
        let closing = closing.map(|mut c| {
            c.signed_record_id = Some(record.id.clone());
            c
        });
        match self.storage.append_record(&record, closing.as_ref()) {
            Ok(()) => {}
            Err(StorageError::ChainHeadMismatch { reason, .. }) => {
                self.freeze(&register_id, &reason)?;
                return Err(LedgerError::ChainConflict {
                    register_id,
                    reason,
                });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            register_id = %register_id,
            record_id = %record.id,
            record_type = %record.record_type,
            counter = record.signature_counter,
            "Signed record appended"
        );

        // 8. 事件（接收端关闭时由 reconcile 补齐）
        if self.event_tx.send(record.clone()).is_err() {
            tracing::debug!(record_id = %record.id, "No subscriber for signed record events");
        }

        Ok(Appended {
            record,
            created: true,
        })
    }

    fn check_original_invoice(
        &self,
        register_id: &str,
        credit_note: &CreditNoteRef,
        totals: &TaxTotals,
    ) -> LedgerResult<()> {
        let original = self
            .storage
            .get_record(&credit_note.original_invoice_id)?
            .ok_or_else(|| {
                LedgerError::OriginalInvoiceInvalid(format!(
                    "record {} does not exist",
                    credit_note.original_invoice_id
                ))
            })?;

        if original.cash_register_id != register_id {
            return Err(LedgerError::OriginalInvoiceInvalid(format!(
                "record {} belongs to register {}",
                original.id, original.cash_register_id
            )));
        }
        if !original.record_type.is_invoice() {
            return Err(LedgerError::OriginalInvoiceInvalid(format!(
                "record {} is a {}, not an invoice",
                original.id, original.record_type
            )));
        }
        let amount = totals.gross_total().abs();
        let already_credited = self.storage.credited_total(&original.id)?;
        if already_credited + amount > original.totals.gross_total() {
            return Err(LedgerError::Validation(format!(
                "credit note amount {amount} plus already credited {already_credited} exceeds original invoice amount {}",
                original.totals.gross_total()
            )));
        }
        Ok(())
    }

    /// 持久化冲突标记，冻结收银机
    fn freeze(&self, register_id: &str, reason: &str) -> LedgerResult<()> {
        tracing::error!(
            register_id = %register_id,
            reason = %reason,
            "Signature chain conflict, register frozen"
        );
        self.storage.put_conflict_marker(&ChainConflictMarker {
            cash_register_id: register_id.to_string(),
            detected_at: shared::util::now_millis(),
            reason: reason.to_string(),
            released_by: None,
            released_at: None,
            notes: None,
        })?;
        Ok(())
    }

    // ========== Verification ==========

    /// 只读链校验（不标记、不冻结）
    ///
    /// `to_counter` 超出链头时截断到链头。
    pub fn inspect_chain(
        &self,
        register_id: &str,
        from_counter: u64,
        to_counter: u64,
    ) -> LedgerResult<ChainVerification> {
        let from = from_counter.max(1);
        let head = self.storage.get_chain_head(register_id)?;
        let to = head.as_ref().map(|h| h.counter.min(to_counter)).unwrap_or(0);

        let mut verification = ChainVerification {
            cash_register_id: register_id.to_string(),
            from_counter: from,
            to_counter: to,
            checked: 0,
            valid: true,
            first_break: None,
        };
        let Some(head) = head else {
            return Ok(verification);
        };
        if from > to {
            return Ok(verification);
        }

        let previous = if from == 1 {
            GENESIS_SIGNATURE.to_string()
        } else {
            match self.storage.get_record_at(register_id, from - 1)? {
                Some(r) => r.signature_value,
                None => {
                    verification.valid = false;
                    verification.first_break = Some(ChainBreak {
                        counter: from - 1,
                        record_id: None,
                        reason: format!("missing record at counter {}", from - 1),
                    });
                    return Ok(verification);
                }
            }
        };

        let records = self.storage.list_records(register_id, from, to)?;
        let (checked, mut first_break) = check_records(&records, from, to, &previous);

        // 链头必须指向最后一条记录
        if first_break.is_none()
            && to == head.counter
            && let Some(last) = records.last()
            && (last.signature_value != head.signature_value || last.id != head.record_id)
        {
            first_break = Some(ChainBreak {
                counter: head.counter,
                record_id: Some(last.id.clone()),
                reason: "chain head does not match latest record".into(),
            });
        }

        verification.checked = checked;
        verification.valid = first_break.is_none();
        verification.first_break = first_break;
        Ok(verification)
    }

    /// 链校验：发现断裂时标记记录无效并冻结收银机
    pub fn verify_chain(
        &self,
        register_id: &str,
        from_counter: u64,
        to_counter: u64,
    ) -> LedgerResult<ChainVerification> {
        let verification = self.inspect_chain(register_id, from_counter, to_counter)?;

        if let Some(chain_break) = &verification.first_break {
            tracing::warn!(
                register_id = %register_id,
                counter = chain_break.counter,
                reason = %chain_break.reason,
                "Signature chain verification failed"
            );
            if chain_break.record_id.is_some() {
                self.storage
                    .mark_record_invalid(register_id, chain_break.counter, &chain_break.reason)?;
            }
            self.freeze(
                register_id,
                &format!(
                    "chain break at counter {}: {}",
                    chain_break.counter, chain_break.reason
                ),
            )?;
        }
        Ok(verification)
    }

    /// 人工解除冻结（不做任何自动修复）
    pub fn release_chain_conflict(
        &self,
        register_id: &str,
        released_by: &str,
        notes: Option<&str>,
    ) -> LedgerResult<ChainConflictMarker> {
        if released_by.trim().is_empty() {
            return Err(LedgerError::Validation("released_by is required".into()));
        }
        let marker = self
            .storage
            .release_conflict_marker(register_id, released_by, notes, shared::util::now_millis())?
            .ok_or_else(|| LedgerError::NoActiveConflict(register_id.to_string()))?;

        tracing::warn!(
            register_id = %register_id,
            released_by = %released_by,
            "Chain conflict released by operator"
        );
        Ok(marker)
    }

    pub fn active_conflict(&self, register_id: &str) -> LedgerResult<Option<ChainConflictMarker>> {
        Ok(self.storage.get_active_conflict(register_id)?)
    }

    // ========== Reads ==========

    pub fn get_record(&self, record_id: &str) -> LedgerResult<SignedRecord> {
        self.storage
            .get_record(record_id)?
            .ok_or_else(|| LedgerError::RecordNotFound(record_id.to_string()))
    }

    /// 从 `from_counter` 开始最多 `limit` 条
    pub fn list_records(
        &self,
        register_id: &str,
        from_counter: u64,
        limit: usize,
    ) -> LedgerResult<Vec<SignedRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let from = from_counter.max(1);
        let to = from.saturating_add(limit as u64 - 1);
        Ok(self.storage.list_records(register_id, from, to)?)
    }

    pub fn chain_head(&self, register_id: &str) -> LedgerResult<Option<ChainHead>> {
        Ok(self.storage.get_chain_head(register_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::DeviceAuditLog;
    use crate::device::SoftwareDriver;
    use rust_decimal::Decimal;
    use shared::fiscal::{ProvisionDeviceRequest, TaxAuthorityCredentials};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup() -> (Arc<SignatureLedger>, FiscalStorage) {
        let storage = FiscalStorage::open_in_memory().unwrap();
        let audit = DeviceAuditLog::new(storage.clone());
        let registry = DeviceRegistry::load(
            storage.clone(),
            Arc::new(SoftwareDriver::auto_provisioning()),
            audit,
            30,
        )
        .unwrap();
        registry
            .provision(ProvisionDeviceRequest {
                serial_number: "SN-1".into(),
                cash_register_id: "REG-1".into(),
                device_type: "software".into(),
                vendor_id: String::new(),
                product_id: String::new(),
                timeout_seconds: 2,
                kassen_id: "KASSE-1".into(),
                tax_authority: TaxAuthorityCredentials::default(),
            })
            .unwrap();
        registry.get("REG-1").unwrap().connect("SN-1").await.unwrap();

        let (ledger, _rx) = SignatureLedger::new(storage.clone(), registry);
        (Arc::new(ledger), storage)
    }

    fn sale(correlation: &str, normal: &str) -> CreateRecordRequest {
        CreateRecordRequest {
            cash_register_id: "REG-1".into(),
            record_type: RecordType::Sale,
            totals: TaxTotals {
                normal: d(normal),
                ..Default::default()
            },
            correlation_id: correlation.into(),
            credit_note: None,
        }
    }

    fn credit_note(correlation: &str, original: &str, normal: &str) -> CreateRecordRequest {
        CreateRecordRequest {
            cash_register_id: "REG-1".into(),
            record_type: RecordType::CreditNote,
            totals: TaxTotals {
                normal: d(normal),
                ..Default::default()
            },
            correlation_id: correlation.into(),
            credit_note: Some(CreditNoteRef {
                original_invoice_id: original.into(),
                reason_code: "RETURN".into(),
                reason_text: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_chain_links_from_genesis() {
        let (ledger, _) = setup().await;

        let first = ledger.create_signed_record(sale("tx-1", "10")).await.unwrap();
        let second = ledger.create_signed_record(sale("tx-2", "5.50")).await.unwrap();

        assert_eq!(first.signature_counter, 1);
        assert_eq!(first.previous_signature_value, GENESIS_SIGNATURE);
        assert_eq!(second.signature_counter, 2);
        assert_eq!(second.previous_signature_value, first.signature_value);
        assert_eq!(first.device_serial, "SN-1");

        let head = ledger.chain_head("REG-1").unwrap().unwrap();
        assert_eq!(head.counter, 2);
        assert_eq!(head.record_id, second.id);

        let verification = ledger.verify_chain("REG-1", 1, u64::MAX).unwrap();
        assert!(verification.valid);
        assert_eq!(verification.checked, 2);
    }

    #[tokio::test]
    async fn test_same_correlation_returns_original() {
        let (ledger, _) = setup().await;

        let first = ledger.create_signed_record(sale("tx-1", "10")).await.unwrap();
        let replay = ledger.create_signed_record(sale("tx-1", "10.00")).await.unwrap();
        let different = ledger.create_signed_record(sale("tx-1", "99")).await.unwrap();

        assert_eq!(first, replay);
        assert_eq!(first, different);
        assert_eq!(ledger.chain_head("REG-1").unwrap().unwrap().counter, 1);
    }

    #[tokio::test]
    async fn test_validation_rules() {
        let (ledger, _) = setup().await;

        let negative_sale = ledger.create_signed_record(sale("tx-1", "-1")).await;
        assert!(matches!(negative_sale, Err(LedgerError::Validation(_))));

        let mut closing = sale("tx-2", "1");
        closing.record_type = RecordType::DailyClosing;
        assert!(matches!(
            ledger.create_signed_record(closing).await,
            Err(LedgerError::Validation(_))
        ));

        let mut empty = sale("", "1");
        empty.correlation_id = " ".into();
        assert!(matches!(
            ledger.create_signed_record(empty).await,
            Err(LedgerError::Validation(_))
        ));

        assert!(ledger.chain_head("REG-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credit_note_is_new_chain_entry() {
        let (ledger, _) = setup().await;
        let original = ledger.create_signed_record(sale("tx-1", "20")).await.unwrap();

        let note = ledger
            .create_signed_record(credit_note("cn-1", &original.id, "-5"))
            .await
            .unwrap();
        assert_eq!(note.signature_counter, 2);
        assert_eq!(note.previous_signature_value, original.signature_value);
        assert_eq!(
            note.credit_note.as_ref().unwrap().original_invoice_id,
            original.id
        );

        // 原票不变
        assert_eq!(ledger.get_record(&original.id).unwrap(), original);

        let unknown = ledger
            .create_signed_record(credit_note("cn-2", "missing", "-1"))
            .await;
        assert!(matches!(unknown, Err(LedgerError::OriginalInvoiceInvalid(_))));

        let of_credit_note = ledger
            .create_signed_record(credit_note("cn-3", &note.id, "-1"))
            .await;
        assert!(matches!(of_credit_note, Err(LedgerError::OriginalInvoiceInvalid(_))));

        let too_large = ledger
            .create_signed_record(credit_note("cn-4", &original.id, "-20.01"))
            .await;
        assert!(matches!(too_large, Err(LedgerError::Validation(_))));

        let positive = ledger
            .create_signed_record(credit_note("cn-5", &original.id, "5"))
            .await;
        assert!(matches!(positive, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_tampered_total_is_detected_and_freezes_register() {
        let (ledger, storage) = setup().await;
        ledger.create_signed_record(sale("tx-1", "10")).await.unwrap();
        let second = ledger.create_signed_record(sale("tx-2", "20")).await.unwrap();
        ledger.create_signed_record(sale("tx-3", "30")).await.unwrap();

        let mut tampered = second.clone();
        tampered.totals.normal = d("2.00");
        storage.put_record_raw(&tampered).unwrap();

        // 只读检查不冻结
        let inspection = ledger.inspect_chain("REG-1", 1, u64::MAX).unwrap();
        assert!(!inspection.valid);
        assert!(ledger.active_conflict("REG-1").unwrap().is_none());

        let verification = ledger.verify_chain("REG-1", 1, u64::MAX).unwrap();
        assert!(!verification.valid);
        let chain_break = verification.first_break.unwrap();
        assert_eq!(chain_break.counter, 2);
        assert!(chain_break.reason.contains("payload hash"));

        let flagged = ledger.get_record(&second.id).unwrap();
        assert!(!flagged.is_valid);
        assert!(flagged.validation_error.is_some());

        let blocked = ledger.create_signed_record(sale("tx-4", "1")).await;
        assert!(matches!(blocked, Err(LedgerError::ChainConflict { .. })));

        ledger
            .release_chain_conflict("REG-1", "auditor", Some("investigated"))
            .unwrap();
        let resumed = ledger.create_signed_record(sale("tx-4", "1")).await.unwrap();
        assert_eq!(resumed.signature_counter, 4);

        assert!(matches!(
            ledger.release_chain_conflict("REG-1", "auditor", None),
            Err(LedgerError::NoActiveConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_broken_link_is_detected() {
        let (ledger, storage) = setup().await;
        ledger.create_signed_record(sale("tx-1", "10")).await.unwrap();
        let second = ledger.create_signed_record(sale("tx-2", "20")).await.unwrap();

        let mut relinked = second.clone();
        relinked.previous_signature_value = "forged".into();
        storage.put_record_raw(&relinked).unwrap();

        let verification = ledger.inspect_chain("REG-1", 2, 2).unwrap();
        assert!(!verification.valid);
        assert!(verification.first_break.unwrap().reason.contains("previous signature"));
    }

    #[tokio::test]
    async fn test_concurrent_signing_is_gap_free() {
        let (ledger, _) = setup().await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .create_signed_record(sale(&format!("tx-{i}"), "1"))
                    .await
            }));
        }
        let mut counters = Vec::new();
        for handle in handles {
            counters.push(handle.await.unwrap().unwrap().signature_counter);
        }
        counters.sort_unstable();
        assert_eq!(counters, (1..=20).collect::<Vec<u64>>());

        let verification = ledger.verify_chain("REG-1", 1, u64::MAX).unwrap();
        assert!(verification.valid);
        assert_eq!(verification.checked, 20);
    }

    #[tokio::test]
    async fn test_list_records_window() {
        let (ledger, _) = setup().await;
        for i in 0..5 {
            ledger
                .create_signed_record(sale(&format!("tx-{i}"), "1"))
                .await
                .unwrap();
        }
        let page = ledger.list_records("REG-1", 2, 2).unwrap();
        let counters: Vec<u64> = page.iter().map(|r| r.signature_counter).collect();
        assert_eq!(counters, vec![2, 3]);
        assert!(ledger.list_records("REG-1", 1, 0).unwrap().is_empty());
        assert!(matches!(
            ledger.get_record("nope"),
            Err(LedgerError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unprovisioned_register_is_rejected() {
        let (ledger, _) = setup().await;
        let mut req = sale("tx-1", "1");
        req.cash_register_id = "REG-9".into();
        assert!(matches!(
            ledger.create_signed_record(req).await,
            Err(LedgerError::Device(crate::device::DeviceError::NotProvisioned(_)))
        ));
    }
}
