//! 签名链记录表
//!
//! 记录按 `(register_id, counter)` 存储，只追加。
//! 链头表 `chain_heads` 与最新记录交叉校验，任何不一致都视为链冲突。

use super::{
    CHAIN_CONFLICTS_TABLE, CHAIN_HEADS_TABLE, CLOSING_BY_RECORD_TABLE, CLOSINGS_TABLE,
    COMPLETED_CLOSINGS_TABLE, CORRELATIONS_TABLE, CREDITED_TOTALS_TABLE, FiscalStorage,
    RECORD_INDEX_TABLE, RECORDS_TABLE, StorageError, StorageResult,
};
use redb::{ReadableDatabase, ReadableTable};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::fiscal::{ChainConflictMarker, ClosingPeriod, GENESIS_SIGNATURE, SignedRecord};

/// 收银机签名链头
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub counter: u64,
    pub signature_value: String,
    pub record_id: String,
}

impl ChainHead {
    /// 下一条记录应链接的签名
    pub fn previous_signature(head: Option<&ChainHead>) -> &str {
        head.map(|h| h.signature_value.as_str())
            .unwrap_or(GENESIS_SIGNATURE)
    }
}

fn head_mismatch(register_id: &str, reason: impl Into<String>) -> StorageError {
    StorageError::ChainHeadMismatch {
        register_id: register_id.to_string(),
        reason: reason.into(),
    }
}

impl FiscalStorage {
    // ========== Reads ==========

    /// 链头（空链返回 None）
    pub fn get_chain_head(&self, register_id: &str) -> StorageResult<Option<ChainHead>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHAIN_HEADS_TABLE)?;
        match table.get(register_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// 按计数器取最新一条记录
    pub fn get_last_record(&self, register_id: &str) -> StorageResult<Option<SignedRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;
        let last = table.range((register_id, 0u64)..=(register_id, u64::MAX))?.next_back();
        match last {
            Some(result) => {
                let (_key, value) = result?;
                Ok(Some(serde_json::from_slice(value.value())?))
            }
            None => Ok(None),
        }
    }

    pub fn get_record(&self, record_id: &str) -> StorageResult<Option<SignedRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(RECORD_INDEX_TABLE)?;
        let key = match index.get(record_id)? {
            Some(g) => {
                let (register_id, counter) = g.value();
                (register_id.to_string(), counter)
            }
            None => return Ok(None),
        };

        let records = read_txn.open_table(RECORDS_TABLE)?;
        match records.get((key.0.as_str(), key.1))? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_record_at(
        &self,
        register_id: &str,
        counter: u64,
    ) -> StorageResult<Option<SignedRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;
        match table.get((register_id, counter))? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// 按上游 correlation_id 查找已签名记录
    pub fn find_by_correlation(
        &self,
        register_id: &str,
        correlation_id: &str,
    ) -> StorageResult<Option<SignedRecord>> {
        let read_txn = self.db.begin_read()?;
        let correlations = read_txn.open_table(CORRELATIONS_TABLE)?;
        let counter = match correlations.get((register_id, correlation_id))? {
            Some(g) => g.value(),
            None => return Ok(None),
        };

        let records = read_txn.open_table(RECORDS_TABLE)?;
        match records.get((register_id, counter))? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// 计数器区间内的记录（含两端）
    pub fn list_records(
        &self,
        register_id: &str,
        from_counter: u64,
        to_counter: u64,
    ) -> StorageResult<Vec<SignedRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;

        let mut records = Vec::new();
        if from_counter > to_counter {
            return Ok(records);
        }
        for result in table.range((register_id, from_counter)..=(register_id, to_counter))? {
            let (_key, value) = result?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    /// 创建时间落在 `[start, end)` 的记录，按计数器升序
    pub fn list_records_between(
        &self,
        register_id: &str,
        start: i64,
        end: i64,
    ) -> StorageResult<Vec<SignedRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECORDS_TABLE)?;

        let mut records = Vec::new();
        for result in table.range((register_id, 0u64)..=(register_id, u64::MAX))? {
            let (_key, value) = result?;
            let record: SignedRecord = serde_json::from_slice(value.value())?;
            if record.created_at >= start && record.created_at < end {
                records.push(record);
            }
        }
        Ok(records)
    }

    // ========== Append ==========

    /// 追加一条签名记录（可选同时写入完成的结账周期）
    ///
    /// 单个写事务内完成：链头校验、记录、ID 索引、correlation、链头更新。
    /// 写入前重新校验链头，签名期间链头被其他写入者改变则返回 `ChainHeadMismatch`。
    pub fn append_record(
        &self,
        record: &SignedRecord,
        closing: Option<&ClosingPeriod>,
    ) -> StorageResult<()> {
        let register_id = record.cash_register_id.as_str();
        let txn = self.db.begin_write()?;
        {
            let mut heads = txn.open_table(CHAIN_HEADS_TABLE)?;
            let mut records = txn.open_table(RECORDS_TABLE)?;

            let head: Option<ChainHead> = match heads.get(register_id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            let last: Option<(u64, String)> = match records
                .range((register_id, 0u64)..=(register_id, u64::MAX))?
                .next_back()
            {
                Some(result) => {
                    let (key, value) = result?;
                    let stored: SignedRecord = serde_json::from_slice(value.value())?;
                    Some((key.value().1, stored.signature_value))
                }
                None => None,
            };

            // 链头与最新记录交叉校验
            match (&head, &last) {
                (None, None) => {}
                (Some(h), Some((counter, signature)))
                    if h.counter == *counter && &h.signature_value == signature => {}
                (Some(h), None) => {
                    return Err(head_mismatch(
                        register_id,
                        format!("head at counter {} but no records stored", h.counter),
                    ));
                }
                (None, Some((counter, _))) => {
                    return Err(head_mismatch(
                        register_id,
                        format!("records up to counter {counter} but no head stored"),
                    ));
                }
                (Some(h), Some((counter, _))) => {
                    return Err(head_mismatch(
                        register_id,
                        format!(
                            "head at counter {} disagrees with latest record {counter}",
                            h.counter
                        ),
                    ));
                }
            }

            let expected_counter = head.as_ref().map(|h| h.counter).unwrap_or(0) + 1;
            if record.signature_counter != expected_counter {
                return Err(head_mismatch(
                    register_id,
                    format!(
                        "expected counter {expected_counter}, got {}",
                        record.signature_counter
                    ),
                ));
            }
            if record.previous_signature_value != ChainHead::previous_signature(head.as_ref()) {
                return Err(head_mismatch(
                    register_id,
                    "previous signature does not match chain head",
                ));
            }
            if records
                .get((register_id, record.signature_counter))?
                .is_some()
            {
                return Err(head_mismatch(
                    register_id,
                    format!("counter {} already occupied", record.signature_counter),
                ));
            }

            let mut correlations = txn.open_table(CORRELATIONS_TABLE)?;
            if correlations
                .get((register_id, record.correlation_id.as_str()))?
                .is_some()
            {
                return Err(head_mismatch(
                    register_id,
                    format!("correlation {} already signed", record.correlation_id),
                ));
            }

            let value = serde_json::to_vec(record)?;
            records.insert((register_id, record.signature_counter), value.as_slice())?;

            let mut index = txn.open_table(RECORD_INDEX_TABLE)?;
            index.insert(
                record.id.as_str(),
                (register_id, record.signature_counter),
            )?;

            correlations.insert(
                (register_id, record.correlation_id.as_str()),
                record.signature_counter,
            )?;

            if let Some(credit_note) = &record.credit_note {
                let mut credited = txn.open_table(CREDITED_TOTALS_TABLE)?;
                let key = credit_note.original_invoice_id.as_str();
                let previous: Decimal = match credited.get(key)? {
                    Some(value) => serde_json::from_slice(value.value())?,
                    None => Decimal::ZERO,
                };
                let total = previous + record.totals.gross_total().abs();
                let total_value = serde_json::to_vec(&total)?;
                credited.insert(key, total_value.as_slice())?;
            }

            let new_head = ChainHead {
                counter: record.signature_counter,
                signature_value: record.signature_value.clone(),
                record_id: record.id.clone(),
            };
            let head_value = serde_json::to_vec(&new_head)?;
            heads.insert(register_id, head_value.as_slice())?;

            if let Some(closing) = closing {
                let mut completed = txn.open_table(COMPLETED_CLOSINGS_TABLE)?;
                let key = (
                    register_id,
                    closing.period_type.as_str(),
                    closing.period_start,
                );
                if completed.get(key)?.is_some() {
                    return Err(StorageError::ClosingExists(format!(
                        "{register_id}/{}/{}",
                        closing.period_type, closing.period_start
                    )));
                }
                completed.insert(key, closing.id)?;

                let mut closings = txn.open_table(CLOSINGS_TABLE)?;
                let closing_value = serde_json::to_vec(closing)?;
                closings.insert(closing.id, closing_value.as_slice())?;

                let mut by_record = txn.open_table(CLOSING_BY_RECORD_TABLE)?;
                by_record.insert(record.id.as_str(), closing.id)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// 原票已红冲的累计金额
    pub fn credited_total(&self, original_invoice_id: &str) -> StorageResult<Decimal> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CREDITED_TOTALS_TABLE)?;
        match table.get(original_invoice_id)? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Ok(Decimal::ZERO),
        }
    }

    /// 校验时标记记录无效（唯一允许的记录变更）
    pub fn mark_record_invalid(
        &self,
        register_id: &str,
        counter: u64,
        reason: &str,
    ) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(RECORDS_TABLE)?;
            let record_opt = match table.get((register_id, counter))? {
                Some(value) => Some(serde_json::from_slice::<SignedRecord>(value.value())?),
                None => None,
            };
            if let Some(mut record) = record_opt {
                record.is_valid = false;
                record.validation_error = Some(reason.to_string());
                let value = serde_json::to_vec(&record)?;
                table.insert((register_id, counter), value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Chain Conflict Markers ==========

    /// 当前生效的冲突标记
    pub fn get_active_conflict(
        &self,
        register_id: &str,
    ) -> StorageResult<Option<ChainConflictMarker>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHAIN_CONFLICTS_TABLE)?;
        match table.get(register_id)? {
            Some(value) => {
                let marker: ChainConflictMarker = serde_json::from_slice(value.value())?;
                Ok(marker.is_active().then_some(marker))
            }
            None => Ok(None),
        }
    }

    /// 写入冲突标记；已有生效标记时保留最早的一条
    pub fn put_conflict_marker(&self, marker: &ChainConflictMarker) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CHAIN_CONFLICTS_TABLE)?;
            let active = match table.get(marker.cash_register_id.as_str())? {
                Some(value) => {
                    serde_json::from_slice::<ChainConflictMarker>(value.value())?.is_active()
                }
                None => false,
            };
            if !active {
                let value = serde_json::to_vec(marker)?;
                table.insert(marker.cash_register_id.as_str(), value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// 人工解除冻结，返回被解除的标记
    pub fn release_conflict_marker(
        &self,
        register_id: &str,
        released_by: &str,
        notes: Option<&str>,
        released_at: i64,
    ) -> StorageResult<Option<ChainConflictMarker>> {
        let txn = self.db.begin_write()?;
        let released = {
            let mut table = txn.open_table(CHAIN_CONFLICTS_TABLE)?;
            let marker_opt = match table.get(register_id)? {
                Some(value) => Some(serde_json::from_slice::<ChainConflictMarker>(
                    value.value(),
                )?),
                None => None,
            };
            match marker_opt {
                Some(mut marker) if marker.is_active() => {
                    marker.released_by = Some(released_by.to_string());
                    marker.released_at = Some(released_at);
                    marker.notes = notes.map(str::to_string);
                    let value = serde_json::to_vec(&marker)?;
                    table.insert(register_id, value.as_slice())?;
                    Some(marker)
                }
                _ => None,
            }
        };
        txn.commit()?;
        Ok(released)
    }

    /// 直接覆盖一条记录，用于篡改检测测试
    #[cfg(test)]
    pub(crate) fn put_record_raw(&self, record: &SignedRecord) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(RECORDS_TABLE)?;
            let value = serde_json::to_vec(record)?;
            table.insert(
                (record.cash_register_id.as_str(), record.signature_counter),
                value.as_slice(),
            )?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::fiscal::{RecordType, SignatureScheme, TaxTotals};

    fn record(register: &str, counter: u64, prev: &str) -> SignedRecord {
        SignedRecord {
            id: format!("{register}-{counter}"),
            cash_register_id: register.to_string(),
            record_type: RecordType::Sale,
            totals: TaxTotals::default(),
            signature_value: format!("sig-{counter}"),
            previous_signature_value: prev.to_string(),
            signature_counter: counter,
            signature_scheme: SignatureScheme::Raw {
                provider: "test".to_string(),
            },
            correlation_id: format!("tx-{counter}"),
            created_at: counter as i64 * 1000,
            device_serial: "SN-1".to_string(),
            device_counter: counter,
            payload_hash: String::new(),
            credit_note: None,
            period: None,
            is_valid: true,
            validation_error: None,
        }
    }

    #[test]
    fn test_append_and_read_chain() {
        let storage = FiscalStorage::open_in_memory().unwrap();
        storage
            .append_record(&record("REG-1", 1, GENESIS_SIGNATURE), None)
            .unwrap();
        storage.append_record(&record("REG-1", 2, "sig-1"), None).unwrap();

        let head = storage.get_chain_head("REG-1").unwrap().unwrap();
        assert_eq!(head.counter, 2);
        assert_eq!(head.signature_value, "sig-2");

        let last = storage.get_last_record("REG-1").unwrap().unwrap();
        assert_eq!(last.signature_counter, 2);

        let by_id = storage.get_record("REG-1-1").unwrap().unwrap();
        assert_eq!(by_id.signature_counter, 1);

        let by_corr = storage.find_by_correlation("REG-1", "tx-2").unwrap().unwrap();
        assert_eq!(by_corr.id, "REG-1-2");

        assert_eq!(storage.list_records("REG-1", 1, 10).unwrap().len(), 2);
        assert_eq!(storage.list_records_between("REG-1", 1000, 2000).unwrap().len(), 1);
        assert!(storage.get_last_record("REG-2").unwrap().is_none());
    }

    #[test]
    fn test_append_rejects_gap_and_bad_link() {
        let storage = FiscalStorage::open_in_memory().unwrap();
        storage
            .append_record(&record("REG-1", 1, GENESIS_SIGNATURE), None)
            .unwrap();

        let err = storage.append_record(&record("REG-1", 3, "sig-1"), None).unwrap_err();
        assert!(matches!(err, StorageError::ChainHeadMismatch { .. }));

        let err = storage.append_record(&record("REG-1", 2, "other"), None).unwrap_err();
        assert!(matches!(err, StorageError::ChainHeadMismatch { .. }));

        // 失败的写事务不留下任何数据
        assert_eq!(storage.get_chain_head("REG-1").unwrap().unwrap().counter, 1);
    }

    #[test]
    fn test_append_rejects_reused_correlation() {
        let storage = FiscalStorage::open_in_memory().unwrap();
        storage
            .append_record(&record("REG-1", 1, GENESIS_SIGNATURE), None)
            .unwrap();
        let mut dup = record("REG-1", 2, "sig-1");
        dup.correlation_id = "tx-1".to_string();
        assert!(storage.append_record(&dup, None).is_err());
    }

    #[test]
    fn test_mark_record_invalid() {
        let storage = FiscalStorage::open_in_memory().unwrap();
        storage
            .append_record(&record("REG-1", 1, GENESIS_SIGNATURE), None)
            .unwrap();
        storage.mark_record_invalid("REG-1", 1, "broken link").unwrap();

        let r = storage.get_record_at("REG-1", 1).unwrap().unwrap();
        assert!(!r.is_valid);
        assert_eq!(r.validation_error.as_deref(), Some("broken link"));
    }

    #[test]
    fn test_conflict_marker_lifecycle() {
        let storage = FiscalStorage::open_in_memory().unwrap();
        assert!(storage.get_active_conflict("REG-1").unwrap().is_none());

        let marker = ChainConflictMarker {
            cash_register_id: "REG-1".to_string(),
            detected_at: 1,
            reason: "first".to_string(),
            released_by: None,
            released_at: None,
            notes: None,
        };
        storage.put_conflict_marker(&marker).unwrap();
        storage
            .put_conflict_marker(&ChainConflictMarker {
                reason: "second".to_string(),
                ..marker.clone()
            })
            .unwrap();

        let active = storage.get_active_conflict("REG-1").unwrap().unwrap();
        assert_eq!(active.reason, "first");

        let released = storage
            .release_conflict_marker("REG-1", "ops", Some("checked"), 2)
            .unwrap()
            .unwrap();
        assert_eq!(released.released_by.as_deref(), Some("ops"));
        assert!(storage.get_active_conflict("REG-1").unwrap().is_none());
        assert!(
            storage
                .release_conflict_marker("REG-1", "ops", None, 3)
                .unwrap()
                .is_none()
        );
    }
}
