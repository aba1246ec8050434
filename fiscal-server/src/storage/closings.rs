//! 结账周期表

use super::{
    CLOSING_BY_RECORD_TABLE, CLOSINGS_TABLE, COMPLETED_CLOSINGS_TABLE, FiscalStorage,
    StorageResult,
};
use redb::{ReadableDatabase, ReadableTable};
use shared::fiscal::{ClosingPeriod, ComplianceStatus, PeriodType};

impl FiscalStorage {
    /// 保存结账周期（Failed 行或状态更新）
    ///
    /// Completed 行只能通过 `append_record` 与结账签名记录一起写入。
    pub fn put_closing(&self, closing: &ClosingPeriod) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CLOSINGS_TABLE)?;
            let value = serde_json::to_vec(closing)?;
            table.insert(closing.id, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_closing(&self, closing_id: i64) -> StorageResult<Option<ClosingPeriod>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLOSINGS_TABLE)?;
        match table.get(closing_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// 已完成的同周期结账
    pub fn find_completed_closing(
        &self,
        register_id: &str,
        period_type: PeriodType,
        period_start: i64,
    ) -> StorageResult<Option<ClosingPeriod>> {
        let read_txn = self.db.begin_read()?;
        let completed = read_txn.open_table(COMPLETED_CLOSINGS_TABLE)?;
        let closing_id = match completed.get((register_id, period_type.as_str(), period_start))? {
            Some(g) => g.value(),
            None => return Ok(None),
        };

        let closings = read_txn.open_table(CLOSINGS_TABLE)?;
        match closings.get(closing_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// 结账历史（最新在前）
    pub fn list_closings(
        &self,
        register_id: &str,
        period_type: Option<PeriodType>,
        limit: usize,
    ) -> StorageResult<Vec<ClosingPeriod>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CLOSINGS_TABLE)?;

        let mut closings = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let closing: ClosingPeriod = serde_json::from_slice(value.value())?;
            if closing.cash_register_id != register_id {
                continue;
            }
            if period_type.is_some_and(|t| t != closing.period_type) {
                continue;
            }
            closings.push(closing);
        }

        closings.sort_by(|a, b| {
            b.period_start
                .cmp(&a.period_start)
                .then(b.created_at.cmp(&a.created_at))
        });
        closings.truncate(limit);
        Ok(closings)
    }

    /// 按结账签名记录更新申报状态，记录不是结账记录时返回 None
    pub fn set_closing_compliance_status(
        &self,
        record_id: &str,
        status: ComplianceStatus,
    ) -> StorageResult<Option<ClosingPeriod>> {
        let txn = self.db.begin_write()?;
        let updated = {
            let by_record = txn.open_table(CLOSING_BY_RECORD_TABLE)?;
            let closing_id = by_record.get(record_id)?.map(|g| g.value());

            match closing_id {
                Some(id) => {
                    let mut table = txn.open_table(CLOSINGS_TABLE)?;
                    let closing_opt = match table.get(id)? {
                        Some(value) => {
                            Some(serde_json::from_slice::<ClosingPeriod>(value.value())?)
                        }
                        None => None,
                    };
                    match closing_opt {
                        Some(mut closing) => {
                            closing.compliance_status = status;
                            let value = serde_json::to_vec(&closing)?;
                            table.insert(id, value.as_slice())?;
                            Some(closing)
                        }
                        None => None,
                    }
                }
                None => None,
            }
        };
        txn.commit()?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::fiscal::{ClosingStatus, TaxTotals};

    fn closing(id: i64, register: &str, start: i64, status: ClosingStatus) -> ClosingPeriod {
        ClosingPeriod {
            id,
            cash_register_id: register.to_string(),
            period_type: PeriodType::Daily,
            period_start: start,
            period_end: start + 86_400_000,
            totals: TaxTotals::default(),
            gross_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            transaction_count: 0,
            status,
            signed_record_id: None,
            compliance_status: ComplianceStatus::Pending,
            failure_reason: None,
            created_at: start,
            completed_at: None,
        }
    }

    #[test]
    fn test_history_newest_first_and_filtered() {
        let storage = FiscalStorage::open_in_memory().unwrap();
        storage.put_closing(&closing(1, "REG-1", 100, ClosingStatus::Failed)).unwrap();
        storage.put_closing(&closing(2, "REG-1", 300, ClosingStatus::Failed)).unwrap();
        storage.put_closing(&closing(3, "REG-2", 200, ClosingStatus::Failed)).unwrap();

        let history = storage.list_closings("REG-1", None, 10).unwrap();
        assert_eq!(history.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 1]);

        let history = storage.list_closings("REG-1", Some(PeriodType::Monthly), 10).unwrap();
        assert!(history.is_empty());

        let history = storage.list_closings("REG-1", None, 1).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_failed_rows_do_not_count_as_completed() {
        let storage = FiscalStorage::open_in_memory().unwrap();
        storage.put_closing(&closing(1, "REG-1", 100, ClosingStatus::Failed)).unwrap();
        assert!(
            storage
                .find_completed_closing("REG-1", PeriodType::Daily, 100)
                .unwrap()
                .is_none()
        );
        assert!(
            storage
                .set_closing_compliance_status("unknown", ComplianceStatus::Reported)
                .unwrap()
                .is_none()
        );
    }
}
