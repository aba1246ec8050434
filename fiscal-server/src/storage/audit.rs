//! 设备审计日志表（只追加）

use super::{DEVICE_AUDIT_TABLE, FiscalStorage, StorageResult};
use crate::audit::DeviceAuditEntry;
use redb::{ReadableDatabase, ReadableTable};

/// 空审计链的 prev_hash
pub const AUDIT_GENESIS_HASH: &str = "genesis";

impl FiscalStorage {
    /// 追加一条审计条目
    ///
    /// `build` 接收新序列号和前一条的哈希，返回完整条目。
    /// 读取链尾与写入在同一个写事务内，redb 单写者保证序列号不冲突。
    pub fn append_audit_entry<F>(&self, build: F) -> StorageResult<DeviceAuditEntry>
    where
        F: FnOnce(u64, &str) -> DeviceAuditEntry,
    {
        let txn = self.db.begin_write()?;
        let entry = {
            let mut table = txn.open_table(DEVICE_AUDIT_TABLE)?;
            let last: Option<DeviceAuditEntry> = match table.last()? {
                Some((_key, value)) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            let (sequence, prev_hash) = match last {
                Some(last) => (last.sequence + 1, last.curr_hash),
                None => (1, AUDIT_GENESIS_HASH.to_string()),
            };

            let entry = build(sequence, &prev_hash);
            let value = serde_json::to_vec(&entry)?;
            table.insert(entry.sequence, value.as_slice())?;
            entry
        };
        txn.commit()?;
        Ok(entry)
    }

    /// 按序列号升序读取审计条目
    pub fn list_audit_entries(
        &self,
        from_sequence: u64,
        limit: usize,
    ) -> StorageResult<Vec<DeviceAuditEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICE_AUDIT_TABLE)?;

        let mut entries = Vec::new();
        for result in table.range(from_sequence..)?.take(limit) {
            let (_key, value) = result?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    /// 某台收银机最近的审计条目（最新在前）
    pub fn recent_audit_entries(
        &self,
        register_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<DeviceAuditEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICE_AUDIT_TABLE)?;

        let mut entries = Vec::new();
        for result in table.iter()?.rev() {
            let (_key, value) = result?;
            let entry: DeviceAuditEntry = serde_json::from_slice(value.value())?;
            if entry.cash_register_id == register_id {
                entries.push(entry);
                if entries.len() >= limit {
                    break;
                }
            }
        }
        Ok(entries)
    }
}
