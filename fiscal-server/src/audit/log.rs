//! 设备审计日志
//!
//! 同步写入 redb，不经过可能丢消息的通道。

use sha2::{Digest, Sha256};

use super::types::{AuditChainBreak, AuditChainVerification, DeviceAuditAction, DeviceAuditEntry};
use crate::storage::{FiscalStorage, StorageResult};

/// 每次读取的批量大小
const VERIFY_BATCH: usize = 500;

#[derive(Clone, Debug)]
pub struct DeviceAuditLog {
    storage: FiscalStorage,
}

impl DeviceAuditLog {
    pub fn new(storage: FiscalStorage) -> Self {
        Self { storage }
    }

    /// 追加一条设备操作记录
    pub fn record(
        &self,
        register_id: &str,
        serial_number: &str,
        action: DeviceAuditAction,
        success: bool,
        detail: Option<String>,
    ) -> StorageResult<DeviceAuditEntry> {
        let timestamp = shared::util::now_millis();
        self.storage.append_audit_entry(|sequence, prev_hash| {
            let curr_hash = compute_audit_hash(
                prev_hash,
                sequence,
                timestamp,
                register_id,
                serial_number,
                action,
                success,
                detail.as_deref(),
            );
            DeviceAuditEntry {
                sequence,
                timestamp,
                cash_register_id: register_id.to_string(),
                serial_number: serial_number.to_string(),
                action,
                success,
                detail,
                prev_hash: prev_hash.to_string(),
                curr_hash,
            }
        })
    }

    /// 收银机最近的设备操作
    pub fn recent(&self, register_id: &str, limit: usize) -> StorageResult<Vec<DeviceAuditEntry>> {
        self.storage.recent_audit_entries(register_id, limit)
    }

    /// 从头验证整条审计链
    pub fn verify_chain(&self) -> StorageResult<AuditChainVerification> {
        let mut breaks = Vec::new();
        let mut total = 0u64;
        let mut expected_prev = crate::storage::AUDIT_GENESIS_HASH.to_string();
        let mut expected_seq = 1u64;

        loop {
            let batch = self.storage.list_audit_entries(expected_seq, VERIFY_BATCH)?;
            if batch.is_empty() {
                break;
            }
            for entry in batch {
                total += 1;
                if entry.sequence != expected_seq {
                    breaks.push(AuditChainBreak {
                        sequence: entry.sequence,
                        reason: format!("expected sequence {expected_seq}"),
                    });
                }
                if entry.prev_hash != expected_prev {
                    breaks.push(AuditChainBreak {
                        sequence: entry.sequence,
                        reason: "prev_hash does not match previous entry".to_string(),
                    });
                }
                let recomputed = compute_audit_hash(
                    &entry.prev_hash,
                    entry.sequence,
                    entry.timestamp,
                    &entry.cash_register_id,
                    &entry.serial_number,
                    entry.action,
                    entry.success,
                    entry.detail.as_deref(),
                );
                if recomputed != entry.curr_hash {
                    breaks.push(AuditChainBreak {
                        sequence: entry.sequence,
                        reason: "curr_hash does not match entry content".to_string(),
                    });
                }
                expected_prev = entry.curr_hash;
                expected_seq = entry.sequence + 1;
            }
        }

        Ok(AuditChainVerification {
            total_entries: total,
            chain_intact: breaks.is_empty(),
            breaks,
        })
    }
}

/// 计算审计条目的 SHA256 哈希
///
/// - 变长字段间用 `\x00` 分隔，防止 `("ab","cd")` 与 `("abc","d")` 碰撞
/// - 定长字段用 LE 字节序
/// - Optional 字段用 `\x00`=None / `\x01`+bytes=Some 区分
#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_audit_hash(
    prev_hash: &str,
    sequence: u64,
    timestamp: i64,
    register_id: &str,
    serial_number: &str,
    action: DeviceAuditAction,
    success: bool,
    detail: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(prev_hash.as_bytes());
    hasher.update(b"\x00");

    hasher.update(sequence.to_le_bytes());
    hasher.update(timestamp.to_le_bytes());

    // action serde snake_case
    let action_str = serde_json::to_string(&action).unwrap_or_default();
    hasher.update(action_str.as_bytes());
    hasher.update(b"\x00");

    hasher.update(register_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(serial_number.as_bytes());
    hasher.update(b"\x00");

    hasher.update([success as u8]);

    match detail {
        Some(v) => {
            hasher.update(b"\x01");
            hasher.update(v.as_bytes());
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    hasher.update(b"\x00");

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_links_and_verifies() {
        let storage = FiscalStorage::open_in_memory().unwrap();
        let log = DeviceAuditLog::new(storage);

        let first = log
            .record("REG-1", "SN-1", DeviceAuditAction::Connect, true, None)
            .unwrap();
        let second = log
            .record(
                "REG-1",
                "SN-1",
                DeviceAuditAction::Sign,
                false,
                Some("timeout".to_string()),
            )
            .unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(first.prev_hash, "genesis");
        assert_eq!(second.prev_hash, first.curr_hash);

        let result = log.verify_chain().unwrap();
        assert!(result.chain_intact);
        assert_eq!(result.total_entries, 2);

        let recent = log.recent("REG-1", 1).unwrap();
        assert_eq!(recent[0].sequence, 2);
    }

    #[test]
    fn test_hash_distinguishes_none_and_empty_detail() {
        let a = compute_audit_hash("p", 1, 0, "R", "S", DeviceAuditAction::Sign, true, None);
        let b = compute_audit_hash("p", 1, 0, "R", "S", DeviceAuditAction::Sign, true, Some(""));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_covers_success_flag() {
        let a = compute_audit_hash("p", 1, 0, "R", "S", DeviceAuditAction::Sign, true, None);
        let b = compute_audit_hash("p", 1, 0, "R", "S", DeviceAuditAction::Sign, false, None);
        assert_ne!(a, b);
    }
}
