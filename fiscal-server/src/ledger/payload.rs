//! 规范化签名载荷
//!
//! 签名与校验使用同一份 JSON 文本：字段顺序固定，金额去掉尾随零。
//! 载荷的 SHA-256 存入 `payload_hash`，存储中的金额被改动时校验可发现。

use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::fiscal::{CreditNoteRef, RecordPeriod, RecordType, SignedRecord, TaxTotals};

#[derive(Debug, Serialize)]
pub struct CanonicalPayload<'a> {
    pub cash_register_id: &'a str,
    pub record_type: RecordType,
    pub signature_counter: u64,
    pub totals: TaxTotals,
    pub previous_signature_value: &'a str,
    pub correlation_id: &'a str,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_note: Option<&'a CreditNoteRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<RecordPeriod>,
}

impl<'a> CanonicalPayload<'a> {
    pub fn of(record: &'a SignedRecord) -> Self {
        Self {
            cash_register_id: &record.cash_register_id,
            record_type: record.record_type,
            signature_counter: record.signature_counter,
            totals: record.totals.normalized(),
            previous_signature_value: &record.previous_signature_value,
            correlation_id: &record.correlation_id,
            created_at: record.created_at,
            credit_note: record.credit_note.as_ref(),
            period: record.period,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

pub fn payload_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// 重新计算一条已存储记录的载荷哈希
pub fn recompute_hash(record: &SignedRecord) -> serde_json::Result<String> {
    let bytes = CanonicalPayload::of(record).to_bytes()?;
    Ok(payload_hash(&bytes))
}
