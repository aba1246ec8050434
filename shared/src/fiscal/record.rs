//! 签名链记录

use super::totals::TaxTotals;
use serde::{Deserialize, Serialize};

/// 空链哨兵：每台收银机第一条记录的 previous_signature_value
pub const GENESIS_SIGNATURE: &str = "genesis";

/// 记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Sale,
    CreditNote,
    DailyClosing,
    MonthlyClosing,
    YearlyClosing,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::CreditNote => "credit_note",
            Self::DailyClosing => "daily_closing",
            Self::MonthlyClosing => "monthly_closing",
            Self::YearlyClosing => "yearly_closing",
        }
    }

    pub fn is_closing(&self) -> bool {
        matches!(
            self,
            Self::DailyClosing | Self::MonthlyClosing | Self::YearlyClosing
        )
    }

    /// 可以被红冲的票据类型
    pub fn is_invoice(&self) -> bool {
        matches!(self, Self::Sale)
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 签名方案（判别联合）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signature_format", rename_all = "snake_case")]
pub enum SignatureScheme {
    /// JWS compact：header.payload.signature
    Jws {
        provider: String,
        header: String,
        payload: String,
    },
    /// 设备直接返回的原始签名
    Raw { provider: String },
}

impl SignatureScheme {
    pub fn provider(&self) -> &str {
        match self {
            Self::Jws { provider, .. } | Self::Raw { provider } => provider,
        }
    }
}

/// 红冲引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteRef {
    pub original_invoice_id: String,
    pub reason_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_text: Option<String>,
}

/// 结账记录覆盖的时间窗口 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPeriod {
    pub start: i64,
    pub end: i64,
}

/// 签名链上的一条记录（销售、红冲、结账）
///
/// 只追加，唯一可变的是 `is_valid` / `validation_error`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedRecord {
    pub id: String,
    pub cash_register_id: String,
    pub record_type: RecordType,
    pub totals: TaxTotals,
    /// 旧格式字段名为 `signature`
    #[serde(alias = "signature")]
    pub signature_value: String,
    pub previous_signature_value: String,
    /// 收银机内单调递增、无空洞
    pub signature_counter: u64,
    pub signature_scheme: SignatureScheme,
    pub correlation_id: String,
    pub created_at: i64,
    pub device_serial: String,
    pub device_counter: u64,
    /// 规范化签名载荷的 SHA-256
    pub payload_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_note: Option<CreditNoteRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<RecordPeriod>,
    #[serde(default = "default_true")]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
}

fn default_true() -> bool {
    true
}

/// 上游提交的签名请求（销售 / 红冲）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub cash_register_id: String,
    pub record_type: RecordType,
    pub totals: TaxTotals,
    /// 上游交易 ID 派生，保证幂等
    pub correlation_id: String,
    #[serde(default)]
    pub credit_note: Option<CreditNoteRef>,
}

/// 链校验中发现的第一处断裂
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub counter: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub reason: String,
}

/// 链校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub cash_register_id: String,
    pub from_counter: u64,
    pub to_counter: u64,
    /// 实际检查的记录数
    pub checked: u64,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_break: Option<ChainBreak>,
}

/// 链冲突冻结标记
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConflictMarker {
    pub cash_register_id: String,
    pub detected_at: i64,
    pub reason: String,
    #[serde(default)]
    pub released_by: Option<String>,
    #[serde(default)]
    pub released_at: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ChainConflictMarker {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_signature_field_is_accepted() {
        let json = serde_json::json!({
            "id": "r1",
            "cash_register_id": "REG-1",
            "record_type": "sale",
            "totals": { "normal": "1.00" },
            "signature": "abc",
            "previous_signature_value": GENESIS_SIGNATURE,
            "signature_counter": 1,
            "signature_scheme": { "signature_format": "raw", "provider": "legacy" },
            "correlation_id": "tx-1",
            "created_at": 0,
            "device_serial": "SN-1",
            "device_counter": 1,
            "payload_hash": "00"
        });
        let record: SignedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.signature_value, "abc");
        assert!(record.is_valid);
        assert_eq!(record.signature_scheme.provider(), "legacy");
    }

    #[test]
    fn scheme_is_tagged_by_format() {
        let scheme = SignatureScheme::Jws {
            provider: "soft".into(),
            header: "h".into(),
            payload: "p".into(),
        };
        let json = serde_json::to_value(&scheme).unwrap();
        assert_eq!(json["signature_format"], "jws");
        assert_eq!(json["header"], "h");
    }

    #[test]
    fn record_type_classification() {
        assert!(RecordType::Sale.is_invoice());
        assert!(!RecordType::CreditNote.is_invoice());
        assert!(RecordType::MonthlyClosing.is_closing());
        assert!(!RecordType::Sale.is_closing());
    }
}
