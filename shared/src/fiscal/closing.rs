//! 结账周期（日结 / 月结 / 年结）

use super::record::RecordType;
use super::totals::TaxTotals;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Daily,
    Monthly,
    Yearly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 3] = [PeriodType::Daily, PeriodType::Monthly, PeriodType::Yearly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// 对应的结账记录类型
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Daily => RecordType::DailyClosing,
            Self::Monthly => RecordType::MonthlyClosing,
            Self::Yearly => RecordType::YearlyClosing,
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(format!("unknown period type: {other}")),
        }
    }
}

/// 结账状态（Completed / Failed 为终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosingStatus {
    Draft,
    Completed,
    Failed,
}

/// 结账记录的申报状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    #[default]
    Pending,
    Reported,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingPeriod {
    pub id: i64,
    pub cash_register_id: String,
    pub period_type: PeriodType,
    pub period_start: i64,
    pub period_end: i64,
    pub totals: TaxTotals,
    pub gross_total: Decimal,
    pub tax_total: Decimal,
    pub transaction_count: u64,
    pub status: ClosingStatus,
    /// 结账签名记录
    pub signed_record_id: Option<String>,
    pub compliance_status: ComplianceStatus,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// canPerformClosing 结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingCheck {
    pub can_perform: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub period_start: i64,
    pub period_end: i64,
}
