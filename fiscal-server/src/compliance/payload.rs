//! 申报请求体

use rust_decimal::Decimal;
use serde::Serialize;
use shared::fiscal::{RecordPeriod, RecordType, SignedRecord, TaxTotals};

/// 发送给税务局的记录内容
#[derive(Debug, Serialize)]
pub struct SubmissionPayload<'a> {
    pub kassen_id: &'a str,
    pub record_id: &'a str,
    pub cash_register_id: &'a str,
    pub record_type: RecordType,
    pub signature_counter: u64,
    pub signature_value: &'a str,
    pub previous_signature_value: &'a str,
    pub signature_format: &'static str,
    pub totals: TaxTotals,
    pub gross_total: Decimal,
    pub tax_total: Decimal,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_invoice_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<RecordPeriod>,
}

impl<'a> SubmissionPayload<'a> {
    pub fn new(kassen_id: &'a str, record: &'a SignedRecord) -> Self {
        let totals = record.totals.normalized();
        Self {
            kassen_id,
            record_id: &record.id,
            cash_register_id: &record.cash_register_id,
            record_type: record.record_type,
            signature_counter: record.signature_counter,
            signature_value: &record.signature_value,
            previous_signature_value: &record.previous_signature_value,
            signature_format: match record.signature_scheme {
                shared::fiscal::SignatureScheme::Jws { .. } => "jws",
                shared::fiscal::SignatureScheme::Raw { .. } => "raw",
            },
            totals,
            gross_total: totals.gross_total(),
            tax_total: totals.tax_total(),
            created_at: record.created_at,
            original_invoice_id: record
                .credit_note
                .as_ref()
                .map(|c| c.original_invoice_id.as_str()),
            period: record.period,
        }
    }
}
