//! Signature Chain Ledger
//!
//! 每台收银机一条只追加的签名链：
//! `record[i].previous_signature_value == record[i-1].signature_value`，
//! 第一条链接到空链哨兵 `"genesis"`，计数器无空洞。

mod error;
mod payload;
mod service;

pub use error::{LedgerError, LedgerResult};
pub use payload::{CanonicalPayload, payload_hash, recompute_hash};
pub use service::SignatureLedger;
pub(crate) use service::{Appended, RecordDraft};
