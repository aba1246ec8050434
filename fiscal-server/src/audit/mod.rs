//! 设备审计日志模块
//!
//! 记录所有签名设备交互：
//! - 只追加，没有删除/更新接口
//! - SHA256 哈希链确保防篡改
//! - 同步写入，成功与失败都不会丢失

mod log;
mod types;

pub use log::DeviceAuditLog;
pub use types::{AuditChainBreak, AuditChainVerification, DeviceAuditAction, DeviceAuditEntry};
