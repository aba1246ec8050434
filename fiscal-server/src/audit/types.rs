//! 设备审计日志类型定义
//!
//! 每次与签名设备的交互（连接、断开、签名、心跳）都记录一条，
//! 成功或失败都必须落地，SHA256 哈希链防篡改。

use serde::{Deserialize, Serialize};

/// 设备操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAuditAction {
    /// 开通设备
    Provision,
    Connect,
    Disconnect,
    Sign,
    Heartbeat,
}

impl std::fmt::Display for DeviceAuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 设备审计条目（不可变）
///
/// - `prev_hash`: 前一条记录的哈希
/// - `curr_hash`: 当前记录的哈希（包含 prev_hash + 所有字段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuditEntry {
    /// 全局递增序列号
    pub sequence: u64,
    /// 时间戳（Unix 毫秒）
    pub timestamp: i64,
    pub cash_register_id: String,
    pub serial_number: String,
    pub action: DeviceAuditAction,
    pub success: bool,
    /// 结果描述（错误信息、签名计数器等）
    pub detail: Option<String>,
    pub prev_hash: String,
    pub curr_hash: String,
}

/// 审计链验证结果
#[derive(Debug, Serialize)]
pub struct AuditChainVerification {
    /// 验证的记录总数
    pub total_entries: u64,
    /// 链是否完整
    pub chain_intact: bool,
    /// 断裂点列表
    pub breaks: Vec<AuditChainBreak>,
}

/// 审计链断裂点
#[derive(Debug, Serialize)]
pub struct AuditChainBreak {
    /// 断裂处的序列号
    pub sequence: u64,
    pub reason: String,
}
