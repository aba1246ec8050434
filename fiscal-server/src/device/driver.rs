//! 签名设备驱动协议
//!
//! 具体硬件驱动（智能卡、HSM、云签名）实现 [`FiscalDriver`]，
//! 网关只通过这个 trait 与设备交互。

use async_trait::async_trait;
use shared::fiscal::SignatureScheme;

use super::error::DriverResult;

/// 连接握手 / 状态查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandshake {
    /// 证书到期时间 (Unix millis)，设备不报告时为 None
    pub certificate_expires_at: Option<i64>,
    /// 已用签名存储
    pub memory_used: u64,
    /// 签名存储容量，0 表示不受限
    pub memory_capacity: u64,
    /// 设备本地签名计数器
    pub signature_counter: u64,
}

/// 设备签名结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSignature {
    pub signature_value: String,
    /// 设备本地计数器（签名后）
    pub counter: u64,
    /// 设备时间 (Unix millis)
    pub timestamp: i64,
    pub scheme: SignatureScheme,
}

/// 签名设备驱动
#[async_trait]
pub trait FiscalDriver: Send + Sync {
    /// 驱动标识（写入签名方案的 provider 字段）
    fn provider(&self) -> &str;

    /// 打开设备并握手
    async fn open(&self, serial_number: &str) -> DriverResult<DeviceHandshake>;

    async fn close(&self, serial_number: &str) -> DriverResult<()>;

    /// 对规范化载荷签名
    async fn sign(&self, serial_number: &str, payload: &[u8]) -> DriverResult<DriverSignature>;

    /// 查询设备状态（心跳）
    async fn status(&self, serial_number: &str) -> DriverResult<DeviceHandshake>;
}
