//! 设备心跳监控
//!
//! 定期对已连接的设备发送心跳，失败的设备进入 Error 状态，
//! 下一次签名会直接返回 DeviceUnavailable。

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::registry::DeviceRegistry;

pub struct DeviceMonitor {
    registry: DeviceRegistry,
    interval: Duration,
}

impl DeviceMonitor {
    pub fn new(registry: DeviceRegistry, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "DeviceMonitor started");

        let mut ticker = tokio::time::interval(self.interval);
        // 跳过立即触发的第一次 tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("DeviceMonitor received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// 对所有已连接设备发送一次心跳
    pub async fn tick(&self) {
        for gateway in self.registry.all() {
            if !gateway.is_connected() {
                continue;
            }
            if let Err(e) = gateway.heartbeat().await {
                tracing::warn!(
                    register_id = %gateway.register_id(),
                    error = %e,
                    "Device heartbeat failed"
                );
            }
        }
    }
}
