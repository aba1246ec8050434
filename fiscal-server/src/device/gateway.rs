//! 单台收银机的签名设备网关
//!
//! 状态机：
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──handshake ok──▶ Connected
//!      ▲                        │                           │
//!      │                   handshake 失败          sign/heartbeat 失败
//!      │                        ▼                           ▼
//!      └──────disconnect─── Connected              Error ──connect──▶ Connecting
//! ```
//!
//! 设备状态放在 `parking_lot::Mutex` 里，持锁期间只做同步的状态修改与持久化，
//! 不跨越 `.await`。每次 connect/disconnect/sign/heartbeat 都同步写入设备审计日志。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shared::fiscal::{
    CertificateStatus, ConnectionState, FiscalDevice, FiscalDeviceStatus, MemoryStatus,
};
use tracing::{info, warn};

use super::driver::{DeviceHandshake, DriverSignature, FiscalDriver};
use super::error::{DeviceError, DeviceResult, DriverError};
use crate::audit::{DeviceAuditAction, DeviceAuditLog};
use crate::storage::FiscalStorage;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// 根据到期时间推导证书状态
pub fn certificate_status(expires_at: Option<i64>, now: i64, warning_days: u32) -> CertificateStatus {
    match expires_at {
        None => CertificateStatus::Unknown,
        Some(exp) if exp <= now => CertificateStatus::Expired,
        Some(exp) if exp - now <= warning_days as i64 * DAY_MS => CertificateStatus::Expiring,
        Some(_) => CertificateStatus::Valid,
    }
}

/// 根据存储用量推导存储状态（≥ 90 % 为 Low）
pub fn memory_status(used: u64, capacity: u64) -> MemoryStatus {
    if capacity == 0 {
        return MemoryStatus::Ok;
    }
    if used >= capacity {
        MemoryStatus::Full
    } else if used.saturating_mul(10) >= capacity.saturating_mul(9) {
        MemoryStatus::Low
    } else {
        MemoryStatus::Ok
    }
}

pub struct FiscalDeviceGateway {
    register_id: String,
    device: Mutex<FiscalDevice>,
    driver: Arc<dyn FiscalDriver>,
    storage: FiscalStorage,
    audit: DeviceAuditLog,
    cert_warning_days: u32,
}

impl std::fmt::Debug for FiscalDeviceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiscalDeviceGateway")
            .field("register_id", &self.register_id)
            .finish_non_exhaustive()
    }
}

impl FiscalDeviceGateway {
    pub fn new(
        device: FiscalDevice,
        driver: Arc<dyn FiscalDriver>,
        storage: FiscalStorage,
        audit: DeviceAuditLog,
        cert_warning_days: u32,
    ) -> Self {
        Self {
            register_id: device.cash_register_id.clone(),
            device: Mutex::new(device),
            driver,
            storage,
            audit,
            cert_warning_days,
        }
    }

    pub fn register_id(&self) -> &str {
        &self.register_id
    }

    /// 当前设备快照
    pub fn device(&self) -> FiscalDevice {
        self.device.lock().clone()
    }

    /// 设备状态（证书状态按当前时间重新推导）
    pub fn status(&self) -> FiscalDeviceStatus {
        let mut device = self.device();
        if device.certificate_expires_at.is_some() {
            device.certificate_status = certificate_status(
                device.certificate_expires_at,
                shared::util::now_millis(),
                self.cert_warning_days,
            );
        }
        FiscalDeviceStatus::from(&device)
    }

    pub fn is_connected(&self) -> bool {
        self.device.lock().connection_state == ConnectionState::Connected
    }

    /// 修改设备状态并立即持久化（持锁期间完成，保证写入顺序）
    fn transition<F>(&self, f: F) -> DeviceResult<FiscalDevice>
    where
        F: FnOnce(&mut FiscalDevice),
    {
        let mut device = self.device.lock();
        f(&mut device);
        self.storage.put_device(&device)?;
        Ok(device.clone())
    }

    fn audit(
        &self,
        serial: &str,
        action: DeviceAuditAction,
        success: bool,
        detail: Option<String>,
    ) -> DeviceResult<()> {
        if let Err(e) = self
            .audit
            .record(&self.register_id, serial, action, success, detail)
        {
            tracing::error!(
                register_id = %self.register_id,
                action = %action,
                error = %e,
                "Failed to write device audit entry"
            );
            return Err(e.into());
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.device.lock().timeout_seconds.max(1))
    }

    /// 进入 Error 状态
    fn fail(&self, reason: &str) -> DeviceResult<()> {
        self.transition(|d| {
            d.connection_state = ConnectionState::Error;
            d.error_message = Some(reason.to_string());
        })?;
        Ok(())
    }

    fn apply_handshake(&self, d: &mut FiscalDevice, handshake: &DeviceHandshake, now: i64) {
        d.certificate_expires_at = handshake.certificate_expires_at;
        d.certificate_status =
            certificate_status(handshake.certificate_expires_at, now, self.cert_warning_days);
        d.memory_status = memory_status(handshake.memory_used, handshake.memory_capacity);
        d.signature_counter = handshake.signature_counter;
    }

    /// 连接设备
    ///
    /// 序列号必须是本收银机绑定的设备。证书过期时连接失败并进入 Error。
    pub async fn connect(&self, serial_number: &str) -> DeviceResult<FiscalDeviceStatus> {
        let bound_serial = self.device.lock().serial_number.clone();
        if serial_number != bound_serial {
            let err = match self.storage.find_register_by_serial(serial_number)? {
                Some(register_id) => DeviceError::NotBound {
                    serial: serial_number.to_string(),
                    register_id,
                },
                None => DeviceError::NotFound(serial_number.to_string()),
            };
            self.audit(
                serial_number,
                DeviceAuditAction::Connect,
                false,
                Some(err.to_string()),
            )?;
            return Err(err);
        }

        self.transition(|d| {
            d.connection_state = ConnectionState::Connecting;
            d.error_message = None;
        })?;

        let timeout = self.timeout();
        let result = tokio::time::timeout(timeout, self.driver.open(serial_number)).await;
        let handshake = match result {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(e)) => {
                let err = match e {
                    DriverError::UnknownDevice(_) => DeviceError::NotFound(serial_number.to_string()),
                    other => DeviceError::Unavailable {
                        serial: serial_number.to_string(),
                        reason: other.to_string(),
                    },
                };
                self.fail(&err.to_string())?;
                self.audit(
                    serial_number,
                    DeviceAuditAction::Connect,
                    false,
                    Some(err.to_string()),
                )?;
                warn!(register_id = %self.register_id, serial = %serial_number, error = %err, "Device connect failed");
                return Err(err);
            }
            Err(_) => {
                let err = DeviceError::Unavailable {
                    serial: serial_number.to_string(),
                    reason: format!("handshake timed out after {}s", timeout.as_secs()),
                };
                self.fail(&err.to_string())?;
                self.audit(
                    serial_number,
                    DeviceAuditAction::Connect,
                    false,
                    Some(err.to_string()),
                )?;
                return Err(err);
            }
        };

        let now = shared::util::now_millis();
        let cert = certificate_status(handshake.certificate_expires_at, now, self.cert_warning_days);
        if cert == CertificateStatus::Expired {
            let err = DeviceError::CertificateExpired(serial_number.to_string());
            if let Err(e) = self.driver.close(serial_number).await {
                warn!(serial = %serial_number, error = %e, "Failed to close device after expired certificate");
            }
            self.transition(|d| {
                self.apply_handshake(d, &handshake, now);
                d.connection_state = ConnectionState::Error;
                d.error_message = Some(err.to_string());
            })?;
            self.audit(
                serial_number,
                DeviceAuditAction::Connect,
                false,
                Some(err.to_string()),
            )?;
            return Err(err);
        }

        let device = self.transition(|d| {
            self.apply_handshake(d, &handshake, now);
            d.connection_state = ConnectionState::Connected;
            d.last_connection_time = Some(now);
            d.error_message = None;
        })?;
        self.audit(
            serial_number,
            DeviceAuditAction::Connect,
            true,
            Some(format!(
                "certificate={:?} memory={:?}",
                device.certificate_status, device.memory_status
            )),
        )?;
        info!(
            register_id = %self.register_id,
            serial = %serial_number,
            can_create_invoices = device.can_create_invoices(),
            "Fiscal device connected"
        );
        Ok(FiscalDeviceStatus::from(&device))
    }

    /// 断开设备
    pub async fn disconnect(&self) -> DeviceResult<FiscalDeviceStatus> {
        let serial = self.device.lock().serial_number.clone();
        let close_result = self.driver.close(&serial).await;
        if let Err(ref e) = close_result {
            warn!(register_id = %self.register_id, error = %e, "Driver close failed, marking disconnected anyway");
        }

        let device = self.transition(|d| {
            d.connection_state = ConnectionState::Disconnected;
        })?;
        self.audit(
            &serial,
            DeviceAuditAction::Disconnect,
            close_result.is_ok(),
            close_result.err().map(|e| e.to_string()),
        )?;
        info!(register_id = %self.register_id, serial = %serial, "Fiscal device disconnected");
        Ok(FiscalDeviceStatus::from(&device))
    }

    /// 签名前检查设备是否可以签发票据
    ///
    /// 区分 "重新连接" 与 "设备需要维护" 两类错误。
    pub fn ensure_can_sign(&self) -> DeviceResult<()> {
        let mut device = self.device();
        if device.certificate_expires_at.is_some() {
            device.certificate_status = certificate_status(
                device.certificate_expires_at,
                shared::util::now_millis(),
                self.cert_warning_days,
            );
        }
        if device.can_create_invoices() {
            return Ok(());
        }

        let serial = device.serial_number.clone();
        if device.connection_state != ConnectionState::Connected {
            return Err(DeviceError::Unavailable {
                serial,
                reason: format!("connection state {:?}", device.connection_state),
            });
        }
        if device.certificate_status == CertificateStatus::Expired {
            return Err(DeviceError::CertificateExpired(serial));
        }
        if device.memory_status == MemoryStatus::Full {
            return Err(DeviceError::MemoryFull(serial));
        }
        Err(DeviceError::CertificateNotValid {
            serial,
            status: device.certificate_status,
        })
    }

    /// 对载荷签名
    ///
    /// 仅 Connected 状态可签名；超时视为失败并强制进入 Error。
    pub async fn sign_operation(&self, payload: &[u8]) -> DeviceResult<DriverSignature> {
        let (serial, state, timeout_seconds) = {
            let d = self.device.lock();
            (d.serial_number.clone(), d.connection_state, d.timeout_seconds.max(1))
        };

        if state != ConnectionState::Connected {
            let err = DeviceError::Unavailable {
                serial: serial.clone(),
                reason: format!("connection state {state:?}"),
            };
            self.audit(&serial, DeviceAuditAction::Sign, false, Some(err.to_string()))?;
            return Err(err);
        }

        let result = tokio::time::timeout(
            Duration::from_secs(timeout_seconds),
            self.driver.sign(&serial, payload),
        )
        .await;

        match result {
            Ok(Ok(signature)) => {
                let now = shared::util::now_millis();
                self.transition(|d| {
                    d.signature_counter = signature.counter;
                    d.last_signature_time = Some(now);
                })?;
                self.audit(
                    &serial,
                    DeviceAuditAction::Sign,
                    true,
                    Some(format!("device_counter={}", signature.counter)),
                )?;
                Ok(signature)
            }
            Ok(Err(e)) => {
                let err = match &e {
                    DriverError::MemoryFull => {
                        self.transition(|d| d.memory_status = MemoryStatus::Full)?;
                        DeviceError::MemoryFull(serial.clone())
                    }
                    _ => {
                        self.fail(&e.to_string())?;
                        DeviceError::Unavailable {
                            serial: serial.clone(),
                            reason: e.to_string(),
                        }
                    }
                };
                self.audit(&serial, DeviceAuditAction::Sign, false, Some(err.to_string()))?;
                warn!(register_id = %self.register_id, error = %err, "Signing failed");
                Err(err)
            }
            Err(_) => {
                let err = DeviceError::SignatureTimeout {
                    serial: serial.clone(),
                    seconds: timeout_seconds,
                };
                self.fail(&err.to_string())?;
                self.audit(&serial, DeviceAuditAction::Sign, false, Some(err.to_string()))?;
                warn!(register_id = %self.register_id, timeout_seconds, "Signing timed out, device moved to Error");
                Err(err)
            }
        }
    }

    /// 心跳：重新查询设备状态，失败进入 Error
    pub async fn heartbeat(&self) -> DeviceResult<FiscalDeviceStatus> {
        let (serial, state) = {
            let d = self.device.lock();
            (d.serial_number.clone(), d.connection_state)
        };
        if state != ConnectionState::Connected {
            return Ok(self.status());
        }

        let timeout = self.timeout();
        let result = tokio::time::timeout(timeout, self.driver.status(&serial)).await;
        match result {
            Ok(Ok(handshake)) => {
                let now = shared::util::now_millis();
                let device = self.transition(|d| self.apply_handshake(d, &handshake, now))?;
                self.audit(&serial, DeviceAuditAction::Heartbeat, true, None)?;
                Ok(FiscalDeviceStatus::from(&device))
            }
            Ok(Err(e)) => {
                let err = DeviceError::Unavailable {
                    serial: serial.clone(),
                    reason: e.to_string(),
                };
                self.fail(&err.to_string())?;
                self.audit(&serial, DeviceAuditAction::Heartbeat, false, Some(err.to_string()))?;
                Err(err)
            }
            Err(_) => {
                let err = DeviceError::Unavailable {
                    serial: serial.clone(),
                    reason: format!("heartbeat timed out after {}s", timeout.as_secs()),
                };
                self.fail(&err.to_string())?;
                self.audit(&serial, DeviceAuditAction::Heartbeat, false, Some(err.to_string()))?;
                Err(err)
            }
        }
    }

    /// 刷新待申报计数
    pub fn update_pending_counts(&self, invoices: u32, reports: u32) -> DeviceResult<()> {
        self.transition(|d| {
            d.pending_invoices = invoices;
            d.pending_reports = reports;
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_status_resolution() {
        let now = 1_000 * DAY_MS;
        assert_eq!(certificate_status(None, now, 30), CertificateStatus::Unknown);
        assert_eq!(certificate_status(Some(now), now, 30), CertificateStatus::Expired);
        assert_eq!(
            certificate_status(Some(now + 10 * DAY_MS), now, 30),
            CertificateStatus::Expiring
        );
        assert_eq!(
            certificate_status(Some(now + 31 * DAY_MS), now, 30),
            CertificateStatus::Valid
        );
    }

    #[test]
    fn test_memory_status_thresholds() {
        assert_eq!(memory_status(5, 0), MemoryStatus::Ok);
        assert_eq!(memory_status(89, 100), MemoryStatus::Ok);
        assert_eq!(memory_status(90, 100), MemoryStatus::Low);
        assert_eq!(memory_status(100, 100), MemoryStatus::Full);
    }
}
