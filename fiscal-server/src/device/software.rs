//! 软件签名驱动（HMAC-SHA256，JWS compact 输出）
//!
//! 用于开发环境与测试，不具备硬件证书的法律效力。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use shared::fiscal::SignatureScheme;

use super::driver::{DeviceHandshake, DriverSignature, FiscalDriver};
use super::error::{DriverError, DriverResult};

type HmacSha256 = Hmac<Sha256>;

const PROVIDER: &str = "software-hmac";

/// 软件设备参数
#[derive(Debug, Clone)]
pub struct SoftwareProfile {
    pub key: Vec<u8>,
    pub certificate_expires_at: Option<i64>,
    /// 0 表示不受限
    pub memory_capacity: u64,
}

impl SoftwareProfile {
    /// 随机密钥，证书一年后过期
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            key,
            certificate_expires_at: Some(
                shared::util::now_millis() + 365 * 24 * 60 * 60 * 1000,
            ),
            memory_capacity: 0,
        }
    }
}

#[derive(Debug)]
struct SoftwareDevice {
    profile: SoftwareProfile,
    counter: u64,
    open: bool,
    offline: bool,
}

/// HMAC 软件签名驱动
#[derive(Debug, Default)]
pub struct SoftwareDriver {
    devices: Mutex<HashMap<String, SoftwareDevice>>,
    /// 签名前的人为延迟（模拟慢设备）
    sign_delay: Mutex<Option<Duration>>,
    /// 未登记的序列号按需生成设备
    auto_provision: bool,
}

impl SoftwareDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未登记的序列号首次 open 时自动生成设备
    pub fn auto_provisioning() -> Self {
        Self {
            auto_provision: true,
            ..Self::default()
        }
    }

    /// 登记一台软件设备
    pub fn add_device(&self, serial_number: &str, profile: SoftwareProfile) {
        self.devices.lock().insert(
            serial_number.to_string(),
            SoftwareDevice {
                profile,
                counter: 0,
                open: false,
                offline: false,
            },
        );
    }

    pub fn set_sign_delay(&self, delay: Option<Duration>) {
        *self.sign_delay.lock() = delay;
    }

    /// 模拟设备掉线（心跳和签名失败）
    pub fn set_offline(&self, serial_number: &str, offline: bool) {
        if let Some(device) = self.devices.lock().get_mut(serial_number) {
            device.offline = offline;
        }
    }

    pub fn set_certificate_expiry(&self, serial_number: &str, expires_at: Option<i64>) {
        if let Some(device) = self.devices.lock().get_mut(serial_number) {
            device.profile.certificate_expires_at = expires_at;
        }
    }

    fn handshake(device: &SoftwareDevice) -> DeviceHandshake {
        DeviceHandshake {
            certificate_expires_at: device.profile.certificate_expires_at,
            memory_used: device.counter,
            memory_capacity: device.profile.memory_capacity,
            signature_counter: device.counter,
        }
    }
}

/// JWS compact 签名：返回 (header, payload, signature)，均为 base64url
fn jws_sign(key: &[u8], kid: &str, payload: &[u8]) -> DriverResult<(String, String, String)> {
    let header = serde_json::json!({ "alg": "HS256", "typ": "JWT", "kid": kid });
    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| DriverError::Rejected(format!("invalid key: {e}")))?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok((header_b64, payload_b64, signature))
}

#[async_trait]
impl FiscalDriver for SoftwareDriver {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn open(&self, serial_number: &str) -> DriverResult<DeviceHandshake> {
        let mut devices = self.devices.lock();
        if self.auto_provision && !devices.contains_key(serial_number) {
            devices.insert(
                serial_number.to_string(),
                SoftwareDevice {
                    profile: SoftwareProfile::generate(),
                    counter: 0,
                    open: false,
                    offline: false,
                },
            );
        }
        let device = devices
            .get_mut(serial_number)
            .ok_or_else(|| DriverError::UnknownDevice(serial_number.to_string()))?;
        if device.offline {
            return Err(DriverError::Connection("device offline".to_string()));
        }
        device.open = true;
        Ok(Self::handshake(device))
    }

    async fn close(&self, serial_number: &str) -> DriverResult<()> {
        if let Some(device) = self.devices.lock().get_mut(serial_number) {
            device.open = false;
        }
        Ok(())
    }

    async fn sign(&self, serial_number: &str, payload: &[u8]) -> DriverResult<DriverSignature> {
        let delay = *self.sign_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut devices = self.devices.lock();
        let device = devices
            .get_mut(serial_number)
            .ok_or_else(|| DriverError::UnknownDevice(serial_number.to_string()))?;
        if device.offline || !device.open {
            return Err(DriverError::Connection("device not open".to_string()));
        }
        let capacity = device.profile.memory_capacity;
        if capacity > 0 && device.counter >= capacity {
            return Err(DriverError::MemoryFull);
        }

        let (header, payload_b64, signature) =
            jws_sign(&device.profile.key, serial_number, payload)?;
        device.counter += 1;

        Ok(DriverSignature {
            signature_value: signature,
            counter: device.counter,
            timestamp: shared::util::now_millis(),
            scheme: SignatureScheme::Jws {
                provider: PROVIDER.to_string(),
                header,
                payload: payload_b64,
            },
        })
    }

    async fn status(&self, serial_number: &str) -> DriverResult<DeviceHandshake> {
        let devices = self.devices.lock();
        let device = devices
            .get(serial_number)
            .ok_or_else(|| DriverError::UnknownDevice(serial_number.to_string()))?;
        if device.offline || !device.open {
            return Err(DriverError::Connection("device not reachable".to_string()));
        }
        Ok(Self::handshake(device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> SoftwareProfile {
        SoftwareProfile {
            key: b"test-key".to_vec(),
            certificate_expires_at: None,
            memory_capacity: 2,
        }
    }

    #[tokio::test]
    async fn test_sign_produces_verifiable_jws() {
        let driver = SoftwareDriver::new();
        driver.add_device("SN-1", profile());
        driver.open("SN-1").await.unwrap();

        let sig = driver.sign("SN-1", b"{\"a\":1}").await.unwrap();
        assert_eq!(sig.counter, 1);

        let SignatureScheme::Jws { header, payload, .. } = &sig.scheme else {
            panic!("expected jws");
        };
        let mut mac = HmacSha256::new_from_slice(b"test-key").unwrap();
        mac.update(format!("{header}.{payload}").as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        assert_eq!(sig.signature_value, expected);
        assert_eq!(URL_SAFE_NO_PAD.decode(payload).unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_memory_capacity_and_closed_device() {
        let driver = SoftwareDriver::new();
        driver.add_device("SN-1", profile());

        assert!(matches!(
            driver.sign("SN-1", b"x").await,
            Err(DriverError::Connection(_))
        ));

        driver.open("SN-1").await.unwrap();
        driver.sign("SN-1", b"x").await.unwrap();
        driver.sign("SN-1", b"y").await.unwrap();
        assert!(matches!(
            driver.sign("SN-1", b"z").await,
            Err(DriverError::MemoryFull)
        ));

        let status = driver.status("SN-1").await.unwrap();
        assert_eq!(status.memory_used, 2);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let driver = SoftwareDriver::new();
        assert!(matches!(
            driver.open("nope").await,
            Err(DriverError::UnknownDevice(_))
        ));

        let auto = SoftwareDriver::auto_provisioning();
        assert!(auto.open("anything").await.is_ok());
    }
}
