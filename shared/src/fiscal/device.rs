//! 签名设备 (Signaturerstellungseinheit) 数据模型

use serde::{Deserialize, Serialize};

/// 设备连接状态机
///
/// Disconnected → Connecting → Connected → Error → Connecting ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// 证书状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Valid,
    /// 即将过期（停止签名，需续期）
    Expiring,
    Expired,
    #[default]
    Unknown,
}

/// 签名存储状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    #[default]
    Ok,
    Low,
    Full,
}

/// 税务局接口凭据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxAuthorityCredentials {
    /// 是否启用申报
    pub enabled: bool,
    /// Teilnehmer-ID
    pub participant_id: String,
    pub user_id: String,
    pub pin: String,
}

/// 签名设备（每台收银机绑定一台）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalDevice {
    pub serial_number: String,
    /// 绑定的收银机
    pub cash_register_id: String,
    pub device_type: String,
    pub vendor_id: String,
    pub product_id: String,
    pub connection_state: ConnectionState,
    pub certificate_status: CertificateStatus,
    pub memory_status: MemoryStatus,
    /// 证书到期时间 (Unix millis)
    pub certificate_expires_at: Option<i64>,
    pub last_connection_time: Option<i64>,
    pub last_signature_time: Option<i64>,
    /// 设备本地签名计数器（最后一次由硬件报告）
    pub signature_counter: u64,
    pub error_message: Option<String>,
    pub timeout_seconds: u64,
    /// 税务局分配的收银机编号
    pub kassen_id: String,
    pub tax_authority: TaxAuthorityCredentials,
    /// 待申报的普通票据数
    pub pending_invoices: u32,
    /// 待申报的结账报告数
    pub pending_reports: u32,
    pub provisioned_at: i64,
}

impl FiscalDevice {
    /// 是否可以签发票据：已连接、证书有效、存储未满
    pub fn can_create_invoices(&self) -> bool {
        self.connection_state == ConnectionState::Connected
            && self.certificate_status == CertificateStatus::Valid
            && self.memory_status != MemoryStatus::Full
    }
}

/// 设备状态视图（API 输出，不含凭据）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalDeviceStatus {
    pub serial_number: String,
    pub cash_register_id: String,
    pub device_type: String,
    pub vendor_id: String,
    pub product_id: String,
    pub connection_state: ConnectionState,
    pub certificate_status: CertificateStatus,
    pub memory_status: MemoryStatus,
    pub certificate_expires_at: Option<i64>,
    pub last_connection_time: Option<i64>,
    pub last_signature_time: Option<i64>,
    pub signature_counter: u64,
    pub can_create_invoices: bool,
    pub error_message: Option<String>,
    pub timeout_seconds: u64,
    pub kassen_id: String,
    pub reporting_enabled: bool,
    pub pending_invoices: u32,
    pub pending_reports: u32,
}

impl From<&FiscalDevice> for FiscalDeviceStatus {
    fn from(d: &FiscalDevice) -> Self {
        Self {
            serial_number: d.serial_number.clone(),
            cash_register_id: d.cash_register_id.clone(),
            device_type: d.device_type.clone(),
            vendor_id: d.vendor_id.clone(),
            product_id: d.product_id.clone(),
            connection_state: d.connection_state,
            certificate_status: d.certificate_status,
            memory_status: d.memory_status,
            certificate_expires_at: d.certificate_expires_at,
            last_connection_time: d.last_connection_time,
            last_signature_time: d.last_signature_time,
            signature_counter: d.signature_counter,
            can_create_invoices: d.can_create_invoices(),
            error_message: d.error_message.clone(),
            timeout_seconds: d.timeout_seconds,
            kassen_id: d.kassen_id.clone(),
            reporting_enabled: d.tax_authority.enabled,
            pending_invoices: d.pending_invoices,
            pending_reports: d.pending_reports,
        }
    }
}

fn default_timeout_seconds() -> u64 {
    10
}

/// 设备开通请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionDeviceRequest {
    pub serial_number: String,
    pub cash_register_id: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub vendor_id: String,
    #[serde(default)]
    pub product_id: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub kassen_id: String,
    #[serde(default)]
    pub tax_authority: TaxAuthorityCredentials,
}

impl ProvisionDeviceRequest {
    pub fn into_device(self, now: i64) -> FiscalDevice {
        FiscalDevice {
            serial_number: self.serial_number,
            cash_register_id: self.cash_register_id,
            device_type: self.device_type,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            connection_state: ConnectionState::Disconnected,
            certificate_status: CertificateStatus::Unknown,
            memory_status: MemoryStatus::Ok,
            certificate_expires_at: None,
            last_connection_time: None,
            last_signature_time: None,
            signature_counter: 0,
            error_message: None,
            timeout_seconds: self.timeout_seconds,
            kassen_id: self.kassen_id,
            tax_authority: self.tax_authority,
            pending_invoices: 0,
            pending_reports: 0,
            provisioned_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> FiscalDevice {
        ProvisionDeviceRequest {
            serial_number: "SN-1".into(),
            cash_register_id: "REG-1".into(),
            device_type: "smartcard".into(),
            vendor_id: String::new(),
            product_id: String::new(),
            timeout_seconds: 5,
            kassen_id: "KASSE-1".into(),
            tax_authority: TaxAuthorityCredentials::default(),
        }
        .into_device(0)
    }

    #[test]
    fn can_create_invoices_requires_all_conditions() {
        let mut d = device();
        assert!(!d.can_create_invoices());

        d.connection_state = ConnectionState::Connected;
        d.certificate_status = CertificateStatus::Valid;
        assert!(d.can_create_invoices());

        d.certificate_status = CertificateStatus::Expiring;
        assert!(!d.can_create_invoices());
        d.certificate_status = CertificateStatus::Valid;

        d.memory_status = MemoryStatus::Full;
        assert!(!d.can_create_invoices());

        d.memory_status = MemoryStatus::Low;
        d.certificate_status = CertificateStatus::Expired;
        assert!(!d.can_create_invoices());
    }

    #[test]
    fn status_view_hides_credentials() {
        let mut d = device();
        d.tax_authority.pin = "1234".into();
        let json = serde_json::to_string(&FiscalDeviceStatus::from(&d)).unwrap();
        assert!(!json.contains("1234"));
        assert!(json.contains("\"connection_state\":\"disconnected\""));
    }
}
