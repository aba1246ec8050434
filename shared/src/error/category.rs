//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories are determined by the leading digit of the error code:
/// - 0xxx: General errors
/// - 1xxx: Fiscal device errors
/// - 2xxx: Ledger errors
/// - 3xxx: Closing errors
/// - 4xxx: Compliance errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Fiscal device errors (1xxx)
    Device,
    /// Signature chain errors (2xxx)
    Ledger,
    /// Closing errors (3xxx)
    Closing,
    /// Compliance submission errors (4xxx)
    Compliance,
    /// System errors (9xxx)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Device,
            2000..3000 => Self::Ledger,
            3000..4000 => Self::Closing,
            4000..5000 => Self::Compliance,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Device => "device",
            Self::Ledger => "ledger",
            Self::Closing => "closing",
            Self::Compliance => "compliance",
            Self::System => "system",
        }
    }
}

/// 面向收银员/操作员的处理建议
///
/// 前端根据此字段区分提示文案：
/// "重新连接设备" / "设备需要维护（证书/存储）" / "本笔交易未签名，请重试"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    /// 重新连接签名设备
    ReconnectDevice,
    /// 设备需要维护（证书过期、存储满）
    ServiceDevice,
    /// 本次操作未完成，可直接重试
    RetryOperation,
    /// 需要人工调查（链冲突等）
    ContactSupport,
    /// 无需特殊处理
    None,
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }

    /// 用户可见的处理建议
    pub fn user_action(&self) -> UserAction {
        match self {
            Self::DeviceUnavailable | Self::DeviceNotFound | Self::DeviceNotBound => {
                UserAction::ReconnectDevice
            }
            Self::CertificateExpired | Self::CertificateNotValid | Self::DeviceMemoryFull => {
                UserAction::ServiceDevice
            }
            Self::SignatureTimeout | Self::SystemBusy | Self::TimeoutError => {
                UserAction::RetryOperation
            }
            Self::ChainConflict | Self::ChainBroken | Self::PendingChainGap => {
                UserAction::ContactSupport
            }
            _ => UserAction::None,
        }
    }
}
