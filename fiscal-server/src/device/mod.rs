//! Fiscal Device Gateway
//!
//! - [`FiscalDriver`]: 硬件驱动协议
//! - [`SoftwareDriver`]: HMAC 软件签名（开发/测试）
//! - [`FiscalDeviceGateway`]: 单台收银机的连接状态机
//! - [`DeviceRegistry`]: 收银机 → 网关
//! - [`DeviceMonitor`]: 心跳后台任务

mod driver;
mod error;
mod gateway;
mod monitor;
mod registry;
mod software;

pub use driver::{DeviceHandshake, DriverSignature, FiscalDriver};
pub use error::{DeviceError, DeviceResult, DriverError, DriverResult};
pub use gateway::{FiscalDeviceGateway, certificate_status, memory_status};
pub use monitor::DeviceMonitor;
pub use registry::DeviceRegistry;
pub use software::{SoftwareDriver, SoftwareProfile};
