use thiserror::Error;

use crate::compliance::ClientError;
use crate::device::DeviceError;
use crate::storage::StorageError;

/// 启动与运行期错误（不经过 HTTP 响应）
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("存储初始化失败: {0}")]
    Storage(#[from] StorageError),

    #[error("设备注册表加载失败: {0}")]
    Device(#[from] DeviceError),

    #[error("税务局客户端初始化失败: {0}")]
    TaxAuthorityClient(#[from] ClientError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部服务器错误: {0}")]
    Internal(#[from] anyhow::Error),
}

/// 服务器 Result 类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
