//! Fiscal Server - RKSV 税控合规后端
//!
//! # 架构概述
//!
//! - **设备网关** (`device`): 每台收银机一个签名设备网关
//! - **签名链账本** (`ledger`): 每台收银机一条只追加的签名链
//! - **结账引擎** (`closing`): 日结 / 月结 / 年结
//! - **申报队列** (`compliance`): 异步向税务局申报，持久化重试
//! - **审计** (`audit`): 设备操作哈希链日志
//! - **存储** (`storage`): 嵌入式 redb
//! - **HTTP API** (`api`): 运维与上游接口
//!
//! # 模块结构
//!
//! ```text
//! fiscal-server/src/
//! ├── core/          # 配置、状态、后台任务、错误
//! ├── storage/       # redb 表与事务
//! ├── audit/         # 设备审计链
//! ├── device/        # 驱动协议、网关、心跳
//! ├── ledger/        # 签名链
//! ├── closing/       # 结账引擎与调度
//! ├── compliance/    # 税务申报
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 日志、时间
//! ```

pub mod api;
pub mod audit;
pub mod closing;
pub mod compliance;
pub mod core;
pub mod device;
pub mod ledger;
pub mod storage;
pub mod utils;

// Re-export 公共类型
pub use closing::ClosingEngine;
pub use compliance::SubmissionQueue;
pub use core::{Config, Server, ServerState};
pub use device::DeviceRegistry;
pub use ledger::SignatureLedger;
pub use storage::FiscalStorage;
pub use utils::{ApiResponse, AppError, AppResult, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

/// 加载 .env 并初始化日志
pub fn setup_environment() -> Config {
    dotenv::dotenv().ok();
    let config = Config::from_env();
    init_logger_with_file(
        Some(&config.log_level),
        Some(config.is_production()),
        config.log_dir.as_deref(),
    );
    config
}

pub fn print_banner() {
    println!(
        r#"
    _______                 __
   / ____(_)_____________ _/ /
  / /_  / / ___/ ___/ __ `/ /
 / __/ / (__  ) /__/ /_/ / /
/_/   /_/____/\___/\__,_/_/
    "#
    );
}
