use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shared::fiscal::SignedRecord;
use tokio::sync::mpsc;

use crate::audit::DeviceAuditLog;
use crate::closing::{ClosingEngine, ClosingScheduler};
use crate::compliance::{HttpTaxAuthorityClient, SubmissionQueue, SubmissionWorker, TaxAuthorityClient};
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, Result};
use crate::device::{DeviceMonitor, DeviceRegistry, FiscalDriver, SoftwareDriver};
use crate::ledger::SignatureLedger;
use crate::storage::FiscalStorage;

/// 服务器状态 - 持有所有服务的单例引用
///
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// # 服务组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | storage | FiscalStorage | redb 存储 |
/// | audit | DeviceAuditLog | 设备审计日志 |
/// | devices | DeviceRegistry | 每台收银机的设备网关 |
/// | ledger | Arc<SignatureLedger> | 签名链账本 |
/// | closing | Arc<ClosingEngine> | 结账引擎 |
/// | submissions | Arc<SubmissionQueue> | 税务申报队列 |
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    pub storage: FiscalStorage,
    pub audit: DeviceAuditLog,
    pub devices: DeviceRegistry,
    pub ledger: Arc<SignatureLedger>,
    pub closing: Arc<ClosingEngine>,
    pub submissions: Arc<SubmissionQueue>,
    /// 账本记录事件，由申报 worker 取走
    record_events: Arc<Mutex<Option<mpsc::UnboundedReceiver<SignedRecord>>>>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录与 redb 数据库 (work_dir/fiscal.redb)
    /// 2. 设备网关 (软件签名驱动)
    /// 3. 账本、结账引擎、申报队列
    pub async fn initialize(config: &Config) -> Result<Self> {
        config.ensure_work_dir()?;
        let storage = FiscalStorage::open(config.database_path())?;

        let client = HttpTaxAuthorityClient::new(
            config.tax_authority_url.clone(),
            config.tax_authority_timeout(),
        )?;

        Self::build(
            config.clone(),
            storage,
            Arc::new(SoftwareDriver::auto_provisioning()),
            Arc::new(client),
        )
    }

    /// 用给定的存储、驱动与税务局客户端组装状态
    ///
    /// 测试使用内存存储和脚本化客户端
    pub fn build(
        config: Config,
        storage: FiscalStorage,
        driver: Arc<dyn FiscalDriver>,
        client: Arc<dyn TaxAuthorityClient>,
    ) -> Result<Self> {
        let audit = DeviceAuditLog::new(storage.clone());
        let devices = DeviceRegistry::load(
            storage.clone(),
            driver,
            audit.clone(),
            config.cert_expiry_warning_days,
        )?;

        let (ledger, record_rx) = SignatureLedger::new(storage.clone(), devices.clone());
        let ledger = Arc::new(ledger);
        let closing = Arc::new(ClosingEngine::new(
            ledger.clone(),
            devices.clone(),
            config.timezone,
        ));
        let submissions = Arc::new(SubmissionQueue::new(
            storage.clone(),
            devices.clone(),
            client,
            config.retry_policy(),
            config.claim_timeout_ms(),
        ));

        tracing::info!(
            registers = devices.register_ids().len(),
            timezone = %config.timezone,
            "Fiscal services initialized"
        );

        Ok(Self {
            config,
            storage,
            audit,
            devices,
            ledger,
            closing,
            submissions,
            record_events: Arc::new(Mutex::new(Some(record_rx))),
        })
    }

    /// 启动后台任务
    ///
    /// 必须在 `Server::run()` 之前调用
    ///
    /// 启动的任务：
    /// - 申报 worker (SubmissionWorker)
    /// - 设备心跳 (DeviceMonitor)
    /// - 自动结账 (ClosingScheduler, 可配置关闭)
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();
        let shutdown = tasks.shutdown_token();

        match self.record_events.lock().take() {
            Some(record_rx) => {
                let worker = SubmissionWorker::new(
                    self.submissions.clone(),
                    self.config.submission_concurrency,
                    Duration::from_secs(self.config.submission_scan_interval_secs.max(1)),
                );
                let token = shutdown.clone();
                tasks.spawn("submission_worker", TaskKind::Worker, async move {
                    worker.run(record_rx, token).await;
                });
            }
            None => {
                tracing::warn!("Record event receiver already taken, submission worker not started");
            }
        }

        let monitor = DeviceMonitor::new(
            self.devices.clone(),
            Duration::from_secs(self.config.device_heartbeat_secs.max(1)),
        );
        let token = shutdown.clone();
        tasks.spawn("device_monitor", TaskKind::Periodic, async move {
            monitor.run(token).await;
        });

        if self.config.auto_closing_enabled {
            let scheduler = ClosingScheduler::new(
                self.closing.clone(),
                self.devices.clone(),
                self.config.daily_closing_time,
                shutdown.clone(),
            );
            tasks.spawn("closing_scheduler", TaskKind::Periodic, async move {
                scheduler.run().await;
            });
        }

        tasks.log_summary();
        tasks
    }
}
