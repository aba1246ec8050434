use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::compliance::RetryPolicy;
use crate::utils::time;

/// 服务器配置 - 税控后端的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/fiscal | 工作目录 |
/// | HTTP_PORT | 3100 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | - | 日志目录 (存在时写文件) |
/// | FISCAL_TIMEZONE | Europe/Vienna | 结账时区 |
/// | CERT_EXPIRY_WARNING_DAYS | 30 | 证书到期预警天数 |
/// | DEVICE_HEARTBEAT_SECS | 60 | 设备心跳间隔 |
/// | TAX_AUTHORITY_URL | http://localhost:8443/rksv | 税务局接口 |
/// | TAX_AUTHORITY_TIMEOUT_MS | 15000 | 申报请求超时 |
/// | SUBMISSION_MAX_ATTEMPTS | 3 | 最大申报次数 |
/// | SUBMISSION_BASE_DELAY_SECS | 5 | 退避基数 |
/// | SUBMISSION_MAX_DELAY_SECS | 300 | 退避上限 |
/// | SUBMISSION_SCAN_INTERVAL_SECS | 30 | 到期扫描间隔 |
/// | SUBMISSION_CONCURRENCY | 4 | 并发申报数 |
/// | SUBMISSION_CLAIM_TIMEOUT_SECS | 120 | 认领超时 |
/// | AUTO_CLOSING_ENABLED | true | 自动日结 |
/// | DAILY_CLOSING_TIME | 23:55 | 自动日结时间 (本地) |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | 关闭超时 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/fiscal HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存放数据库和日志
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// 结账周期按此时区划分
    pub timezone: Tz,
    pub cert_expiry_warning_days: u32,
    pub device_heartbeat_secs: u64,

    // === 税务申报 ===
    pub tax_authority_url: String,
    pub tax_authority_timeout_ms: u64,
    pub submission_max_attempts: u32,
    pub submission_base_delay_secs: u64,
    pub submission_max_delay_secs: u64,
    pub submission_scan_interval_secs: u64,
    pub submission_concurrency: usize,
    pub submission_claim_timeout_secs: u64,

    // === 结账 ===
    pub auto_closing_enabled: bool,
    pub daily_closing_time: NaiveTime,

    /// 关闭超时时间 (毫秒)
    pub shutdown_timeout_ms: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        let timezone = std::env::var("FISCAL_TIMEZONE")
            .ok()
            .and_then(|name| time::parse_timezone(&name))
            .unwrap_or(chrono_tz::Europe::Vienna);
        let daily_closing_time = std::env::var("DAILY_CLOSING_TIME")
            .ok()
            .and_then(|v| time::parse_hhmm(&v))
            .unwrap_or_else(default_closing_time);

        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/fiscal".into()),
            http_port: env_or("HTTP_PORT", 3100),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|v| !v.is_empty()),
            timezone,
            cert_expiry_warning_days: env_or("CERT_EXPIRY_WARNING_DAYS", 30),
            device_heartbeat_secs: env_or("DEVICE_HEARTBEAT_SECS", 60),

            tax_authority_url: std::env::var("TAX_AUTHORITY_URL")
                .unwrap_or_else(|_| "http://localhost:8443/rksv".into()),
            tax_authority_timeout_ms: env_or("TAX_AUTHORITY_TIMEOUT_MS", 15000),
            submission_max_attempts: env_or("SUBMISSION_MAX_ATTEMPTS", 3),
            submission_base_delay_secs: env_or("SUBMISSION_BASE_DELAY_SECS", 5),
            submission_max_delay_secs: env_or("SUBMISSION_MAX_DELAY_SECS", 300),
            submission_scan_interval_secs: env_or("SUBMISSION_SCAN_INTERVAL_SECS", 30),
            submission_concurrency: env_or("SUBMISSION_CONCURRENCY", 4),
            submission_claim_timeout_secs: env_or("SUBMISSION_CLAIM_TIMEOUT_SECS", 120),

            auto_closing_enabled: env_or("AUTO_CLOSING_ENABLED", true),
            daily_closing_time,

            shutdown_timeout_ms: env_or("SHUTDOWN_TIMEOUT_MS", 10000),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// redb 数据库文件
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("fiscal.redb")
    }

    /// 确保工作目录存在
    pub fn ensure_work_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.work_dir)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.submission_max_attempts.max(1),
            base_delay: Duration::from_secs(self.submission_base_delay_secs),
            max_delay: Duration::from_secs(self.submission_max_delay_secs),
        }
    }

    pub fn tax_authority_timeout(&self) -> Duration {
        Duration::from_millis(self.tax_authority_timeout_ms)
    }

    pub fn claim_timeout_ms(&self) -> i64 {
        (self.submission_claim_timeout_secs * 1000) as i64
    }
}

fn default_closing_time() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 55, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_never_zero_attempts() {
        let mut config = Config::from_env();
        config.submission_max_attempts = 0;
        assert_eq!(config.retry_policy().max_attempts, 1);
    }

    #[test]
    fn test_database_path_under_work_dir() {
        let config = Config::with_overrides("/tmp/fiscal-test", 0);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/fiscal-test/fiscal.redb")
        );
        assert_eq!(config.http_port, 0);
    }
}
