//! 后台任务管理
//!
//! 统一管理所有后台任务的注册、启动和关闭。
//!
//! # 任务类型
//!
//! - [`TaskKind::Worker`] - 长期后台工作者（申报队列）
//! - [`TaskKind::Periodic`] - 定时任务（设备心跳、自动结账）

use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// 长期后台工作者
    Worker,
    /// 定时任务
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Worker => write!(f, "Worker"),
            TaskKind::Periodic => write!(f, "Periodic"),
        }
    }
}

/// 已注册的后台任务
struct RegisteredTask {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// 后台任务管理器
///
/// # 使用示例
///
/// ```ignore
/// let mut tasks = BackgroundTasks::new();
/// let token = tasks.shutdown_token();
///
/// tasks.spawn("submission_worker", TaskKind::Worker, async move {
///     worker.run(record_rx, token).await;
/// });
///
/// // Graceful shutdown
/// tasks.shutdown(Duration::from_secs(10)).await;
/// ```
pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    /// 全局取消令牌
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// 获取取消令牌（用于任务内部监听 shutdown 信号）
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 注册并启动一个后台任务
    ///
    /// 任务会被包装以捕获 panic；未收到 shutdown 信号就退出会记录警告。
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let wrapped_future = async move {
            let result: Result<(), Box<dyn std::any::Any + Send>> =
                AssertUnwindSafe(future).catch_unwind().await;
            match result {
                Ok(()) => {
                    if !shutdown.is_cancelled() {
                        tracing::warn!(task = %name, kind = %kind, "Background task completed unexpectedly");
                    }
                }
                Err(panic_info) => {
                    let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    tracing::error!(
                        task = %name,
                        kind = %kind,
                        panic = %panic_msg,
                        "Background task panicked! This is a bug that should be reported."
                    );
                }
            }
        };

        let handle = tokio::spawn(wrapped_future);
        tracing::debug!(task = %name, kind = %kind, "Registered background task");
        self.tasks.push(RegisteredTask { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 按类型统计任务数量 (worker, periodic)
    pub fn count_by_kind(&self) -> (usize, usize) {
        self.tasks.iter().fold((0, 0), |(worker, periodic), task| match task.kind {
            TaskKind::Worker => (worker + 1, periodic),
            TaskKind::Periodic => (worker, periodic + 1),
        })
    }

    /// 打印任务摘要
    pub fn log_summary(&self) {
        let (worker, periodic) = self.count_by_kind();
        tracing::info!(
            "Background tasks registered: {} total (Worker: {}, Periodic: {})",
            self.tasks.len(),
            worker,
            periodic
        );
    }

    /// 返回已经结束的任务数量
    pub fn check_health(&self) -> usize {
        let mut failed_count = 0;
        for task in &self.tasks {
            if task.handle.is_finished() {
                tracing::error!(
                    task = %task.name,
                    kind = %task.kind,
                    "Background task unexpectedly finished! This may indicate a panic or error."
                );
                failed_count += 1;
            }
        }
        failed_count
    }

    /// Graceful shutdown - 取消所有任务并等待完成
    ///
    /// 超过 `timeout` 仍未结束的任务被 abort。
    pub async fn shutdown(self, timeout: Duration) {
        tracing::info!("Shutting down {} background tasks...", self.tasks.len());
        self.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + timeout;
        for mut task in self.tasks {
            match tokio::time::timeout_at(deadline, &mut task.handle).await {
                Ok(Ok(())) => {
                    tracing::debug!(task = %task.name, "Task completed");
                }
                Ok(Err(e)) if e.is_cancelled() => {
                    tracing::debug!(task = %task.name, "Task cancelled");
                }
                Ok(Err(e)) => {
                    tracing::error!(task = %task.name, error = ?e, "Task panicked");
                }
                Err(_) => {
                    tracing::warn!(task = %task.name, "Task did not stop in time, aborting");
                    task.handle.abort();
                }
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_stops_cooperative_tasks() {
        let mut tasks = BackgroundTasks::new();
        let token = tasks.shutdown_token();
        tasks.spawn("waiter", TaskKind::Worker, async move {
            token.cancelled().await;
        });
        tasks.spawn("ticker", TaskKind::Periodic, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks.count_by_kind(), (1, 1));
        assert_eq!(tasks.check_health(), 0);

        let started = std::time::Instant::now();
        tasks.shutdown(Duration::from_millis(200)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let mut tasks = BackgroundTasks::new();
        tasks.spawn("boom", TaskKind::Worker, async {
            panic!("boom");
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tasks.check_health(), 1);
        tasks.shutdown(Duration::from_millis(100)).await;
    }
}
