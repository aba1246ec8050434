//! SubmissionWorker - 申报后台任务
//!
//! - 消费签名账本发出的记录事件（入队）
//! - 定期扫描到期行并提交（并发受限）
//! - 启动时补齐崩溃丢失的事件

use std::sync::Arc;
use std::time::Duration;

use shared::fiscal::SignedRecord;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use super::queue::SubmissionQueue;

pub struct SubmissionWorker {
    queue: Arc<SubmissionQueue>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    scan_interval: Duration,
}

impl SubmissionWorker {
    pub fn new(queue: Arc<SubmissionQueue>, concurrency: usize, scan_interval: Duration) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            queue,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            scan_interval,
        }
    }

    pub async fn run(
        self,
        mut event_rx: mpsc::UnboundedReceiver<SignedRecord>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(
            concurrency = self.concurrency,
            scan_interval_secs = self.scan_interval.as_secs(),
            "SubmissionWorker started"
        );

        if let Err(e) = self.queue.reconcile() {
            tracing::error!(error = %e, "Failed to reconcile submission queue");
        }

        let mut scan_interval = tokio::time::interval(self.scan_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("SubmissionWorker received shutdown signal");
                    break;
                }
                record_opt = event_rx.recv() => {
                    match record_opt {
                        Some(record) => {
                            if let Err(e) = self.queue.enqueue_record(&record) {
                                tracing::error!(record_id = %record.id, error = %e, "Failed to enqueue signed record");
                            }
                        }
                        None => {
                            tracing::info!("Signed record channel closed, shutting down SubmissionWorker");
                            break;
                        }
                    }
                }
                _ = scan_interval.tick() => {
                    self.dispatch_due().await;
                }
            }
        }
    }

    /// 认领到期行，并发提交
    async fn dispatch_due(&self) {
        let batch = match self
            .queue
            .claim_due(shared::util::now_millis(), self.concurrency * 4)
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim due submissions");
                return;
            }
        };
        if batch.entries.is_empty() {
            return;
        }
        tracing::debug!(count = batch.entries.len(), "Dispatching due submissions");

        for entry in batch.entries {
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                return;
            };
            let queue = self.queue.clone();
            let token = batch.token.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = queue.submit(&entry, &token).await {
                    tracing::error!(record_id = %entry.record_id, error = %e, "Submission processing failed");
                }
            });
        }
    }
}
