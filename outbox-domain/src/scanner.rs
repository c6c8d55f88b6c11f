//! 重试扫描器（RetryScanner）
//!
//! 周期性重扫 Outbox 中悬而未决的行并重放：
//! - 候选行：`retries < max_retries` 且已过宽限期，按位点升序，单轮
//!   限量；
//! - 主题已不在注册表中的孤儿行直接删除（部署间主题收缩不积压）；
//! - 逐行自增重试数后重放：出站行重走完整发布路径，入站行本地
//!   直接再调用注册的处理器（绕过 broker）；
//! - 单行失败（包括 panic 与发布超时）只影响该行，不中断本轮与循环；
//! - 提供关闭与等待的 `ScannerHandle`。
//!
//! 本扫描器仅单实例安全：多实例并行运行会对同一行产生并发重试，
//! 需要外部租约/选主机制。
//!
use crate::config::RetryConfig;
use crate::event::PendingEvent;
use crate::publisher::EventPublisher;
use crate::registry::EventRegistry;
use crate::store::{OutboxRecord, OutboxStore, RecordKind};
use bon::Builder;
use chrono::Utc;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Builder)]
pub struct RetryScanner {
    store: Arc<dyn OutboxStore>,
    registry: Arc<EventRegistry>,
    publisher: Arc<EventPublisher>,
    #[builder(default)]
    config: RetryConfig,
}

/// 单轮扫描结果（日志观测用）
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// 入选候选行数
    pub scanned: usize,
    /// 删除的孤儿行数
    pub orphaned: usize,
    /// 重放成功行数
    pub replayed: usize,
    /// 重放失败（含 panic / 自增失败跳过）行数
    pub failed: usize,
    /// 本轮达到重试上限的行数
    pub exhausted: usize,
}

impl RetryScanner {
    /// 启动扫描循环，返回可用于关闭/等待的句柄
    ///
    /// 首轮在宽限期长度的预热延迟之后触发，避免与初次同步发布的
    /// 正常路径竞争。
    pub fn start(self: Arc<Self>) -> ScannerHandle {
        let token = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(1);

        {
            let scanner = self.clone();
            let child = token.clone();
            let warmup = self.config.grace;
            let interval = self.config.scan_interval;

            tasks.push(tokio::spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + warmup, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = child.cancelled() => break,
                        _ = ticker.tick() => {
                            let report = scanner.run_cycle().await;
                            if report.scanned > 0 {
                                info!(?report, "outbox rescan cycle finished");
                            }
                        }
                    }
                }
            }));
        }

        ScannerHandle { token, tasks }
    }

    /// 执行一轮扫描（独立可调用，便于测试与手工驱动）
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.grace).unwrap_or_else(|_| chrono::Duration::zero());

        for kind in [RecordKind::Publish, RecordKind::Consume] {
            let batch = match self
                .store
                .fetch_retryable(kind, self.config.max_retries, cutoff, self.config.batch_size)
                .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(?kind, %err, "failed to fetch retry candidates");
                    continue;
                }
            };

            for record in batch {
                report.scanned += 1;
                self.process_record(kind, record, &mut report).await;
            }
        }

        if report.exhausted > 0 {
            warn!(
                exhausted = report.exhausted,
                max_retries = self.config.max_retries,
                "rows reached retry limit and will no longer be rescanned"
            );
        }

        report
    }

    async fn process_record(&self, kind: RecordKind, record: OutboxRecord, report: &mut CycleReport) {
        let tracked = match kind {
            RecordKind::Publish => self.registry.is_publish_tracked(record.topic()),
            RecordKind::Consume => self.registry.is_consume_tracked(record.topic()),
        };

        // 孤儿行：主题已不再注册，删除且不重放
        if !tracked {
            if let Err(err) = self
                .store
                .delete(kind, record.topic(), record.identity())
                .await
            {
                warn!(topic = record.topic(), identity = record.identity(), %err,
                    "failed to delete orphaned outbox row");
            } else {
                info!(topic = record.topic(), identity = record.identity(),
                    "deleted orphaned outbox row");
                report.orphaned += 1;
            }
            return;
        }

        // 行级自增：失败只跳过本行，不影响批次其余行
        let retries = match self
            .store
            .bump_retries(kind, record.topic(), record.identity())
            .await
        {
            Ok(retries) => retries,
            Err(err) => {
                warn!(topic = record.topic(), identity = record.identity(), %err,
                    "failed to bump retry counter; skipping row");
                report.failed += 1;
                return;
            }
        };

        match self.replay(kind, &record).await {
            Ok(()) => report.replayed += 1,
            Err(reason) => {
                warn!(topic = record.topic(), identity = record.identity(), retries,
                    reason, "replay attempt failed");
                report.failed += 1;
            }
        }

        if retries >= self.config.max_retries {
            report.exhausted += 1;
        }
    }

    /// 重放一行；panic 在此边界收敛为错误字符串
    async fn replay(&self, kind: RecordKind, record: &OutboxRecord) -> Result<(), String> {
        match kind {
            RecordKind::Publish => {
                // 封包内容还原载荷与传播元数据，重放消息头与首发一致
                let event =
                    PendingEvent::from_stored(record.topic(), record.identity(), record.content());

                // 超时上限约束单行重放：悬挂的 broker 只损失本行的这次
                // 尝试（行保留，下轮再试），不拖住批次其余行与扫描循环
                let attempt = AssertUnwindSafe(self.publisher.publish(event)).catch_unwind();
                match time::timeout(self.config.replay_timeout, attempt).await {
                    Ok(Ok(Ok(()))) => Ok(()),
                    Ok(Ok(Err(err))) => Err(err.to_string()),
                    Ok(Err(_)) => {
                        error!(topic = record.topic(), identity = record.identity(),
                            "publish replay panicked");
                        Err("publish replay panicked".to_string())
                    }
                    Err(_) => {
                        warn!(topic = record.topic(), identity = record.identity(),
                            timeout = ?self.config.replay_timeout,
                            "publish replay timed out");
                        Err("publish replay timed out".to_string())
                    }
                }
            }
            RecordKind::Consume => {
                // 本地再驱动：绕过 broker 直接调用注册的处理器
                let replayed = AssertUnwindSafe(
                    self.registry
                        .replay_consume(record.topic(), record.content().clone()),
                )
                .catch_unwind()
                .await;

                match replayed {
                    Ok(Ok(())) => {
                        self.delete_processed(record).await;
                        Ok(())
                    }
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(_) => {
                        error!(topic = record.topic(), identity = record.identity(),
                            "consume handler panicked during replay");
                        Err("consume handler panicked".to_string())
                    }
                }
            }
        }
    }

    /// 入站行处理确认成功后删除（尽力而为）
    async fn delete_processed(&self, record: &OutboxRecord) {
        if let Err(err) = self
            .store
            .delete(RecordKind::Consume, record.topic(), record.identity())
            .await
        {
            warn!(topic = record.topic(), identity = record.identity(), %err,
                "failed to delete processed consume row");
        }
    }
}

/// 扫描器运行句柄：用于优雅关闭与等待任务结束
pub struct ScannerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ScannerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
    }
}

impl Drop for ScannerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
