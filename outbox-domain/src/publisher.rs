//! 提交后发布器（EventPublisher）
//!
//! 以“单元工作”为粒度暂存事务期间抛出的事件，事务提交成功后才异步
//! 推送至 broker：
//! - `stage_pending` 追加到对应单元工作的暂存区；
//! - `flush_on_commit` 在提交成功后恰好调用一次，取走暂存区并逐条
//!   异步发布（不阻塞请求路径）；回滚路径调用 `discard` 丢弃；
//! - 暂存区被取走后不再从内存重试，此后只有持久化的 Outbox 行支撑
//!   重试；
//! - 发布成功且主题被跟踪时尽力删除对应行（删除失败仅记录日志，
//!   扫描器会安全地重发，broker 侧需按 identity 幂等）；
//! - 异步路径上的 panic 被捕获并记录，不影响调用方与其他任务。
//!
use crate::broker::{BrokerMessage, MessageBroker};
use crate::error::OutboxResult;
use crate::event::PendingEvent;
use crate::registry::EventRegistry;
use crate::store::{OutboxStore, RecordKind};
use dashmap::DashMap;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{error, warn};
use uuid::Uuid;

pub struct EventPublisher {
    broker: Arc<dyn MessageBroker>,
    registry: Arc<EventRegistry>,
    store: Arc<dyn OutboxStore>,
    /// 单元工作ID -> 待发布事件（请求作用域，互不共享）
    staging: DashMap<Uuid, Vec<PendingEvent>>,
    tracker: TaskTracker,
}

impl EventPublisher {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        registry: Arc<EventRegistry>,
        store: Arc<dyn OutboxStore>,
    ) -> Self {
        Self {
            broker,
            registry,
            store,
            staging: DashMap::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// 把事件追加到指定单元工作的暂存区
    pub fn stage_pending(&self, unit_of_work: Uuid, events: Vec<PendingEvent>) {
        if events.is_empty() {
            return;
        }
        self.staging.entry(unit_of_work).or_default().extend(events);
    }

    /// 丢弃指定单元工作的暂存区（回滚路径）
    pub fn discard(&self, unit_of_work: Uuid) {
        self.staging.remove(&unit_of_work);
    }

    /// 事务提交成功后调用：取走暂存区并逐条异步发布
    ///
    /// 暂存区被移除保证同一单元工作最多冲刷一次。
    pub fn flush_on_commit(self: &Arc<Self>, unit_of_work: Uuid) {
        let Some((_, events)) = self.staging.remove(&unit_of_work) else {
            return;
        };

        for event in events {
            self.spawn_publish(event);
        }
    }

    fn spawn_publish(self: &Arc<Self>, event: PendingEvent) {
        let this = self.clone();
        self.tracker.spawn(async move {
            let topic = event.topic().to_string();
            let identity = event.identity().to_string();
            // 发布路径上的 panic 在此边界收敛为日志
            let outcome = AssertUnwindSafe(this.publish(event)).catch_unwind().await;
            if outcome.is_err() {
                error!(topic, identity, "publish task panicked");
            }
        });
    }

    /// 发布一条事件（初次或重试共用的完整路径）
    ///
    /// 错误在此记录后仍然返回，供扫描器统计重放结果；被跟踪主题的
    /// 持久行在失败时原样保留。
    pub async fn publish(&self, event: PendingEvent) -> OutboxResult<()> {
        let message = BrokerMessage::builder()
            .topic(event.topic().to_string())
            .partition_key(event.identity().to_string())
            .headers(event.propagation().to_headers())
            .payload(event.payload().clone())
            .build();

        match self.broker.publish(message).await {
            Ok(()) => {
                if self.registry.is_publish_tracked(event.topic()) {
                    // 尽力删除：失败只记录，行会被扫描器重发，
                    // broker/消费侧按 identity 幂等
                    if let Err(err) = self
                        .store
                        .delete(RecordKind::Publish, event.topic(), event.identity())
                        .await
                    {
                        warn!(
                            topic = event.topic(),
                            identity = event.identity(),
                            %err,
                            "failed to delete published outbox row"
                        );
                    }
                }
                Ok(())
            }
            Err(err) => {
                warn!(
                    topic = event.topic(),
                    identity = event.identity(),
                    %err,
                    "publish failed"
                );
                Err(err)
            }
        }
    }

    /// 关闭：给在途异步发布一个有界的宽限窗口
    pub async fn close(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!("in-flight publishes did not finish within grace window");
        }
    }

    /// 指定单元工作当前暂存的事件数（观测/断言用）
    pub fn staged_len(&self, unit_of_work: Uuid) -> usize {
        self.staging
            .get(&unit_of_work)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("staging", &self.staging.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OutboxError;
    use crate::event::{OutboxEvent, PropagationContext};
    use crate::store::{InMemoryOutboxStore, NewRecord, StoreSession};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct GoodsShipped {
        order_id: String,
    }

    impl OutboxEvent for GoodsShipped {
        const TOPIC: &'static str = "ShopGoods:Shipped";

        fn identity(&self) -> &str {
            &self.order_id
        }
    }

    #[derive(Default)]
    struct SpyBroker {
        published: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl MessageBroker for SpyBroker {
        async fn publish(&self, message: BrokerMessage) -> OutboxResult<()> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(OutboxError::broker("wire down"));
            }
            assert_eq!(message.partition_key(), message.payload()["order_id"]);
            self.published.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn pending(id: &str) -> PendingEvent {
        PendingEvent::from_event(
            &GoodsShipped {
                order_id: id.into(),
            },
            &PropagationContext::builder()
                .maybe_trace_id(Some("t-1".into()))
                .build(),
        )
        .unwrap()
    }

    fn publisher(broker: Arc<SpyBroker>, store: InMemoryOutboxStore) -> Arc<EventPublisher> {
        let registry = Arc::new(
            EventRegistry::builder()
                .publish::<GoodsShipped>()
                .unwrap()
                .build(),
        );
        Arc::new(EventPublisher::new(broker, registry, Arc::new(store)))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_is_once_and_discard_drops_buffer() {
        let broker = Arc::new(SpyBroker::default());
        let publisher = publisher(broker.clone(), InMemoryOutboxStore::new());

        let uow = Uuid::new_v4();
        publisher.stage_pending(uow, vec![pending("o-1"), pending("o-2")]);
        assert_eq!(publisher.staged_len(uow), 2);

        publisher.flush_on_commit(uow);
        assert_eq!(publisher.staged_len(uow), 0);
        // 第二次冲刷为 no-op
        publisher.flush_on_commit(uow);

        publisher.close(Duration::from_secs(1)).await;
        assert_eq!(broker.published.load(Ordering::Relaxed), 2);

        let rolled_back = Uuid::new_v4();
        publisher.stage_pending(rolled_back, vec![pending("o-3")]);
        publisher.discard(rolled_back);
        assert_eq!(publisher.staged_len(rolled_back), 0);
    }

    #[tokio::test]
    async fn success_deletes_tracked_row_and_failure_keeps_it() {
        let broker = Arc::new(SpyBroker::default());
        let store = InMemoryOutboxStore::new();
        let publisher = publisher(broker.clone(), store.clone());

        // 预置一条已落库的发布行
        let mut session = store.begin().await.unwrap();
        session
            .insert(RecordKind::Publish, NewRecord::try_from(&pending("o-9")).unwrap())
            .await
            .unwrap();
        session.commit().await.unwrap();

        broker.fail.store(true, Ordering::Relaxed);
        assert!(publisher.publish(pending("o-9")).await.is_err());
        assert_eq!(store.count(RecordKind::Publish).await.unwrap(), 1);

        broker.fail.store(false, Ordering::Relaxed);
        publisher.publish(pending("o-9")).await.unwrap();
        assert_eq!(store.count(RecordKind::Publish).await.unwrap(), 0);
    }
}
