//! 事务内写入器（TransactionalWriter）
//!
//! 在调用方的活动事务内持久化 Outbox 行，使事件与业务状态变更同生
//! 共死：
//! - 被跟踪主题的抛出事件 → 事务内插入 PublishRecord（插入失败向上
//!   传播，整个事务失败）；
//! - 被跟踪主题的确认事件 → 同事务删除对应 ConsumeRecord；
//! - 未注册主题完全绕过 Outbox（即发即弃，不参与重试）；
//! - 随后把全部抛出事件（含未跟踪的）暂存到提交后发布器的对应单元
//!   工作缓冲区；聚合内的事件集合随本次调用被清空。
//!
use crate::error::OutboxResult;
use crate::event::{OutboxEvent, RaisedEvents};
use crate::publisher::EventPublisher;
use crate::registry::EventRegistry;
use crate::store::{NewRecord, OutboxStore, RecordKind, StoreSession};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct TransactionalWriter {
    registry: Arc<EventRegistry>,
    publisher: Arc<EventPublisher>,
    store: Arc<dyn OutboxStore>,
}

impl TransactionalWriter {
    pub fn new(
        registry: Arc<EventRegistry>,
        publisher: Arc<EventPublisher>,
        store: Arc<dyn OutboxStore>,
    ) -> Self {
        Self {
            registry,
            publisher,
            store,
        }
    }

    /// 在活动事务内保存聚合抛出/确认的事件
    ///
    /// 事件集合在调用后被清空，重复调用不会重复暂存。
    pub async fn save(
        &self,
        session: &mut dyn StoreSession,
        events: &mut RaisedEvents,
        unit_of_work: Uuid,
    ) -> OutboxResult<()> {
        let raised = events.take_raised();
        let acked = events.take_acked();

        for event in &raised {
            if self.registry.is_publish_tracked(event.topic()) {
                session
                    .insert(RecordKind::Publish, NewRecord::try_from(event)?)
                    .await?;
            } else {
                debug!(topic = event.topic(), identity = event.identity(),
                    "topic not registered; event bypasses the outbox");
            }
        }

        for ack in &acked {
            if self.registry.is_consume_tracked(ack.topic()) {
                session
                    .delete(RecordKind::Consume, ack.topic(), ack.identity())
                    .await?;
            }
        }

        self.publisher.stage_pending(unit_of_work, raised);
        Ok(())
    }

    /// 记录一条收到的入站事件（处理确认之前的持久化锚点）
    ///
    /// 仅当主题登记为入站跟踪时落 ConsumeRecord（独立短事务），
    /// 返回是否已持久化。
    pub async fn record_incoming(
        &self,
        topic: &str,
        identity: &str,
        payload: Value,
    ) -> OutboxResult<bool> {
        if !self.registry.is_consume_tracked(topic) {
            return Ok(false);
        }

        let mut session = self.store.begin().await?;
        session
            .insert(
                RecordKind::Consume,
                NewRecord::builder()
                    .identity(identity.to_string())
                    .topic(topic.to_string())
                    .content(payload)
                    .build(),
            )
            .await?;
        session.commit().await?;
        Ok(true)
    }

    /// `record_incoming` 的类型化便捷入口
    pub async fn record_incoming_event<E>(&self, event: &E) -> OutboxResult<bool>
    where
        E: OutboxEvent,
    {
        self.record_incoming(E::TOPIC, event.identity(), serde_json::to_value(event)?)
            .await
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }
}
