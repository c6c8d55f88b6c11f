/// Outbox 引擎（内存版）示例
/// 展示 事务内落库 -> 提交后发布 -> 确认删除 的闭环
use anyhow::Result as AnyResult;
use futures_util::StreamExt;
use outbox_domain::broker::InMemoryBroker;
use outbox_domain::event::{OutboxEvent, PropagationContext, RaisedEvents};
use outbox_domain::publisher::EventPublisher;
use outbox_domain::registry::EventRegistry;
use outbox_domain::store::{InMemoryOutboxStore, OutboxStore, RecordKind};
use outbox_domain::unit_of_work::UnitOfWork;
use outbox_domain::writer::TransactionalWriter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// 领域事件定义
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UserRegistered {
    user_id: String,
    email: String,
}

impl OutboxEvent for UserRegistered {
    const TOPIC: &'static str = "User:Registered";

    fn identity(&self) -> &str {
        &self.user_id
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AnyResult<()> {
    println!("=== Outbox 引擎（内存版）示例 ===\n");

    // Registry：启动期一次性注册，之后只读
    let registry = Arc::new(EventRegistry::builder().publish::<UserRegistered>()?.build());

    // Store & Broker
    let store = InMemoryOutboxStore::new();
    let broker = Arc::new(InMemoryBroker::new(1024));
    let mut messages = broker.subscribe();

    // Publisher & Writer
    let publisher = Arc::new(EventPublisher::new(
        broker.clone(),
        registry.clone(),
        Arc::new(store.clone()),
    ));
    let writer = TransactionalWriter::new(registry, publisher.clone(), Arc::new(store.clone()));

    // 在一个工作单元内保存业务状态与事件
    let session = store.begin().await?;
    let mut uow = UnitOfWork::new(session, writer, publisher.clone());

    let mut events = RaisedEvents::new();
    events.raise(
        &UserRegistered {
            user_id: "u-1".to_string(),
            email: "u1@example.com".to_string(),
        },
        &PropagationContext::builder()
            .maybe_trace_id(Some("trace-demo".to_string()))
            .build(),
    )?;
    uow.save(&mut events).await?;
    println!("✅ 事件已随事务落库（提交前 broker 静默）");

    uow.commit().await?;
    println!("✅ 事务提交，延迟发布触发");

    // 订阅端收到消息
    if let Some(Ok(message)) = messages.next().await {
        println!(
            "✅ 收到消息 topic={} key={} trace-id={:?}",
            message.topic(),
            message.partition_key(),
            message.header("trace-id"),
        );
    }

    // 发布成功后 outbox 行被确认删除
    publisher.close(Duration::from_secs(1)).await;
    let remaining = store.count(RecordKind::Publish).await?;
    println!("✅ 剩余 PublishRecord: {remaining}");
    Ok(())
}
