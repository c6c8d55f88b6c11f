//! 事务内保存的端到端行为：原子性、唯一约束与未注册主题旁路
use async_trait::async_trait;
use outbox_domain::broker::{BrokerMessage, MessageBroker};
use outbox_domain::error::{OutboxError, OutboxResult};
use outbox_domain::event::{OutboxEvent, PropagationContext, RaisedEvents};
use outbox_domain::publisher::EventPublisher;
use outbox_domain::registry::EventRegistry;
use outbox_domain::store::{InMemoryOutboxStore, NewRecord, OutboxStore, RecordKind, StoreSession};
use outbox_domain::unit_of_work::UnitOfWork;
use outbox_domain::writer::TransactionalWriter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GoodsSold {
    shop_id: String,
    amount: u32,
}

impl OutboxEvent for GoodsSold {
    const TOPIC: &'static str = "ShopGoods:Sold";

    fn identity(&self) -> &str {
        &self.shop_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DebugPing {
    probe_id: String,
}

impl OutboxEvent for DebugPing {
    const TOPIC: &'static str = "Debug:Ping";

    fn identity(&self) -> &str {
        &self.probe_id
    }
}

#[derive(Default)]
struct SpyBroker {
    published: AtomicUsize,
    topics: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageBroker for SpyBroker {
    async fn publish(&self, message: BrokerMessage) -> OutboxResult<()> {
        self.topics.lock().unwrap().push(message.topic().to_string());
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct Fixture {
    store: InMemoryOutboxStore,
    broker: Arc<SpyBroker>,
    publisher: Arc<EventPublisher>,
    writer: TransactionalWriter,
}

fn fixture() -> Fixture {
    let registry = Arc::new(
        EventRegistry::builder()
            .publish::<GoodsSold>()
            .unwrap()
            .build(),
    );
    let store = InMemoryOutboxStore::new();
    let broker = Arc::new(SpyBroker::default());
    let publisher = Arc::new(EventPublisher::new(
        broker.clone(),
        registry.clone(),
        Arc::new(store.clone()),
    ));
    let writer = TransactionalWriter::new(registry, publisher.clone(), Arc::new(store.clone()));
    Fixture {
        store,
        broker,
        publisher,
        writer,
    }
}

impl Fixture {
    async fn unit_of_work(&self) -> UnitOfWork {
        let session = self.store.begin().await.unwrap();
        UnitOfWork::new(session, self.writer.clone(), self.publisher.clone())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn committed_transaction_persists_row_then_flushes() {
    let fx = fixture();
    let mut uow = fx.unit_of_work().await;

    let mut events = RaisedEvents::new();
    events
        .raise(
            &GoodsSold {
                shop_id: "s-1".into(),
                amount: 7,
            },
            &PropagationContext::builder()
                .maybe_trace_id(Some("t-1".into()))
                .build(),
        )
        .unwrap();

    uow.save(&mut events).await.unwrap();
    // save 之后聚合事件集合被清空
    assert!(events.is_empty());

    uow.commit().await.unwrap();
    fx.publisher.close(Duration::from_secs(1)).await;

    // 发布成功后行被确认删除；broker 恰好收到一条
    assert_eq!(fx.store.count(RecordKind::Publish).await.unwrap(), 0);
    assert_eq!(fx.broker.published.load(Ordering::Relaxed), 1);
    assert_eq!(fx.broker.topics.lock().unwrap().as_slice(), ["ShopGoods:Sold"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn rolled_back_transaction_leaves_no_row_and_no_publish() {
    let fx = fixture();
    let mut uow = fx.unit_of_work().await;

    let mut events = RaisedEvents::new();
    events
        .raise(
            &GoodsSold {
                shop_id: "s-2".into(),
                amount: 1,
            },
            &PropagationContext::default(),
        )
        .unwrap();
    uow.save(&mut events).await.unwrap();

    // 模拟下游出错：整个事务回滚
    uow.rollback().await.unwrap();
    fx.publisher.close(Duration::from_secs(1)).await;

    assert!(fx.store.get(RecordKind::Publish, "ShopGoods:Sold", "s-2").is_none());
    assert_eq!(fx.broker.published.load(Ordering::Relaxed), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unregistered_topic_bypasses_outbox_but_still_publishes() {
    let fx = fixture();
    let mut uow = fx.unit_of_work().await;

    let mut events = RaisedEvents::new();
    events
        .raise(
            &DebugPing {
                probe_id: "p-1".into(),
            },
            &PropagationContext::default(),
        )
        .unwrap();
    uow.save(&mut events).await.unwrap();
    uow.commit().await.unwrap();
    fx.publisher.close(Duration::from_secs(1)).await;

    // 即发即弃：发出了，但从未落行
    assert_eq!(fx.broker.published.load(Ordering::Relaxed), 1);
    assert_eq!(fx.store.count(RecordKind::Publish).await.unwrap(), 0);
    assert!(fx.store.get(RecordKind::Publish, "Debug:Ping", "p-1").is_none());
}

#[tokio::test]
async fn duplicate_identity_aborts_second_transaction_only() {
    let fx = fixture();

    let row = || {
        NewRecord::builder()
            .identity("1".to_string())
            .topic("X".to_string())
            .content(serde_json::json!({ "n": 1 }))
            .build()
    };

    let mut first = fx.store.begin().await.unwrap();
    first.insert(RecordKind::Publish, row()).await.unwrap();
    first.commit().await.unwrap();

    let mut second = fx.store.begin().await.unwrap();
    let err = second.insert(RecordKind::Publish, row()).await.unwrap_err();
    assert!(matches!(err, OutboxError::DuplicateRecord { .. }));
    second.rollback().await.unwrap();

    // 第一行不受影响
    let kept = fx.store.get(RecordKind::Publish, "X", "1").unwrap();
    assert_eq!(kept.retries(), 0);
    assert_eq!(fx.store.count(RecordKind::Publish).await.unwrap(), 1);
}
