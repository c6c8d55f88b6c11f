/// 重试扫描器示例
/// 模拟 broker 停机导致首发失败，恢复后由后台扫描循环补发
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use outbox_domain::broker::{BrokerMessage, MessageBroker};
use outbox_domain::config::RetryConfig;
use outbox_domain::error::{OutboxError, OutboxResult};
use outbox_domain::event::{OutboxEvent, PropagationContext, RaisedEvents};
use outbox_domain::publisher::EventPublisher;
use outbox_domain::registry::EventRegistry;
use outbox_domain::scanner::RetryScanner;
use outbox_domain::store::{InMemoryOutboxStore, OutboxStore, RecordKind};
use outbox_domain::unit_of_work::UnitOfWork;
use outbox_domain::writer::TransactionalWriter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ============================================================================
// 可切换故障的 Broker
// ============================================================================

#[derive(Default)]
struct ToggleBroker {
    down: AtomicBool,
}

#[async_trait]
impl MessageBroker for ToggleBroker {
    async fn publish(&self, message: BrokerMessage) -> OutboxResult<()> {
        if self.down.load(Ordering::Relaxed) {
            return Err(OutboxError::broker("broker is down"));
        }
        println!(
            "  -> 发布成功 topic={} key={}",
            message.topic(),
            message.partition_key()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct InvoiceIssued {
    invoice_id: String,
    cents: u64,
}

impl OutboxEvent for InvoiceIssued {
    const TOPIC: &'static str = "Invoice:Issued";

    fn identity(&self) -> &str {
        &self.invoice_id
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AnyResult<()> {
    println!("=== 重试扫描器示例 ===\n");

    let registry = Arc::new(EventRegistry::builder().publish::<InvoiceIssued>()?.build());
    let store = InMemoryOutboxStore::new();
    let broker = Arc::new(ToggleBroker::default());
    broker.down.store(true, Ordering::Relaxed);

    let publisher = Arc::new(EventPublisher::new(
        broker.clone(),
        registry.clone(),
        Arc::new(store.clone()),
    ));
    let writer = TransactionalWriter::new(
        registry.clone(),
        publisher.clone(),
        Arc::new(store.clone()),
    );

    // broker 停机时提交事务：首发失败，行保留在 outbox 表
    let session = store.begin().await?;
    let mut uow = UnitOfWork::new(session, writer, publisher.clone());
    let mut events = RaisedEvents::new();
    events.raise(
        &InvoiceIssued {
            invoice_id: "inv-1".to_string(),
            cents: 9900,
        },
        &PropagationContext::default(),
    )?;
    uow.save(&mut events).await?;
    uow.commit().await?;
    publisher.close(Duration::from_secs(1)).await;
    println!(
        "✅ 首发失败，行保留: {}",
        store.count(RecordKind::Publish).await?
    );

    // 启动扫描循环（演示用短间隔；生产缺省 60s 宽限 / 30s 间隔）
    let scanner = Arc::new(
        RetryScanner::builder()
            .store(Arc::new(store.clone()) as Arc<dyn OutboxStore>)
            .registry(registry)
            .publisher(publisher)
            .config(RetryConfig {
                grace: Duration::from_millis(200),
                scan_interval: Duration::from_millis(200),
                ..RetryConfig::default()
            })
            .build(),
    );
    let handle = scanner.start();
    println!("✅ 扫描循环已启动");

    // broker 恢复后，下一轮扫描补发并删除行
    tokio::time::sleep(Duration::from_millis(300)).await;
    broker.down.store(false, Ordering::Relaxed);
    println!("✅ broker 已恢复");

    tokio::time::sleep(Duration::from_secs(1)).await;
    println!(
        "✅ 补发完成，剩余 PublishRecord: {}",
        store.count(RecordKind::Publish).await?
    );

    handle.shutdown();
    handle.join().await;
    println!("\n✅ 优雅关闭完成");
    Ok(())
}
