//! Outbox 运行时（OutboxRuntime）
//!
//! 显式构造的服务实例：装配注册表、存储、broker 与引擎组件，
//! 并提供显式的启动/关闭生命周期。每个组件以注入方式获得依赖，
//! 不存在进程级单例状态。
//!
use crate::error::AppError;
use outbox_domain::broker::MessageBroker;
use outbox_domain::config::RetryConfig;
use outbox_domain::publisher::EventPublisher;
use outbox_domain::registry::EventRegistry;
use outbox_domain::scanner::{RetryScanner, ScannerHandle};
use outbox_domain::store::OutboxStore;
use outbox_domain::unit_of_work::UnitOfWork;
use outbox_domain::writer::TransactionalWriter;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

pub struct OutboxRuntime {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<EventPublisher>,
    writer: TransactionalWriter,
    scanner: Arc<RetryScanner>,
    handle: Mutex<Option<ScannerHandle>>,
}

impl OutboxRuntime {
    /// 装配一个运行时实例（注册表在此之前应已封板）
    pub fn new(
        store: Arc<dyn OutboxStore>,
        broker: Arc<dyn MessageBroker>,
        registry: Arc<EventRegistry>,
        config: RetryConfig,
    ) -> Self {
        let publisher = Arc::new(EventPublisher::new(
            broker,
            registry.clone(),
            store.clone(),
        ));
        let writer =
            TransactionalWriter::new(registry.clone(), publisher.clone(), store.clone());
        let scanner = Arc::new(
            RetryScanner::builder()
                .store(store.clone())
                .registry(registry)
                .publisher(publisher.clone())
                .config(config)
                .build(),
        );

        Self {
            store,
            publisher,
            writer,
            scanner,
            handle: Mutex::new(None),
        }
    }

    /// 启动后台扫描循环；重复启动返回错误
    pub fn start(&self) -> Result<(), AppError> {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return Err(AppError::AlreadyStarted);
        }

        *handle = Some(self.scanner.clone().start());
        info!("outbox runtime started");
        Ok(())
    }

    /// 关闭：停止扫描循环，并给在途异步发布一个有界宽限窗口
    pub async fn shutdown(&self, grace: Duration) -> Result<(), AppError> {
        let handle = {
            let mut guard = self.handle.lock().unwrap();
            guard.take()
        };
        let Some(handle) = handle else {
            return Err(AppError::NotStarted);
        };

        handle.shutdown();
        handle.join().await;
        self.publisher.close(grace).await;
        info!("outbox runtime stopped");
        Ok(())
    }

    /// 开启一个请求作用域的单元工作
    pub async fn begin_unit_of_work(&self) -> Result<UnitOfWork, AppError> {
        let session = self.store.begin().await?;
        Ok(UnitOfWork::new(
            session,
            self.writer.clone(),
            self.publisher.clone(),
        ))
    }

    pub fn writer(&self) -> &TransactionalWriter {
        &self.writer
    }

    pub fn publisher(&self) -> &Arc<EventPublisher> {
        &self.publisher
    }

    pub fn scanner(&self) -> &Arc<RetryScanner> {
        &self.scanner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_domain::broker::InMemoryBroker;
    use outbox_domain::event::{OutboxEvent, PropagationContext, RaisedEvents};
    use outbox_domain::store::{InMemoryOutboxStore, RecordKind};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        order_id: String,
    }

    impl OutboxEvent for OrderPlaced {
        const TOPIC: &'static str = "Order:Placed";

        fn identity(&self) -> &str {
            &self.order_id
        }
    }

    fn runtime(store: InMemoryOutboxStore) -> OutboxRuntime {
        let registry = Arc::new(
            EventRegistry::builder()
                .publish::<OrderPlaced>()
                .unwrap()
                .build(),
        );
        OutboxRuntime::new(
            Arc::new(store),
            Arc::new(InMemoryBroker::new(16)),
            registry,
            RetryConfig::default(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_start_once_then_shutdown() {
        let rt = runtime(InMemoryOutboxStore::new());

        rt.start().unwrap();
        assert!(matches!(rt.start(), Err(AppError::AlreadyStarted)));

        rt.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            rt.shutdown(Duration::from_secs(1)).await,
            Err(AppError::NotStarted)
        ));

        // 关闭后可以再次启动
        rt.start().unwrap();
        rt.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unit_of_work_commit_persists_then_publishes() {
        let store = InMemoryOutboxStore::new();
        let rt = runtime(store.clone());

        let mut uow = rt.begin_unit_of_work().await.unwrap();
        let mut events = RaisedEvents::new();
        events
            .raise(
                &OrderPlaced {
                    order_id: "o-1".into(),
                },
                &PropagationContext::default(),
            )
            .unwrap();

        uow.save(&mut events).await.unwrap();
        assert!(events.is_empty());
        uow.commit().await.unwrap();

        // 发布为异步路径：等待行被确认删除
        rt.publisher().close(Duration::from_secs(1)).await;
        assert_eq!(store.count(RecordKind::Publish).await.unwrap(), 0);
    }
}
