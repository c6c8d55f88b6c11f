//! 消息 broker 协议与内存实现
//!
//! 定义向外部 broker 发送消息的最小抽象：主题作为路由键、业务键作为
//! 分区键、传播元数据作为消息头。`InMemoryBroker` 基于
//! `tokio::sync::broadcast` 实现，满足测试、示例与本地开发；
//! `subscribe` 返回 `'static` 生命周期消息流，便于在 `tokio::spawn`
//! 中消费。
//!
use crate::error::{OutboxError, OutboxResult};
use async_trait::async_trait;
use bon::Builder;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// 一条发往 broker 的消息
#[derive(Debug, Clone, Builder)]
pub struct BrokerMessage {
    /// 路由键（事件主题）
    topic: String,
    /// 分区/排序键（业务唯一键）
    partition_key: String,
    /// 消息头（传播元数据）
    #[builder(default)]
    headers: Vec<(String, String)>,
    /// 消息体（已序列化的事件载荷）
    payload: Value,
}

impl BrokerMessage {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// 消息 broker：负责把消息送达外部系统
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, message: BrokerMessage) -> OutboxResult<()>;
}

/// 简单的内存 broker 实现
#[derive(Clone)]
pub struct InMemoryBroker {
    tx: broadcast::Sender<BrokerMessage>,
}

impl InMemoryBroker {
    /// 创建一个内存 broker，`capacity` 为广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 返回一个 `'static` 生命周期的消息流
    pub fn subscribe(&self) -> BoxStream<'static, OutboxResult<BrokerMessage>> {
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).map(|r| r.map_err(|e| OutboxError::broker(e.to_string())));
        Box::pin(stream)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, message: BrokerMessage) -> OutboxResult<()> {
        // 若当前无订阅者，broadcast 的 send 会返回错误，这里视为非致命并忽略
        let _ = self.tx.send(message);
        Ok(())
    }
}
