//! 事件注册表（EventRegistry）
//!
//! 进程级“主题 → 事件类型/处理器”的映射，启动期一次性构建：
//! - 通过 `EventRegistryBuilder` 注册发布主题与消费主题；
//! - 注册消费主题时以泛型包装将具体处理器擦除为固定形态的重放闭包
//!   `(payload) -> Future<anyhow::Result<()>>`，运行期不做类型检查；
//! - `build` 之后注册表不可变，`is_*_tracked` 为无锁只读查询；
//! - 注册错误（空主题、重复主题）显式返回，启动路径应视为致命。
//!
use crate::error::{OutboxError, OutboxResult};
use crate::event::OutboxEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type ReplayFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// 固定形态的重放闭包：入参为已持久化的载荷，类型还原在闭包内部完成
type ReplayFn = Arc<dyn Fn(Value) -> ReplayFuture + Send + Sync>;

/// 入站事件处理器：消费某一具体类型的事件
///
/// 处理器与事件类型的匹配由泛型签名在编译期保证。
#[async_trait]
pub trait ConsumeHandler<E>: Send + Sync
where
    E: OutboxEvent,
{
    async fn handle(&self, event: E) -> anyhow::Result<()>;
}

/// 注册表构建器（仅在启动期使用）
#[derive(Default)]
pub struct EventRegistryBuilder {
    publish: HashSet<String>,
    consume: HashMap<String, ReplayFn>,
}

impl EventRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册发布主题
    pub fn publish<E>(mut self) -> OutboxResult<Self>
    where
        E: OutboxEvent,
    {
        let topic = checked_topic::<E>()?;
        if !self.publish.insert(topic.to_string()) {
            return Err(OutboxError::DuplicateTopic {
                topic: topic.to_string(),
            });
        }
        Ok(self)
    }

    /// 注册消费主题及其处理器
    pub fn consume<E, H>(mut self, handler: Arc<H>) -> OutboxResult<Self>
    where
        E: OutboxEvent,
        H: ConsumeHandler<E> + 'static,
    {
        let topic = checked_topic::<E>()?;
        if self.consume.contains_key(topic) {
            return Err(OutboxError::DuplicateTopic {
                topic: topic.to_string(),
            });
        }

        // 擦除：闭包内先还原具体事件类型，再调用处理器
        let f: ReplayFn = Arc::new(move |payload| {
            let handler = handler.clone();
            Box::pin(async move {
                let event: E = serde_json::from_value(payload)?;
                handler.handle(event).await
            })
        });

        self.consume.insert(topic.to_string(), f);
        Ok(self)
    }

    /// 以异步闭包注册消费主题（无需定义处理器类型）
    pub fn consume_fn<E, F, Fut>(self, handler: F) -> OutboxResult<Self>
    where
        E: OutboxEvent,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        struct FnHandler<F>(F);

        #[async_trait]
        impl<E, F, Fut> ConsumeHandler<E> for FnHandler<F>
        where
            E: OutboxEvent,
            F: Fn(E) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        {
            async fn handle(&self, event: E) -> anyhow::Result<()> {
                (self.0)(event).await
            }
        }

        self.consume::<E, _>(Arc::new(FnHandler(handler)))
    }

    /// 封板为不可变注册表
    pub fn build(self) -> EventRegistry {
        EventRegistry {
            publish: self.publish,
            consume: self.consume,
        }
    }
}

impl std::fmt::Debug for EventRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistryBuilder")
            .field("publish", &self.publish)
            .field("consume", &self.consume.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// 不可变的进程级注册表（启动后只读）
pub struct EventRegistry {
    publish: HashSet<String>,
    consume: HashMap<String, ReplayFn>,
}

impl EventRegistry {
    pub fn builder() -> EventRegistryBuilder {
        EventRegistryBuilder::new()
    }

    /// 该主题是否登记为出站跟踪（决定是否落 PublishRecord）
    pub fn is_publish_tracked(&self, topic: &str) -> bool {
        self.publish.contains(topic)
    }

    /// 该主题是否登记为入站跟踪（决定是否落/删 ConsumeRecord）
    pub fn is_consume_tracked(&self, topic: &str) -> bool {
        self.consume.contains_key(topic)
    }

    /// 重放一条入站事件：还原类型并调用注册的处理器
    pub async fn replay_consume(&self, topic: &str, payload: Value) -> OutboxResult<()> {
        let Some(f) = self.consume.get(topic) else {
            return Err(OutboxError::UnknownTopic {
                topic: topic.to_string(),
            });
        };

        (f)(payload).await.map_err(|e| OutboxError::ReplayFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn publish_topics(&self) -> impl Iterator<Item = &str> {
        self.publish.iter().map(String::as_str)
    }

    pub fn consume_topics(&self) -> impl Iterator<Item = &str> {
        self.consume.keys().map(String::as_str)
    }
}

fn checked_topic<E: OutboxEvent>() -> OutboxResult<&'static str> {
    if E::TOPIC.is_empty() {
        return Err(OutboxError::EmptyTopic);
    }
    Ok(E::TOPIC)
}
