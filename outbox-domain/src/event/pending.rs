//! 暂存事件（PendingEvent）
//!
//! 事件在“抛出之后、事务提交之前”的内存形态：载荷在抛出时即完成
//! 序列化，保证暂存与落库使用同一份内容。
//!
use super::{OutboxEvent, PropagationContext};
use crate::error::OutboxResult;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 发布行的落库内容封包：载荷与传播元数据一并持久化，
/// 重放消息得以携带与首发相同的消息头
#[derive(Serialize, Deserialize)]
struct StoredContent {
    payload: Value,
    propagation: PropagationContext,
}

#[derive(Debug, Clone, Builder)]
pub struct PendingEvent {
    /// 事件主题（注册表键 / broker 路由键）
    topic: String,
    /// 业务唯一键（broker 分区键）
    identity: String,
    /// 已序列化的事件载荷
    payload: Value,
    /// 抛出时捕获的请求级传播元数据
    propagation: PropagationContext,
}

impl PendingEvent {
    /// 从事件载荷构造暂存形态（序列化在此刻发生）
    pub fn from_event<E>(event: &E, propagation: &PropagationContext) -> OutboxResult<Self>
    where
        E: OutboxEvent,
    {
        Ok(Self {
            topic: E::TOPIC.to_string(),
            identity: event.identity().to_string(),
            payload: serde_json::to_value(event)?,
            propagation: propagation.clone(),
        })
    }

    /// 转换为落库内容（封包形态）
    pub fn stored_content(&self) -> OutboxResult<Value> {
        Ok(serde_json::to_value(StoredContent {
            payload: self.payload.clone(),
            propagation: self.propagation.clone(),
        })?)
    }

    /// 从落库内容还原暂存形态；无法识别封包时退化为裸载荷 + 空传播
    pub fn from_stored(topic: &str, identity: &str, content: &Value) -> Self {
        let (payload, propagation) = match serde_json::from_value::<StoredContent>(content.clone())
        {
            Ok(stored) => (stored.payload, stored.propagation),
            Err(_) => (content.clone(), PropagationContext::default()),
        };

        Self {
            topic: topic.to_string(),
            identity: identity.to_string(),
            payload,
            propagation,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn propagation(&self) -> &PropagationContext {
        &self.propagation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct GoodsPriced {
        goods_id: String,
        cents: u64,
    }

    impl OutboxEvent for GoodsPriced {
        const TOPIC: &'static str = "ShopGoods:Priced";

        fn identity(&self) -> &str {
            &self.goods_id
        }
    }

    #[test]
    fn stored_content_round_trips_payload_and_propagation() {
        let pending = PendingEvent::from_event(
            &GoodsPriced {
                goods_id: "g-1".into(),
                cents: 420,
            },
            &PropagationContext::builder()
                .maybe_trace_id(Some("t-9".into()))
                .build(),
        )
        .unwrap();

        let content = pending.stored_content().unwrap();
        let restored = PendingEvent::from_stored("ShopGoods:Priced", "g-1", &content);

        assert_eq!(restored.payload(), pending.payload());
        assert_eq!(restored.propagation().trace_id(), Some("t-9"));
    }

    #[test]
    fn from_stored_accepts_bare_payload() {
        // 旧格式行：内容即裸载荷，传播元数据按空处理
        let content = serde_json::json!({ "goods_id": "g-2", "cents": 7 });
        let restored = PendingEvent::from_stored("ShopGoods:Priced", "g-2", &content);

        assert_eq!(restored.payload(), &content);
        assert_eq!(restored.propagation().trace_id(), None);
    }
}
