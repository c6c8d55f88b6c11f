//! 聚合事件集合（RaisedEvents）
//!
//! 聚合在一次业务操作中抛出的待发布事件与待确认的入站事件，按抛出
//! 顺序排列；`save` 之后集合被清空，避免重复暂存。
//!
use super::{OutboxEvent, PendingEvent, PropagationContext};
use crate::error::OutboxResult;
use std::slice::Iter;

/// 对已处理入站事件的确认（用于同事务删除 ConsumeRecord）
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    topic: String,
    identity: String,
}

impl Acknowledgement {
    pub fn new(topic: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            identity: identity.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// 聚合内的事件集合，嵌入到聚合结构体中使用
#[derive(Debug, Default)]
pub struct RaisedEvents {
    raised: Vec<PendingEvent>,
    acked: Vec<Acknowledgement>,
}

impl RaisedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// 抛出一个待发布事件（序列化在抛出时发生）
    pub fn raise<E>(&mut self, event: &E, propagation: &PropagationContext) -> OutboxResult<()>
    where
        E: OutboxEvent,
    {
        self.raised.push(PendingEvent::from_event(event, propagation)?);
        Ok(())
    }

    /// 确认一个已处理的入站事件
    pub fn ack<E>(&mut self, event: &E)
    where
        E: OutboxEvent,
    {
        self.acked
            .push(Acknowledgement::new(E::TOPIC, event.identity()));
    }

    /// 按主题与业务键确认（无具体事件实例时使用）
    pub fn ack_identity(&mut self, topic: impl Into<String>, identity: impl Into<String>) {
        self.acked.push(Acknowledgement::new(topic, identity));
    }

    /// 取走全部待发布事件（集合被清空）
    pub fn take_raised(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.raised)
    }

    /// 取走全部确认记录（集合被清空）
    pub fn take_acked(&mut self) -> Vec<Acknowledgement> {
        std::mem::take(&mut self.acked)
    }

    pub fn raised(&self) -> &[PendingEvent] {
        &self.raised
    }

    pub fn acked(&self) -> &[Acknowledgement] {
        &self.acked
    }

    pub fn len(&self) -> usize {
        self.raised.len() + self.acked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raised.is_empty() && self.acked.is_empty()
    }

    /// 迭代待发布事件引用（不消费集合）
    pub fn iter_raised(&self) -> Iter<'_, PendingEvent> {
        self.raised.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct GoodsShipped {
        order_id: String,
        count: u32,
    }

    impl OutboxEvent for GoodsShipped {
        const TOPIC: &'static str = "ShopGoods:Shipped";

        fn identity(&self) -> &str {
            &self.order_id
        }
    }

    #[test]
    fn raise_serializes_at_raise_time_and_take_clears() {
        let ctx = PropagationContext::builder()
            .maybe_trace_id(Some("t-1".into()))
            .maybe_service_name(Some("shop".into()))
            .build();

        let mut basket = RaisedEvents::new();
        let mut ev = GoodsShipped {
            order_id: "o-1".into(),
            count: 2,
        };
        basket.raise(&ev, &ctx).unwrap();

        // 抛出之后修改事件实例，不影响已序列化的暂存内容
        ev.count = 99;

        assert_eq!(basket.len(), 1);
        let raised = basket.take_raised();
        assert!(basket.is_empty());
        assert_eq!(raised[0].topic(), "ShopGoods:Shipped");
        assert_eq!(raised[0].identity(), "o-1");
        assert_eq!(raised[0].payload()["count"], 2);
        assert_eq!(raised[0].propagation().trace_id(), Some("t-1"));

        // 再次取走应为空
        assert!(basket.take_raised().is_empty());
    }

    #[test]
    fn ack_collects_topic_and_identity() {
        let mut basket = RaisedEvents::new();
        let ev = GoodsShipped {
            order_id: "o-2".into(),
            count: 1,
        };
        basket.ack(&ev);
        basket.ack_identity("ShopGoods:Shipped", "o-3");

        let acked = basket.take_acked();
        assert_eq!(acked.len(), 2);
        assert_eq!(acked[0], Acknowledgement::new("ShopGoods:Shipped", "o-2"));
        assert_eq!(acked[1].identity(), "o-3");
        assert!(basket.is_empty());
    }
}
