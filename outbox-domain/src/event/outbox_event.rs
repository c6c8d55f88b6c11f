use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// Outbox 事件载荷需要满足的通用能力边界
pub trait OutboxEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 事件主题，约定形如 `<AggregateName>:<ActionName>`，
    /// 同时作为注册表键与 broker 的路由键
    const TOPIC: &'static str;

    /// 业务唯一键（同一 `(topic, identity)` 在 Outbox 中唯一）
    fn identity(&self) -> &str;
}
