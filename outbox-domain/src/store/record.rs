//! Outbox 持久化模型（OutboxRecord）
//!
//! 定义事件在 Outbox 中的标准行形态及其插入形态。`sequence` 由存储层
//! 赋值，仅作为存储身份与 FIFO 重放顺序；业务身份是 `(topic, identity)`。
//!
use crate::error::{OutboxError, OutboxResult};
use crate::event::PendingEvent;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 记录归属的逻辑表：出站发布日志 / 入站消费日志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Publish,
    Consume,
}

impl RecordKind {
    /// 表名中的分类段（`pub` / `sub`）
    pub fn table_tag(&self) -> &'static str {
        match self {
            RecordKind::Publish => "pub",
            RecordKind::Consume => "sub",
        }
    }
}

#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// 存储层自增位点，FIFO 重放顺序
    sequence: i64,
    /// 业务唯一键（与 topic 组成唯一约束）
    identity: String,
    /// 事件主题
    topic: String,
    /// 已进行的重试次数（初始为 0）
    retries: i32,
    /// 已序列化的事件载荷
    content: Value,
    /// 创建时间（重试宽限期的锚点）
    created: DateTime<Utc>,
    /// 最近一次重试时间
    updated: DateTime<Utc>,
}

impl OutboxRecord {
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn retries(&self) -> i32 {
        self.retries
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// 行级自增重试数并刷新更新时间，返回自增后的值（存储实现使用）
    pub(crate) fn bump_retries(&mut self, now: DateTime<Utc>) -> i32 {
        self.retries += 1;
        self.updated = now;
        self.retries
    }
}

/// 插入形态：`sequence`/时间戳/重试数由存储层赋值
#[derive(Debug, Clone, Builder)]
pub struct NewRecord {
    identity: String,
    topic: String,
    content: Value,
}

impl NewRecord {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn content(&self) -> &Value {
        &self.content
    }
}

impl TryFrom<&PendingEvent> for NewRecord {
    type Error = OutboxError;

    /// 发布行的内容为封包形态（载荷 + 传播元数据），重放时还原消息头
    fn try_from(event: &PendingEvent) -> OutboxResult<Self> {
        Ok(NewRecord {
            identity: event.identity().to_string(),
            topic: event.topic().to_string(),
            content: event.stored_content()?,
        })
    }
}
