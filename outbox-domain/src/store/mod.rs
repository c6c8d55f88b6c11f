//! Outbox 存储（store）
//!
//! 定义 Outbox 的行模型与存储协议，支持：
//! - 事务作用域内的写入/删除（`StoreSession`），与业务状态同生共死；
//! - 池侧操作（`OutboxStore`）：确认删除、候选行查询、重试数自增；
//! - 内存实现（`InMemoryOutboxStore`，测试/示例/单进程场景）；
//! - Postgres 实现（`store-postgres` 特性，按月分表）。
//!
//! 该模块聚焦协议与装配逻辑，具体存储后端由特性开关提供实现并注入。
//!
mod memory;
#[cfg(feature = "store-postgres")]
mod postgres;
mod record;

pub use memory::{InMemoryOutboxStore, InMemorySession};
#[cfg(feature = "store-postgres")]
pub use postgres::{PgOutboxStore, PgStoreSession};
pub use record::{NewRecord, OutboxRecord, RecordKind};

use crate::error::OutboxResult;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};

/// 一次事务作用域内的 Outbox 写入口
///
/// 插入失败应向上传播并使调用方的整个事务失败；`commit`/`rollback`
/// 消费会话，提交或丢弃其中的全部变更。
#[async_trait]
pub trait StoreSession: Send {
    /// 在事务内插入一条记录；`(topic, identity)` 冲突返回
    /// `OutboxError::DuplicateRecord`
    async fn insert(&mut self, kind: RecordKind, record: NewRecord) -> OutboxResult<()>;

    /// 在事务内按业务身份删除一条记录（幂等，不存在时为 no-op）
    async fn delete(&mut self, kind: RecordKind, topic: &str, identity: &str) -> OutboxResult<()>;

    async fn commit(self: Box<Self>) -> OutboxResult<()>;

    async fn rollback(self: Box<Self>) -> OutboxResult<()>;
}

/// Outbox 存储协议（池侧操作 + 开启事务会话）
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// 开启一个事务作用域
    async fn begin(&self) -> OutboxResult<Box<dyn StoreSession>>;

    /// 按业务身份删除（发布确认后的尽力删除；幂等）
    async fn delete(&self, kind: RecordKind, topic: &str, identity: &str) -> OutboxResult<()>;

    /// 查询候选行：`retries < max_retries` 且 `created < older_than`，
    /// 按 `sequence` 升序，至多 `limit` 条
    async fn fetch_retryable(
        &self,
        kind: RecordKind,
        max_retries: i32,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> OutboxResult<Vec<OutboxRecord>>;

    /// 行级自增重试数并刷新 `updated`，返回自增后的值
    async fn bump_retries(&self, kind: RecordKind, topic: &str, identity: &str)
    -> OutboxResult<i32>;

    /// 当前行数（观测用）
    async fn count(&self, kind: RecordKind) -> OutboxResult<u64>;
}

/// 按月分表的时间段后缀（`YYYYMM`）
pub fn partition_suffix(at: DateTime<Utc>) -> String {
    format!("{:04}{:02}", at.year(), at.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn partition_suffix_is_calendar_month() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 10, 0, 0).unwrap();
        assert_eq!(partition_suffix(at), "202403");

        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(partition_suffix(at), "202412");
    }

    #[test]
    fn record_kind_table_tags() {
        assert_eq!(RecordKind::Publish.table_tag(), "pub");
        assert_eq!(RecordKind::Consume.table_tag(), "sub");
    }
}
