//! 领域层统一错误定义
//!
//! 聚焦注册、序列化、存储与投递等最小必要集合，
//! 便于在各实现层统一转换为 `OutboxError`。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OutboxError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 注册表（启动期，调用方应视为致命） ---
    #[error("empty topic is not allowed")]
    EmptyTopic,
    #[error("topic already registered: {topic}")]
    DuplicateTopic { topic: String },
    #[error("topic not registered: {topic}")]
    UnknownTopic { topic: String },

    // --- Outbox 存储 ---
    #[error("duplicate record: topic={topic}, identity={identity}")]
    DuplicateRecord { topic: String, identity: String },
    #[error("record not found: topic={topic}, identity={identity}")]
    RecordNotFound { topic: String, identity: String },
    #[error("store error: {reason}")]
    Store { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },

    // --- 投递/重放 ---
    #[error("broker error: {reason}")]
    Broker { reason: String },
    #[error("replay failed: topic={topic}, reason={reason}")]
    ReplayFailed { topic: String, reason: String },

    // --- 单元工作（Unit of Work） ---
    #[error("unit of work already finished")]
    UnitOfWorkFinished,
}

impl OutboxError {
    pub fn store(reason: impl Into<String>) -> Self {
        OutboxError::Store {
            reason: reason.into(),
        }
    }

    pub fn broker(reason: impl Into<String>) -> Self {
        OutboxError::Broker {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type OutboxResult<T> = Result<T, OutboxError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx 错误转换为 OutboxError

#[cfg(feature = "store-postgres")]
impl From<sqlx::Error> for OutboxError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => OutboxError::store("row not found"),
            other => OutboxError::Database {
                reason: other.to_string(),
            },
        }
    }
}
