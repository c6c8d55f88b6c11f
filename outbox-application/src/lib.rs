//! Outbox 应用层（outbox-application）
//!
//! 在领域层之上提供应用装配与请求级横切构件：
//! - `AppContext`：一次应用层调用携带的传播元数据与幂等键；
//! - `OutboxRuntime`：显式构造、显式启停的服务实例，取代进程级
//!   单例的事件管理器；
//! - `AppError`：应用层统一错误。
//!
pub mod context;
pub mod error;
pub mod runtime;

pub use context::AppContext;
pub use error::AppError;
pub use runtime::OutboxRuntime;
