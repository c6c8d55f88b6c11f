//! 事务性 Outbox 基础库（outbox-domain）
//!
//! 解决双写问题（dual-write）的核心构件：业务状态变更与对外事件通知
//! 仅以本地事务为原子性原语，提供至少一次投递保证：
//! - 事件模型（`event`）：载荷接口、传播元数据与聚合事件集合
//! - 注册表（`registry`）：启动期构建的主题 → 类型/处理器映射
//! - 存储（`store`）：两张日志表的协议、内存与 Postgres 实现
//! - 事务内写入器（`writer`）：Outbox 行与业务状态同事务生效
//! - 提交后发布器（`publisher`）：事务提交后才异步推送 broker
//! - 重试扫描器（`scanner`）：周期重扫未决行并有界重放
//! - 单元工作（`unit_of_work`）：一次请求的显式事务 + 暂存作用域
//!
//! 本 crate 尽量保持与具体 broker 与存储实现解耦，仅定义协议与最小
//! 必要的错误类型，以便在不同基础设施（例如 Postgres、Kafka 等）上
//! 进行适配实现。
//!
//! 典型用法：
//! 1. 定义事件类型并实现 `OutboxEvent`（主题约定 `<聚合>:<动作>`）；
//! 2. 启动期用 `EventRegistryBuilder` 注册发布/消费主题并封板；
//! 3. 请求内开启 `UnitOfWork`，聚合通过 `RaisedEvents` 抛出事件，
//!    `save` 后提交；
//! 4. 启动 `RetryScanner` 兜底重放未确认的行。
//!
pub mod config;
pub mod error;
pub mod event;
pub mod registry;
pub mod store;

#[cfg(feature = "engine")]
pub mod broker;
#[cfg(feature = "engine")]
pub mod publisher;
#[cfg(feature = "engine")]
pub mod scanner;
#[cfg(feature = "engine")]
pub mod unit_of_work;
#[cfg(feature = "engine")]
pub mod writer;
