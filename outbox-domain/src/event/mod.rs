//! 领域事件（Outbox Event）与事件集合
//!
//! 定义事件载荷需要实现的最小接口（`OutboxEvent`）、随事件传播的请求级
//! 元数据（`PropagationContext`）、暂存形态（`PendingEvent`）以及聚合内
//! 待发布/待确认事件的集合类型 `RaisedEvents`。

mod outbox_event;
mod pending;
mod propagation;
mod raised;

pub use outbox_event::OutboxEvent;
pub use pending::PendingEvent;
pub use propagation::PropagationContext;
pub use raised::{Acknowledgement, RaisedEvents};
