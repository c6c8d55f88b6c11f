use outbox_domain::event::PropagationContext;

/// 应用层上下文（Application Context）
///
/// 承载一次应用层调用（请求/事务）所需的横切信息，例如：
/// - 传播元数据（`PropagationContext`）：链路追踪 `trace_id`、关联
///   `correlation_id`、发起方服务名，事件抛出时随之捕获并最终成为
///   broker 消息头；
/// - 幂等键（`idempotency_key`）：用于在基础设施层实现请求幂等
///   （如 API 层重复提交保护）。
///
/// 典型用法：
/// ```rust
/// use outbox_application::context::AppContext;
/// use outbox_domain::event::PropagationContext;
///
/// let ctx = AppContext {
///     propagation: PropagationContext::builder()
///         .maybe_trace_id(Some("trace-123".into()))
///         .maybe_correlation_id(Some("cor-abc".into()))
///         .maybe_service_name(Some("shop".into()))
///         .build(),
///     idempotency_key: Some("idem-xyz".into()),
/// };
/// assert_eq!(ctx.propagation.service_name(), Some("shop"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    /// 传播元数据（链路追踪、发起方）
    pub propagation: PropagationContext,
    /// 幂等键（可选）：为空则由上层或基础设施决定是否参与幂等
    pub idempotency_key: Option<String>,
}
