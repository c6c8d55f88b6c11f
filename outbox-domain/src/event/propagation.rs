use bon::Builder;
use serde::{Deserialize, Serialize};

/// 请求级传播元数据
///
/// 在事件被抛出时从请求上下文捕获，随事件暂存并最终作为 broker
/// 消息头下发，用于下游链路关联。
#[derive(Builder, Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationContext {
    /// 链路追踪ID
    trace_id: Option<String>,
    /// 关联ID
    correlation_id: Option<String>,
    /// 发起方服务名
    service_name: Option<String>,
}

impl PropagationContext {
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// 转换为消息头键值对，空字段不产出
    pub fn to_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(3);
        if let Some(v) = self.trace_id() {
            headers.push(("trace-id".to_string(), v.to_string()));
        }
        if let Some(v) = self.correlation_id() {
            headers.push(("correlation-id".to_string(), v.to_string()));
        }
        if let Some(v) = self.service_name() {
            headers.push(("service-name".to_string(), v.to_string()));
        }
        headers
    }
}
