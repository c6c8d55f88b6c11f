//! 重试策略配置
//!
use std::time::Duration;

/// 重试扫描三项可调参数 + 单轮批量上限，进程启动期设定
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    /// 首次重试前的宽限时长（避免与同步发布的正常路径竞争）
    pub grace: Duration,
    /// 扫描周期
    pub scan_interval: Duration,
    /// 最大重试次数（达到后不再入选扫描）
    pub max_retries: i32,
    /// 单轮扫描的行数上限（限定每轮工作量）
    pub batch_size: usize,
    /// 单行重放发布的超时上限（悬挂的 broker 不得拖住整轮扫描）
    pub replay_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            scan_interval: Duration::from_secs(30),
            max_retries: 3,
            batch_size: 200,
            replay_timeout: Duration::from_secs(10),
        }
    }
}
