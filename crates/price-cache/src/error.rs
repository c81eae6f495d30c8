//! 价格缓存同步专用错误类型
//!
//! 区分"消息本身有问题"（解码失败，重试无意义）和"存储暂时不可用"（可退避重试）
//! 两类失败，消费管道据此决定重试还是直接转入死信队列。

use pricing_shared::error::ServiceError;

/// 缓存同步错误
#[derive(Debug, thiserror::Error)]
pub enum CacheSyncError {
    /// 负载不是合法 JSON 或缺少必填字段
    #[error("消息解码失败: {0}")]
    Decode(String),

    /// 缓存表写入失败
    #[error("缓存写入失败: {0}")]
    Store(ServiceError),

    #[error(transparent)]
    Shared(#[from] ServiceError),
}

impl CacheSyncError {
    /// 写入死信消息时使用的失败类别
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Shared(e) => e.code(),
        }
    }

    /// 仅存储层的瞬时故障值得重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for CacheSyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
