//! 统一错误处理模块
//!
//! 定义系统中所有共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum ServiceError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    // ==================== Kafka 错误 ====================
    /// 连接、订阅、收发消息失败，对当前操作是致命的，由调用方决定重试或告警
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    /// 在错误的生命周期状态下调用了消费者/生产者的方法
    #[error("非法的状态转换: {operation} 不允许在 {state} 状态下执行")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    // ==================== 序列化错误 ====================
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 数据库 I/O 属于瞬时故障；Kafka 传输错误由 broker 客户端自行恢复，
    /// 本层不重试，直接交给上层处理。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
