//! 订单服务错误类型
//!
//! 计价失败时订单一律被拒绝，不会以错误的金额落库。

use pricing_shared::error::ServiceError;
use thiserror::Error;

/// 订单计价错误
#[derive(Debug, Error)]
pub enum PricingError {
    /// 商品不在价格缓存中，通常是 catalog 事件尚未同步到位
    #[error("商品价格缓存未命中: product_id={product_id}")]
    CacheMiss { product_id: String },

    /// 购物车选择的配置项在缓存的价格配置中不存在
    #[error("商品配置与价格配置不匹配: product_id={product_id}, option={option}, value={value:?}")]
    ConfigurationMismatch {
        product_id: String,
        option: String,
        /// 选项名本身不存在时为 None
        value: Option<String>,
    },

    #[error("购物车不合法: {0}")]
    InvalidCart(String),

    #[error(transparent)]
    Shared(#[from] ServiceError),
}

/// 订单服务 Result 类型别名
pub type Result<T> = std::result::Result<T, PricingError>;

impl PricingError {
    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CacheMiss { .. } => "PRODUCT_CACHE_MISS",
            Self::ConfigurationMismatch { .. } => "CONFIGURATION_MISMATCH",
            Self::InvalidCart(_) => "INVALID_CART",
            Self::Shared(e) => e.code(),
        }
    }

    /// 是否为调用方可修正的错误（对应 4xx）
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::CacheMiss { .. } | Self::ConfigurationMismatch { .. } | Self::InvalidCart(_) => {
                true
            }
            Self::Shared(e) => matches!(e, ServiceError::Validation(_)),
        }
    }
}

impl From<validator::ValidationErrors> for PricingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidCart(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = PricingError::CacheMiss {
            product_id: "p-1".to_string(),
        };
        assert_eq!(err.error_code(), "PRODUCT_CACHE_MISS");
        assert_eq!(
            PricingError::Shared(ServiceError::Database(sqlx::Error::PoolTimedOut)).error_code(),
            "DATABASE_ERROR"
        );
    }

    #[test]
    fn test_is_client_error() {
        assert!(
            PricingError::CacheMiss {
                product_id: "p-1".to_string()
            }
            .is_client_error()
        );
        assert!(
            PricingError::ConfigurationMismatch {
                product_id: "p-1".to_string(),
                option: "Size".to_string(),
                value: Some("Huge".to_string()),
            }
            .is_client_error()
        );
        assert!(!PricingError::Shared(ServiceError::Internal("x".to_string())).is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = PricingError::ConfigurationMismatch {
            product_id: "p-1".to_string(),
            option: "Crust".to_string(),
            value: None,
        };
        assert!(err.to_string().contains("Crust"));
        assert!(err.to_string().contains("None"));
    }
}
