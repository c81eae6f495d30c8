//! 仓储 Trait 定义

use async_trait::async_trait;
use pricing_shared::error::Result;

use crate::models::{Coupon, Order};

/// 优惠券仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponRepositoryTrait: Send + Sync {
    /// 按 (code, tenant_id) 查找，不存在返回 None
    async fn find_one(&self, code: &str, tenant_id: &str) -> Result<Option<Coupon>>;
}

/// 订单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepositoryTrait: Send + Sync {
    async fn create(&self, order: &Order) -> Result<()>;
}
