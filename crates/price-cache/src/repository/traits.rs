//! 仓储 Trait 定义
//!
//! 缓存更新处理器和计价引擎都只依赖这里的抽象。

use async_trait::async_trait;
use pricing_shared::error::Result;

use crate::models::{ProductPriceEntry, ToppingPriceEntry};

/// 商品价格缓存仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductCacheRepositoryTrait: Send + Sync {
    /// 插入或整体替换价格配置
    async fn upsert(&self, entry: &ProductPriceEntry) -> Result<()>;

    /// 批量查询，未命中的 id 直接省略；空输入不访问存储
    async fn find_by_ids(&self, product_ids: &[String]) -> Result<Vec<ProductPriceEntry>>;
}

/// 配料价格缓存仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToppingCacheRepositoryTrait: Send + Sync {
    async fn upsert(&self, entry: &ToppingPriceEntry) -> Result<()>;
    async fn find_by_ids(&self, topping_ids: &[String]) -> Result<Vec<ToppingPriceEntry>>;
}
