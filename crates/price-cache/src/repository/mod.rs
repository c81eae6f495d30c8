//! 价格缓存仓储层
//!
//! 缓存条目只会被整体替换，不提供删除。
//! PostgreSQL 实现用于生产，内存实现用于测试和无数据库的独立运行。

mod memory;
mod product_cache_repo;
mod topping_cache_repo;
mod traits;

pub use memory::InMemoryPriceCache;
pub use product_cache_repo::ProductCacheRepository;
pub use topping_cache_repo::ToppingCacheRepository;
pub use traits::*;
