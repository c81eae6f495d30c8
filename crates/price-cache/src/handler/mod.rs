//! 缓存更新处理器
//!
//! 每个 topic 对应一个处理器，负责把 catalog 变更事件转换为一次缓存 upsert。
//! 处理器之间互不依赖，新增领域只需实现 [`CacheUpdateHandler`] 并注册，
//! 消费循环本身无需改动。

mod product;
mod registry;
mod topping;

use async_trait::async_trait;

use crate::error::CacheSyncError;

pub use product::ProductUpdateHandler;
pub use registry::HandlerRegistry;
pub use topping::ToppingUpdateHandler;

/// 缓存更新处理器 Trait
///
/// - 负载格式错误返回 [`CacheSyncError::Decode`]，不得 panic
/// - 存储失败返回 [`CacheSyncError::Store`]，由调用方决定是否重试
/// - 同一负载重复处理结果不变
#[async_trait]
pub trait CacheUpdateHandler: Send + Sync {
    /// 此处理器负责的 topic
    fn topic(&self) -> &str;

    /// 处理一条原始消息负载
    async fn handle(&self, payload: &[u8]) -> Result<(), CacheSyncError>;
}

/// 校验消息中的实体 id 非空
fn require_id(id: &str) -> Result<(), CacheSyncError> {
    if id.trim().is_empty() {
        return Err(CacheSyncError::Decode("data.id 不能为空".to_string()));
    }
    Ok(())
}
