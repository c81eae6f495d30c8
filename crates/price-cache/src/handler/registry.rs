//! Handler 注册表
//!
//! 以 topic 为 key 路由到对应的缓存更新处理器。注册表在启动时构建一次，
//! 之后只读共享。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::{CacheUpdateHandler, ProductUpdateHandler, ToppingUpdateHandler};
use crate::repository::{ProductCacheRepositoryTrait, ToppingCacheRepositoryTrait};

/// topic -> 处理器
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CacheUpdateHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个处理器，同一 topic 的旧处理器会被替换
    pub fn register(&mut self, handler: Arc<dyn CacheUpdateHandler>) -> &mut Self {
        let topic = handler.topic().to_string();
        debug!(topic = %topic, "注册缓存更新处理器");
        self.handlers.insert(topic, handler);
        self
    }

    pub fn get(&self, topic: &str) -> Option<Arc<dyn CacheUpdateHandler>> {
        self.handlers.get(topic).cloned()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    /// 已注册的 topic，按字典序
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 注册商品和配料两个默认处理器
    pub fn with_repositories(
        product_repo: Arc<dyn ProductCacheRepositoryTrait>,
        topping_repo: Arc<dyn ToppingCacheRepositoryTrait>,
    ) -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(ProductUpdateHandler::new(product_repo)))
            .register(Arc::new(ToppingUpdateHandler::new(topping_repo)));

        info!(topics = ?registry.topics(), "缓存更新处理器初始化完成");
        registry
    }
}
