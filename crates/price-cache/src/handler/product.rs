//! 商品价格更新处理器

use std::sync::Arc;

use async_trait::async_trait;
use pricing_shared::kafka::topics;
use tracing::debug;

use super::{CacheUpdateHandler, require_id};
use crate::error::CacheSyncError;
use crate::models::{ProductMessage, ProductPriceEntry};
use crate::repository::ProductCacheRepositoryTrait;

/// 处理 `product` topic：整体替换商品的价格配置
pub struct ProductUpdateHandler {
    repo: Arc<dyn ProductCacheRepositoryTrait>,
}

impl ProductUpdateHandler {
    pub fn new(repo: Arc<dyn ProductCacheRepositoryTrait>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CacheUpdateHandler for ProductUpdateHandler {
    fn topic(&self) -> &str {
        topics::PRODUCT
    }

    async fn handle(&self, payload: &[u8]) -> Result<(), CacheSyncError> {
        let message: ProductMessage = serde_json::from_slice(payload)?;
        require_id(&message.data.id)?;

        let entry = ProductPriceEntry::from(message.data);
        self.repo
            .upsert(&entry)
            .await
            .map_err(CacheSyncError::Store)?;

        debug!(
            product_id = %entry.product_id,
            options = entry.price_configuration.len(),
            "商品价格缓存已更新"
        );
        Ok(())
    }
}
