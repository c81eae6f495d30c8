//! 配料价格更新处理器

use std::sync::Arc;

use async_trait::async_trait;
use pricing_shared::kafka::topics;
use tracing::debug;

use super::{CacheUpdateHandler, require_id};
use crate::error::CacheSyncError;
use crate::models::{ToppingMessage, ToppingPriceEntry};
use crate::repository::ToppingCacheRepositoryTrait;

/// 处理 `topping` topic：替换配料单价
pub struct ToppingUpdateHandler {
    repo: Arc<dyn ToppingCacheRepositoryTrait>,
}

impl ToppingUpdateHandler {
    pub fn new(repo: Arc<dyn ToppingCacheRepositoryTrait>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CacheUpdateHandler for ToppingUpdateHandler {
    fn topic(&self) -> &str {
        topics::TOPPING
    }

    async fn handle(&self, payload: &[u8]) -> Result<(), CacheSyncError> {
        let message: ToppingMessage = serde_json::from_slice(payload)?;
        require_id(&message.data.id)?;
        if message.data.price < 0 {
            return Err(CacheSyncError::Decode(format!(
                "配料 {} 的价格不能为负数: {}",
                message.data.id, message.data.price
            )));
        }

        let entry = ToppingPriceEntry::from(message.data);
        self.repo
            .upsert(&entry)
            .await
            .map_err(CacheSyncError::Store)?;

        debug!(topping_id = %entry.topping_id, price = entry.price, "配料价格缓存已更新");
        Ok(())
    }
}
