//! 商品价格缓存仓储

use async_trait::async_trait;
use pricing_shared::error::Result;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use super::traits::ProductCacheRepositoryTrait;
use crate::models::{PriceConfiguration, ProductPriceEntry};

/// 基于 `product_price_cache` 表的仓储
pub struct ProductCacheRepository {
    pool: PgPool,
}

impl ProductCacheRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductCacheRepositoryTrait for ProductCacheRepository {
    #[instrument(skip(self, entry), fields(product_id = %entry.product_id))]
    async fn upsert(&self, entry: &ProductPriceEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_price_cache (product_id, price_configuration, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (product_id) DO UPDATE
            SET price_configuration = EXCLUDED.price_configuration,
                updated_at = NOW()
            "#,
        )
        .bind(&entry.product_id)
        .bind(Json(&entry.price_configuration))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(count = product_ids.len()))]
    async fn find_by_ids(&self, product_ids: &[String]) -> Result<Vec<ProductPriceEntry>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, (String, Json<PriceConfiguration>)>(
            r#"
            SELECT product_id, price_configuration
            FROM product_price_cache
            WHERE product_id = ANY($1)
            "#,
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(product_id, Json(price_configuration))| ProductPriceEntry {
                product_id,
                price_configuration,
            })
            .collect())
    }
}
