//! 配料价格缓存仓储

use async_trait::async_trait;
use pricing_shared::error::Result;
use sqlx::PgPool;
use tracing::instrument;

use super::traits::ToppingCacheRepositoryTrait;
use crate::models::ToppingPriceEntry;

/// 基于 `topping_price_cache` 表的仓储
pub struct ToppingCacheRepository {
    pool: PgPool,
}

impl ToppingCacheRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ToppingCacheRepositoryTrait for ToppingCacheRepository {
    #[instrument(skip(self, entry), fields(topping_id = %entry.topping_id))]
    async fn upsert(&self, entry: &ToppingPriceEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO topping_price_cache (topping_id, price, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (topping_id) DO UPDATE
            SET price = EXCLUDED.price,
                updated_at = NOW()
            "#,
        )
        .bind(&entry.topping_id)
        .bind(entry.price)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(count = topping_ids.len()))]
    async fn find_by_ids(&self, topping_ids: &[String]) -> Result<Vec<ToppingPriceEntry>> {
        if topping_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT topping_id, price
            FROM topping_price_cache
            WHERE topping_id = ANY($1)
            "#,
        )
        .bind(topping_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(topping_id, price)| ToppingPriceEntry { topping_id, price })
            .collect())
    }
}
