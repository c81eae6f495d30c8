//! 优惠券仓储

use async_trait::async_trait;
use pricing_shared::error::Result;
use sqlx::PgPool;
use tracing::instrument;

use super::traits::CouponRepositoryTrait;
use crate::models::Coupon;

pub struct CouponRepository {
    pool: PgPool,
}

impl CouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponRepositoryTrait for CouponRepository {
    #[instrument(skip(self))]
    async fn find_one(&self, code: &str, tenant_id: &str) -> Result<Option<Coupon>> {
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT id, code, tenant_id, discount, valid_upto
            FROM coupons
            WHERE code = $1 AND tenant_id = $2
            "#,
        )
        .bind(code)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(coupon)
    }
}
