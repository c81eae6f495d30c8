//! 订单仓储

use async_trait::async_trait;
use pricing_shared::error::Result;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use super::traits::OrderRepositoryTrait;
use crate::models::Order;

pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepositoryTrait for OrderRepository {
    #[instrument(skip(self, order), fields(order_id = %order.id, tenant_id = %order.tenant_id))]
    async fn create(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, cart, customer_id, tenant_id, address, comment,
                payment_mode, order_status, payment_status,
                total, discount, taxes, delivery_charges, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id)
        .bind(Json(&order.cart))
        .bind(&order.customer_id)
        .bind(&order.tenant_id)
        .bind(&order.address)
        .bind(&order.comment)
        .bind(order.payment_mode)
        .bind(order.order_status)
        .bind(order.payment_status)
        .bind(order.total)
        .bind(order.discount)
        .bind(order.taxes)
        .bind(order.delivery_charges)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
