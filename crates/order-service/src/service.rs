//! 下单服务
//!
//! 校验请求 -> 计价 -> 以"已接单/待支付"状态落库。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::Result;
use crate::models::{CreateOrderRequest, Order, OrderStatus, PaymentStatus};
use crate::pricing::PricingEngine;
use crate::repository::OrderRepositoryTrait;

pub struct OrderService {
    engine: Arc<PricingEngine>,
    orders: Arc<dyn OrderRepositoryTrait>,
}

impl OrderService {
    pub fn new(engine: Arc<PricingEngine>, orders: Arc<dyn OrderRepositoryTrait>) -> Self {
        Self { engine, orders }
    }

    /// 创建订单
    ///
    /// 计价失败（缓存未命中、配置不匹配等）时不会写入任何订单。
    #[instrument(
        skip(self, request),
        fields(tenant_id = %request.tenant_id, customer_id = %request.customer_id)
    )]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order> {
        request.validate()?;

        let breakdown = self
            .engine
            .calculate(
                &request.cart,
                request.coupon_code.as_deref(),
                &request.tenant_id,
            )
            .await?;

        let order = Order {
            id: Uuid::now_v7(),
            cart: request.cart,
            customer_id: request.customer_id,
            tenant_id: request.tenant_id,
            address: request.address,
            comment: request.comment,
            payment_mode: request.payment_mode,
            order_status: OrderStatus::Received,
            payment_status: PaymentStatus::Pending,
            total: breakdown.total,
            discount: breakdown.discount,
            taxes: breakdown.taxes,
            delivery_charges: breakdown.delivery_charges,
            created_at: Utc::now(),
        };

        self.orders.create(&order).await?;

        info!(
            order_id = %order.id,
            total = order.total,
            topping_fallbacks = breakdown.topping_fallbacks.len(),
            "订单已创建"
        );
        Ok(order)
    }
}
