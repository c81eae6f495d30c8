//! 订单实体与下单请求

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::cart::CartItem;

/// 订单状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum OrderStatus {
    /// 已接单，新订单的初始状态
    #[default]
    Received,
    Confirmed,
    Prepared,
    OutForDelivery,
    Delivered,
}

/// 支付状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

/// 支付方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum PaymentMode {
    Card,
    Cash,
}

/// 下单请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "购物车不能为空"))]
    #[validate(nested)]
    pub cart: Vec<CartItem>,
    pub coupon_code: Option<String>,
    #[validate(length(min = 1, message = "租户 ID 不能为空"))]
    pub tenant_id: String,
    pub payment_mode: PaymentMode,
    #[validate(length(min = 1, message = "客户 ID 不能为空"))]
    pub customer_id: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[validate(length(min = 1, message = "配送地址不能为空"))]
    pub address: String,
}

/// 已创建的订单，金额字段均为服务端计算结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub cart: Vec<CartItem>,
    pub customer_id: String,
    pub tenant_id: String,
    pub address: String,
    pub comment: Option<String>,
    pub payment_mode: PaymentMode,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: i64,
    pub discount: i64,
    pub taxes: i64,
    pub delivery_charges: i64,
    pub created_at: DateTime<Utc>,
}
