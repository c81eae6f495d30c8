//! 订单服务
//!
//! 下单时基于本地价格缓存重新计算订单金额（商品、配料、优惠券、税费、配送费），
//! 不信任客户端提交的价格，计算结果随订单一起持久化。

pub mod error;
pub mod models;
pub mod pricing;
pub mod repository;
pub mod service;

pub use error::{PricingError, Result};
pub use pricing::{PriceBreakdown, PricingEngine, ToppingFallback, round_half_up};
pub use service::OrderService;
