//! 订单服务仓储层

mod coupon_repo;
mod order_repo;
mod traits;

pub use coupon_repo::CouponRepository;
pub use order_repo::OrderRepository;
pub use traits::*;
