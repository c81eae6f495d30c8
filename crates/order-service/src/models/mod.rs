//! 订单服务数据模型

mod cart;
mod coupon;
mod order;

pub use cart::{CartItem, ChosenConfiguration, SelectedTopping};
pub use coupon::Coupon;
pub use order::{CreateOrderRequest, Order, OrderStatus, PaymentMode, PaymentStatus};
