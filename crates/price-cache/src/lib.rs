//! 价格缓存同步
//!
//! 消费 catalog 服务发布的商品/配料变更事件，把最新的价格配置
//! 物化到本地缓存表，供下单计价时只读查询。
//! 缓存与上游之间只保证最终一致。

pub mod consumer;
pub mod error;
pub mod handler;
pub mod models;
pub mod repository;
