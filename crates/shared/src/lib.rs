//! 共享库
//!
//! 包含价格缓存同步服务与订单服务共用的配置、错误处理、数据库连接、
//! Kafka、重试、死信队列与可观测性等基础设施代码。

pub mod config;
pub mod database;
pub mod dlq;
pub mod error;
pub mod kafka;
pub mod observability;
pub mod retry;
