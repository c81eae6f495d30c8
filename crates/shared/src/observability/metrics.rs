//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
///
/// Drop 时终止指标 HTTP 服务器任务
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册通用指标描述，出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "price_cache_updates_total",
        "Total number of price cache update messages by topic and outcome"
    );
    metrics::describe_histogram!(
        "price_cache_update_duration_seconds",
        "Price cache update handling duration in seconds"
    );
    metrics::describe_counter!(
        "dead_letter_messages_total",
        "Total number of messages forwarded to the dead letter topic"
    );
    metrics::describe_counter!(
        "pricing_calculations_total",
        "Total number of order price calculations by status"
    );
    metrics::describe_counter!(
        "pricing_topping_fallback_total",
        "Toppings priced from the cart because no cache entry existed"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一条价格缓存更新消息的处理结果
#[inline]
pub fn record_cache_update(topic: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "price_cache_updates_total",
        "topic" => topic.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "price_cache_update_duration_seconds",
        "topic" => topic.to_string()
    )
    .record(duration_secs);
}

/// 记录进入死信队列的消息
#[inline]
pub fn record_dead_letter(source_topic: &str) {
    metrics::counter!(
        "dead_letter_messages_total",
        "topic" => source_topic.to_string()
    )
    .increment(1);
}

/// 记录一次订单计价
#[inline]
pub fn record_pricing_calculation(status: &str) {
    metrics::counter!(
        "pricing_calculations_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录使用购物车回退价格的配料数量
#[inline]
pub fn record_topping_fallback(count: u64) {
    metrics::counter!("pricing_topping_fallback_total").increment(count);
}
