//! 价格缓存同步服务
//!
//! 消费 catalog 的商品/配料变更事件，维护本地价格缓存表。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pricing_shared::{
    config::AppConfig,
    database::Database,
    dlq::DlqProducer,
    kafka::KafkaProducer,
    observability,
};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use price_cache::{
    consumer::{CacheSyncConsumer, CacheSyncPipeline},
    handler::HandlerRegistry,
    repository::{ProductCacheRepository, ToppingCacheRepository},
};

const SERVICE_NAME: &str = "price-cache-sync";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // 1. 加载配置：config/default.toml -> config/{env}.toml -> config/price-cache-sync.toml -> 环境变量
    let config = AppConfig::load(SERVICE_NAME)?;

    // 2. 可观测性（服务名已在加载配置时注入）
    let _guard = observability::init(&config.observability).await?;

    info!(environment = %config.environment, "Starting price-cache-sync...");

    // 3. 数据库
    let db = Database::connect(&config.database).await?;
    db.run_migrations().await?;
    let pool = db.pool().clone();

    // 4. 仓储与处理器注册表
    let registry = Arc::new(HandlerRegistry::with_repositories(
        Arc::new(ProductCacheRepository::new(pool.clone())),
        Arc::new(ToppingCacheRepository::new(pool)),
    ));

    // 5. 死信生产者
    let producer = KafkaProducer::connect(&config.kafka)?;
    let dead_letters = Arc::new(DlqProducer::new(producer.clone()));

    let pipeline = CacheSyncPipeline::new(
        registry,
        dead_letters,
        config.cache_sync.retry_policy(),
        config.service_name.clone(),
    );
    let consumer = CacheSyncConsumer::new(&config, pipeline);

    // 6. 关闭信号
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let outcome = consumer
        .run(
            &config.cache_sync.topics,
            config.cache_sync.from_beginning,
            shutdown_rx,
        )
        .await;

    // 7. 无论正常关闭还是出错都要刷新生产者、关闭连接池
    if let Err(e) = producer.disconnect(Duration::from_secs(5)) {
        warn!(error = %e, "刷新 Kafka 生产者失败");
    }
    db.close().await;

    match outcome {
        Ok(()) => {
            info!("Service shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "价格缓存消费者异常退出");
            Err(e.into())
        }
    }
}

/// 监听 Ctrl+C 和 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
