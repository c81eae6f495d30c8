//! Kafka 消费管道
//!
//! 按 topic 把消息路由到注册表中的处理器：
//! - 未注册的 topic：记录日志后忽略
//! - 解码失败：直接转入死信队列
//! - 存储失败：按重试策略退避重试，耗尽后转入死信队列
//!
//! 以上三种情况都视为消息已结清，位点照常存储；只有死信队列本身不可用时
//! 才会中止消费循环，保证消息不被静默丢弃。

use std::sync::Arc;
use std::time::Instant;

use pricing_shared::config::AppConfig;
use pricing_shared::dlq::{DeadLetterMessage, DeadLetterSink};
use pricing_shared::error::ServiceError;
use pricing_shared::kafka::{ConsumerMessage, KafkaConsumer};
use pricing_shared::observability::{metrics, tracing as otel};
use pricing_shared::retry::{RetryPolicy, retry_with_policy};
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::CacheSyncError;
use crate::handler::HandlerRegistry;

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// 缓存已更新
    Applied,
    /// 没有处理器负责该 topic
    Ignored,
    /// 已转入死信队列
    DeadLettered,
}

impl MessageOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Ignored => "ignored",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

/// 消息处理管道：路由、重试、死信
///
/// 与 Kafka 客户端解耦，单元测试可以直接构造 [`ConsumerMessage`] 调用。
pub struct CacheSyncPipeline {
    registry: Arc<HandlerRegistry>,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry_policy: RetryPolicy,
    service_name: String,
}

impl CacheSyncPipeline {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        dead_letters: Arc<dyn DeadLetterSink>,
        retry_policy: RetryPolicy,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            dead_letters,
            retry_policy,
            service_name: service_name.into(),
        }
    }

    /// 处理单条消息
    ///
    /// 返回 `Err` 仅表示死信投递失败，调用方不应存储该消息的位点。
    pub async fn handle_message(
        &self,
        msg: &ConsumerMessage,
    ) -> Result<MessageOutcome, ServiceError> {
        let span = info_span!(
            "cache_update",
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset
        );
        otel::set_parent_from_headers(&span, &msg.headers);

        async {
            let start = Instant::now();
            let outcome = self.dispatch(msg).await?;
            metrics::record_cache_update(
                &msg.topic,
                outcome.as_label(),
                start.elapsed().as_secs_f64(),
            );
            Ok::<_, ServiceError>(outcome)
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, msg: &ConsumerMessage) -> Result<MessageOutcome, ServiceError> {
        let Some(handler) = self.registry.get(&msg.topic) else {
            warn!(topic = %msg.topic, "没有为该 topic 注册处理器，忽略消息");
            return Ok(MessageOutcome::Ignored);
        };

        let mut attempts: u32 = 0;
        let result = retry_with_policy(
            &self.retry_policy,
            "cache_update",
            CacheSyncError::is_retryable,
            || {
                attempts += 1;
                handler.handle(&msg.payload)
            },
        )
        .await;

        match result {
            Ok(()) => {
                debug!(attempts, "缓存更新完成");
                Ok(MessageOutcome::Applied)
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), attempts, "缓存更新失败，转入死信队列");
                let dead_letter = DeadLetterMessage::from_consumer_message(
                    msg,
                    e.kind(),
                    &e.to_string(),
                    attempts,
                    &self.service_name,
                );
                self.dead_letters.send_to_dlq(&dead_letter).await?;
                Ok(MessageOutcome::DeadLettered)
            }
        }
    }
}

/// 价格缓存消费者
///
/// 组合 KafkaConsumer（消息拉取）和 CacheSyncPipeline（路由与容错）。
pub struct CacheSyncConsumer {
    consumer: KafkaConsumer,
    pipeline: CacheSyncPipeline,
}

impl CacheSyncConsumer {
    pub fn new(config: &AppConfig, pipeline: CacheSyncPipeline) -> Self {
        Self {
            consumer: KafkaConsumer::new(&config.kafka, Some("price-cache")),
            pipeline,
        }
    }

    /// 连接、订阅并运行消费循环，直到收到关闭信号或出现致命错误
    ///
    /// 无论以何种方式退出，消费者都会回到 Disconnected 状态。
    pub async fn run(
        self,
        topics: &[String],
        from_beginning: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), CacheSyncError> {
        let Self {
            mut consumer,
            pipeline,
        } = self;

        for topic in topics {
            if !pipeline.registry.contains(topic) {
                warn!(topic = %topic, "订阅的 topic 没有对应处理器，其消息将被忽略");
            }
        }

        consumer.connect().await?;
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs, from_beginning)?;

        info!(?topics, from_beginning, "价格缓存消费者已启动");

        let pipeline = &pipeline;
        consumer
            .run(shutdown, |msg| async move {
                pipeline.handle_message(&msg).await.map(|_| ())
            })
            .await?;

        info!("价格缓存消费者已停止");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToppingPriceEntry;
    use crate::repository::{InMemoryPriceCache, MockToppingCacheRepositoryTrait};
    use crate::handler::ToppingUpdateHandler;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<DeadLetterMessage>>,
    }

    #[async_trait]
    impl DeadLetterSink for RecordingSink {
        async fn send_to_dlq(&self, message: &DeadLetterMessage) -> Result<(), ServiceError> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl DeadLetterSink for BrokenSink {
        async fn send_to_dlq(&self, _message: &DeadLetterMessage) -> Result<(), ServiceError> {
            Err(ServiceError::Kafka("broker 不可达".to_string()))
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    fn message(topic: &str, payload: &[u8]) -> ConsumerMessage {
        ConsumerMessage {
            topic: topic.to_string(),
            partition: 0,
            offset: 7,
            key: None,
            payload: payload.to_vec(),
            timestamp: None,
            headers: HashMap::new(),
        }
    }

    fn pipeline_with(
        registry: HandlerRegistry,
        sink: Arc<dyn DeadLetterSink>,
    ) -> CacheSyncPipeline {
        CacheSyncPipeline::new(Arc::new(registry), sink, fast_policy(), "price-cache-sync")
    }

    #[tokio::test]
    async fn test_applies_topping_update() {
        let cache = Arc::new(InMemoryPriceCache::new());
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(
            HandlerRegistry::with_repositories(cache.clone(), cache.clone()),
            sink.clone(),
        );

        let outcome = pipeline
            .handle_message(&message("topping", br#"{"data":{"id":"t-1","price":50}}"#))
            .await
            .unwrap();

        assert_eq!(outcome, MessageOutcome::Applied);
        assert_eq!(
            cache.topping("t-1"),
            Some(ToppingPriceEntry {
                topping_id: "t-1".to_string(),
                price: 50
            })
        );
        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_topic_is_ignored() {
        let cache = Arc::new(InMemoryPriceCache::new());
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(
            HandlerRegistry::with_repositories(cache.clone(), cache.clone()),
            sink.clone(),
        );

        let outcome = pipeline
            .handle_message(&message("inventory", b"{}"))
            .await
            .unwrap();

        assert_eq!(outcome, MessageOutcome::Ignored);
        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decode_error_goes_to_dlq_without_retry() {
        let cache = Arc::new(InMemoryPriceCache::new());
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(
            HandlerRegistry::with_repositories(cache.clone(), cache.clone()),
            sink.clone(),
        );

        let outcome = pipeline
            .handle_message(&message("product", b"{broken"))
            .await
            .unwrap();

        assert_eq!(outcome, MessageOutcome::DeadLettered);
        let dead = sink.messages.lock().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].error_kind, "DECODE_ERROR");
        assert_eq!(dead[0].attempts, 1);
        assert_eq!(dead[0].message_id, "product-0-7");
        assert_eq!(cache.product_count(), 0);
    }

    #[tokio::test]
    async fn test_store_error_retried_then_dead_lettered() {
        let mut repo = MockToppingCacheRepositoryTrait::new();
        repo.expect_upsert()
            .times(3)
            .returning(|_| Err(ServiceError::Database(sqlx::Error::PoolTimedOut)));

        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(ToppingUpdateHandler::new(Arc::new(repo))));
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(registry, sink.clone());

        let outcome = pipeline
            .handle_message(&message("topping", br#"{"data":{"id":"t-1","price":50}}"#))
            .await
            .unwrap();

        assert_eq!(outcome, MessageOutcome::DeadLettered);
        let dead = sink.messages.lock().unwrap();
        assert_eq!(dead[0].error_kind, "STORE_ERROR");
        // 首次执行 + 2 次重试
        assert_eq!(dead[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_store_recovers_within_retry_budget() {
        let mut repo = MockToppingCacheRepositoryTrait::new();
        let mut calls = 0;
        repo.expect_upsert().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(ServiceError::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok(())
            }
        });

        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(ToppingUpdateHandler::new(Arc::new(repo))));
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(registry, sink.clone());

        let outcome = pipeline
            .handle_message(&message("topping", br#"{"data":{"id":"t-1","price":50}}"#))
            .await
            .unwrap();

        assert_eq!(outcome, MessageOutcome::Applied);
        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dlq_failure_is_propagated() {
        let cache = Arc::new(InMemoryPriceCache::new());
        let pipeline = pipeline_with(
            HandlerRegistry::with_repositories(cache.clone(), cache),
            Arc::new(BrokenSink),
        );

        let result = pipeline
            .handle_message(&message("product", b"not json"))
            .await;

        assert!(matches!(result, Err(ServiceError::Kafka(_))));
    }
}
