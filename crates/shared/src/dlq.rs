//! 死信队列
//!
//! 无法解码或重试耗尽仍写入失败的消息不会阻塞消费循环，
//! 而是附带失败原因写入死信 topic，供人工排查或后续重放。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ServiceError;
use crate::kafka::{ConsumerMessage, KafkaProducer, topics};
use crate::observability::{metrics, tracing as otel};

// ---------------------------------------------------------------------------
// DeadLetterMessage — 死信消息信封
// ---------------------------------------------------------------------------

/// 死信消息信封
///
/// 保留原始消息的来源位置和原始负载，附加失败原因和已尝试次数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    /// `{topic}-{partition}-{offset}`，在整个集群内唯一
    pub message_id: String,
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    pub key: Option<String>,
    /// 原始负载（非 UTF-8 字节按替换字符转换）
    pub payload: String,
    /// 失败类别，如 DECODE_ERROR、STORE_ERROR
    pub error_kind: String,
    pub error: String,
    /// 进入死信队列前已执行的处理次数
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
    pub source_service: String,
}

impl DeadLetterMessage {
    pub fn from_consumer_message(
        msg: &ConsumerMessage,
        error_kind: &str,
        error: &str,
        attempts: u32,
        source_service: &str,
    ) -> Self {
        Self {
            message_id: format!("{}-{}-{}", msg.topic, msg.partition, msg.offset),
            source_topic: msg.topic.clone(),
            source_partition: msg.partition,
            source_offset: msg.offset,
            key: msg.key.clone(),
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
            error_kind: error_kind.to_string(),
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
            source_service: source_service.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// DeadLetterSink — 死信写入抽象
// ---------------------------------------------------------------------------

/// 死信写入接口
///
/// 消费管道只依赖此 trait，测试中可替换为内存实现。
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send_to_dlq(&self, message: &DeadLetterMessage) -> Result<(), ServiceError>;
}

// ---------------------------------------------------------------------------
// DlqProducer — 将失败消息发送到死信队列
// ---------------------------------------------------------------------------

/// 基于 Kafka 的死信生产者
pub struct DlqProducer {
    producer: KafkaProducer,
    topic: String,
}

impl DlqProducer {
    pub fn new(producer: KafkaProducer) -> Self {
        Self {
            producer,
            topic: topics::DEAD_LETTER_QUEUE.to_string(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for DlqProducer {
    async fn send_to_dlq(&self, message: &DeadLetterMessage) -> Result<(), ServiceError> {
        let mut headers = HashMap::new();
        otel::inject_to_headers(&mut headers);

        self.producer
            .send_json(&self.topic, &message.message_id, message, &headers)
            .await?;

        metrics::record_dead_letter(&message.source_topic);
        warn!(
            message_id = %message.message_id,
            source_topic = %message.source_topic,
            error_kind = %message.error_kind,
            error = %message.error,
            "消息已发送到死信队列"
        );

        Ok(())
    }
}
