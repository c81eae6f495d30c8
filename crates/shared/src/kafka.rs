//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Producer/Consumer 抽象，
//! 统一消息序列化、错误映射和优雅关闭语义。
//!
//! 消费者显式维护生命周期状态：
//! `Disconnected → Connected → Subscribed → Running → Disconnected`。
//! 客户端实例由调用方创建并持有，不存在进程级的全局连接。

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::ServiceError;

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

/// 集中管理 Kafka topic 名称，防止字符串散落在各服务中导致拼写不一致
pub mod topics {
    /// catalog 服务发布的商品变更事件
    pub const PRODUCT: &str = "product";
    /// catalog 服务发布的配料变更事件
    pub const TOPPING: &str = "topping";
    pub const DEAD_LETTER_QUEUE: &str = "pricing.cache.dlq";
}

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp: msg.timestamp().to_millis(),
            headers,
        }
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer`（内部是 Arc 包装的，Clone 开销很小）。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建并连接生产者
    ///
    /// `message.timeout.ms` 设为 5 秒：超时仍无法投递时由上层决定重试或告警。
    pub fn connect(config: &KafkaConfig) -> Result<Self, ServiceError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", format!("{}-producer", config.consumer_group))
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| ServiceError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节消息，key 可选
    pub async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<(i32, i64), ServiceError> {
        let record = build_record(topic, key, payload, headers);
        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| ServiceError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key = ?key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 发送文本消息
    pub async fn send_message(
        &self,
        topic: &str,
        message: &str,
        key: Option<&str>,
    ) -> Result<(i32, i64), ServiceError> {
        self.send(topic, key, message.as_bytes(), &HashMap::new())
            .await
    }

    /// 将值序列化为 JSON 后发送
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
        headers: &HashMap<String, String>,
    ) -> Result<(i32, i64), ServiceError> {
        let payload = serde_json::to_vec(value)?;
        self.send(topic, Some(key), &payload, headers).await
    }

    /// 断开生产者：刷新所有待投递的消息
    pub fn disconnect(&self, timeout: Duration) -> Result<(), ServiceError> {
        self.producer
            .flush(timeout)
            .map_err(|e| ServiceError::Kafka(format!("刷新生产者失败: {e}")))?;
        info!("Kafka 生产者已断开");
        Ok(())
    }
}

/// 构造待发送的记录，key 为空时由分区器随机分配分区，消息头为空时不附带 headers
fn build_record<'a>(
    topic: &'a str,
    key: Option<&'a str>,
    payload: &'a [u8],
    headers: &HashMap<String, String>,
) -> FutureRecord<'a, str, [u8]> {
    let mut record = FutureRecord::<str, [u8]>::to(topic).payload(payload);
    if let Some(key) = key {
        record = record.key(key);
    }
    if !headers.is_empty() {
        let owned = headers.iter().fold(OwnedHeaders::new(), |acc, (k, v)| {
            acc.insert(Header {
                key: k.as_str(),
                value: Some(v.as_str()),
            })
        });
        record = record.headers(owned);
    }
    record
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 消费者生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connected,
    Subscribed,
    Running,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::Subscribed => "Subscribed",
            Self::Running => "Running",
        };
        write!(f, "{s}")
    }
}

/// `from_beginning` 对应的 auto.offset.reset 取值
fn offset_reset_policy(from_beginning: bool) -> &'static str {
    if from_beginning { "earliest" } else { "latest" }
}

/// 面向业务的 Kafka 消费者
///
/// 提供显式的 connect / subscribe / run / disconnect 生命周期，
/// 基于 `watch` channel 的优雅关闭，以及至少一次的投递语义：
/// 位点只在 handler 返回之后才被存储，崩溃重启后未确认的消息会被重新投递。
pub struct KafkaConsumer {
    config: KafkaConfig,
    group_id: String,
    state: ConsumerState,
    consumer: Option<StreamConsumer>,
    /// 当前底层消费者使用的 auto.offset.reset
    offset_reset: String,
}

impl KafkaConsumer {
    /// 创建处于 Disconnected 状态的消费者，不进行任何网络 I/O
    ///
    /// `group_id_suffix` 允许同一服务内不同消费逻辑使用独立的消费组。
    pub fn new(config: &KafkaConfig, group_id_suffix: Option<&str>) -> Self {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        Self {
            config: config.clone(),
            group_id,
            state: ConsumerState::Disconnected,
            consumer: None,
            offset_reset: config.auto_offset_reset.clone(),
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    fn ensure_state(
        &self,
        expected: ConsumerState,
        operation: &'static str,
    ) -> Result<(), ServiceError> {
        if self.state != expected {
            return Err(ServiceError::InvalidState {
                operation,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    fn build_consumer(&self, offset_reset: &str) -> Result<StreamConsumer, ServiceError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.group_id)
            .set("client.id", &self.group_id)
            .set("auto.offset.reset", offset_reset)
            .set("enable.auto.commit", "true")
            // 位点由消费循环在 handler 完成后手动存储
            .set("enable.auto.offset.store", "false")
            .create()
            .map_err(|e| ServiceError::Kafka(format!("创建消费者失败: {e}")))
    }

    /// 连接 broker：Disconnected → Connected
    ///
    /// 通过拉取集群元数据验证连通性，最长等待 `connect_timeout_ms`。
    /// `fetch_metadata` 是同步调用，放在阻塞线程池中执行。
    pub async fn connect(&mut self) -> Result<(), ServiceError> {
        self.ensure_state(ConsumerState::Disconnected, "connect")?;

        let consumer = self.build_consumer(&self.offset_reset)?;
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let consumer = tokio::task::spawn_blocking(move || {
            consumer.fetch_metadata(None, timeout).map(|_| consumer)
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("连接任务异常退出: {e}")))?
        .map_err(|e| ServiceError::Kafka(format!("连接 broker 失败: {e}")))?;

        self.consumer = Some(consumer);
        self.state = ConsumerState::Connected;
        info!(brokers = %self.config.brokers, group_id = %self.group_id, "Kafka 消费者已连接");
        Ok(())
    }

    /// 订阅 topic 列表：Connected → Subscribed
    ///
    /// `from_beginning` 决定在消费组没有已提交位点时从最早保留的消息还是仅从新消息开始，
    /// 只在订阅时生效一次，运行中不可更改。
    pub fn subscribe(&mut self, topics: &[&str], from_beginning: bool) -> Result<(), ServiceError> {
        self.ensure_state(ConsumerState::Connected, "subscribe")?;

        let wanted = offset_reset_policy(from_beginning);
        if self.offset_reset != wanted {
            // auto.offset.reset 只能在创建客户端时设置，尚未订阅时重建即可
            debug!(from = %self.offset_reset, to = wanted, "按订阅参数重建消费者");
            self.consumer = Some(self.build_consumer(wanted)?);
            self.offset_reset = wanted.to_string();
        }

        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| ServiceError::Internal("已连接的消费者缺少客户端实例".to_string()))?;
        consumer
            .subscribe(topics)
            .map_err(|e| ServiceError::Kafka(format!("订阅 topic 失败: {e}")))?;

        self.state = ConsumerState::Subscribed;
        info!(?topics, from_beginning, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环：Subscribed → Running，退出后 → Disconnected
    ///
    /// 每次只处理一条消息，handler 返回之前不会拉取下一条，保证分区内顺序。
    /// - handler 返回 `Ok` 表示消息已结清（处理成功、跳过或已转入死信队列），随后存储位点；
    /// - handler 返回 `Err` 视为致命错误：不存储位点，退出循环并把错误交给调用方；
    /// - 关闭信号只在两条消息之间检查，正在执行的 handler 总能自然完成。
    pub async fn run<F, Fut>(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        handler: F,
    ) -> Result<(), ServiceError>
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), ServiceError>>,
    {
        self.ensure_state(ConsumerState::Subscribed, "run")?;
        self.state = ConsumerState::Running;

        let outcome = match self.consumer.as_ref() {
            Some(consumer) => consume_loop(consumer, &mut shutdown, &handler).await,
            None => Err(ServiceError::Internal(
                "已订阅的消费者缺少客户端实例".to_string(),
            )),
        };

        self.disconnect();
        outcome
    }

    /// 断开连接：任意状态 → Disconnected
    ///
    /// 取消订阅并释放底层客户端，已存储的位点会在客户端关闭时提交。重复调用是安全的。
    pub fn disconnect(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            if self.state == ConsumerState::Subscribed || self.state == ConsumerState::Running {
                consumer.unsubscribe();
            }
            drop(consumer);
            info!(group_id = %self.group_id, "Kafka 消费者已断开");
        }
        self.state = ConsumerState::Disconnected;
    }
}

impl Drop for KafkaConsumer {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// 逐条拉取并处理消息，直到收到关闭信号或出现致命错误
async fn consume_loop<F, Fut>(
    consumer: &StreamConsumer,
    shutdown: &mut watch::Receiver<bool>,
    handler: &F,
) -> Result<(), ServiceError>
where
    F: Fn(ConsumerMessage) -> Fut,
    Fut: std::future::Future<Output = Result<(), ServiceError>>,
{
    let stream = consumer.stream();
    futures::pin_mut!(stream);

    info!("Kafka 消费循环已启动");

    loop {
        if *shutdown.borrow() {
            info!("收到关闭信号，Kafka 消费循环退出");
            return Ok(());
        }

        tokio::select! {
            // 偏向关闭信号，保证收到关闭时能尽快退出
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("收到关闭信号，Kafka 消费循环退出");
                    return Ok(());
                }
            }

            msg_result = stream.next() => {
                let Some(msg_result) = msg_result else {
                    warn!("Kafka 消息流意外结束");
                    return Err(ServiceError::Kafka("消息流意外结束".to_string()));
                };

                match msg_result {
                    Ok(borrowed_msg) => {
                        let msg = ConsumerMessage::from_borrowed(&borrowed_msg);
                        drop(borrowed_msg);
                        debug!(
                            topic = %msg.topic,
                            partition = msg.partition,
                            offset = msg.offset,
                            "收到 Kafka 消息"
                        );

                        let (topic, partition, offset) =
                            (msg.topic.clone(), msg.partition, msg.offset);

                        if let Err(e) = handler(msg).await {
                            error!(
                                error = %e,
                                topic = %topic,
                                partition,
                                offset,
                                "消息处理出现致命错误，停止消费且不确认该消息"
                            );
                            return Err(e);
                        }

                        store_offset(consumer, &topic, partition, offset)?;
                    }
                    Err(e) if e.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal) => {
                        error!(error = %e, "Kafka 传输出现不可恢复错误");
                        return Err(ServiceError::Kafka(format!("不可恢复的传输错误: {e}")));
                    }
                    Err(e) => {
                        // 瞬时错误由 librdkafka 自行重连恢复
                        warn!(error = %e, "接收 Kafka 消息出错");
                    }
                }
            }
        }
    }
}

/// 存储"下一条待消费"的位点，在下一次自动提交时生效
fn store_offset(
    consumer: &StreamConsumer,
    topic: &str,
    partition: i32,
    offset: i64,
) -> Result<(), ServiceError> {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1))
        .map_err(|e| ServiceError::Kafka(format!("构造位点列表失败: {e}")))?;
    consumer
        .store_offsets(&tpl)
        .map_err(|e| ServiceError::Kafka(format!("存储位点失败: {e}")))
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_record_with_key_and_headers() {
        let mut headers = HashMap::new();
        headers.insert("traceparent".to_string(), "00-abc-01".to_string());

        let record = build_record(
            topics::DEAD_LETTER_QUEUE,
            Some("product-0-7"),
            br#"{"a":1}"#,
            &headers,
        );

        assert_eq!(record.topic, "pricing.cache.dlq");
        assert_eq!(record.key, Some("product-0-7"));
        assert_eq!(record.payload, Some(&br#"{"a":1}"#[..]));

        let owned = record.headers.as_ref().unwrap();
        assert_eq!(owned.count(), 1);
        let header = owned.get(0);
        assert_eq!(header.key, "traceparent");
        assert_eq!(header.value, Some(&b"00-abc-01"[..]));
    }

    #[test]
    fn test_build_record_without_key() {
        // send_message 不带 key 时的记录形态
        let record = build_record(topics::PRODUCT, None, b"hello", &HashMap::new());

        assert_eq!(record.topic, "product");
        assert!(record.key.is_none());
        assert!(record.headers.is_none());
        assert_eq!(record.payload, Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_broker_stays_disconnected() {
        let config = KafkaConfig {
            brokers: "127.0.0.1:1".to_string(),
            connect_timeout_ms: 200,
            ..KafkaConfig::default()
        };
        let mut consumer = KafkaConsumer::new(&config, None);

        let err = consumer.connect().await.unwrap_err();

        assert!(matches!(err, ServiceError::Kafka(_)));
        assert_eq!(consumer.state(), ConsumerState::Disconnected);
    }

    #[test]
    fn test_topic_constants() {
        assert_eq!(topics::PRODUCT, "product");
        assert_eq!(topics::TOPPING, "topping");
        assert_eq!(topics::DEAD_LETTER_QUEUE, "pricing.cache.dlq");
    }

    #[test]
    fn test_new_consumer_is_disconnected() {
        let consumer = KafkaConsumer::new(&KafkaConfig::default(), Some("price-cache"));
        assert_eq!(consumer.state(), ConsumerState::Disconnected);
        assert_eq!(consumer.group_id(), "order-service.price-cache");
    }

    #[test]
    fn test_subscribe_before_connect_is_rejected() {
        let mut consumer = KafkaConsumer::new(&KafkaConfig::default(), None);
        let err = consumer.subscribe(&[topics::PRODUCT], false).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidState {
                operation: "subscribe",
                ..
            }
        ));
        assert_eq!(consumer.state(), ConsumerState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_before_subscribe_is_rejected() {
        let mut consumer = KafkaConsumer::new(&KafkaConfig::default(), None);
        let (_tx, rx) = watch::channel(false);
        let result = consumer.run(rx, |_msg| async { Ok(()) }).await;
        assert!(matches!(
            result,
            Err(ServiceError::InvalidState {
                operation: "run",
                ..
            })
        ));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut consumer = KafkaConsumer::new(&KafkaConfig::default(), None);
        consumer.disconnect();
        consumer.disconnect();
        assert_eq!(consumer.state(), ConsumerState::Disconnected);
    }

    #[test]
    fn test_offset_reset_policy() {
        assert_eq!(offset_reset_policy(true), "earliest");
        assert_eq!(offset_reset_policy(false), "latest");
    }
}
