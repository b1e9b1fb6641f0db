//! Adaptive Consumer (spec §4.3): broker connection lifecycle, admission
//! control, dispatch to the Handler, reply publishing, and requeue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tokio::sync::{RwLock, Semaphore};

use judge_handler::{handle, ChildProcessRunner, Decision, HandlerConfig};

use crate::config::{Config, SWAP_THRESHOLD_PCT};
use crate::health::HealthReading;
use crate::metrics;

const RECONNECT_ATTEMPTS: u32 = 30;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
const CONSUMER_TAG: &str = "judge-worker";
const RETRY_HEADER: &str = "x-retry-count";

/// Per-process state machine position (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    Consuming,
    Paused,
    Draining,
    Closed,
}

impl State {
    fn metric_value(self) -> i64 {
        match self {
            State::Connecting => 0,
            State::Consuming => 1,
            State::Paused => 2,
            State::Draining => 3,
            State::Closed => 4,
        }
    }
}

/// Outcome of running the consumer against one connection; tells the outer
/// loop whether to reconnect or stop entirely.
enum ConnectionOutcome {
    Disconnected,
    ShuttingDown,
}

pub struct AdaptiveConsumer {
    config: Arc<Config>,
    runner: Arc<ChildProcessRunner>,
    handler_config: HandlerConfig,
    shutdown: Arc<AtomicBool>,
    health: Arc<RwLock<HealthReading>>,
    semaphore: Arc<Semaphore>,
}

impl AdaptiveConsumer {
    pub fn new(config: Config, shutdown: Arc<AtomicBool>, health: Arc<RwLock<HealthReading>>) -> Self {
        let runner = Arc::new(ChildProcessRunner::new(
            config.sandbox_binary_path.clone(),
            config.max_parallel_testcases,
        ));
        let handler_config = HandlerConfig {
            max_retry: config.max_retry_count,
        };
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_submissions as usize));

        Self {
            config: Arc::new(config),
            runner,
            handler_config,
            shutdown,
            health,
            semaphore,
        }
    }

    /// Drive the full process lifetime: connect, consume, reconnect on
    /// drop, exit cleanly on a shutdown signal.
    pub async fn run(&self) -> Result<()> {
        metrics::CONSUMER_STATE.set(State::Connecting.metric_value());

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                metrics::CONSUMER_STATE.set(State::Closed.metric_value());
                return Ok(());
            }

            let channel = self.connect_with_backoff().await?;
            metrics::CONSUMER_STATE.set(State::Consuming.metric_value());

            match self.consume_on(&channel).await? {
                ConnectionOutcome::ShuttingDown => {
                    metrics::CONSUMER_STATE.set(State::Closed.metric_value());
                    return Ok(());
                }
                ConnectionOutcome::Disconnected => {
                    tracing::warn!("broker connection lost, reconnecting");
                    metrics::CONSUMER_STATE.set(State::Connecting.metric_value());
                }
            }
        }
    }

    /// Connect with linear backoff, up to `RECONNECT_ATTEMPTS` tries (spec
    /// §4.3 "Reconnect").
    async fn connect_with_backoff(&self) -> Result<Channel> {
        let mut last_err = None;
        for attempt in 1..=RECONNECT_ATTEMPTS {
            match self.try_connect().await {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "broker connect attempt failed");
                    last_err = Some(e);
                    tokio::time::sleep(RECONNECT_BACKOFF * attempt).await;
                }
            }
        }
        Err(anyhow!("exhausted {RECONNECT_ATTEMPTS} connect attempts: {:?}", last_err))
    }

    async fn try_connect(&self) -> Result<Channel> {
        let connection = Connection::connect(&self.config.amqp_url(), ConnectionProperties::default())
            .await
            .context("failed to connect to broker")?;
        let channel = connection.create_channel().await.context("failed to open channel")?;

        channel
            .queue_declare(
                &self.config.submission_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("failed to declare submission queue")?;

        channel
            .basic_qos(self.config.max_concurrent_submissions as u16, BasicQosOptions::default())
            .await
            .context("failed to set prefetch")?;

        Ok(channel)
    }

    /// Run the Consuming/Paused state machine against one live channel
    /// until the connection drops or a shutdown is requested.
    async fn consume_on(&self, channel: &Channel) -> Result<ConnectionOutcome> {
        let mut consumer = self.subscribe(channel).await?;
        let mut paused = false;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                metrics::CONSUMER_STATE.set(State::Draining.metric_value());
                self.drain(channel, &mut consumer, paused).await;
                return Ok(ConnectionOutcome::ShuttingDown);
            }

            if self.config.adaptive_mode {
                let should_pause = self
                    .health
                    .read()
                    .await
                    .exceeds(self.config.memory_threshold_pct, SWAP_THRESHOLD_PCT, self.config.cpu_threshold_pct);

                if should_pause && !paused {
                    tracing::warn!("host health over threshold, pausing consumption");
                    if let Err(e) = channel.basic_cancel(CONSUMER_TAG, BasicCancelOptions::default()).await {
                        tracing::error!(error = %e, "failed to cancel consumer subscription");
                    }
                    paused = true;
                    metrics::PAUSED.set(1);
                    metrics::CONSUMER_STATE.set(State::Paused.metric_value());
                } else if !should_pause && paused {
                    tracing::info!("host health recovered, resuming consumption");
                    consumer = self.subscribe(channel).await?;
                    paused = false;
                    metrics::PAUSED.set(0);
                    metrics::CONSUMER_STATE.set(State::Consuming.metric_value());
                }
            }

            if paused {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            match tokio::time::timeout(Duration::from_millis(500), consumer.next()).await {
                Ok(Some(Ok(delivery))) => {
                    let permit = match self.semaphore.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => return Ok(ConnectionOutcome::Disconnected),
                    };
                    metrics::ACTIVE_SUBMISSIONS.inc();

                    let channel = channel.clone();
                    let runner = self.runner.clone();
                    let handler_config = self.handler_config.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = Self::handle_delivery(&channel, &runner, &handler_config, delivery).await {
                            tracing::error!(error = %e, "failed to handle delivery");
                        }
                        metrics::ACTIVE_SUBMISSIONS.dec();
                    });
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(error = %e, "consumer stream error");
                    return Ok(ConnectionOutcome::Disconnected);
                }
                Ok(None) => return Ok(ConnectionOutcome::Disconnected),
                Err(_) => continue,
            }
        }
    }

    async fn subscribe(&self, channel: &Channel) -> Result<Consumer> {
        channel
            .basic_consume(
                &self.config.submission_queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("failed to start consuming")
    }

    /// Stop accepting new deliveries and let in-flight handlers finish
    /// before the channel is dropped (spec §4.3 "Draining").
    async fn drain(&self, channel: &Channel, _consumer: &mut Consumer, already_cancelled: bool) {
        if !already_cancelled {
            if let Err(e) = channel.basic_cancel(CONSUMER_TAG, BasicCancelOptions::default()).await {
                tracing::warn!(error = %e, "failed to cancel subscription during shutdown");
            }
        }

        let deadline = Instant::now() + Duration::from_secs(30);
        while self.semaphore.available_permits() < self.config.max_concurrent_submissions as usize {
            if Instant::now() >= deadline {
                tracing::warn!("drain deadline exceeded with submissions still in flight");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn handle_delivery(
        channel: &Channel,
        runner: &ChildProcessRunner,
        handler_config: &HandlerConfig,
        delivery: lapin::message::Delivery,
    ) -> Result<()> {
        let retry_count = read_retry_count(&delivery);
        let reply_to = delivery.properties.reply_to().clone();
        let correlation_id = delivery.properties.correlation_id().clone();

        let started = Instant::now();
        let decision = handle(runner, handler_config, &delivery.data, retry_count).await;

        match decision {
            Decision::AckAndReply(reply) => {
                metrics::record_submission(&reply.error_code, started.elapsed().as_secs_f64(), "unknown");
                if let Some(reply_to) = reply_to {
                    publish_reply(channel, reply_to.as_str(), correlation_id.as_ref().map(|c| c.as_str()), &reply).await?;
                }
                delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .context("failed to ack delivery")?;
            }
            Decision::Requeue => {
                metrics::DELIVERIES_REQUEUED.inc();
                requeue(channel, &delivery, retry_count + 1).await?;
                delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .context("failed to ack original delivery after requeue")?;
            }
            Decision::AckOnly => {
                delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .context("failed to ack delivery")?;
            }
        }

        Ok(())
    }
}

fn read_retry_count(delivery: &lapin::message::Delivery) -> u32 {
    delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(RETRY_HEADER))
        .and_then(|value| match value {
            AMQPValue::LongUInt(n) => Some(*n),
            AMQPValue::LongLongInt(n) => Some((*n).max(0) as u32),
            AMQPValue::ShortUInt(n) => Some(*n as u32),
            _ => None,
        })
        .unwrap_or(0)
}

async fn publish_reply(
    channel: &Channel,
    reply_to: &str,
    correlation_id: Option<&str>,
    reply: &judge_common::wire::ReplyMessage,
) -> Result<()> {
    let body = serde_json::to_vec(reply).context("failed to serialise reply")?;

    let mut properties = BasicProperties::default().with_delivery_mode(2);
    if let Some(correlation_id) = correlation_id {
        properties = properties.with_correlation_id(correlation_id.into());
    }

    channel
        .basic_publish("", reply_to, BasicPublishOptions::default(), &body, properties)
        .await
        .context("failed to publish reply")?
        .await
        .context("broker did not confirm reply publish")?;

    Ok(())
}

/// Republish the original body to `submission_queue` with an incremented
/// retry header, preserving `replyTo`/`correlationId` (spec §4.3
/// "Requeue mechanics" — deliberately not a native NACK-with-requeue, which
/// would bypass the retry counter).
async fn requeue(channel: &Channel, delivery: &lapin::message::Delivery, next_retry_count: u32) -> Result<()> {
    let mut headers = delivery.properties.headers().clone().unwrap_or_default();
    headers.insert(RETRY_HEADER.into(), AMQPValue::LongUInt(next_retry_count));

    let mut properties = delivery.properties.clone().with_headers(headers).with_delivery_mode(2);
    if let Some(reply_to) = delivery.properties.reply_to() {
        properties = properties.with_reply_to(reply_to.clone());
    }
    if let Some(correlation_id) = delivery.properties.correlation_id() {
        properties = properties.with_correlation_id(correlation_id.clone());
    }

    channel
        .basic_publish(
            "",
            delivery.routing_key.as_str(),
            BasicPublishOptions::default(),
            &delivery.data,
            properties,
        )
        .await
        .context("failed to republish for retry")?
        .await
        .context("broker did not confirm retry publish")?;

    Ok(())
}
