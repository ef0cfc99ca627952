//! Best-effort publishing of order completion events.
//!
//! [`EventPublisher::publish`] never returns an error: delivery failures and
//! timeouts are recorded on the producer span, logged and counted, and the
//! caller receives a [`PublishOutcome`] it is free to ignore.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use telemetry::{
    ContextCarrier, KeyValue, MessageHeaders, SpanKind, SpanOps, Tracer, record_failure,
};

use crate::context::RequestContext;
use crate::error::BestEffortError;
use crate::events::OrderEvent;
use crate::model::OrderResult;
use crate::services::RetainedLog;
use crate::transport::TransportError;

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// A record handed to the message bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: MessageHeaders,
}

/// Broker acknowledgement; brokers that do not report a position leave these empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

/// Message bus client.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, TransportError>;
}

#[derive(Debug, Default)]
struct InMemoryProducerState {
    messages: RetainedLog<OutboundMessage>,
    fail_on_send: bool,
    delay: Option<Duration>,
}

/// Appends messages to a single in-memory partition.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProducer {
    state: Arc<RwLock<InMemoryProducerState>>,
}

impl InMemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers only the newest `limit` messages; offsets and counts stay exact.
    pub fn with_retention(self, limit: usize) -> Self {
        self.state
            .write()
            .unwrap()
            .messages
            .set_capacity(Some(limit));
        self
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Delays every acknowledgement, e.g. past the publisher's timeout.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    /// Messages currently remembered, oldest first.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.state.read().unwrap().messages.iter().cloned().collect()
    }

    /// Messages ever acknowledged.
    pub fn message_count(&self) -> usize {
        self.state.read().unwrap().messages.total()
    }

    pub fn retained_messages(&self) -> usize {
        self.state.read().unwrap().messages.len()
    }
}

#[async_trait]
impl MessageProducer for InMemoryProducer {
    async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, TransportError> {
        let delay = self.state.read().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(TransportError::Unavailable("broker unreachable".to_string()));
        }

        let offset = state.messages.total() as i64;
        state.messages.push(message);
        Ok(DeliveryReceipt {
            partition: Some(0),
            offset: Some(offset),
        })
    }
}

/// What happened to one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered(DeliveryReceipt),
    Failed(BestEffortError),
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered(_))
    }

    fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Delivered(_) => "delivered",
            PublishOutcome::Failed(_) => "failed",
        }
    }
}

/// Publishes [`OrderEvent`]s with the active trace context in the message headers.
#[derive(Clone)]
pub struct EventPublisher {
    producer: Arc<dyn MessageProducer>,
    tracer: Tracer,
    topic: String,
    timeout: Duration,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("topic", &self.topic)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl EventPublisher {
    pub fn new(producer: Arc<dyn MessageProducer>, tracer: Tracer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            tracer,
            topic: topic.into(),
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Upper bound on waiting for the broker's acknowledgement.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes an `OrderPlaced` event for `order`, keyed by order id.
    #[tracing::instrument(skip_all, fields(order_id = %order.order_id, topic = %self.topic))]
    pub async fn publish(&self, ctx: &RequestContext, order: &OrderResult) -> PublishOutcome {
        let event = OrderEvent::order_placed(order.clone());
        let key = event.order_id().to_string();

        let mut span = self.tracer.start_span(
            format!("{} publish", self.topic),
            SpanKind::Producer,
            ctx.parent(),
        );
        span.set_attributes([
            KeyValue::new("messaging.operation", "publish"),
            KeyValue::new("messaging.destination.name", self.topic.clone()),
            KeyValue::new("messaging.message.key", key.clone()),
            KeyValue::new("messaging.message.type", event.event_type()),
        ]);

        let outcome = match serde_json::to_vec(&event) {
            Ok(payload) => {
                span.set_attribute(KeyValue::new(
                    "messaging.message.body.size",
                    payload.len() as i64,
                ));
                let mut headers = MessageHeaders::new();
                headers.inject(&ctx.propagated().with_parent(span.span_context().clone()));
                let message = OutboundMessage {
                    topic: self.topic.clone(),
                    key,
                    payload,
                    headers,
                };
                self.send(ctx, message).await
            }
            Err(err) => Err(TransportError::Encode(err.to_string())),
        };

        let outcome = match outcome {
            Ok(receipt) => {
                if let Some(partition) = receipt.partition {
                    span.set_attribute(KeyValue::new(
                        "messaging.destination.partition.id",
                        partition.to_string(),
                    ));
                }
                if let Some(offset) = receipt.offset {
                    span.set_attribute(KeyValue::new("messaging.message.offset", offset));
                }
                tracing::debug!(
                    partition = ?receipt.partition,
                    offset = ?receipt.offset,
                    "order event delivered"
                );
                PublishOutcome::Delivered(receipt)
            }
            Err(source) => {
                let error = BestEffortError::EventPublishFailed(source);
                record_failure(&mut span, &error);
                tracing::warn!(step = %error.step(), error = %error, "order event not delivered");
                PublishOutcome::Failed(error)
            }
        };

        metrics::counter!("checkout_events_published_total", "outcome" => outcome.label())
            .increment(1);
        span.end();
        outcome
    }

    async fn send(
        &self,
        ctx: &RequestContext,
        message: OutboundMessage,
    ) -> Result<DeliveryReceipt, TransportError> {
        match tokio::time::timeout(self.timeout, ctx.run(self.producer.send(message))).await {
            Ok(Ok(result)) => result,
            Ok(Err(interrupted)) => Err(interrupted.into()),
            Err(_elapsed) => Err(TransportError::DeadlineExceeded),
        }
    }
}
