//! Order confirmation contract, HTTP client and in-memory implementation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CallRecorder, RetainedLog};
use crate::model::OrderResult;
use crate::transport::{HttpRequest, TransportError};

pub const SERVICE: &str = "EmailService";

/// Confirmation payload sent to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub email: String,
    pub order: OrderResult,
}

/// Notification collaborator.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_order_confirmation(
        &self,
        request: HttpRequest<OrderConfirmation>,
    ) -> Result<(), TransportError>;
}

/// Posts confirmations as JSON to `{base_url}/send_order_confirmation`.
#[derive(Debug, Clone)]
pub struct HttpNotificationService {
    client: Client,
    base_url: String,
}

impl HttpNotificationService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn map_request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::DeadlineExceeded
    } else if err.is_builder() || err.is_body() {
        TransportError::Encode(err.to_string())
    } else {
        TransportError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl NotificationService for HttpNotificationService {
    async fn send_order_confirmation(
        &self,
        request: HttpRequest<OrderConfirmation>,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(format!("{}/send_order_confirmation", self.base_url))
            .headers(request.headers.into_inner())
            .json(&request.body)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(TransportError::status(status.as_u16(), message))
    }
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: RetainedLog<OrderConfirmation>,
    fail_on_send: bool,
    delay: Option<Duration>,
}

/// Keeps confirmations in memory instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
    recorder: CallRecorder,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn recorder(&self) -> &CallRecorder {
        &self.recorder
    }

    /// Remembers only the newest `limit` confirmations; counts stay exact.
    pub fn with_retention(self, limit: usize) -> Self {
        self.state.write().unwrap().sent.set_capacity(Some(limit));
        self
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    /// Confirmations currently remembered, oldest first.
    pub fn sent(&self) -> Vec<OrderConfirmation> {
        self.state.read().unwrap().sent.iter().cloned().collect()
    }

    /// Confirmations ever delivered.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.total()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send_order_confirmation(
        &self,
        request: HttpRequest<OrderConfirmation>,
    ) -> Result<(), TransportError> {
        self.recorder
            .record(SERVICE, "SendOrderConfirmation", &request.headers);
        let delay = self.state.read().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(TransportError::status(503, "mail relay unavailable"));
        }
        state.sent.push(request.body);
        Ok(())
    }
}
