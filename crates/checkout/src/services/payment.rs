//! Payment service contract and implementations.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::Money;

use super::{CallRecorder, RetainedLog};
use crate::model::CreditCardInfo;
use crate::transport::{RpcRequest, TransportError};

pub const SERVICE: &str = "PaymentService";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub amount: Money,
    pub credit_card: CreditCardInfo,
}

/// Raw charge response; an empty transaction id is a malformed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeResponse {
    pub transaction_id: String,
}

/// Payment collaborator.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges the card for `amount`.
    async fn charge(&self, request: RpcRequest<ChargeRequest>)
    -> Result<ChargeResponse, TransportError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: RetainedLog<(String, Money)>,
    next_id: u32,
    fail_on_charge: bool,
    delay: Option<Duration>,
}

/// In-memory payment service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
    recorder: CallRecorder,
}

impl InMemoryPaymentService {
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

    /// Remembers only the newest `limit` charges; counts stay exact.
    pub fn with_retention(self, limit: usize) -> Self {
        self.state
            .write()
            .unwrap()
            .charges
            .set_capacity(Some(limit));
        self
    }

    /// Configures the service to decline charges.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().fail_on_charge = fail;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    /// Returns the number of successful charges.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.total()
    }

    /// Charges currently remembered.
    pub fn retained_charges(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }

    /// The amount charged under `transaction_id`.
    pub fn charged_amount(&self, transaction_id: &str) -> Option<Money> {
        self.state
            .read()
            .unwrap()
            .charges
            .iter()
            .find(|(id, _)| id == transaction_id)
            .map(|(_, amount)| *amount)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn charge(
        &self,
        request: RpcRequest<ChargeRequest>,
    ) -> Result<ChargeResponse, TransportError> {
        self.recorder.record(SERVICE, "Charge", &request.metadata);
        let delay = self.state.read().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap();
        if state.fail_on_charge {
            return Err(TransportError::status(400, "card declined"));
        }

        state.next_id += 1;
        let transaction_id = format!("PAY-{:04}", state.next_id);
        state
            .charges
            .push((transaction_id.clone(), request.body.amount));

        Ok(ChargeResponse { transaction_id })
    }
}

/// Stands in for a payment endpoint that cannot be reached.
///
/// Used when a fault policy redirects payment traffic.
#[derive(Debug, Clone, Default)]
pub struct UnreachablePaymentService {
    address: String,
}

impl UnreachablePaymentService {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl PaymentService for UnreachablePaymentService {
    async fn charge(
        &self,
        _request: RpcRequest<ChargeRequest>,
    ) -> Result<ChargeResponse, TransportError> {
        Err(TransportError::Unavailable(format!(
            "connection refused: {}",
            self.address
        )))
    }
}
