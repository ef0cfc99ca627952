//! Shipping service contract and in-memory implementation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::Money;

use super::{CallRecorder, RetainedLog};
use crate::model::{Address, CartItem};
use crate::transport::{RpcRequest, TransportError};

pub const SERVICE: &str = "ShippingService";

/// Body of both the quote and the ship call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingRequest {
    pub address: Address,
    pub items: Vec<CartItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteResponse {
    pub cost: Option<Money>,
}

/// Raw ship response; an empty tracking id is a malformed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipOrderResponse {
    pub tracking_id: String,
}

/// Fulfillment collaborator.
#[async_trait]
pub trait ShippingService: Send + Sync {
    /// Prices shipping `items` to `address`.
    async fn get_quote(
        &self,
        request: RpcRequest<ShippingRequest>,
    ) -> Result<QuoteResponse, TransportError>;

    /// Hands the order to fulfillment and returns its tracking id.
    async fn ship_order(
        &self,
        request: RpcRequest<ShippingRequest>,
    ) -> Result<ShipOrderResponse, TransportError>;
}

#[derive(Debug)]
struct InMemoryShippingState {
    quote: Money,
    shipments: RetainedLog<(String, ShippingRequest)>,
    next_id: u32,
    fail_on_quote: bool,
    fail_on_ship: bool,
    delay: Option<Duration>,
}

/// In-memory shipping service with a flat quote per order.
#[derive(Debug, Clone)]
pub struct InMemoryShippingService {
    state: Arc<RwLock<InMemoryShippingState>>,
    recorder: CallRecorder,
}

impl InMemoryShippingService {
    /// Creates a service quoting `quote` for every non-empty order.
    pub fn new(quote: Money) -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryShippingState {
                quote,
                shipments: RetainedLog::unbounded(),
                next_id: 0,
                fail_on_quote: false,
                fail_on_ship: false,
                delay: None,
            })),
            recorder: CallRecorder::new(),
        }
    }

    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn recorder(&self) -> &CallRecorder {
        &self.recorder
    }

    /// Remembers only the newest `limit` shipments; counts stay exact.
    pub fn with_retention(self, limit: usize) -> Self {
        self.state
            .write()
            .unwrap()
            .shipments
            .set_capacity(Some(limit));
        self
    }

    pub fn set_quote(&self, quote: Money) {
        self.state.write().unwrap().quote = quote;
    }

    pub fn set_fail_on_quote(&self, fail: bool) {
        self.state.write().unwrap().fail_on_quote = fail;
    }

    /// Configures the service to fail on ship_order calls.
    pub fn set_fail_on_ship(&self, fail: bool) {
        self.state.write().unwrap().fail_on_ship = fail;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    /// Returns the number of shipped orders.
    pub fn shipment_count(&self) -> usize {
        self.state.read().unwrap().shipments.total()
    }

    /// Shipments currently remembered.
    pub fn retained_shipments(&self) -> usize {
        self.state.read().unwrap().shipments.len()
    }

    /// Returns true if a shipment exists with the given tracking id.
    pub fn has_shipment(&self, tracking_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .shipments
            .iter()
            .any(|(id, _)| id == tracking_id)
    }

    async fn wait(&self) {
        let delay = self.state.read().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ShippingService for InMemoryShippingService {
    async fn get_quote(
        &self,
        request: RpcRequest<ShippingRequest>,
    ) -> Result<QuoteResponse, TransportError> {
        self.recorder.record(SERVICE, "GetQuote", &request.metadata);
        self.wait().await;

        let state = self.state.read().unwrap();
        if state.fail_on_quote {
            return Err(TransportError::Unavailable(
                "quote backend unreachable".to_string(),
            ));
        }

        let cost = if request.body.items.is_empty() {
            Money::zero(state.quote.currency())
        } else {
            state.quote
        };
        Ok(QuoteResponse { cost: Some(cost) })
    }

    async fn ship_order(
        &self,
        request: RpcRequest<ShippingRequest>,
    ) -> Result<ShipOrderResponse, TransportError> {
        self.recorder.record(SERVICE, "ShipOrder", &request.metadata);
        self.wait().await;

        let mut state = self.state.write().unwrap();
        if state.fail_on_ship {
            return Err(TransportError::status(503, "Shipping unavailable"));
        }

        state.next_id += 1;
        let tracking_id = format!("TRACK-{:04}", state.next_id);
        state.shipments.push((tracking_id.clone(), request.body));

        Ok(ShipOrderResponse { tracking_id })
    }
}
