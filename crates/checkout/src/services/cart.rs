//! Cart service contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::UserId;

use super::CallRecorder;
use crate::model::CartItem;
use crate::transport::{RpcRequest, TransportError};

pub const SERVICE: &str = "CartService";

/// Raw cart contents as returned over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartResponse {
    pub user_id: UserId,
    pub items: Vec<CartItem>,
}

/// Cart collaborator.
#[async_trait]
pub trait CartService: Send + Sync {
    /// Reads the user's cart. An unknown user has an empty cart.
    async fn get_cart(&self, request: RpcRequest<UserId>) -> Result<CartResponse, TransportError>;

    /// Removes every item from the user's cart.
    async fn empty_cart(&self, request: RpcRequest<UserId>) -> Result<(), TransportError>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<UserId, Vec<CartItem>>,
    fail_on_get: bool,
    fail_on_empty: bool,
    delay: Option<Duration>,
}

/// In-memory cart store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartService {
    state: Arc<RwLock<InMemoryCartState>>,
    recorder: CallRecorder,
}

impl InMemoryCartService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received calls into `recorder` instead of a private one.
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn recorder(&self) -> &CallRecorder {
        &self.recorder
    }

    /// Adds `quantity` of a product to the user's cart.
    pub fn add_item(&self, user_id: &UserId, item: CartItem) {
        let mut state = self.state.write().unwrap();
        let cart = state.carts.entry(user_id.clone()).or_default();
        match cart.iter_mut().find(|line| line.product_id == item.product_id) {
            Some(line) => line.quantity += item.quantity,
            None => cart.push(item),
        }
    }

    pub fn items(&self, user_id: &UserId) -> Vec<CartItem> {
        self.state
            .read()
            .unwrap()
            .carts
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drops the user's cart without going through the service call.
    pub fn clear(&self, user_id: &UserId) {
        self.state.write().unwrap().carts.remove(user_id);
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.state.write().unwrap().fail_on_get = fail;
    }

    pub fn set_fail_on_empty(&self, fail: bool) {
        self.state.write().unwrap().fail_on_empty = fail;
    }

    /// Makes every call wait before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    async fn wait(&self) {
        let delay = self.state.read().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn get_cart(&self, request: RpcRequest<UserId>) -> Result<CartResponse, TransportError> {
        self.recorder.record(SERVICE, "GetCart", &request.metadata);
        self.wait().await;

        let state = self.state.read().unwrap();
        if state.fail_on_get {
            return Err(TransportError::Unavailable("cart store unreachable".to_string()));
        }

        Ok(CartResponse {
            items: state.carts.get(&request.body).cloned().unwrap_or_default(),
            user_id: request.body,
        })
    }

    async fn empty_cart(&self, request: RpcRequest<UserId>) -> Result<(), TransportError> {
        self.recorder.record(SERVICE, "EmptyCart", &request.metadata);
        self.wait().await;

        let mut state = self.state.write().unwrap();
        if state.fail_on_empty {
            return Err(TransportError::Unavailable("cart store unreachable".to_string()));
        }

        state.carts.remove(&request.body);
        Ok(())
    }
}
