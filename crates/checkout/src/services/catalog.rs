//! Product catalog contract and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, ProductId};

use super::CallRecorder;
use crate::transport::{RpcRequest, TransportError};

pub const SERVICE: &str = "ProductCatalogService";

/// A catalog entry as returned over the wire. `price` may be missing in a
/// malformed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub price: Option<Money>,
}

/// Catalog collaborator.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_product(
        &self,
        request: RpcRequest<ProductId>,
    ) -> Result<ProductResponse, TransportError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, ProductResponse>,
    failing: HashSet<ProductId>,
    delay: Option<Duration>,
}

/// In-memory product catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogService {
    state: Arc<RwLock<InMemoryCatalogState>>,
    recorder: CallRecorder,
}

impl InMemoryCatalogService {
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

    pub fn add_product(&self, id: impl Into<ProductId>, name: impl Into<String>, price: Money) {
        let id = id.into();
        self.state.write().unwrap().products.insert(
            id.clone(),
            ProductResponse {
                id,
                name: name.into(),
                price: Some(price),
            },
        );
    }

    /// Stores a raw response, e.g. one without a price.
    pub fn add_raw(&self, product: ProductResponse) {
        self.state
            .write()
            .unwrap()
            .products
            .insert(product.id.clone(), product);
    }

    /// Makes lookups of `id` fail with a transport error.
    pub fn set_fail_on(&self, id: impl Into<ProductId>, fail: bool) {
        let id = id.into();
        let mut state = self.state.write().unwrap();
        if fail {
            state.failing.insert(id);
        } else {
            state.failing.remove(&id);
        }
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    pub fn product_count(&self) -> usize {
        self.state.read().unwrap().products.len()
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalogService {
    async fn get_product(
        &self,
        request: RpcRequest<ProductId>,
    ) -> Result<ProductResponse, TransportError> {
        self.recorder
            .record(SERVICE, "GetProduct", &request.metadata);
        let delay = self.state.read().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.read().unwrap();
        if state.failing.contains(&request.body) {
            return Err(TransportError::Unavailable(
                "catalog backend unreachable".to_string(),
            ));
        }

        state
            .products
            .get(&request.body)
            .cloned()
            .ok_or_else(|| TransportError::status(404, format!("no product with id {}", request.body)))
    }
}
