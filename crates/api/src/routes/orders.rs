//! Order placement endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use checkout::{OrderOrchestrator, OrderResult, PlaceOrderRequest, RequestContext};
use telemetry::{ContextCarrier, HttpHeaders};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
#[derive(Debug)]
pub struct AppState {
    pub orchestrator: OrderOrchestrator,
}

/// POST /orders: place an order for the user's cart.
///
/// The inbound `traceparent` and `baggage` headers become the parent of the
/// server span. Dropping the request (client disconnect) drops the call.
#[tracing::instrument(skip_all)]
pub async fn place(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResult>), ApiError> {
    let Json(request) = payload?;
    let inbound = HttpHeaders::from(headers).extract();
    let ctx = RequestContext::new(inbound);

    let order = state.orchestrator.place_order(&ctx, request).await?;
    tracing::info!(order_id = %order.order_id, "order accepted");

    Ok((StatusCode::CREATED, Json(order)))
}
