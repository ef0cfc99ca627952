//! HTTP front end for checkout order placement.
//!
//! Exposes `POST /orders` over the [`checkout::OrderOrchestrator`], with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    CallRecorder, CartItem, Clients, Collaborators, HttpNotificationService, InMemoryCartService,
    InMemoryCatalogService, InMemoryCurrencyService, InMemoryNotificationService,
    InMemoryPaymentService, InMemoryProducer, InMemoryShippingService, NotificationService,
    OrderOrchestrator, StaticFaultPolicy,
};
use common::{CurrencyCode, Money, MoneyError, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use telemetry::{LogExporter, Tracer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// User whose cart is pre-filled by [`create_default_state`].
pub const DEMO_USER: &str = "demo-user";

/// Catalog seeded by [`create_default_state`]: id, name, USD units, nanos.
const DEMO_CATALOG: &[(&str, &str, i64, i32)] = &[
    ("OLJCESPC7Z", "Sunglasses", 19, 990_000_000),
    ("66VCHSJNUP", "Tank Top", 18, 990_000_000),
    ("1YMWWN1N4O", "Watch", 109, 990_000_000),
    ("L9ECAV7KIM", "Loafers", 89, 990_000_000),
    ("2ZYFJ3GM2N", "Hairdryer", 24, 990_000_000),
    ("0PUK6V6EV0", "Candle Holder", 18, 990_000_000),
    ("LS4PSXUNUM", "Salt & Pepper Shakers", 18, 490_000_000),
    ("9SIQT8TOJO", "Bamboo Glass Jar", 5, 490_000_000),
    ("6E92ZMYYFZ", "Mug", 8, 990_000_000),
];

/// Handles to the in-memory collaborators behind a default state.
#[derive(Debug, Clone)]
pub struct DemoCollaborators {
    pub cart: InMemoryCartService,
    pub catalog: InMemoryCatalogService,
    pub currency: InMemoryCurrencyService,
    pub payment: InMemoryPaymentService,
    pub shipping: InMemoryShippingService,
    /// Unused when `NOTIFICATION_URL` is set.
    pub notification: InMemoryNotificationService,
    pub producer: InMemoryProducer,
    pub faults: StaticFaultPolicy,
}

impl DemoCollaborators {
    /// Puts a few catalog items in `user_id`'s cart.
    pub fn fill_cart(&self, user_id: &UserId) {
        self.cart.add_item(user_id, CartItem::new("OLJCESPC7Z", 1));
        self.cart.add_item(user_id, CartItem::new("66VCHSJNUP", 2));
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates an orchestrator over seeded in-memory collaborators.
///
/// Confirmations go over HTTP when `config.notification_url` is set. The
/// fakes record no calls and keep at most `config.demo_retention` charges,
/// shipments, confirmations and events.
/// Spans are written to the log.
pub fn create_default_state(
    config: &Config,
) -> Result<(Arc<AppState>, DemoCollaborators), MoneyError> {
    let usd = CurrencyCode::parse("USD")?;

    let recorder = CallRecorder::disabled();
    let retention = config.demo_retention;

    let catalog = InMemoryCatalogService::new().with_recorder(recorder.clone());
    for (id, name, units, nanos) in DEMO_CATALOG {
        catalog.add_product(*id, *name, Money::new(usd, *units, *nanos)?);
    }

    let demo = DemoCollaborators {
        cart: InMemoryCartService::new().with_recorder(recorder.clone()),
        catalog,
        currency: InMemoryCurrencyService::new().with_recorder(recorder.clone()),
        payment: InMemoryPaymentService::new()
            .with_recorder(recorder.clone())
            .with_retention(retention),
        shipping: InMemoryShippingService::new(Money::new(usd, 8, 990_000_000)?)
            .with_recorder(recorder.clone())
            .with_retention(retention),
        notification: InMemoryNotificationService::new()
            .with_recorder(recorder)
            .with_retention(retention),
        producer: InMemoryProducer::new().with_retention(retention),
        faults: StaticFaultPolicy::new(
            config.fault_payment_unreachable,
            config.fault_event_flood,
        ),
    };
    demo.fill_cart(&UserId::new(DEMO_USER));

    let notification: Arc<dyn NotificationService> = match &config.notification_url {
        Some(url) => Arc::new(HttpNotificationService::new(url.clone())),
        None => Arc::new(demo.notification.clone()),
    };

    let services = Collaborators {
        cart: Arc::new(demo.cart.clone()),
        catalog: Arc::new(demo.catalog.clone()),
        currency: Arc::new(demo.currency.clone()),
        payment: Arc::new(demo.payment.clone()),
        shipping: Arc::new(demo.shipping.clone()),
        notification,
    };
    let tracer = Tracer::with_sample_ratio(LogExporter, config.trace_sample_ratio);

    let clients = Clients::new(services, tracer);
    let orchestrator = OrderOrchestrator::new(clients, config.orchestrator_config())
        .with_producer(Arc::new(demo.producer.clone()))
        .with_fault_policy(Arc::new(demo.faults.clone()));

    Ok((Arc::new(AppState { orchestrator }), demo))
}
