//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;

use api::DemoCollaborators;
use api::config::Config;
use api::routes::orders::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use telemetry::ContextCarrier;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, Arc<AppState>, DemoCollaborators) {
    let (state, demo) = api::create_default_state(&Config::default()).unwrap();
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state, demo)
}

fn order_body(currency: &str) -> serde_json::Value {
    serde_json::json!({
        "user_id": api::DEMO_USER,
        "user_currency": currency,
        "address": {
            "street_address": "1600 Amphitheatre Parkway",
            "city": "Mountain View",
            "state": "CA",
            "country": "United States",
            "zip_code": "94043"
        },
        "email": "someone@example.com",
        "credit_card": {
            "credit_card_number": "4432-8015-6152-0454",
            "credit_card_cvv": 672,
            "credit_card_expiration_year": 2030,
            "credit_card_expiration_month": 1
        }
    })
}

fn post_order(body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["pending_background_tasks"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_place_order() {
    let (app, state, demo) = setup();

    let response = app.oneshot(post_order(&order_body("USD"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let order = json_body(response).await;
    assert!(order["order_id"].as_str().is_some());
    assert_eq!(order["shipping_tracking_id"], "TRACK-0001");
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    // 19.99 + 2 * 18.99 + 8.99 shipping
    assert_eq!(order["total_cost"]["currency_code"], "USD");
    assert_eq!(order["total_cost"]["units"], 66);
    assert_eq!(order["total_cost"]["nanos"], 960_000_000);

    assert!(demo.cart.items(&api::DEMO_USER.into()).is_empty());
    assert_eq!(demo.payment.charge_count(), 1);

    state.orchestrator.drain_background().await;
    assert_eq!(demo.notification.sent().len(), 1);
    assert_eq!(demo.producer.message_count(), 1);
}

#[tokio::test]
async fn test_order_in_other_currency_is_converted() {
    let (app, _, _) = setup();

    let response = app.oneshot(post_order(&order_body("EUR"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let order = json_body(response).await;
    assert_eq!(order["total_cost"]["currency_code"], "EUR");
    assert_eq!(order["shipping_cost"]["currency_code"], "EUR");
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let (app, _, demo) = setup();

    let mut body = order_body("USD");
    body["address"] = serde_json::Value::Null;
    let response = app.oneshot(post_order(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["step"], "validate");
    assert!(json["error"].as_str().unwrap().contains("address"));
    assert_eq!(demo.payment.charge_count(), 0);
    assert_eq!(demo.cart.items(&api::DEMO_USER.into()).len(), 2);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let (app, _, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].as_str().is_some());
}

#[tokio::test]
async fn test_unreachable_payment_returns_payment_required() {
    let (app, _, demo) = setup();
    demo.faults.set_redirect_payment(true);

    let response = app.oneshot(post_order(&order_body("USD"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let json = json_body(response).await;
    assert_eq!(json["step"], "charge_payment");
    assert!(json["error"].as_str().unwrap().contains("badAddress:5000"));
    assert_eq!(demo.payment.charge_count(), 0);
    assert_eq!(demo.shipping.shipment_count(), 0);
}

#[tokio::test]
async fn test_collaborator_failure_returns_bad_gateway() {
    let (app, _, demo) = setup();
    demo.catalog.set_fail_on("66VCHSJNUP", true);

    let response = app.oneshot(post_order(&order_body("USD"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = json_body(response).await;
    assert_eq!(json["step"], "get_product");
    assert!(json["error"].as_str().unwrap().contains("66VCHSJNUP"));
}

#[tokio::test]
async fn test_inbound_trace_reaches_order_event() {
    let (app, state, demo) = setup();

    let mut request = post_order(&order_body("USD"));
    request
        .headers_mut()
        .insert("traceparent", TRACEPARENT.parse().unwrap());
    request
        .headers_mut()
        .insert("baggage", "session=abc123".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    state.orchestrator.drain_background().await;

    let messages = demo.producer.messages();
    assert_eq!(messages.len(), 1);
    let propagated = messages[0].headers.extract();
    assert_eq!(
        propagated.parent.unwrap().trace_id().to_string(),
        "4bf92f3577b34da6a3ce929d0e0e4736"
    );
    assert_eq!(propagated.baggage.get("session"), Some("abc123"));
}

#[tokio::test]
async fn test_event_flood_publishes_copies() {
    let config = Config {
        fault_event_flood: 2,
        ..Config::default()
    };
    let (state, demo) = api::create_default_state(&config).unwrap();
    let app = api::create_app(state.clone(), get_metrics_handle());

    let response = app.oneshot(post_order(&order_body("USD"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    state.orchestrator.drain_background().await;
    assert_eq!(demo.producer.message_count(), 3);
}

#[tokio::test]
async fn test_demo_state_stays_bounded_under_steady_traffic() {
    let config = Config {
        demo_retention: 20,
        ..Config::default()
    };
    let (state, demo) = api::create_default_state(&config).unwrap();
    let app = api::create_app(state.clone(), get_metrics_handle());
    let user = common::UserId::new(api::DEMO_USER);

    for _ in 0..200 {
        demo.fill_cart(&user);
        let response = app
            .clone()
            .oneshot(post_order(&order_body("USD")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    state.orchestrator.drain_background().await;

    assert_eq!(demo.payment.charge_count(), 200);
    assert_eq!(demo.payment.retained_charges(), 20);
    assert_eq!(demo.shipping.shipment_count(), 200);
    assert_eq!(demo.shipping.retained_shipments(), 20);
    assert_eq!(demo.notification.sent_count(), 200);
    assert_eq!(demo.notification.sent().len(), 20);
    assert_eq!(demo.producer.message_count(), 200);
    assert_eq!(demo.producer.retained_messages(), 20);

    assert!(demo.cart.recorder().calls().is_empty());
    assert!(demo.payment.recorder().calls().is_empty());
    assert_eq!(state.orchestrator.pending_background(), 0);
}
