//! Order placement orchestration.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use common::{CurrencyCode, Money, MoneyError, OrderId};
use telemetry::{KeyValue, Span, SpanKind, SpanOps, record_failure};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::clients::Clients;
use crate::context::RequestContext;
use crate::error::{BestEffortError, CheckoutError};
use crate::fault::{FaultPolicy, NoFaults};
use crate::model::{CartSnapshot, OrderItem, OrderResult, PlaceOrderRequest};
use crate::publisher::{DEFAULT_PUBLISH_TIMEOUT, EventPublisher, MessageProducer, PublishOutcome};
use crate::state::CheckoutState;
use crate::steps::Step;

/// Settings of the orchestrator and its event publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Topic order completion events are published to.
    pub events_topic: String,
    /// Upper bound on one event publish, acknowledgement included.
    pub event_publish_timeout: Duration,
    /// Upper bound on sending the order confirmation.
    pub notification_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            events_topic: "orders".to_string(),
            event_publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            notification_timeout: Duration::from_secs(5),
        }
    }
}

/// Drives one `PlaceOrder` call through cart, pricing, payment and shipping.
///
/// Steps up to and including shipping are sequential and fatal on failure.
/// Emptying the cart is awaited but best-effort. The confirmation and the
/// completion event run as background tasks the caller never waits for;
/// [`OrderOrchestrator::drain_background`] awaits them.
pub struct OrderOrchestrator {
    clients: Clients,
    publisher: Option<EventPublisher>,
    faults: Arc<dyn FaultPolicy>,
    config: OrchestratorConfig,
    background: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for OrderOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderOrchestrator")
            .field("publisher", &self.publisher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrderOrchestrator {
    /// An orchestrator with no event publisher and no fault injection.
    pub fn new(clients: Clients, config: OrchestratorConfig) -> Self {
        Self {
            clients,
            publisher: None,
            faults: Arc::new(NoFaults),
            config,
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Publishes completion events through `producer` to the configured topic.
    pub fn with_producer(mut self, producer: Arc<dyn MessageProducer>) -> Self {
        let publisher = EventPublisher::new(
            producer,
            self.clients.tracer().clone(),
            self.config.events_topic.clone(),
        )
        .with_timeout(self.config.event_publish_timeout);
        self.publisher = Some(publisher);
        self
    }

    pub fn with_fault_policy(mut self, faults: Arc<dyn FaultPolicy>) -> Self {
        self.faults = faults;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Places an order for the requesting user.
    ///
    /// The server span is a child of the inbound context in `ctx`; every
    /// collaborator call below it is a child of that span.
    #[tracing::instrument(
        skip(self, ctx, request),
        fields(user_id = %request.user_id, currency = %request.user_currency)
    )]
    pub async fn place_order(
        &self,
        ctx: &RequestContext,
        request: PlaceOrderRequest,
    ) -> Result<OrderResult, CheckoutError> {
        metrics::counter!("checkout_orders_total").increment(1);
        let started = Instant::now();

        let mut span = self
            .clients
            .tracer()
            .start_span("PlaceOrder", SpanKind::Server, ctx.parent());
        span.set_attributes([
            KeyValue::new("app.user.id", request.user_id.to_string()),
            KeyValue::new("app.user.currency", request.user_currency.clone()),
        ]);
        let ctx = ctx.with_parent(span.span_context().clone());

        let result = self.execute(&ctx, &mut span, request).await;

        match &result {
            Ok(order) => {
                tracing::info!(
                    order_id = %order.order_id,
                    total = %order.total_cost,
                    tracking_id = %order.shipping_tracking_id,
                    "order placed"
                );
            }
            Err(err) => {
                record_failure(&mut span, err);
                metrics::counter!("checkout_orders_failed_total", "step" => err.step().as_str())
                    .increment(1);
                tracing::warn!(step = %err.step(), error = %err, "order placement failed");
            }
        }

        metrics::histogram!("checkout_order_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        span.end();
        result
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        span: &mut Span,
        request: PlaceOrderRequest,
    ) -> Result<OrderResult, CheckoutError> {
        let mut state = CheckoutState::default();

        // 1. Validate
        let order = request.validate()?;
        let order_id = OrderId::new();
        span.set_attribute(KeyValue::new("app.order.id", order_id.to_string()));

        // 2. Fetch cart
        let cart = self.clients.get_cart(ctx, &order.user_id).await?;
        state = advance(state, order_id);

        // 3. Look up catalog prices
        let catalog_items = self.fetch_prices(ctx, &cart).await?;

        // 4. Quote shipping
        let quote = self
            .clients
            .quote_shipping(ctx, &order.address, cart.items())
            .await?;

        // 5. Convert and total
        let items = self
            .convert_items(ctx, catalog_items, order.currency)
            .await?;
        let shipping_cost = self
            .to_currency(ctx, quote.cost, order.currency)
            .await?;
        let total = order_total(order.currency, &items, &shipping_cost).map_err(|source| {
            CheckoutError::InvalidAmount {
                step: Step::PrepareTotal,
                source,
            }
        })?;
        span.add_event(
            "prepared",
            vec![
                KeyValue::new("app.order.items.count", items.len() as i64),
                KeyValue::new("app.shipping.amount", shipping_cost.to_f64()),
            ],
        );
        state = advance(state, order_id);

        // 6. Charge
        let redirect = self.faults.should_redirect_payment();
        if redirect {
            tracing::warn!(%order_id, "fault policy redirected payment to an unreachable endpoint");
        }
        let charge = self
            .clients
            .charge(ctx, total, &order.credit_card, redirect)
            .await?;
        span.add_event(
            "charged",
            vec![KeyValue::new(
                "app.payment.transaction.id",
                charge.transaction_id.clone(),
            )],
        );
        tracing::info!(
            %order_id,
            transaction_id = %charge.transaction_id,
            amount = %total,
            "payment charged"
        );
        state = advance(state, order_id);

        // 7. Ship
        let tracking_id = match self
            .clients
            .ship_order(ctx, &order.address, cart.items())
            .await
        {
            Ok(tracking_id) => tracking_id,
            Err(err) => {
                if state.is_charged() {
                    tracing::error!(
                        %order_id,
                        transaction_id = %charge.transaction_id,
                        "order charged but not shipped; no refund issued"
                    );
                }
                return Err(err);
            }
        };
        span.add_event(
            "shipped",
            vec![KeyValue::new("app.shipping.tracking.id", tracking_id.clone())],
        );
        state = advance(state, order_id);

        // 8. Empty cart
        if let Err(err) = self.clients.empty_cart(ctx, &order.user_id).await {
            record_best_effort_failure(Some(&mut *span), &err);
        }
        state = advance(state, order_id);

        // 9. Assemble
        let result = OrderResult {
            order_id,
            shipping_tracking_id: tracking_id,
            shipping_cost,
            shipping_address: order.address,
            items,
            total_cost: total,
        };
        span.set_attributes([
            KeyValue::new("app.order.amount", total.to_f64()),
            KeyValue::new("app.order.items.count", result.items.len() as i64),
            KeyValue::new("app.shipping.amount", shipping_cost.to_f64()),
            KeyValue::new(
                "app.shipping.tracking.id",
                result.shipping_tracking_id.clone(),
            ),
        ]);

        // 10. Confirmation and completion event
        self.spawn_follow_ups(ctx, order.email, &result);
        advance(state, order_id);

        Ok(result)
    }

    /// Each cart line with its unit price in the catalog's currency.
    async fn fetch_prices(
        &self,
        ctx: &RequestContext,
        cart: &CartSnapshot,
    ) -> Result<Vec<OrderItem>, CheckoutError> {
        let mut items = Vec::with_capacity(cart.len());
        for item in cart.items() {
            let cost = self.clients.get_price(ctx, &item.product_id).await?;
            items.push(OrderItem {
                item: item.clone(),
                cost,
            });
        }
        Ok(items)
    }

    async fn convert_items(
        &self,
        ctx: &RequestContext,
        items: Vec<OrderItem>,
        currency: CurrencyCode,
    ) -> Result<Vec<OrderItem>, CheckoutError> {
        let mut converted = Vec::with_capacity(items.len());
        for OrderItem { item, cost } in items {
            let cost = self.to_currency(ctx, cost, currency).await?;
            converted.push(OrderItem { item, cost });
        }
        Ok(converted)
    }

    async fn to_currency(
        &self,
        ctx: &RequestContext,
        amount: Money,
        currency: CurrencyCode,
    ) -> Result<Money, CheckoutError> {
        if amount.currency() == currency {
            return Ok(amount);
        }
        self.clients.convert(ctx, amount, currency).await
    }

    fn spawn_follow_ups(&self, ctx: &RequestContext, email: String, order: &OrderResult) {
        let detached = ctx.detached();
        let follow_up = tracing::info_span!("order_follow_up", order_id = %order.order_id);
        let mut tasks = self.tasks();
        reap_finished(&mut tasks);

        if email.is_empty() {
            tracing::info!(order_id = %order.order_id, "no email on request; skipping confirmation");
        } else {
            let clients = self.clients.clone();
            let ctx = detached.clone().with_timeout(self.config.notification_timeout);
            let order = order.clone();
            tasks.spawn(
                async move {
                    match clients.send_confirmation(&ctx, &email, &order).await {
                        Ok(()) => tracing::debug!("order confirmation sent"),
                        Err(err) => record_best_effort_failure(None, &err),
                    }
                }
                .instrument(follow_up.clone()),
            );
        }

        if let Some(publisher) = &self.publisher {
            let publisher = publisher.clone();
            let copies = 1 + self.faults.extra_event_copies();
            let order = order.clone();
            tasks.spawn(
                async move {
                    for _ in 0..copies {
                        // The publisher logs its own failures.
                        if let PublishOutcome::Failed(err) =
                            publisher.publish(&detached, &order).await
                        {
                            count_best_effort_failure(&err);
                        }
                    }
                }
                .instrument(follow_up),
            );
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of background tasks still running.
    pub fn pending_background(&self) -> usize {
        let mut tasks = self.tasks();
        reap_finished(&mut tasks);
        tasks.len()
    }

    /// Waits for every background task spawned so far; returns how many there were.
    pub async fn drain_background(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks());
        let mut drained = 0;
        while let Some(joined) = tasks.join_next().await {
            drained += 1;
            if let Err(err) = joined {
                tracing::warn!(error = %err, "background task did not complete");
            }
        }
        drained
    }
}

/// Drops finished tasks from the set so it only holds running ones.
fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.try_join_next() {
        if let Err(err) = joined {
            tracing::warn!(error = %err, "background task did not complete");
        }
    }
}

fn advance(state: CheckoutState, order_id: OrderId) -> CheckoutState {
    let next = state.next().unwrap_or(state);
    tracing::debug!(%order_id, from = %state, to = %next, "checkout state changed");
    next
}

/// `Σ cost × quantity + shipping`, all in `currency`.
fn order_total(
    currency: CurrencyCode,
    items: &[OrderItem],
    shipping_cost: &Money,
) -> Result<Money, MoneyError> {
    let line_totals = items
        .iter()
        .map(OrderItem::line_total)
        .collect::<Result<Vec<_>, _>>()?;
    Money::sum(currency, &line_totals)?.add(shipping_cost)
}

fn count_best_effort_failure(err: &BestEffortError) {
    metrics::counter!("checkout_best_effort_failures_total", "step" => err.step().as_str())
        .increment(1);
}

fn record_best_effort_failure(span: Option<&mut Span>, err: &BestEffortError) {
    let step = err.step();
    count_best_effort_failure(err);
    tracing::warn!(step = %step, error = %err, "best-effort step failed");
    if let Some(span) = span {
        span.add_event(
            format!("{step} failed"),
            vec![KeyValue::new("exception.message", err.to_string())],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CartItem;
    use common::NANOS_PER_UNIT;
    use proptest::prelude::*;

    fn usd(units: i64, nanos: i32) -> Money {
        Money::new(CurrencyCode::parse("USD").unwrap(), units, nanos).unwrap()
    }

    #[test]
    fn test_order_total() {
        let items = vec![
            OrderItem {
                item: CartItem::new("SKU1", 2),
                cost: usd(10, 0),
            },
            OrderItem {
                item: CartItem::new("SKU2", 3),
                cost: usd(0, 990_000_000),
            },
        ];
        let total = order_total(usd(0, 0).currency(), &items, &usd(5, 0)).unwrap();
        assert_eq!(total, usd(27, 970_000_000));
    }

    #[test]
    fn test_empty_order_costs_shipping_only() {
        let total = order_total(usd(0, 0).currency(), &[], &usd(5, 0)).unwrap();
        assert_eq!(total, usd(5, 0));
    }

    #[test]
    fn test_order_total_rejects_mixed_currencies() {
        let eur = Money::from_units(CurrencyCode::parse("EUR").unwrap(), 5);
        let err = order_total(usd(0, 0).currency(), &[], &eur).unwrap_err();
        assert!(matches!(err, MoneyError::CurrencyMismatch { .. }));
    }

    fn as_nanos(money: &Money) -> i128 {
        i128::from(money.units()) * i128::from(NANOS_PER_UNIT) + i128::from(money.nanos())
    }

    fn price() -> impl Strategy<Value = (i64, i32)> {
        (0i64..1_000_000, 0..NANOS_PER_UNIT)
    }

    proptest! {
        #[test]
        fn order_total_matches_nano_arithmetic(
            lines in prop::collection::vec((price(), 1u32..100), 0..8),
            shipping in price(),
        ) {
            let items: Vec<OrderItem> = lines
                .iter()
                .enumerate()
                .map(|(i, ((units, nanos), quantity))| OrderItem {
                    item: CartItem::new(format!("SKU{i}"), *quantity),
                    cost: usd(*units, *nanos),
                })
                .collect();
            let shipping = usd(shipping.0, shipping.1);

            let expected = lines
                .iter()
                .map(|((units, nanos), quantity)| {
                    (i128::from(*units) * i128::from(NANOS_PER_UNIT) + i128::from(*nanos))
                        * i128::from(*quantity)
                })
                .sum::<i128>()
                + as_nanos(&shipping);

            let total = order_total(shipping.currency(), &items, &shipping).unwrap();
            prop_assert_eq!(as_nanos(&total), expected);
            prop_assert!(total.nanos() >= 0 && total.nanos() < NANOS_PER_UNIT);
        }
    }

    #[test]
    fn test_sub_unit_discount_offsets_total() {
        let items = vec![OrderItem {
            item: CartItem::new("SKU1", 1),
            cost: usd(3, 0),
        }];
        let total = order_total(usd(0, 0).currency(), &items, &usd(0, -250_000_000)).unwrap();
        assert_eq!(total, usd(2, 750_000_000));
    }

    #[test]
    fn test_advance_stops_at_terminal_state() {
        let id = OrderId::new();
        assert_eq!(
            advance(CheckoutState::Validating, id),
            CheckoutState::CartFetched
        );
        assert_eq!(
            advance(CheckoutState::Completed, id),
            CheckoutState::Completed
        );
    }
}
