//! Typed calls to every collaborator.
//!
//! Each call starts a client span under the context's active span, injects
//! that span into a fresh carrier just before sending, races the call
//! against the caller's cancellation and deadline, validates the raw
//! response and classifies any failure for its step.

use std::future::Future;
use std::sync::Arc;

use common::{CurrencyCode, Money, ProductId, UserId};
use telemetry::{
    ContextCarrier, HttpHeaders, KeyValue, RpcMetadata, SpanKind, SpanOps, Tracer, record_failure,
};
use thiserror::Error;

use crate::context::{Interrupted, RequestContext};
use crate::error::{BestEffortError, CheckoutError};
use crate::model::{Address, CartItem, CartSnapshot, ChargeResult, CreditCardInfo, OrderResult, ShippingQuote};
use crate::services::{
    CartService, CatalogService, ChargeRequest, ConvertRequest, CurrencyService,
    NotificationService, OrderConfirmation, PaymentService, ShippingRequest, ShippingService,
    UnreachablePaymentService, cart, catalog, currency, notification, payment, shipping,
};
use crate::steps::Step;
use crate::transport::{HttpRequest, RpcRequest, TransportError};

/// Address the payment fault redirect points at.
pub const UNREACHABLE_PAYMENT_ADDRESS: &str = "badAddress:5000";

/// Every collaborator the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub cart: Arc<dyn CartService>,
    pub catalog: Arc<dyn CatalogService>,
    pub currency: Arc<dyn CurrencyService>,
    pub payment: Arc<dyn PaymentService>,
    pub shipping: Arc<dyn ShippingService>,
    pub notification: Arc<dyn NotificationService>,
}

struct Operation {
    service: &'static str,
    method: &'static str,
    step: Step,
}

impl Operation {
    const fn new(service: &'static str, method: &'static str, step: Step) -> Self {
        Self {
            service,
            method,
            step,
        }
    }
}

#[derive(Debug, Error)]
enum CallFailure {
    #[error(transparent)]
    Interrupted(Interrupted),
    #[error(transparent)]
    Transport(TransportError),
}

impl CallFailure {
    /// Classifies the failure of a mandatory step.
    fn fatal(self, step: Step, wrap: impl FnOnce(TransportError) -> CheckoutError) -> CheckoutError {
        match self {
            CallFailure::Interrupted(Interrupted::Cancelled) => CheckoutError::Cancelled { step },
            CallFailure::Interrupted(Interrupted::DeadlineExceeded) => {
                CheckoutError::DeadlineExceeded { step }
            }
            CallFailure::Transport(source) => wrap(source),
        }
    }

    fn into_transport(self) -> TransportError {
        match self {
            CallFailure::Interrupted(interrupted) => interrupted.into(),
            CallFailure::Transport(source) => source,
        }
    }
}

/// Typed client over [`Collaborators`].
#[derive(Clone)]
pub struct Clients {
    services: Collaborators,
    unreachable_payment: Arc<dyn PaymentService>,
    tracer: Tracer,
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients")
            .field("tracer", &self.tracer)
            .finish_non_exhaustive()
    }
}

impl Clients {
    pub fn new(services: Collaborators, tracer: Tracer) -> Self {
        Self {
            services,
            unreachable_payment: Arc::new(UnreachablePaymentService::new(
                UNREACHABLE_PAYMENT_ADDRESS,
            )),
            tracer,
        }
    }

    /// Replaces the payment endpoint used when the fault redirect is active.
    pub fn with_unreachable_payment(mut self, payment: Arc<dyn PaymentService>) -> Self {
        self.unreachable_payment = payment;
        self
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    async fn call<C, T, F, Fut>(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        send: F,
    ) -> Result<T, CallFailure>
    where
        C: ContextCarrier + Default,
        F: FnOnce(C) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut span = self.tracer.start_span(
            format!("{}/{}", operation.service, operation.method),
            SpanKind::Client,
            ctx.parent(),
        );
        span.set_attributes([
            KeyValue::new("rpc.service", operation.service),
            KeyValue::new("rpc.method", operation.method),
            KeyValue::new("app.step", operation.step.as_str()),
        ]);

        let mut carrier = C::default();
        carrier.inject(&ctx.propagated().with_parent(span.span_context().clone()));

        let result = match ctx.run(send(carrier)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => Err(CallFailure::Transport(source)),
            Err(interrupted) => Err(CallFailure::Interrupted(interrupted)),
        };

        if let Err(failure) = &result {
            record_failure(&mut span, failure);
        }
        span.end();
        result
    }

    /// Reads and validates the user's cart.
    pub async fn get_cart(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
    ) -> Result<CartSnapshot, CheckoutError> {
        let cart = &self.services.cart;
        self.call(
            ctx,
            Operation::new(cart::SERVICE, "GetCart", Step::GetCart),
            |metadata: RpcMetadata| async move {
                let response = cart
                    .get_cart(RpcRequest::new(metadata, user_id.clone()))
                    .await?;
                if response.user_id != *user_id {
                    return Err(TransportError::invalid_response(format!(
                        "cart belongs to {}, expected {user_id}",
                        response.user_id
                    )));
                }
                CartSnapshot::from_items(response.items).map_err(TransportError::InvalidResponse)
            },
        )
        .await
        .map_err(|failure| {
            failure.fatal(Step::GetCart, |source| CheckoutError::CartUnavailable {
                user_id: user_id.clone(),
                source,
            })
        })
    }

    /// Looks up the unit price of one product.
    pub async fn get_price(
        &self,
        ctx: &RequestContext,
        product_id: &ProductId,
    ) -> Result<Money, CheckoutError> {
        let catalog = &self.services.catalog;
        self.call(
            ctx,
            Operation::new(catalog::SERVICE, "GetProduct", Step::GetProduct),
            |metadata: RpcMetadata| async move {
                let product = catalog
                    .get_product(RpcRequest::new(metadata, product_id.clone()))
                    .await?;
                if product.id != *product_id {
                    return Err(TransportError::invalid_response(format!(
                        "asked for product {product_id}, got {}",
                        product.id
                    )));
                }
                product.price.ok_or_else(|| {
                    TransportError::invalid_response(format!("product {product_id} has no price"))
                })
            },
        )
        .await
        .map_err(|failure| {
            failure.fatal(Step::GetProduct, |source| CheckoutError::CatalogUnavailable {
                product_id: product_id.clone(),
                source,
            })
        })
    }

    /// Converts `amount` into `to` through the pricing collaborator.
    pub async fn convert(
        &self,
        ctx: &RequestContext,
        amount: Money,
        to: CurrencyCode,
    ) -> Result<Money, CheckoutError> {
        let pricing = &self.services.currency;
        self.call(
            ctx,
            Operation::new(currency::SERVICE, "Convert", Step::ConvertCurrency),
            |metadata: RpcMetadata| async move {
                let converted = pricing
                    .convert(RpcRequest::new(
                        metadata,
                        ConvertRequest {
                            from: amount,
                            to_code: to,
                        },
                    ))
                    .await?;
                if converted.currency() != to {
                    return Err(TransportError::invalid_response(format!(
                        "converted amount is in {}, expected {to}",
                        converted.currency()
                    )));
                }
                Ok(converted)
            },
        )
        .await
        .map_err(|failure| {
            failure.fatal(Step::ConvertCurrency, |source| {
                CheckoutError::PricingUnavailable {
                    from: amount.currency(),
                    to,
                    source,
                }
            })
        })
    }

    pub async fn quote_shipping(
        &self,
        ctx: &RequestContext,
        address: &Address,
        items: &[CartItem],
    ) -> Result<ShippingQuote, CheckoutError> {
        let shipping = &self.services.shipping;
        self.call(
            ctx,
            Operation::new(shipping::SERVICE, "GetQuote", Step::QuoteShipping),
            |metadata: RpcMetadata| async move {
                let quote = shipping
                    .get_quote(RpcRequest::new(
                        metadata,
                        ShippingRequest {
                            address: address.clone(),
                            items: items.to_vec(),
                        },
                    ))
                    .await?;
                let cost = quote
                    .cost
                    .ok_or_else(|| TransportError::invalid_response("quote has no cost"))?;
                if cost.is_negative() {
                    return Err(TransportError::invalid_response(format!(
                        "negative shipping quote {cost}"
                    )));
                }
                Ok(ShippingQuote { cost })
            },
        )
        .await
        .map_err(|failure| failure.fatal(Step::QuoteShipping, CheckoutError::ShippingQuoteFailed))
    }

    /// Charges the card. With `redirect` set the charge goes to the
    /// unreachable endpoint instead.
    pub async fn charge(
        &self,
        ctx: &RequestContext,
        amount: Money,
        credit_card: &CreditCardInfo,
        redirect: bool,
    ) -> Result<ChargeResult, CheckoutError> {
        let payment = if redirect {
            &self.unreachable_payment
        } else {
            &self.services.payment
        };
        self.call(
            ctx,
            Operation::new(payment::SERVICE, "Charge", Step::ChargePayment),
            |metadata: RpcMetadata| async move {
                let response = payment
                    .charge(RpcRequest::new(
                        metadata,
                        ChargeRequest {
                            amount,
                            credit_card: credit_card.clone(),
                        },
                    ))
                    .await?;
                if response.transaction_id.trim().is_empty() {
                    return Err(TransportError::invalid_response(
                        "charge returned no transaction id",
                    ));
                }
                Ok(ChargeResult {
                    transaction_id: response.transaction_id,
                })
            },
        )
        .await
        .map_err(|failure| failure.fatal(Step::ChargePayment, CheckoutError::PaymentFailed))
    }

    /// Hands the order to fulfillment, returning the tracking id.
    pub async fn ship_order(
        &self,
        ctx: &RequestContext,
        address: &Address,
        items: &[CartItem],
    ) -> Result<String, CheckoutError> {
        let shipping = &self.services.shipping;
        self.call(
            ctx,
            Operation::new(shipping::SERVICE, "ShipOrder", Step::ShipOrder),
            |metadata: RpcMetadata| async move {
                let response = shipping
                    .ship_order(RpcRequest::new(
                        metadata,
                        ShippingRequest {
                            address: address.clone(),
                            items: items.to_vec(),
                        },
                    ))
                    .await?;
                if response.tracking_id.trim().is_empty() {
                    return Err(TransportError::invalid_response(
                        "shipment has no tracking id",
                    ));
                }
                Ok(response.tracking_id)
            },
        )
        .await
        .map_err(|failure| failure.fatal(Step::ShipOrder, CheckoutError::ShippingFailed))
    }

    pub async fn empty_cart(
        &self,
        ctx: &RequestContext,
        user_id: &UserId,
    ) -> Result<(), BestEffortError> {
        let cart = &self.services.cart;
        self.call(
            ctx,
            Operation::new(cart::SERVICE, "EmptyCart", Step::EmptyCart),
            |metadata: RpcMetadata| cart.empty_cart(RpcRequest::new(metadata, user_id.clone())),
        )
        .await
        .map_err(|failure| BestEffortError::CartClearFailed(failure.into_transport()))
    }

    /// Sends the order confirmation over HTTP.
    pub async fn send_confirmation(
        &self,
        ctx: &RequestContext,
        email: &str,
        order: &OrderResult,
    ) -> Result<(), BestEffortError> {
        let notifier = &self.services.notification;
        self.call(
            ctx,
            Operation::new(
                notification::SERVICE,
                "SendOrderConfirmation",
                Step::SendConfirmation,
            ),
            |headers: HttpHeaders| {
                notifier.send_order_confirmation(HttpRequest::new(
                    headers,
                    OrderConfirmation {
                        email: email.to_string(),
                        order: order.clone(),
                    },
                ))
            },
        )
        .await
        .map_err(|failure| BestEffortError::NotificationFailed(failure.into_transport()))
    }
}
