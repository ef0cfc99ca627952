//! Checkout order placement.
//!
//! [`OrderOrchestrator::place_order`] turns a user's cart into a committed
//! order by calling independent collaborators in sequence:
//! 1. Validate the request
//! 2. Read the cart
//! 3. Price every item in the catalog currency
//! 4. Quote shipping
//! 5. Convert item prices and shipping to the user's currency and total the order
//! 6. Charge the card
//! 7. Ship the order
//! 8. Empty the cart (best-effort)
//! 9. Send the confirmation and publish the completion event (best-effort, background)
//!
//! Failures up to shipping abort the call. There is no compensation: an
//! order that was charged but failed to ship is reported as `ShippingFailed`.

pub mod clients;
pub mod context;
pub mod error;
pub mod events;
pub mod fault;
pub mod model;
pub mod orchestrator;
pub mod publisher;
pub mod services;
pub mod state;
pub mod steps;
pub mod transport;

pub use clients::{Clients, Collaborators};
pub use context::{CancellationToken, Interrupted, RequestContext};
pub use error::{BestEffortError, CheckoutError};
pub use events::OrderEvent;
pub use fault::{FaultPolicy, NoFaults, StaticFaultPolicy};
pub use model::{
    Address, CartItem, CartSnapshot, ChargeResult, CreditCardInfo, OrderItem, OrderResult,
    PlaceOrderRequest, ShippingQuote, ValidatedOrder, ValidationError,
};
pub use orchestrator::{OrchestratorConfig, OrderOrchestrator};
pub use publisher::{
    DeliveryReceipt, EventPublisher, InMemoryProducer, MessageProducer, OutboundMessage,
    PublishOutcome,
};
pub use services::{
    CallRecorder, CartService, CatalogService, CurrencyService, HttpNotificationService,
    InMemoryCartService, InMemoryCatalogService, InMemoryCurrencyService,
    InMemoryNotificationService, InMemoryPaymentService, InMemoryShippingService,
    NotificationService, PaymentService, RecordedCall, RetainedLog, ShippingService,
    UnreachablePaymentService,
};
pub use state::CheckoutState;
pub use steps::Step;
pub use transport::{HttpRequest, RpcRequest, TransportError};
