//! Distributed tracing plumbing for the checkout service.
//!
//! - [`SpanContext`] and [`Baggage`]: the request's position in a trace
//!   plus arbitrary key/value data riding along with it
//! - Carriers ([`RpcMetadata`], [`HttpHeaders`], [`MessageHeaders`]) that
//!   serialize a [`PropagatedContext`] into each transport's native headers
//!   using the W3C `traceparent` and `baggage` formats
//! - [`Tracer`]: an explicitly passed span factory over the `opentelemetry`
//!   SDK with pluggable exporters; there is no process-wide tracer

pub mod carrier;
pub mod context;
pub mod tracer;

pub use carrier::{ContextCarrier, HttpHeaders, MessageHeaders, RpcMetadata, extract, inject};
pub use context::{Baggage, PropagatedContext};
pub use opentelemetry::trace::{SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState};
pub use opentelemetry::{KeyValue, Value};
pub use opentelemetry_sdk::export::trace::{SpanData, SpanExporter};
pub use tracer::{
    FinishedSpan, InMemoryExporter, LogExporter, Span, SpanOps, Tracer, record_failure,
};
