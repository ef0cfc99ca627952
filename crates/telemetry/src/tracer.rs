//! Span creation and export on the `opentelemetry` SDK.
//!
//! A [`Tracer`] owns its SDK provider and is handed to whatever needs to
//! create spans; nothing reads or installs a global. New traces are sampled
//! by trace-id ratio, child spans follow their parent's decision, and ids
//! come from the SDK's random id generator.

use std::borrow::Cow;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use opentelemetry::trace::{
    Event, SpanContext, SpanId, SpanKind, Status, TraceContextExt, TraceError, Tracer as _,
    TracerProvider as _,
};
use opentelemetry::{Context, Value};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::trace::{self as sdktrace, RandomIdGenerator, Sampler, TracerProvider};

pub use opentelemetry::trace::Span as SpanOps;
pub use opentelemetry_sdk::trace::Span;

const INSTRUMENTATION_NAME: &str = "checkout";

type ExportFuture = Pin<Box<dyn Future<Output = ExportResult> + Send + 'static>>;

/// Records `error` as an `exception` event and marks the span failed.
pub fn record_failure(span: &mut impl SpanOps, error: &dyn std::error::Error) {
    span.record_error(error);
    span.set_status(Status::error(error.to_string()));
}

/// Lookups over a finished span, mostly for assertions.
pub trait FinishedSpan {
    /// Last value recorded for `key`.
    fn attribute(&self, key: &str) -> Option<&Value>;

    /// First event named `name`.
    fn event(&self, name: &str) -> Option<&Event>;

    fn is_error(&self) -> bool;

    /// Parent span id, `None` for a root span.
    fn parent(&self) -> Option<SpanId>;
}

impl FinishedSpan for SpanData {
    fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .rev()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    fn event(&self, name: &str) -> Option<&Event> {
        self.events.iter().find(|event| event.name == name)
    }

    fn is_error(&self) -> bool {
        matches!(self.status, Status::Error { .. })
    }

    fn parent(&self) -> Option<SpanId> {
        (self.parent_span_id != SpanId::INVALID).then_some(self.parent_span_id)
    }
}

/// Writes every finished span as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> ExportFuture {
        for span in batch {
            let duration_ms = span
                .end_time
                .duration_since(span.start_time)
                .map(|elapsed| elapsed.as_millis() as u64)
                .unwrap_or_default();
            tracing::debug!(
                target: "telemetry::spans",
                trace_id = %span.span_context.trace_id(),
                span_id = %span.span_context.span_id(),
                parent_span_id = ?span.parent().map(|id| id.to_string()),
                name = %span.name,
                kind = ?span.span_kind,
                status = ?span.status,
                events = span.events.len(),
                duration_ms,
                "span finished"
            );
        }
        Box::pin(future::ready(Ok(())))
    }
}

/// Collects finished spans in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans exported so far, in end order.
    pub fn spans(&self) -> Vec<SpanData> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The first finished span with the given name.
    pub fn find(&self, name: &str) -> Option<SpanData> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|span| span.name == name)
            .cloned()
    }

    pub fn reset(&self) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> ExportFuture {
        let result = match self.spans.lock() {
            Ok(mut spans) => {
                spans.extend(batch);
                Ok(())
            }
            Err(_) => Err(TraceError::from("in-memory span store poisoned")),
        };
        Box::pin(future::ready(result))
    }
}

/// Creates spans through an owned SDK provider.
#[derive(Debug, Clone)]
pub struct Tracer {
    provider: TracerProvider,
    tracer: sdktrace::Tracer,
    sample_ratio: f64,
}

impl Tracer {
    /// A tracer that samples every new trace.
    pub fn new(exporter: impl SpanExporter + 'static) -> Self {
        Self::with_sample_ratio(exporter, 1.0)
    }

    /// Samples `ratio` of new traces, clamped to `[0, 1]`.
    pub fn with_sample_ratio(exporter: impl SpanExporter + 'static, ratio: f64) -> Self {
        let ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };

        let provider = TracerProvider::builder()
            .with_config(
                sdktrace::config()
                    .with_sampler(Sampler::ParentBased(Box::new(
                        Sampler::TraceIdRatioBased(ratio),
                    )))
                    .with_id_generator(RandomIdGenerator::default()),
            )
            .with_simple_exporter(exporter)
            .build();
        let tracer = provider.tracer(INSTRUMENTATION_NAME);

        Self {
            provider,
            tracer,
            sample_ratio: ratio,
        }
    }

    pub fn sample_ratio(&self) -> f64 {
        self.sample_ratio
    }

    /// Starts a span; a valid `parent` makes it a child in the parent's trace.
    pub fn start_span(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        parent: Option<&SpanContext>,
    ) -> Span {
        let parent_cx = match parent.filter(|p| p.is_valid()) {
            Some(parent) => Context::new().with_remote_span_context(parent.clone()),
            None => Context::new(),
        };

        self.tracer
            .span_builder(name)
            .with_kind(kind)
            .start_with_context(&self.tracer, &parent_cx)
    }

    /// Blocks until every span ended so far has reached the exporter.
    pub fn force_flush(&self) {
        for result in self.provider.force_flush() {
            if let Err(err) = result {
                tracing::warn!(error = %err, "span flush failed");
            }
        }
    }
}
