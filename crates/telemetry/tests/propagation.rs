//! Inject/extract round trips across every carrier kind.

use proptest::prelude::*;
use telemetry::{
    Baggage, ContextCarrier, HttpHeaders, InMemoryExporter, MessageHeaders, PropagatedContext,
    RpcMetadata, SpanContext, SpanId, SpanKind, SpanOps, TraceFlags, TraceId, TraceState, Tracer,
};

fn span_context() -> impl Strategy<Value = SpanContext> {
    (1u128..=u128::MAX, 1u64..=u64::MAX, any::<bool>()).prop_map(|(trace, span, sampled)| {
        let flags = if sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        SpanContext::new(
            TraceId::from_bytes(trace.to_be_bytes()),
            SpanId::from_bytes(span.to_be_bytes()),
            flags,
            false,
            TraceState::default(),
        )
    })
}

/// Keys and values drawn from the whole of Unicode, including whitespace
/// and the characters the baggage header uses as delimiters.
fn baggage() -> impl Strategy<Value = Baggage> {
    proptest::collection::hash_map("\\PC{1,12}", "[ \\t,;=%]{0,2}\\PC{0,16}[ \\t]{0,2}", 0..8)
        .prop_map(|entries| entries.into_iter().collect())
}

fn round_trip<C: ContextCarrier + Default>(context: &PropagatedContext) -> PropagatedContext {
    let mut carrier = C::default();
    carrier.inject(context);
    carrier.extract()
}

fn assert_round_trip(sent: &PropagatedContext, received: &PropagatedContext) {
    let sent_parent = sent.parent.as_ref().unwrap();
    let received_parent = received
        .parent
        .as_ref()
        .expect("parent should survive the round trip");
    assert_eq!(received_parent.trace_id(), sent_parent.trace_id());
    assert_eq!(received_parent.span_id(), sent_parent.span_id());
    assert_eq!(received_parent.is_sampled(), sent_parent.is_sampled());
    assert!(received_parent.is_remote());
    assert_eq!(received.baggage, sent.baggage);
}

proptest! {
    #[test]
    fn rpc_metadata_round_trip(parent in span_context(), baggage in baggage()) {
        let sent = PropagatedContext::new(Some(parent), baggage);
        assert_round_trip(&sent, &round_trip::<RpcMetadata>(&sent));
    }

    #[test]
    fn http_headers_round_trip(parent in span_context(), baggage in baggage()) {
        let sent = PropagatedContext::new(Some(parent), baggage);
        assert_round_trip(&sent, &round_trip::<HttpHeaders>(&sent));
    }

    #[test]
    fn message_headers_round_trip(parent in span_context(), baggage in baggage()) {
        let sent = PropagatedContext::new(Some(parent), baggage);
        assert_round_trip(&sent, &round_trip::<MessageHeaders>(&sent));
    }
}

#[test]
fn large_baggage_survives_every_carrier() {
    let baggage: Baggage = (0..250)
        .map(|i| (format!("entry.{i}"), format!("  value {i}, with; delimiters=%  ")))
        .collect();
    let sent = PropagatedContext::new(None, baggage);

    assert_eq!(round_trip::<RpcMetadata>(&sent).baggage, sent.baggage);
    assert_eq!(round_trip::<HttpHeaders>(&sent).baggage, sent.baggage);
    assert_eq!(round_trip::<MessageHeaders>(&sent).baggage, sent.baggage);
}

#[test]
fn child_of_extracted_context_continues_the_trace() {
    let tracer = Tracer::new(InMemoryExporter::new());
    let upstream = tracer.start_span("upstream", SpanKind::Client, None);
    let upstream_ctx = upstream.span_context().clone();

    let mut inbound = HttpHeaders::new();
    inbound.inject(&PropagatedContext::new(Some(upstream_ctx.clone()), Baggage::new()));
    let received = inbound.extract();

    let local = tracer.start_span("local", SpanKind::Server, received.parent.as_ref());
    let local_ctx = local.span_context().clone();

    let mut outbound = RpcMetadata::new();
    outbound.inject(&received.with_parent(local_ctx.clone()));
    let downstream = outbound.extract().parent.unwrap();

    assert_eq!(downstream.trace_id(), upstream_ctx.trace_id());
    assert_eq!(downstream.span_id(), local_ctx.span_id());
}
