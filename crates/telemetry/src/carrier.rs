//! Transport carriers for trace context and baggage.
//!
//! Each transport kind keeps its own native header representation and
//! implements the `opentelemetry` [`Injector`]/[`Extractor`] pair over it.
//! [`inject`] and [`extract`] write and read the W3C `traceparent` and
//! `baggage` headers against any such carrier.
//!
//! Baggage keys and values are percent-encoded per entry, so any string
//! (surrounding whitespace, `,`, `;`, `=`, `%`, non-ASCII) survives a round
//! trip unchanged, and no entry-count cap is applied on either side.
//!
//! Extraction never fails: a missing or malformed `traceparent` simply
//! yields a context with no parent, and undecodable baggage members are
//! skipped.

use std::collections::BTreeMap;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::Context;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::TraceContextExt;
use opentelemetry_sdk::propagation::TraceContextPropagator;

use crate::context::{Baggage, PropagatedContext};

pub const BAGGAGE_HEADER: &str = "baggage";

/// W3C baggage limits that conforming receivers must accept.
pub const BAGGAGE_MAX_ENTRIES: usize = 180;
pub const BAGGAGE_MAX_BYTES: usize = 8192;

/// Serializes `context` into `injector` as `traceparent`/`tracestate` and `baggage`.
pub fn inject(context: &PropagatedContext, injector: &mut dyn Injector) {
    if let Some(parent) = context.parent.as_ref().filter(|p| p.is_valid()) {
        let cx = Context::new().with_remote_span_context(parent.clone());
        TraceContextPropagator::new().inject_context(&cx, injector);
    }

    if let Some(header) = encode_baggage(&context.baggage) {
        injector.set(BAGGAGE_HEADER, header);
    }
}

/// Reads a [`PropagatedContext`] back out of `extractor`.
pub fn extract(extractor: &dyn Extractor) -> PropagatedContext {
    let cx = TraceContextPropagator::new().extract(extractor);
    let span = cx.span();
    let span_context = span.span_context();
    let parent = span_context.is_valid().then(|| span_context.clone());

    let baggage = extractor
        .get(BAGGAGE_HEADER)
        .map(decode_baggage)
        .unwrap_or_default();

    PropagatedContext { parent, baggage }
}

/// `key=value` members joined by `,`, sorted so the header is deterministic.
fn encode_baggage(baggage: &Baggage) -> Option<String> {
    if baggage.is_empty() {
        return None;
    }

    let mut members: Vec<String> = baggage
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect();
    members.sort_unstable();
    let header = members.join(",");

    if members.len() > BAGGAGE_MAX_ENTRIES || header.len() > BAGGAGE_MAX_BYTES {
        tracing::warn!(
            entries = members.len(),
            bytes = header.len(),
            max_entries = BAGGAGE_MAX_ENTRIES,
            max_bytes = BAGGAGE_MAX_BYTES,
            "baggage exceeds W3C limits; third-party receivers may truncate it"
        );
    }

    Some(header)
}

fn decode_baggage(header: &str) -> Baggage {
    let is_ows = |c: char| c == ' ' || c == '\t';

    header
        .split(',')
        .filter_map(|member| {
            // Member properties after `;` are not carried.
            let pair = member.split(';').next()?;
            let (key, value) = pair.split_once('=')?;
            let key = urlencoding::decode(key.trim_matches(is_ows)).ok()?;
            let value = urlencoding::decode(value.trim_matches(is_ows)).ok()?;
            (!key.is_empty()).then(|| (key.into_owned(), value.into_owned()))
        })
        .collect()
}

/// The two operations every transport adapter offers.
pub trait ContextCarrier {
    /// Writes the context into this carrier's native headers.
    fn inject(&mut self, context: &PropagatedContext);

    /// Reads the context back; never fails.
    fn extract(&self) -> PropagatedContext;
}

impl<T: Injector + Extractor> ContextCarrier for T {
    fn inject(&mut self, context: &PropagatedContext) {
        inject(context, self);
    }

    fn extract(&self) -> PropagatedContext {
        extract(self)
    }
}

/// RPC call metadata: case-insensitive keys, possibly several values per key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcMetadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl RpcMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all values for `key`.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .insert(key.to_ascii_lowercase(), vec![value.into()]);
    }

    /// Adds another value for `key`.
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Injector for RpcMetadata {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key, value);
    }
}

impl Extractor for RpcMetadata {
    fn get(&self, key: &str) -> Option<&str> {
        RpcMetadata::get(self, key)
    }

    fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

/// HTTP request/response headers.
#[derive(Debug, Clone, Default)]
pub struct HttpHeaders(HeaderMap);

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: HeaderMap) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.0
    }

    pub fn into_inner(self) -> HeaderMap {
        self.0
    }

    /// Header value as text; non-visible-ASCII values read as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|value| value.to_str().ok())
    }
}

impl From<HeaderMap> for HttpHeaders {
    fn from(map: HeaderMap) -> Self {
        Self(map)
    }
}

impl Injector for HttpHeaders {
    fn set(&mut self, key: &str, value: String) {
        // Entries that are not valid HTTP tokens are dropped.
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

impl Extractor for HttpHeaders {
    fn get(&self, key: &str) -> Option<&str> {
        HttpHeaders::get(self, key)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Message-queue record headers: ordered, byte-valued, case-sensitive keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders(Vec<(String, Vec<u8>)>);

impl MessageHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any existing header named `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        self.0.retain(|(existing, _)| *existing != key);
        self.0.push((key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Injector for MessageHeaders {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key, value.into_bytes());
    }
}

impl Extractor for MessageHeaders {
    fn get(&self, key: &str) -> Option<&str> {
        MessageHeaders::get(self, key).and_then(|value| std::str::from_utf8(value).ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|(key, _)| key.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn upstream_span() -> SpanContext {
        SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        )
    }

    fn sample_context() -> PropagatedContext {
        let mut baggage = Baggage::new();
        baggage.insert("session.id", "s-42");
        PropagatedContext::new(Some(upstream_span()), baggage)
    }

    #[test]
    fn test_rpc_metadata_is_case_insensitive() {
        let mut md = RpcMetadata::new();
        md.insert("X-Request-Id", "abc");
        assert_eq!(md.get("x-request-id"), Some("abc"));

        md.append("x-request-id", "def");
        assert_eq!(md.get_all("X-REQUEST-ID"), &["abc", "def"]);
        assert_eq!(md.get("x-request-id"), Some("abc"));
    }

    #[test]
    fn test_message_headers_replace_on_insert() {
        let mut headers = MessageHeaders::new();
        headers.insert("traceparent", "a");
        headers.insert("traceparent", "b");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("traceparent"), Some(b"b".as_slice()));
    }

    #[test]
    fn test_inject_writes_traceparent() {
        let mut md = RpcMetadata::new();
        md.inject(&sample_context());

        assert_eq!(md.get("traceparent"), Some(TRACEPARENT));
        assert_eq!(md.get("baggage"), Some("session.id=s-42"));
    }

    #[test]
    fn test_extract_known_traceparent() {
        let mut headers = HttpHeaders::new();
        Injector::set(&mut headers, "traceparent", TRACEPARENT.to_string());

        let ctx = headers.extract();
        let parent = ctx.parent.expect("parent should be extracted");
        assert_eq!(parent.trace_id(), upstream_span().trace_id());
        assert_eq!(parent.span_id(), upstream_span().span_id());
        assert!(parent.is_sampled());
        assert!(parent.is_remote());
    }

    #[test]
    fn test_missing_context_means_no_parent() {
        let ctx = MessageHeaders::new().extract();
        assert!(ctx.parent.is_none());
        assert!(ctx.baggage.is_empty());
    }

    #[test]
    fn test_malformed_traceparent_means_no_parent() {
        for bad in [
            "garbage",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-zzzzzzzzzzzzzzzz-01",
        ] {
            let mut md = RpcMetadata::new();
            md.insert("traceparent", bad);
            assert!(md.extract().parent.is_none(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_non_utf8_message_header_is_ignored() {
        let mut headers = MessageHeaders::new();
        headers.insert("traceparent", vec![0xff, 0xfe]);
        assert!(headers.extract().parent.is_none());
    }

    #[test]
    fn test_no_parent_injects_nothing() {
        let mut md = RpcMetadata::new();
        md.inject(&PropagatedContext::empty());
        assert!(md.get("traceparent").is_none());
        assert!(md.get("baggage").is_none());
    }

    #[test]
    fn test_baggage_keeps_whitespace_and_delimiters() {
        let baggage: Baggage = [
            ("padded", " spaced "),
            ("tabbed", "\tx\t"),
            ("list", "a,b;c=d"),
            ("percent", "100%"),
            ("unicode", "caf\u{e9} \u{2603}"),
            ("empty", ""),
        ]
        .into_iter()
        .collect();
        let sent = PropagatedContext::new(None, baggage);

        let mut headers = HttpHeaders::new();
        headers.inject(&sent);
        assert!(headers.get("baggage").is_some(), "header must be valid ASCII");
        assert_eq!(headers.extract().baggage, sent.baggage);

        let mut md = MessageHeaders::new();
        md.inject(&sent);
        assert_eq!(md.extract().baggage, sent.baggage);
    }

    #[test]
    fn test_baggage_beyond_w3c_entry_limit_is_kept() {
        let baggage: Baggage = (0..200)
            .map(|i| (format!("key{i}"), format!("value {i}")))
            .collect();
        let sent = PropagatedContext::new(None, baggage);

        let mut md = RpcMetadata::new();
        md.inject(&sent);
        let received = md.extract().baggage;

        assert_eq!(received.len(), 200);
        assert_eq!(received, sent.baggage);
    }

    #[test]
    fn test_inbound_baggage_properties_and_bad_members_are_skipped() {
        let mut md = RpcMetadata::new();
        md.insert(
            "baggage",
            "userId=alice;prop=1, serverNode = DF%2028 ,noequals,bad=%FF,=orphan",
        );

        let baggage = md.extract().baggage;
        assert_eq!(baggage.get("userId"), Some("alice"));
        assert_eq!(baggage.get("serverNode"), Some("DF 28"));
        assert_eq!(baggage.len(), 2);
    }
}
