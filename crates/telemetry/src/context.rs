//! Baggage and the propagated context that crosses transport boundaries.
//!
//! Span identity is the `opentelemetry` [`SpanContext`]; ids are minted by
//! the SDK's id generator inside [`crate::Tracer`].

use std::collections::HashMap;
use std::collections::hash_map;

use opentelemetry::trace::SpanContext;

/// Unordered string key/value pairs propagated alongside the trace context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baggage(HashMap<String, String>);

impl Baggage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Baggage {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// What crosses a transport boundary: an optional parent span plus baggage.
///
/// `parent == None` means "no parent"; the receiver starts a new trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagatedContext {
    pub parent: Option<SpanContext>,
    pub baggage: Baggage,
}

impl PropagatedContext {
    /// No parent and no baggage.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(parent: Option<SpanContext>, baggage: Baggage) -> Self {
        Self { parent, baggage }
    }

    /// Same baggage, with `span` as the parent for the next hop.
    pub fn with_parent(&self, span: SpanContext) -> Self {
        Self {
            parent: Some(span),
            baggage: self.baggage.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanId, TraceFlags, TraceId, TraceState};

    #[test]
    fn test_baggage_from_iter() {
        let baggage: Baggage = [("session.id", "abc"), ("synthetic_request", "true")]
            .into_iter()
            .collect();
        assert_eq!(baggage.len(), 2);
        assert_eq!(baggage.get("session.id"), Some("abc"));
    }

    #[test]
    fn test_insert_replaces_value() {
        let mut baggage = Baggage::new();
        assert_eq!(baggage.insert("tenant", "acme"), None);
        assert_eq!(baggage.insert("tenant", "globex"), Some("acme".to_string()));
        assert_eq!(baggage.get("tenant"), Some("globex"));
    }

    #[test]
    fn test_with_parent_keeps_baggage() {
        let mut baggage = Baggage::new();
        baggage.insert("tenant", "acme");
        let ctx = PropagatedContext::new(None, baggage);
        let span = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );

        let next = ctx.with_parent(span.clone());
        assert_eq!(next.parent, Some(span));
        assert_eq!(next.baggage.get("tenant"), Some("acme"));
    }
}
