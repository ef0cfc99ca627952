//! Collaborator contracts and in-memory implementations.
//!
//! Each trait is the remote side of one collaborator as seen over the wire:
//! a request envelope carrying propagation metadata in, a raw response out.
//! Response validation and error classification happen in
//! [`crate::clients`], not here.

pub mod cart;
pub mod catalog;
pub mod currency;
pub mod notification;
pub mod payment;
pub mod shipping;

use std::collections::VecDeque;
use std::collections::vec_deque;
use std::sync::{Arc, Mutex};

use telemetry::{ContextCarrier, PropagatedContext};

pub use cart::{CartResponse, CartService, InMemoryCartService};
pub use catalog::{CatalogService, InMemoryCatalogService, ProductResponse};
pub use currency::{ConvertRequest, CurrencyService, InMemoryCurrencyService};
pub use notification::{
    HttpNotificationService, InMemoryNotificationService, NotificationService, OrderConfirmation,
};
pub use payment::{
    ChargeRequest, ChargeResponse, InMemoryPaymentService, PaymentService,
    UnreachablePaymentService,
};
pub use shipping::{
    InMemoryShippingService, QuoteResponse, ShipOrderResponse, ShippingRequest, ShippingService,
};

/// What an in-memory fake has received, newest last.
///
/// A bounded log keeps only the newest `capacity` entries while
/// [`RetainedLog::total`] keeps counting, so a long-running process holds
/// flat memory and still reports exact counts.
#[derive(Debug, Clone)]
pub struct RetainedLog<T> {
    entries: VecDeque<T>,
    capacity: Option<usize>,
    total: usize,
}

impl<T> Default for RetainedLog<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> RetainedLog<T> {
    pub fn unbounded() -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: None,
            total: 0,
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::unbounded()
        }
    }

    /// Changes the bound, evicting the oldest entries beyond it.
    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
        self.evict();
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn push(&mut self, entry: T) {
        self.total += 1;
        self.entries.push_back(entry);
        self.evict();
    }

    /// Entries currently retained.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ever pushed, evicted ones included.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
    }

    fn evict(&mut self) {
        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                self.entries.pop_front();
            }
        }
    }
}

/// One call observed by an in-memory collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub service: &'static str,
    pub method: &'static str,
    /// The context the collaborator extracted from the request carrier.
    pub context: PropagatedContext,
}

/// Shared log of calls received by in-memory collaborators, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<RetainedLog<RecordedCall>>>,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that keeps nothing, for fakes serving real traffic.
    pub fn disabled() -> Self {
        Self {
            calls: Arc::new(Mutex::new(RetainedLog::bounded(0))),
        }
    }

    /// Extracts the propagated context from `carrier` and records the call.
    pub fn record(&self, service: &'static str, method: &'static str, carrier: &dyn ContextCarrier) {
        let mut calls = self.calls.lock().unwrap();
        if calls.capacity() == Some(0) {
            return;
        }
        calls.push(RecordedCall {
            service,
            method,
            context: carrier.extract(),
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().iter().cloned().collect()
    }

    /// Number of recorded calls to `method`.
    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.method)
            .collect()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry::RpcMetadata;

    #[test]
    fn test_bounded_log_keeps_newest_and_counts_all() {
        let mut log = RetainedLog::bounded(3);
        for i in 0..10 {
            log.push(i);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.total(), 10);
        assert_eq!(log.iter().copied().collect::<Vec<_>>(), vec![7, 8, 9]);
    }

    #[test]
    fn test_shrinking_capacity_evicts_oldest() {
        let mut log = RetainedLog::unbounded();
        for i in [1, 2, 3, 4] {
            log.push(i);
        }
        log.set_capacity(Some(2));
        assert_eq!(log.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(log.total(), 4);
    }

    #[test]
    fn test_disabled_recorder_keeps_nothing() {
        let recorder = CallRecorder::disabled();
        for _ in 0..50 {
            recorder.record("CartService", "GetCart", &RpcMetadata::new());
        }
        assert!(recorder.calls().is_empty());
        assert_eq!(recorder.count("GetCart"), 0);
    }

    #[test]
    fn test_recorder_keeps_calls_in_order() {
        let recorder = CallRecorder::new();
        recorder.record("CartService", "GetCart", &RpcMetadata::new());
        recorder.record("CartService", "EmptyCart", &RpcMetadata::new());
        assert_eq!(recorder.methods(), vec!["GetCart", "EmptyCart"]);

        recorder.reset();
        assert!(recorder.calls().is_empty());
    }
}
