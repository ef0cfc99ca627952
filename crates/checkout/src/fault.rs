//! Fault injection hooks consulted by the orchestrator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Decides, per request, whether to inject a failure.
pub trait FaultPolicy: Send + Sync {
    /// Send the charge to an unreachable payment endpoint instead of the real one.
    fn should_redirect_payment(&self) -> bool;

    /// Extra copies of each completion event to publish.
    fn extra_event_copies(&self) -> u32;
}

/// Never injects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {
    fn should_redirect_payment(&self) -> bool {
        false
    }

    fn extra_event_copies(&self) -> u32 {
        0
    }
}

/// Toggles that can be flipped at runtime; clones share the same switches.
#[derive(Debug, Clone, Default)]
pub struct StaticFaultPolicy {
    redirect_payment: Arc<AtomicBool>,
    extra_event_copies: Arc<AtomicU32>,
}

impl StaticFaultPolicy {
    pub fn new(redirect_payment: bool, extra_event_copies: u32) -> Self {
        Self {
            redirect_payment: Arc::new(AtomicBool::new(redirect_payment)),
            extra_event_copies: Arc::new(AtomicU32::new(extra_event_copies)),
        }
    }

    pub fn set_redirect_payment(&self, enabled: bool) {
        self.redirect_payment.store(enabled, Ordering::Relaxed);
    }

    pub fn set_extra_event_copies(&self, copies: u32) {
        self.extra_event_copies.store(copies, Ordering::Relaxed);
    }
}

impl FaultPolicy for StaticFaultPolicy {
    fn should_redirect_payment(&self) -> bool {
        self.redirect_payment.load(Ordering::Relaxed)
    }

    fn extra_event_copies(&self) -> u32 {
        self.extra_event_copies.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_faults() {
        assert!(!NoFaults.should_redirect_payment());
        assert_eq!(NoFaults.extra_event_copies(), 0);
    }

    #[test]
    fn test_static_policy_toggles_are_shared() {
        let policy = StaticFaultPolicy::default();
        let clone = policy.clone();
        assert!(!clone.should_redirect_payment());

        policy.set_redirect_payment(true);
        policy.set_extra_event_copies(3);
        assert!(clone.should_redirect_payment());
        assert_eq!(clone.extra_event_copies(), 3);
    }
}
