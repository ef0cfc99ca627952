//! Request-scoped context threaded through every step.
//!
//! Carries the inbound trace context and baggage plus the caller's deadline
//! and cancellation signal. Nothing here is process-wide.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use telemetry::{PropagatedContext, SpanContext};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::transport::TransportError;

/// Why a call was abandoned before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("request cancelled")]
    Cancelled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl From<Interrupted> for TransportError {
    fn from(interrupted: Interrupted) -> Self {
        match interrupted {
            Interrupted::Cancelled => TransportError::Cancelled,
            Interrupted::DeadlineExceeded => TransportError::DeadlineExceeded,
        }
    }
}

/// A cloneable cancellation signal; every clone observes the same state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Everything about the caller that must reach each outbound call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    propagated: PropagatedContext,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// A context continuing the given inbound trace.
    pub fn new(propagated: PropagatedContext) -> Self {
        Self {
            propagated,
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// No inbound trace, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Same trace and baggage, but independent of this request's deadline
    /// and cancellation. Used for work that outlives the response.
    pub fn detached(&self) -> Self {
        Self::new(self.propagated.clone())
    }

    /// Same deadline and cancellation, with `span` as the active span.
    ///
    /// Outbound calls made with the returned context are children of `span`.
    pub fn with_parent(&self, span: SpanContext) -> Self {
        Self {
            propagated: self.propagated.with_parent(span),
            deadline: self.deadline,
            cancellation: self.cancellation.clone(),
        }
    }

    /// The active span, if any.
    pub fn parent(&self) -> Option<&SpanContext> {
        self.propagated.parent.as_ref()
    }

    pub fn propagated(&self) -> &PropagatedContext {
        &self.propagated
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Drives `future` unless the context is cancelled or its deadline passes first.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Interrupted> {
        if self.cancellation.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Interrupted::Cancelled),
            () = deadline => Err(Interrupted::DeadlineExceeded),
            output = future => Ok(output),
        }
    }
}
