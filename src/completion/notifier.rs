//! Completion callback contract

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::GatewayError;

/// Outcome callback of one operation, implemented by the response pipeline
///
/// Callers guarantee at most one invocation per operation.
pub trait CompletionNotifier: Send + Sync {
    fn succeeded(&self);

    fn failed(&self, cause: GatewayError);
}

/// Forwards only the first notification to the wrapped notifier
pub struct SingleFire<N> {
    inner: N,
    fired: AtomicBool,
}

impl<N: CompletionNotifier> SingleFire<N> {
    pub fn new(inner: N) -> Self {
        Self {
            inner,
            fired: AtomicBool::new(false),
        }
    }

    /// Whether a notification went through already
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    fn claim(&self) -> bool {
        !self.fired.swap(true, Ordering::SeqCst)
    }
}

impl<N: CompletionNotifier> CompletionNotifier for SingleFire<N> {
    fn succeeded(&self) {
        if self.claim() {
            self.inner.succeeded();
        } else {
            tracing::warn!("dropping duplicate success notification");
        }
    }

    fn failed(&self, cause: GatewayError) {
        if self.claim() {
            self.inner.failed(cause);
        } else {
            tracing::warn!(cause = %cause, "dropping duplicate failure notification");
        }
    }
}

impl<N> fmt::Debug for SingleFire<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFire")
            .field("fired", &self.fired.load(Ordering::SeqCst))
            .finish()
    }
}

impl<N: CompletionNotifier + ?Sized> CompletionNotifier for std::sync::Arc<N> {
    fn succeeded(&self) {
        (**self).succeeded()
    }

    fn failed(&self, cause: GatewayError) {
        (**self).failed(cause)
    }
}

impl<N: CompletionNotifier + ?Sized> CompletionNotifier for Box<N> {
    fn succeeded(&self) {
        (**self).succeeded()
    }

    fn failed(&self, cause: GatewayError) {
        (**self).failed(cause)
    }
}
