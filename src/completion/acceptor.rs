//! Event acceptor: lifecycle events in, exactly one completion out
//!
//! The engine reports an operation through two independent streams: coarse
//! status events and raw failure causes. Neither order nor uniqueness is
//! guaranteed. The acceptor pairs an `Error` status with its cause through a
//! three-state atomic and tells the caller when the operation can be
//! forgotten.
//!
//! ```text
//!                 on_status(Error)
//!   NoErrors ───────────────────────────▶ EndedWithError
//!      │                                       │
//!      │ on_cause(e) → failed(e)               │ on_cause(e) → failed(e), stop
//!      ▼                                       ▼
//!   HasPublishedErrors ◀───────────────────────┘
//!      │
//!      │ on_status(Error) → stop
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use super::notifier::{CompletionNotifier, SingleFire};
use crate::error::GatewayError;
use crate::types::OperationId;

/// Execution status reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Unstarted,
    Pending,
    Processing,
    ProcessingWithError,
    Completed,
    CompletedWithError,
    Terminated,
    Error,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Completed | Status::CompletedWithError | Status::Terminated | Status::Error
        )
    }
}

/// Error bookkeeping of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorState {
    NoErrors = 0,
    /// A cause event was delivered and notified
    HasPublishedErrors = 1,
    /// An `Error` status arrived before any cause
    EndedWithError = 2,
}

impl ErrorState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ErrorState::NoErrors,
            1 => ErrorState::HasPublishedErrors,
            _ => ErrorState::EndedWithError,
        }
    }
}

/// Converts racy lifecycle events into a single completion notification
pub struct EventAcceptor {
    operation_id: OperationId,
    notifier: SingleFire<Box<dyn CompletionNotifier>>,
    state: AtomicU8,
}

impl EventAcceptor {
    pub fn new(operation_id: OperationId, notifier: impl CompletionNotifier + 'static) -> Self {
        Self {
            operation_id,
            notifier: SingleFire::new(Box::new(notifier)),
            state: AtomicU8::new(ErrorState::NoErrors as u8),
        }
    }

    pub fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    pub fn error_state(&self) -> ErrorState {
        ErrorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether the completion notification was delivered
    pub fn is_finished(&self) -> bool {
        self.notifier.has_fired()
    }

    /// Handle a status event; returns `true` when tracking should stop
    ///
    /// # Panics
    ///
    /// On `CompletedWithError`, which the engine never reports for tracked
    /// operations. The notifier is failed with an internal error first.
    pub fn on_status(&self, status: Status) -> bool {
        tracing::debug!(operation = %self.operation_id, ?status, "status event");
        match status {
            Status::Unstarted | Status::Pending | Status::Processing | Status::ProcessingWithError => {
                false
            }
            Status::Completed => {
                self.notifier.succeeded();
                true
            }
            Status::Terminated => {
                self.notifier.failed(GatewayError::Terminated);
                true
            }
            Status::Error => self.end_with_error(),
            Status::CompletedWithError => {
                let reason = format!(
                    "operation '{}' reported unexpected terminal status {:?}",
                    self.operation_id, status
                );
                tracing::error!(operation = %self.operation_id, ?status, "illegal terminal status");
                self.notifier.failed(GatewayError::Internal {
                    reason: reason.clone(),
                });
                panic!("{}", reason);
            }
        }
    }

    /// Handle a raw failure cause; returns `true` when tracking should stop
    pub fn on_cause(&self, cause: GatewayError) -> bool {
        tracing::debug!(operation = %self.operation_id, cause = %cause, "cause event");
        let previous = ErrorState::from_u8(
            self.state
                .swap(ErrorState::HasPublishedErrors as u8, Ordering::SeqCst),
        );
        self.notifier.failed(cause);
        previous == ErrorState::EndedWithError
    }

    fn end_with_error(&self) -> bool {
        match self.state.compare_exchange(
            ErrorState::NoErrors as u8,
            ErrorState::EndedWithError as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            // the cause event is still on its way and will signal stop
            Ok(_) => false,
            Err(actual) => match ErrorState::from_u8(actual) {
                ErrorState::HasPublishedErrors => true,
                other => {
                    tracing::debug!(operation = %self.operation_id, state = ?other, "duplicate error status");
                    false
                }
            },
        }
    }
}

impl fmt::Debug for EventAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventAcceptor")
            .field("operation_id", &self.operation_id)
            .field("state", &self.error_state())
            .field("finished", &self.is_finished())
            .finish()
    }
}
