//! Completion tracking
//!
//! - [`notifier`] - the `succeeded` / `failed` callback and its single-fire guard
//! - [`acceptor`] - status/cause state machine for one operation
//! - [`router`] - operation id to acceptor registry
//! - [`recording`] - notifier that records notifications

pub mod acceptor;
pub mod notifier;
pub mod recording;
pub mod router;

pub use acceptor::{ErrorState, EventAcceptor, Status};
pub use notifier::{CompletionNotifier, SingleFire};
pub use recording::{Notification, RecordingNotifier};
pub use router::{EventRouter, StopHook};
