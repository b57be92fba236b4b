//! Recording notifier
//!
//! Keeps every notification it receives. Used by the CLI to report the
//! outcome after the relay threads finish, and by tests for assertions.

use std::sync::Arc;

use parking_lot::Mutex;

use super::CompletionNotifier;
use crate::error::{ErrorKind, GatewayError};

/// One received notification
#[derive(Debug)]
pub enum Notification {
    Succeeded,
    Failed(GatewayError),
}

/// Notifier that records instead of acting
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of notifications received
    pub fn count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn successes(&self) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|n| matches!(n, Notification::Succeeded))
            .count()
    }

    /// Messages of every failure cause, in arrival order
    pub fn failures(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Failed(cause) => Some(cause.to_string()),
                Notification::Succeeded => None,
            })
            .collect()
    }

    /// Kinds of every failure cause, in arrival order
    pub fn failure_kinds(&self) -> Vec<ErrorKind> {
        self.received
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Failed(cause) => Some(cause.kind()),
                Notification::Succeeded => None,
            })
            .collect()
    }

    /// Remove and return everything received so far
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.received.lock())
    }
}

impl CompletionNotifier for RecordingNotifier {
    fn succeeded(&self) {
        self.received.lock().push(Notification::Succeeded);
    }

    fn failed(&self, cause: GatewayError) {
        self.received.lock().push(Notification::Failed(cause));
    }
}
