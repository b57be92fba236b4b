//! Routes engine events to the acceptor of their operation
//!
//! Events for operations nobody tracks are dropped. When an acceptor signals
//! stop, the operation is forgotten and the stop hook runs, exactly once per
//! tracked operation.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::acceptor::{EventAcceptor, Status};
use crate::error::{GatewayError, Result};
use crate::types::OperationId;

/// Called with the id of every operation that stopped being tracked
pub type StopHook = Box<dyn Fn(&OperationId) + Send + Sync>;

/// Thread-safe registry of tracked operations
#[derive(Default)]
pub struct EventRouter {
    trackers: DashMap<OperationId, Arc<EventAcceptor>>,
    on_stop: Option<StopHook>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` whenever an operation stops being tracked
    pub fn with_stop_hook(mut self, hook: impl Fn(&OperationId) + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Box::new(hook));
        self
    }

    /// Start tracking the acceptor's operation
    pub fn track(&self, acceptor: EventAcceptor) -> Result<Arc<EventAcceptor>> {
        let operation_id = acceptor.operation_id().clone();
        match self.trackers.entry(operation_id.clone()) {
            Entry::Occupied(_) => Err(GatewayError::DuplicateOperation {
                operation_id: operation_id.to_string(),
            }),
            Entry::Vacant(vacant) => {
                let acceptor = Arc::new(acceptor);
                vacant.insert(Arc::clone(&acceptor));
                tracing::debug!(operation = %operation_id, "tracking operation");
                Ok(acceptor)
            }
        }
    }

    /// Forward a status event; returns `true` if the operation stopped
    pub fn on_status(&self, operation_id: &OperationId, status: Status) -> bool {
        let Some(acceptor) = self.lookup(operation_id) else {
            tracing::debug!(operation = %operation_id, ?status, "status for untracked operation");
            return false;
        };
        let stop = acceptor.on_status(status);
        stop && self.finish(operation_id, &acceptor)
    }

    /// Forward a failure cause; returns `true` if the operation stopped
    pub fn on_cause(&self, operation_id: &OperationId, cause: GatewayError) -> bool {
        let Some(acceptor) = self.lookup(operation_id) else {
            tracing::debug!(operation = %operation_id, cause = %cause, "cause for untracked operation");
            return false;
        };
        let stop = acceptor.on_cause(cause);
        stop && self.finish(operation_id, &acceptor)
    }

    /// Stop tracking without running the stop hook
    pub fn stop_tracking(&self, operation_id: &OperationId) -> Option<Arc<EventAcceptor>> {
        self.trackers.remove(operation_id).map(|(_, acceptor)| acceptor)
    }

    pub fn is_tracked(&self, operation_id: &OperationId) -> bool {
        self.trackers.contains_key(operation_id)
    }

    /// Number of tracked operations
    pub fn tracked(&self) -> usize {
        self.trackers.len()
    }

    /// Forget every tracked operation
    pub fn clear(&self) {
        self.trackers.clear();
    }

    fn lookup(&self, operation_id: &OperationId) -> Option<Arc<EventAcceptor>> {
        // clone out so no shard lock is held while the notifier runs
        self.trackers.get(operation_id).map(|entry| Arc::clone(entry.value()))
    }

    fn finish(&self, operation_id: &OperationId, acceptor: &Arc<EventAcceptor>) -> bool {
        let removed = self
            .trackers
            .remove_if(operation_id, |_, tracked| Arc::ptr_eq(tracked, acceptor))
            .is_some();
        if removed {
            tracing::debug!(operation = %operation_id, "operation finished");
            if let Some(hook) = &self.on_stop {
                hook(operation_id);
            }
        }
        removed
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("tracked", &self.trackers.len())
            .field("has_stop_hook", &self.on_stop.is_some())
            .finish()
    }
}
