//! Progress tracking between one writer and its readers
//!
//! The writer records every committed byte count and finalizes when it is
//! done; readers block in [`ProgressTracker::await_at_least`] until enough
//! bytes are committed or the writer finalized.
//!
//! A single lock guards `committed` and `finalized`. A reader returning from
//! `await_at_least` sees at least the state that released it, so after the
//! call either `committed >= required` or the tracker is finalized.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Outcome of waiting on a [`ProgressTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// At least the required number of bytes is committed, more may follow
    Reached(u64),
    /// The writer finalized; the value is the final committed length
    Finalized(u64),
}

impl Progress {
    /// Committed length observed when the wait returned
    pub fn committed(&self) -> u64 {
        match *self {
            Progress::Reached(n) | Progress::Finalized(n) => n,
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, Progress::Finalized(_))
    }
}

#[derive(Debug, Default)]
struct State {
    committed: u64,
    finalized: bool,
}

impl State {
    fn progress(&self) -> Progress {
        if self.finalized {
            Progress::Finalized(self.committed)
        } else {
            Progress::Reached(self.committed)
        }
    }
}

/// Thread-safe monotonic counter of committed bytes
#[derive(Default)]
pub struct ProgressTracker {
    state: Mutex<State>,
    changed: Condvar,
    /// Set when the reader went away before the writer finished
    abandoned: AtomicBool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `written` freshly committed bytes and wake satisfied readers
    pub fn record_written(&self, written: u64) {
        if written == 0 {
            return;
        }
        let mut state = self.state.lock();
        state.committed = state.committed.saturating_add(written);
        self.changed.notify_all();
    }

    /// Mark the writer as done; every current and future wait returns at once
    pub fn finalize(&self) {
        let mut state = self.state.lock();
        if !state.finalized {
            state.finalized = true;
            tracing::trace!(committed = state.committed, "progress finalized");
        }
        self.changed.notify_all();
    }

    /// Mark the read side as gone; writers check this before every write
    pub fn abandon(&self) {
        if !self.abandoned.swap(true, Ordering::SeqCst) {
            tracing::trace!("progress abandoned by reader");
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Number of bytes committed so far
    pub fn committed(&self) -> u64 {
        self.state.lock().committed
    }

    pub fn is_finalized(&self) -> bool {
        self.state.lock().finalized
    }

    /// Block until `committed >= required` or the tracker is finalized
    pub fn await_at_least(&self, required: u64) -> Progress {
        let mut state = self.state.lock();
        while !state.finalized && state.committed < required {
            self.changed.wait(&mut state);
        }
        state.progress()
    }

    /// Like [`await_at_least`](Self::await_at_least) but gives up after `timeout`
    ///
    /// Returns `None` if neither condition held before the deadline.
    pub fn await_at_least_for(&self, required: u64, timeout: Duration) -> Option<Progress> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.finalized && state.committed < required {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                if state.finalized || state.committed >= required {
                    break;
                }
                return None;
            }
        }
        Some(state.progress())
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ProgressTracker")
            .field("committed", &state.committed)
            .field("finalized", &state.finalized)
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}
