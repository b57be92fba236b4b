//! Streaming transport between the query engine and the response pipeline
//!
//! - [`conduit`] - bounded in-memory pipe
//! - [`progress`] - committed-length tracker with blocking waits
//! - [`limited`] - read/write decorators bound to a tracker

pub mod conduit;
pub mod limited;
pub mod progress;

pub use conduit::{Conduit, ConduitReader, ConduitWriter, DEFAULT_CAPACITY};
pub use limited::{LimitedReader, ProgressWriter};
pub use progress::{Progress, ProgressTracker};
