//! Streamgate - streaming result buffers and completion tracking for a
//! dataset-query gateway
//!
//! The engine writes serialized results into a [`ResultSink`] while the
//! response pipeline reads them back concurrently from a [`ResultSource`];
//! a [`ProgressTracker`] keeps the reader behind the writer. Lifecycle events
//! go through an [`EventAcceptor`] that fires exactly one completion.

pub mod buffer;
pub mod completion;
pub mod config;
pub mod error;
pub mod store;
pub mod transport;
pub mod types;

pub use buffer::{Buffer, BufferKind, FileBuffer, MemoryBuffer, ResultSink, ResultSource};
pub use completion::{
    CompletionNotifier, EventAcceptor, EventRouter, RecordingNotifier, SingleFire, Status,
};
pub use config::GatewayConfig;
pub use error::{ErrorKind, FixSuggestion, GatewayError, Result};
pub use store::{ReadableResult, ResultHandler, ResultStore};
pub use transport::{Conduit, LimitedReader, Progress, ProgressTracker, ProgressWriter};
pub use types::OperationId;
