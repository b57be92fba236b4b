//! Result buffers: one write side, one read side, same content
//!
//! Two implementations of the [`Buffer`] capability:
//! - [`FileBuffer`] - backed by a file, tolerates results larger than memory
//! - [`MemoryBuffer`] - backed by a bounded [`Conduit`](crate::transport::Conduit)
//!
//! Lifecycle: *writable* until the [`ResultSink`] is closed or dropped, then
//! *finalized*. [`Buffer::dispose`] releases the storage and is idempotent.

mod file;
mod memory;

pub use file::FileBuffer;
pub use memory::MemoryBuffer;

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transport::{ProgressTracker, ProgressWriter};
use crate::types::OperationId;

/// Storage capability shared by every buffer variant
pub trait Buffer: Send + Sync + fmt::Debug {
    fn operation_id(&self) -> &OperationId;

    /// Take the single write side
    fn writer(&self) -> Result<ResultSink>;

    /// Open a read side bounded by the writer's progress
    fn reader(&self) -> Result<ResultSource>;

    fn tracker(&self) -> &Arc<ProgressTracker>;

    /// Release backing storage; safe to call more than once
    fn dispose(&self) -> Result<()>;

    fn is_disposed(&self) -> bool;
}

/// Which [`Buffer`] implementation a store creates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    #[default]
    File,
    Memory,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::File => f.write_str("file"),
            BufferKind::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for BufferKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BufferKind::File),
            "memory" | "mem" => Ok(BufferKind::Memory),
            other => Err(format!("unknown buffer backend '{}' (expected file or memory)", other)),
        }
    }
}

/// Write side handed to the execution engine
///
/// Every write is recorded on the buffer's tracker. Closing or dropping the
/// sink finalizes the buffer, even when the engine gives up half way.
pub struct ResultSink {
    inner: ProgressWriter<Box<dyn Write + Send>>,
}

impl ResultSink {
    pub(crate) fn new(inner: Box<dyn Write + Send>, tracker: Arc<ProgressTracker>) -> Self {
        Self {
            inner: ProgressWriter::new(inner, tracker),
        }
    }

    /// Bytes committed so far
    pub fn committed(&self) -> u64 {
        self.inner.committed()
    }

    /// Flush and finalize
    pub fn close(self) -> io::Result<()> {
        self.inner.close()
    }
}

impl Write for ResultSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSink")
            .field("committed", &self.committed())
            .finish()
    }
}

/// Read side handed to the response pipeline
///
/// Dropping the source abandons the buffer's tracker: the client went away,
/// so every further engine write fails with `BrokenPipe`.
pub struct ResultSource {
    inner: Box<dyn Read + Send>,
    tracker: Arc<ProgressTracker>,
}

impl ResultSource {
    pub(crate) fn new(inner: Box<dyn Read + Send>, tracker: Arc<ProgressTracker>) -> Self {
        Self { inner, tracker }
    }
}

impl Drop for ResultSource {
    fn drop(&mut self) {
        if !self.tracker.is_finalized() {
            tracing::debug!("result source dropped before the writer finished");
        }
        self.tracker.abandon();
    }
}

impl Read for ResultSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl fmt::Debug for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSource")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
