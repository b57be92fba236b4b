//! File-backed buffer
//!
//! One file per operation. The sink appends through a plain `File` (no
//! user-space buffering, so committed bytes are visible to readers at once);
//! every reader opens its own handle on the same path.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Buffer, ResultSink, ResultSource};
use crate::error::{GatewayError, Result};
use crate::transport::{LimitedReader, ProgressTracker};
use crate::types::OperationId;

pub struct FileBuffer {
    operation_id: OperationId,
    path: PathBuf,
    tracker: Arc<ProgressTracker>,
    /// Write handle, present until the sink is taken
    file: Mutex<Option<File>>,
    disposed: AtomicBool,
    /// Backing file is gone
    removed: AtomicBool,
}

impl FileBuffer {
    /// Create the backing file; fails if it cannot be created or already exists
    pub fn create(operation_id: OperationId, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| GatewayError::BufferCreation {
                operation_id: operation_id.to_string(),
                source,
            })?;

        tracing::debug!(operation = %operation_id, path = %path.display(), "file buffer created");
        Ok(Self {
            operation_id,
            path,
            tracker: Arc::new(ProgressTracker::new()),
            file: Mutex::new(Some(file)),
            disposed: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Buffer for FileBuffer {
    fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    fn writer(&self) -> Result<ResultSink> {
        if self.is_disposed() {
            return Err(GatewayError::Closed);
        }
        let file = self.file.lock().take().ok_or_else(|| GatewayError::SideTaken {
            operation_id: self.operation_id.to_string(),
            side: "write",
        })?;
        Ok(ResultSink::new(Box::new(file), Arc::clone(&self.tracker)))
    }

    fn reader(&self) -> Result<ResultSource> {
        if self.is_disposed() {
            return Err(GatewayError::Closed);
        }
        let file = File::open(&self.path)?;
        let limited = LimitedReader::new(file, Arc::clone(&self.tracker));
        Ok(ResultSource::new(Box::new(limited), Arc::clone(&self.tracker)))
    }

    fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Finalize and remove the backing file
    ///
    /// A failed removal is retried by the next call.
    fn dispose(&self) -> Result<()> {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.tracker.finalize();
            drop(self.file.lock().take());
        }
        if self.removed.load(Ordering::SeqCst) {
            return Ok(());
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {
                self.removed.store(true, Ordering::SeqCst);
                tracing::debug!(operation = %self.operation_id, "file buffer disposed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.removed.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    operation = %self.operation_id,
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove buffer file"
                );
                Err(e.into())
            }
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for FileBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBuffer")
            .field("operation_id", &self.operation_id)
            .field("path", &self.path)
            .field("tracker", &self.tracker)
            .finish()
    }
}
