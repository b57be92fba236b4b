//! Streamed result store
//!
//! Maps operation ids to result buffers kept under a private root directory.
//! The engine gets a [`ResultHandler`] bound to the write side, the response
//! pipeline gets a [`ReadableResult`] bound to the read side. Lookup and
//! deletion by id are part of the repository contract but not supported by
//! this streaming store: they fail with a usage error instead of pretending
//! the result is empty.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tempfile::TempDir;

use crate::buffer::{Buffer, BufferKind, FileBuffer, MemoryBuffer, ResultSink, ResultSource};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::types::OperationId;

const ROOT_PREFIX: &str = "streamgate-";
const BUFFER_SUFFIX: &str = ".buffer";

/// A buffer together with the media type its content is serialized in
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub buffer: Arc<dyn Buffer>,
    pub media_type: Arc<str>,
}

/// Write side of one operation's result
#[derive(Debug)]
pub struct ResultHandler {
    pub operation_id: OperationId,
    pub media_type: Arc<str>,
    pub sink: ResultSink,
}

impl ResultHandler {
    /// Split into the sink, for moving it onto the engine thread
    pub fn into_sink(self) -> ResultSink {
        self.sink
    }
}

/// Read side of one operation's result
#[derive(Debug)]
pub struct ReadableResult {
    pub operation_id: OperationId,
    pub media_type: Arc<str>,
    pub source: ResultSource,
}

/// Thread-safe store of streamed results
pub struct ResultStore {
    kind: BufferKind,
    conduit_capacity: usize,
    /// Private root; `None` once disposed. Handler creation holds the read
    /// lock until its entry is inserted.
    root: RwLock<Option<TempDir>>,
    root_path: PathBuf,
    results: DashMap<OperationId, StoredResult>,
    sequence: AtomicU64,
}

impl ResultStore {
    /// Create a store with a fresh private directory under `base`
    pub fn new(kind: BufferKind, base: impl AsRef<Path>, conduit_capacity: usize) -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix(ROOT_PREFIX)
            .tempdir_in(base.as_ref())?;
        let root_path = root.path().to_path_buf();
        tracing::debug!(root = %root_path.display(), backend = %kind, "result store opened");

        Ok(Self {
            kind,
            conduit_capacity,
            root: RwLock::new(Some(root)),
            root_path,
            results: DashMap::new(),
            sequence: AtomicU64::new(0),
        })
    }

    /// Create a store as described by `config`
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        Self::new(
            config.storage.backend,
            config.storage.base_dir(),
            config.conduit.capacity,
        )
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Number of results currently stored
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Create the buffer for a new operation and hand out its write side
    pub fn new_handler_for(
        &self,
        operation_id: impl Into<OperationId>,
        media_type: impl Into<Arc<str>>,
    ) -> Result<ResultHandler> {
        let operation_id = operation_id.into();
        let media_type = media_type.into();

        let root = self.root.read();
        if root.is_none() {
            return Err(GatewayError::Closed);
        }

        let vacant = match self.results.entry(operation_id.clone()) {
            Entry::Occupied(_) => {
                return Err(GatewayError::DuplicateOperation {
                    operation_id: operation_id.to_string(),
                })
            }
            Entry::Vacant(vacant) => vacant,
        };

        let buffer = self.create_buffer(&operation_id)?;
        let sink = match buffer.writer() {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(cleanup) = buffer.dispose() {
                    tracing::warn!(operation = %operation_id, error = %cleanup, "cleanup after failed handler creation");
                }
                return Err(e);
            }
        };

        vacant.insert(StoredResult {
            buffer,
            media_type: Arc::clone(&media_type),
        });
        tracing::debug!(operation = %operation_id, media_type = %media_type, "result handler created");
        drop(root);

        Ok(ResultHandler {
            operation_id,
            media_type,
            sink,
        })
    }

    /// Open the read side of a stored result
    pub fn obtain_readable_result(&self, operation_id: &OperationId) -> Result<ReadableResult> {
        let stored = self
            .results
            .get(operation_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::ResultNotFound {
                operation_id: operation_id.to_string(),
            })?;

        let source = stored.buffer.reader()?;
        Ok(ReadableResult {
            operation_id: operation_id.clone(),
            media_type: stored.media_type,
            source,
        })
    }

    /// Lookup by id is not supported for streamed results
    pub fn find(&self, _operation_id: &OperationId) -> Result<StoredResult> {
        Err(GatewayError::Unsupported { operation: "find" })
    }

    /// Deletion by id is not supported for streamed results
    pub fn delete(&self, _operation_id: &OperationId) -> Result<()> {
        Err(GatewayError::Unsupported { operation: "delete" })
    }

    /// Dispose one operation's buffer once it is no longer tracked
    ///
    /// Returns `Ok(false)` if nothing was stored under the id.
    pub fn release(&self, operation_id: &OperationId) -> Result<bool> {
        match self.results.remove(operation_id) {
            Some((_, stored)) => {
                stored.buffer.dispose()?;
                tracing::debug!(operation = %operation_id, "result released");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Dispose every buffer and remove the private root directory
    ///
    /// Idempotent; files already removed by [`release`](Self::release) are fine.
    pub fn dispose_all(&self) -> Result<()> {
        let mut first_error = None;
        // no handler can be created once the root is taken
        let root = self.root.write().take();

        let ids: Vec<OperationId> = self.results.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, stored)) = self.results.remove(&id) {
                if let Err(e) = stored.buffer.dispose() {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(root) = root {
            match root.close() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(root = %self.root_path.display(), error = %e, "failed to remove store root");
                    first_error.get_or_insert(e.into());
                }
            }
            tracing::debug!(root = %self.root_path.display(), "result store disposed");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn create_buffer(&self, operation_id: &OperationId) -> Result<Arc<dyn Buffer>> {
        match self.kind {
            BufferKind::File => {
                let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
                let name = format!("{}-{}{}", operation_id.file_stem(), seq, BUFFER_SUFFIX);
                let buffer = FileBuffer::create(operation_id.clone(), self.root_path.join(name))?;
                Ok(Arc::new(buffer))
            }
            BufferKind::Memory => Ok(Arc::new(MemoryBuffer::new(
                operation_id.clone(),
                self.conduit_capacity,
            ))),
        }
    }
}

impl Drop for ResultStore {
    fn drop(&mut self) {
        if let Err(e) = self.dispose_all() {
            tracing::warn!(error = %e, "result store cleanup on drop failed");
        }
    }
}

impl fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStore")
            .field("kind", &self.kind)
            .field("root", &self.root_path)
            .field("len", &self.results.len())
            .finish()
    }
}
