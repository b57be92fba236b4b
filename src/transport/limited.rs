//! Progress-aware stream decorators
//!
//! - [`LimitedReader`]: never reads past what the writer has committed
//! - [`ProgressWriter`]: records every write and finalizes on close or drop

use std::io::{self, Read, Write};
use std::sync::Arc;

use super::progress::ProgressTracker;

/// Read side decorator bounded by a [`ProgressTracker`]
///
/// `read(buf)` first waits until `position + buf.len()` bytes are committed (or
/// the writer finalized), then delegates. After finalization the delegate may
/// return fewer bytes than requested and finally `0`, which is plain EOF.
#[derive(Debug)]
pub struct LimitedReader<R> {
    inner: R,
    tracker: Arc<ProgressTracker>,
    position: u64,
    window: Option<u64>,
}

impl<R: Read> LimitedReader<R> {
    pub fn new(inner: R, tracker: Arc<ProgressTracker>) -> Self {
        Self {
            inner,
            tracker,
            position: 0,
            window: None,
        }
    }

    /// Cap how far ahead of the current position a single read may wait
    ///
    /// Needed when the source is bounded (a conduit): waiting for more bytes
    /// than the source can hold would block forever against a full writer.
    pub fn with_window(mut self, window: u64) -> Self {
        self.window = Some(window.max(1));
        self
    }

    /// Bytes delivered to the caller so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut wanted = buf.len() as u64;
        if let Some(window) = self.window {
            wanted = wanted.min(window);
        }
        let progress = self
            .tracker
            .await_at_least(self.position.saturating_add(wanted));

        let available = progress.committed().saturating_sub(self.position);
        if available == 0 && progress.is_finalized() {
            return Ok(0);
        }
        let limit = usize::try_from(available.min(buf.len() as u64)).unwrap_or(buf.len());

        let count = self.inner.read(&mut buf[..limit])?;
        self.position += count as u64;
        Ok(count)
    }
}

/// Write side decorator feeding a [`ProgressTracker`]
///
/// Finalization happens exactly when the writer goes away, on [`close`]
/// or on drop, whether or not the writer succeeded. Once the tracker is
/// abandoned by the reader every write fails with `BrokenPipe`.
///
/// [`close`]: ProgressWriter::close
#[derive(Debug)]
pub struct ProgressWriter<W: Write> {
    inner: Option<W>,
    tracker: Arc<ProgressTracker>,
}

impl<W: Write> ProgressWriter<W> {
    pub fn new(inner: W, tracker: Arc<ProgressTracker>) -> Self {
        Self {
            inner: Some(inner),
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Bytes committed through this writer
    pub fn committed(&self) -> u64 {
        self.tracker.committed()
    }

    /// Flush, drop the delegate and finalize the tracker
    pub fn close(mut self) -> io::Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        let result = match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        };
        // drop the delegate before readers see EOF
        self.inner = None;
        self.tracker.finalize();
        result
    }

    fn inner_mut(&mut self) -> io::Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "writer already closed"))
    }
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.tracker.is_abandoned() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "result reader closed",
            ));
        }
        let count = self.inner_mut()?.write(buf)?;
        self.tracker.record_written(count as u64);
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner_mut()?.flush()
    }
}

impl<W: Write> Drop for ProgressWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "flush on writer drop failed");
        }
    }
}
