//! Conduit-backed buffer
//!
//! Holds at most the conduit capacity in memory; a slow reader stalls the
//! writer instead of growing the buffer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Buffer, ResultSink, ResultSource};
use crate::error::{GatewayError, Result};
use crate::transport::{Conduit, ConduitReader, ConduitWriter, LimitedReader, ProgressTracker};
use crate::types::OperationId;

pub struct MemoryBuffer {
    operation_id: OperationId,
    conduit: Conduit,
    tracker: Arc<ProgressTracker>,
    writer: Mutex<Option<ConduitWriter>>,
    reader: Mutex<Option<ConduitReader>>,
    disposed: AtomicBool,
}

impl MemoryBuffer {
    pub fn new(operation_id: OperationId, capacity: usize) -> Self {
        let (conduit, writer, reader) = Conduit::open(capacity);
        tracing::debug!(operation = %operation_id, capacity = conduit.capacity(), "memory buffer created");
        Self {
            operation_id,
            conduit,
            tracker: Arc::new(ProgressTracker::new()),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.conduit.capacity()
    }

    fn side_taken(&self, side: &'static str) -> GatewayError {
        GatewayError::SideTaken {
            operation_id: self.operation_id.to_string(),
            side,
        }
    }
}

impl Buffer for MemoryBuffer {
    fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    fn writer(&self) -> Result<ResultSink> {
        if self.is_disposed() {
            return Err(GatewayError::Closed);
        }
        let writer = self.writer.lock().take().ok_or_else(|| self.side_taken("write"))?;
        Ok(ResultSink::new(Box::new(writer), Arc::clone(&self.tracker)))
    }

    /// A conduit has exactly one read end, so this succeeds once
    fn reader(&self) -> Result<ResultSource> {
        if self.is_disposed() {
            return Err(GatewayError::Closed);
        }
        let reader = self.reader.lock().take().ok_or_else(|| self.side_taken("read"))?;
        let limited = LimitedReader::new(reader, Arc::clone(&self.tracker))
            .with_window(self.conduit.capacity() as u64);
        Ok(ResultSource::new(Box::new(limited), Arc::clone(&self.tracker)))
    }

    fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.conduit.release();
        self.tracker.finalize();
        drop(self.writer.lock().take());
        drop(self.reader.lock().take());
        tracing::debug!(operation = %self.operation_id, "memory buffer disposed");
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("operation_id", &self.operation_id)
            .field("capacity", &self.conduit.capacity())
            .field("tracker", &self.tracker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::{self, Read, Write};
    use std::thread;

    #[test]
    fn large_result_streams_through_small_conduit() {
        let buffer = MemoryBuffer::new(OperationId::new("big"), 8);
        let mut sink = buffer.writer().unwrap();
        let mut source = buffer.reader().unwrap();

        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let producer = thread::spawn(move || {
            sink.write_all(&payload).unwrap();
            sink.close().unwrap();
        });

        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        producer.join().unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn reader_is_single_use() {
        let buffer = MemoryBuffer::new(OperationId::new("once"), 8);
        let _source = buffer.reader().unwrap();
        assert_eq!(buffer.reader().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn dropped_reader_fails_writer() {
        let buffer = MemoryBuffer::new(OperationId::new("disconnect"), 8);
        let mut sink = buffer.writer().unwrap();
        drop(buffer.reader().unwrap());

        let err = sink.write_all(b"anyone there?").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn dispose_releases_conduit_and_unblocks_reader() {
        let buffer = Arc::new(MemoryBuffer::new(OperationId::new("abort"), 8));
        let mut source = buffer.reader().unwrap();
        let reading = thread::spawn(move || source.read(&mut [0u8; 4]));

        thread::sleep(std::time::Duration::from_millis(50));
        buffer.dispose().unwrap();
        buffer.dispose().unwrap();

        let result = reading.join().unwrap();
        assert!(matches!(result, Ok(0)));
        assert!(matches!(buffer.writer().unwrap_err(), GatewayError::Closed));
    }
}
