//! Bounded in-memory pipe with a paired write end and read end
//!
//! Both ends share one state and report the same open/closed status:
//! - closing the writer lets the reader drain what is buffered, then EOF
//! - closing the reader makes every pending and later write fail (`BrokenPipe`)
//! - [`Conduit::release`] closes both; every later call fails

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Default conduit capacity (64 KiB)
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closed {
    Open,
    /// Writer finished; buffered bytes remain readable
    ByWriter,
    /// Reader went away; writes fail
    ByReader,
    /// Storage released; everything fails
    Released,
}

#[derive(Debug)]
struct State {
    data: VecDeque<u8>,
    closed: Closed,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    /// Signalled when data arrives or the conduit closes
    readable: Condvar,
    /// Signalled when space frees up or the conduit closes
    writable: Condvar,
    capacity: usize,
}

impl Shared {
    fn close(&self, how: Closed) {
        let mut state = self.state.lock();
        match (state.closed, how) {
            (Closed::Released, _) => return,
            (_, Closed::Released) => {
                state.data.clear();
                state.closed = Closed::Released;
            }
            (Closed::Open, how) | (Closed::ByWriter, how @ Closed::ByReader) => {
                state.closed = how
            }
            _ => {}
        }
        self.readable.notify_all();
        self.writable.notify_all();
    }

    fn is_open(&self) -> bool {
        self.state.lock().closed == Closed::Open
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "conduit released")
}

/// Owner of both conduit ends until they are handed out
#[derive(Debug)]
pub struct Conduit {
    shared: Arc<Shared>,
}

impl Conduit {
    /// Create a conduit holding at most `capacity` unread bytes
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    data: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                    closed: Closed::Open,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Create a conduit and return both ends
    pub fn open(capacity: usize) -> (Self, ConduitWriter, ConduitReader) {
        let conduit = Self::new(capacity);
        let writer = conduit.writer();
        let reader = conduit.reader();
        (conduit, writer, reader)
    }

    pub fn writer(&self) -> ConduitWriter {
        ConduitWriter {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn reader(&self) -> ConduitReader {
        ConduitReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Number of buffered, unread bytes
    pub fn buffered(&self) -> usize {
        self.shared.state.lock().data.len()
    }

    /// Close both ends and drop buffered bytes; idempotent
    pub fn release(&self) {
        self.shared.close(Closed::Released);
    }
}

/// Write end of a [`Conduit`]
#[derive(Debug)]
pub struct ConduitWriter {
    shared: Arc<Shared>,
}

impl ConduitWriter {
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Signal end of data; the reader drains and then sees EOF
    pub fn close(&self) {
        self.shared.close(Closed::ByWriter);
    }
}

impl Write for ConduitWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        loop {
            match state.closed {
                Closed::Open => {}
                Closed::ByReader => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "conduit reader closed",
                    ))
                }
                Closed::ByWriter => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "conduit writer closed",
                    ))
                }
                Closed::Released => return Err(closed_error()),
            }
            let free = shared.capacity - state.data.len();
            if free > 0 {
                let n = free.min(buf.len());
                state.data.extend(&buf[..n]);
                shared.readable.notify_all();
                return Ok(n);
            }
            shared.writable.wait(&mut state);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.shared.state.lock().closed {
            Closed::Released => Err(closed_error()),
            _ => Ok(()),
        }
    }
}

impl Drop for ConduitWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read end of a [`Conduit`]
#[derive(Debug)]
pub struct ConduitReader {
    shared: Arc<Shared>,
}

impl ConduitReader {
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Abort reading; the writer's next write fails
    pub fn close(&self) {
        self.shared.close(Closed::ByReader);
    }
}

impl Read for ConduitReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        loop {
            match state.closed {
                Closed::Released | Closed::ByReader => return Err(closed_error()),
                Closed::Open | Closed::ByWriter => {}
            }
            if !state.data.is_empty() {
                let n = state.data.len().min(buf.len());
                for (slot, byte) in buf.iter_mut().zip(state.data.drain(..n)) {
                    *slot = byte;
                }
                shared.writable.notify_all();
                return Ok(n);
            }
            if state.closed == Closed::ByWriter {
                return Ok(0);
            }
            shared.readable.wait(&mut state);
        }
    }
}

impl Drop for ConduitReader {
    fn drop(&mut self) {
        self.close();
    }
}
