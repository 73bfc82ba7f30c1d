//! Bounded output capture.
//!
//! A capture pairs a write side ([`CaptureSink`], handed to the evaluator)
//! with a drain side ([`OutputCapture`], kept by the session owner). The
//! buffer has a fixed byte capacity: writes block once it is full and stay
//! blocked until a drain frees space, so output-heavy evaluations apply
//! backpressure instead of growing without bound.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Default capture capacity: 64 KiB per stream.
pub const DEFAULT_CAPTURE_CAPACITY: usize = 64 * 1024;

/// The capture was closed while a write was pending or attempted.
#[derive(Debug, Error)]
#[error("output capture closed")]
pub struct SinkClosed;

#[derive(Debug)]
struct State {
    buf: Vec<u8>,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    space: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a bounded capture with the given byte capacity.
pub fn bounded(capacity: usize) -> (CaptureSink, OutputCapture) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: Vec::new(),
            closed: false,
        }),
        space: Condvar::new(),
    });

    (
        CaptureSink {
            shared: Arc::clone(&shared),
            capacity: capacity.max(1),
        },
        OutputCapture { shared },
    )
}

/// Write side of a capture, held by the evaluation runtime.
#[derive(Clone)]
pub struct CaptureSink {
    shared: Arc<Shared>,
    capacity: usize,
}

impl CaptureSink {
    /// Append bytes to the capture, blocking while the buffer is full.
    ///
    /// Returns [`SinkClosed`] once the capture has been closed (the session
    /// was killed); any bytes written before that point stay drainable.
    pub fn write(&self, bytes: &[u8]) -> Result<(), SinkClosed> {
        let mut rest = bytes;
        let mut state = self.shared.lock();

        while !rest.is_empty() {
            while state.buf.len() >= self.capacity && !state.closed {
                state = self
                    .shared
                    .space
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.closed {
                return Err(SinkClosed);
            }
            let n = (self.capacity - state.buf.len()).min(rest.len());
            state.buf.extend_from_slice(&rest[..n]);
            rest = &rest[n..];
        }
        Ok(())
    }

    /// Convenience wrapper for text output.
    pub fn write_str(&self, text: &str) -> Result<(), SinkClosed> {
        self.write(text.as_bytes())
    }
}

/// Drain side of a capture, held by the session owner.
#[derive(Debug)]
pub struct OutputCapture {
    shared: Arc<Shared>,
}

impl OutputCapture {
    /// Return and atomically clear all currently buffered bytes.
    ///
    /// Draining twice without an intervening write yields empty the second
    /// time. Draining also wakes any writer blocked on a full buffer.
    pub fn drain(&self) -> Vec<u8> {
        let mut state = self.shared.lock();
        let out = std::mem::take(&mut state.buf);
        drop(state);
        self.shared.space.notify_all();
        out
    }

    /// Close the capture: pending and future writes fail, buffered bytes
    /// remain drainable.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        state.closed = true;
        drop(state);
        self.shared.space.notify_all();
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.shared.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
