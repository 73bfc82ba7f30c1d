//! Evaluation runtime abstraction.
//!
//! Provides a trait for evaluation runtimes, allowing a session to host any
//! interpreter that can run under a capability policy and a memory ceiling.
//! The session layer owns the worker thread, liveness, and termination; an
//! implementation only has to start and evaluate.

use crate::capture::CaptureSink;
use crate::error::{EvalError, InitError};
use crate::value::Value;
use policy::CapabilityPolicy;

/// Memory ceiling for a single evaluation runtime.
///
/// Bounds live allocation inside the runtime; a breach fails the in-flight
/// evaluate with [`EvalError::ResourceExhausted`] and is terminal for the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimit(u64);

impl MemoryLimit {
    /// Default ceiling: 16 MiB.
    pub const DEFAULT: MemoryLimit = MemoryLimit::from_mib(16);

    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * 1024 * 1024)
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }
}

impl Default for MemoryLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Trait for evaluation runtimes hosted inside a session.
///
/// `start` runs on the session's worker thread and must leave the runtime
/// ready to accept expressions; its result is what the creating caller sees
/// from the readiness rendezvous. `submit` evaluates exactly one expression.
/// Output belongs in the capture sinks, never in the returned value.
pub trait Evaluator: Sized + Send + 'static {
    /// Bring up a runtime under the given policy and memory ceiling, bound
    /// to the session's stdout and stderr sinks.
    fn start(
        policy: CapabilityPolicy,
        limit: MemoryLimit,
        stdout: CaptureSink,
        stderr: CaptureSink,
    ) -> Result<Self, InitError>;

    /// Evaluate one expression to a value.
    fn submit(&mut self, expr: &str) -> Result<Value, EvalError>;
}
