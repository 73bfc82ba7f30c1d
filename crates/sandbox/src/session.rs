//! Session management.
//!
//! A [`Session`] hosts exactly one evaluation runtime on a background worker
//! and owns the drain side of its two output captures. Creation performs one
//! synchronous readiness rendezvous with the worker; evaluation is a
//! command/reply exchange over a channel; kill is abrupt and terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capture::{self, OutputCapture, DEFAULT_CAPTURE_CAPACITY};
use crate::error::{EvalError, InitError};
use crate::evaluator::{Evaluator, MemoryLimit};
use crate::interp::FactEvaluator;
use crate::value::Value;
use policy::CapabilityPolicy;

/// A unique identifier for a session.
///
/// Generated at creation, immutable, compared by identity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for a new session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Memory ceiling for the evaluation runtime.
    pub memory_limit: MemoryLimit,

    /// Capability policy the runtime is confined by.
    pub policy: CapabilityPolicy,

    /// Byte capacity of each output capture.
    pub capture_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            memory_limit: MemoryLimit::DEFAULT,
            policy: CapabilityPolicy::restrictive(),
            capture_capacity: DEFAULT_CAPTURE_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_limit(mut self, limit: MemoryLimit) -> Self {
        self.memory_limit = limit;
        self
    }

    pub fn with_policy(mut self, policy: CapabilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_capture_capacity(mut self, bytes: usize) -> Self {
        self.capture_capacity = bytes;
        self
    }
}

enum Command {
    Evaluate {
        expr: String,
        reply: oneshot::Sender<Result<Value, EvalError>>,
    },
}

/// One isolated evaluation context plus its paired output captures.
///
/// Evaluate calls must be issued sequentially by the owner; the other
/// operations are non-async and safe to call from a separate coordinating
/// task (e.g., racing a [`kill`](Session::kill) against an in-flight
/// evaluate to impose a deadline).
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    alive: Arc<AtomicBool>,
    stdout: OutputCapture,
    stderr: OutputCapture,
}

impl Session {
    /// Create a session hosting the reference [`FactEvaluator`].
    pub async fn create(config: SessionConfig) -> Result<Self, InitError> {
        Self::create_with::<FactEvaluator>(config).await
    }

    /// Create a session hosting a custom evaluation runtime.
    ///
    /// Spawns the worker, starts the evaluator under the configured policy
    /// and memory ceiling bound to two fresh captures, and blocks until the
    /// worker signals one-time readiness. On a startup failure no session is
    /// returned.
    pub async fn create_with<E: Evaluator>(config: SessionConfig) -> Result<Self, InitError> {
        let id = SessionId::new();
        let (stdout_sink, stdout) = capture::bounded(config.capture_capacity);
        let (stderr_sink, stderr) = capture::bounded(config.capture_capacity);
        let (tx, mut rx) = mpsc::channel(1);
        let (ready_tx, ready_rx) = oneshot::channel();
        let alive = Arc::new(AtomicBool::new(true));

        let worker_alive = Arc::clone(&alive);
        let policy = config.policy;
        let limit = config.memory_limit;

        tokio::task::spawn_blocking(move || {
            let mut evaluator = match E::start(policy, limit, stdout_sink, stderr_sink) {
                Ok(evaluator) => evaluator,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if ready_tx.send(Ok(())).is_err() {
                return; // creator gave up
            }

            while let Some(Command::Evaluate { expr, reply }) = rx.blocking_recv() {
                if !worker_alive.load(Ordering::Acquire) {
                    let _ = reply.send(Err(EvalError::Terminated));
                    break;
                }
                let result = evaluator.submit(&expr);
                let fatal = matches!(&result, Err(e) if e.is_fatal());
                if fatal {
                    // Flip liveness before replying so the caller observing
                    // the error already sees a dead session.
                    worker_alive.store(false, Ordering::Release);
                    warn!(session = %id, "evaluation runtime died");
                }
                let _ = reply.send(result);
                if fatal {
                    break;
                }
            }
            worker_alive.store(false, Ordering::Release);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                debug!(session = %id, "session ready");
                Ok(Self {
                    id,
                    commands: Mutex::new(Some(tx)),
                    alive,
                    stdout,
                    stderr,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(InitError::WorkerGone),
        }
    }

    /// Evaluate one expression inside the session.
    ///
    /// Bytes the expression writes to its standard output/error accumulate
    /// in the session's captures and are never part of the return value.
    /// Once the session is dead — killed, or terminated by
    /// [`EvalError::ResourceExhausted`] — every further call reports
    /// [`EvalError::Terminated`].
    pub async fn evaluate(&self, expr: impl Into<String>) -> Result<Value, EvalError> {
        let Some(sender) = self.sender() else {
            return Err(EvalError::Terminated);
        };
        if !self.is_alive() {
            return Err(EvalError::Terminated);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Command::Evaluate {
                expr: expr.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EvalError::Terminated)?;

        reply_rx.await.unwrap_or(Err(EvalError::Terminated))
    }

    /// Return and clear everything the session wrote to standard output
    /// since the last drain.
    pub fn drain_stdout(&self) -> Vec<u8> {
        self.stdout.drain()
    }

    /// Return and clear everything the session wrote to standard error
    /// since the last drain.
    pub fn drain_stderr(&self) -> Vec<u8> {
        self.stderr.drain()
    }

    /// Drain both streams, discarding the results.
    pub fn flush(&self) {
        self.stdout.drain();
        self.stderr.drain();
    }

    /// Non-blocking liveness query: true from creation until the session is
    /// killed or its runtime dies from resource exhaustion.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Forcibly terminate the session.
    ///
    /// Abrupt, not graceful: the command channel is dropped and both
    /// captures are closed, waking any writer blocked on backpressure.
    /// Already-buffered output remains drainable.
    pub fn kill(&self) {
        let was_alive = self.alive.swap(false, Ordering::AcqRel);
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.stdout.close();
        self.stderr.close();
        if was_alive {
            debug!(session = %self.id, "session killed");
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Command>> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.kill();
    }
}
