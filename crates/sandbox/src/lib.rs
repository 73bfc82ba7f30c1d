//! Brig sandbox — isolated evaluation sessions for untrusted code.
//!
//! This crate provides the core sandboxing primitive: a [`Session`] hosting
//! one isolated evaluation runtime under a capability policy and a memory
//! ceiling, with both output streams captured into bounded buffers. It is a
//! library, not a server — intended to be embedded in a higher-level service.
//!
//! # Overview
//!
//! The crate is organized around these concepts:
//!
//! - **Session**: One isolated evaluation context plus its paired output
//!   captures. Created on demand, killed explicitly or reclaimed on drop.
//! - **Evaluator**: A trait abstracting the runtime that actually evaluates
//!   expressions. [`FactEvaluator`] is the reference implementation.
//! - **OutputCapture**: A bounded buffer accumulating a stream's output until
//!   drained; writers block when it is full.
//! - **CapabilityPolicy** (re-exported from the `policy` crate): declarative
//!   rules restricting filesystem, network, and process-execution operations.
//!
//! # Lifecycle
//!
//! A session moves through `INITIALIZING → READY → DEAD`. Creation spawns a
//! worker for the evaluator and blocks once on its readiness signal.
//! Successful evaluations keep the session READY. [`Session::kill`] or a
//! breached memory ceiling move it to DEAD, which is terminal: only drains
//! are permitted afterward.
//!
//! # Example
//!
//! ```ignore
//! use sandbox::{Session, SessionConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::create(SessionConfig::default()).await?;
//!
//! session.evaluate("(assert (parent tom bob))").await?;
//! let result = session.evaluate("(query (parent tom _))").await?;
//! println!("{result}");
//!
//! session.evaluate(r#"(print "hello")"#).await?;
//! assert_eq!(session.drain_stdout(), b"hello");
//!
//! session.kill();
//! # Ok(())
//! # }
//! ```

mod capture;
mod error;
mod evaluator;
mod interp;
mod session;
mod value;

pub use capture::{CaptureSink, OutputCapture, SinkClosed, DEFAULT_CAPTURE_CAPACITY};
pub use error::{EvalError, InitError};
pub use evaluator::{Evaluator, MemoryLimit};
pub use interp::FactEvaluator;
pub use session::{Session, SessionConfig, SessionId};
pub use value::Value;

// Re-export the policy types sessions are configured with.
pub use policy::{AccessKind, AccessRequest, AllowRules, CapabilityPolicy, Decision};
