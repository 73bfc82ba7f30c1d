//! Capability-based policy system.
//!
//! Core principle: **every side effect inside a sandbox requires an explicit
//! capability.** Filesystem reads and writes, network access, and process
//! execution are all checked against a declarative rule set before the
//! operation is allowed to happen.

mod capability;
mod error;
mod policy;

pub use capability::{AccessKind, AccessRequest};
pub use error::{Error, Result};
pub use policy::{AllowRules, CapabilityPolicy, Decision};
