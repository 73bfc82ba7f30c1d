//! Error taxonomy for session creation and evaluation.

use policy::AccessKind;
use thiserror::Error;

/// Failure to bring up a session's evaluation runtime.
///
/// Fatal to the creating call only: no session is returned and nothing
/// needs cleaning up.
#[derive(Debug, Error)]
pub enum InitError {
    /// The evaluator reported a startup failure.
    #[error("evaluator failed to start: {0}")]
    Startup(String),

    /// The worker exited before signalling readiness.
    #[error("evaluator worker exited before signalling readiness")]
    WorkerGone,
}

/// Failure of a single evaluate call.
///
/// Only [`EvalError::ResourceExhausted`] is terminal for the session;
/// every other variant leaves the evaluator alive.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The submitted expression was malformed.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The evaluated expression raised an error.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Live allocation exceeded the session's memory ceiling.
    #[error("out of memory: live allocation of {used} bytes exceeds the {limit} byte ceiling")]
    ResourceExhausted { used: u64, limit: u64 },

    /// The expression attempted an operation forbidden by the capability
    /// policy. The same denied operation reproduces the same error.
    #[error("access denied ({kind}): {reason}")]
    AccessDenied { kind: AccessKind, reason: String },

    /// Evaluate was invoked on a dead session.
    #[error("evaluator terminated")]
    Terminated,
}

impl EvalError {
    /// Whether this failure ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EvalError::ResourceExhausted { .. } | EvalError::Terminated
        )
    }
}

impl From<policy::Error> for EvalError {
    fn from(e: policy::Error) -> Self {
        match e {
            policy::Error::Denied { kind, reason } => EvalError::AccessDenied { kind, reason },
            other => EvalError::Runtime(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_exhausted_reads_as_oom() {
        let err = EvalError::ResourceExhausted {
            used: 32 * 1024 * 1024,
            limit: 16 * 1024 * 1024,
        };
        assert!(err.to_string().contains("out of memory"));
        assert!(err.is_fatal());
    }

    #[test]
    fn access_denied_names_the_kind() {
        let err = EvalError::from(policy::Error::Denied {
            kind: AccessKind::Network,
            reason: "network not in allowlist".into(),
        });
        assert!(err.to_string().contains("network"));
        assert!(!err.is_fatal());
    }
}
