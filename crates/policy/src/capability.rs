use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of restricted operations a sandboxed evaluation can attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
    Network,
    Execute,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
            AccessKind::Network => "network",
            AccessKind::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// An access request with optional scope.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub kind: AccessKind,
    pub scope: Option<String>, // e.g., path, host:port, command
}

impl AccessRequest {
    pub fn new(kind: AccessKind) -> Self {
        Self { kind, scope: None }
    }

    pub fn with_scope(kind: AccessKind, scope: impl Into<String>) -> Self {
        Self {
            kind,
            scope: Some(scope.into()),
        }
    }

    pub fn read(path: impl Into<String>) -> Self {
        Self::with_scope(AccessKind::Read, path)
    }

    pub fn write(path: impl Into<String>) -> Self {
        Self::with_scope(AccessKind::Write, path)
    }

    pub fn network(target: impl Into<String>) -> Self {
        Self::with_scope(AccessKind::Network, target)
    }

    pub fn execute(command: impl Into<String>) -> Self {
        Self::with_scope(AccessKind::Execute, command)
    }
}
