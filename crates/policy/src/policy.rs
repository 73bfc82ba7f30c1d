//! Policy configuration and enforcement.

use crate::{AccessKind, AccessRequest, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Declarative capability policy, loadable from TOML.
///
/// Everything not explicitly allowed is denied: an empty allow-list for a
/// kind denies that kind entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityPolicy {
    /// Operations that are explicitly allowed.
    #[serde(default)]
    pub allow: AllowRules,
}

/// Rules for allowed operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowRules {
    /// Filesystem subtrees readable by the sandbox.
    #[serde(default)]
    pub fs_read: Vec<PathBuf>,

    /// Filesystem subtrees writable by the sandbox.
    #[serde(default)]
    pub fs_write: Vec<PathBuf>,

    /// Network targets (`host` or `host:port`) the sandbox may reach.
    #[serde(default)]
    pub network: Vec<String>,

    /// Commands the sandbox may execute (exact or prefix match).
    #[serde(default)]
    pub execute: Vec<String>,
}

/// Result of an access check.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl CapabilityPolicy {
    /// Load policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }

    /// The default sandbox policy: no writes, no network, no process
    /// execution; reads only under the subtree two directory levels above
    /// the working directory.
    pub fn restrictive() -> Self {
        let read_root = std::env::current_dir()
            .ok()
            .and_then(|dir| dir.ancestors().nth(2).map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            allow: AllowRules {
                fs_read: vec![read_root],
                ..AllowRules::default()
            },
        }
    }

    /// Check an access request against the rule set.
    pub fn check(&self, request: &AccessRequest) -> Decision {
        let allowed = match request.kind {
            AccessKind::Read => Self::path_allowed(&self.allow.fs_read, &request.scope),
            AccessKind::Write => Self::path_allowed(&self.allow.fs_write, &request.scope),
            AccessKind::Network => Self::target_allowed(&self.allow.network, &request.scope),
            AccessKind::Execute => Self::command_allowed(&self.allow.execute, &request.scope),
        };

        if allowed {
            Decision::Allow
        } else {
            Decision::Deny {
                reason: format!(
                    "{} not in allowlist{}",
                    request.kind,
                    request
                        .scope
                        .as_ref()
                        .map(|s| format!(" (scope: {s})"))
                        .unwrap_or_default()
                ),
            }
        }
    }

    /// Check an access request, surfacing a refusal as [`Error::Denied`].
    pub fn require(&self, request: &AccessRequest) -> Result<()> {
        match self.check(request) {
            Decision::Allow => Ok(()),
            Decision::Deny { reason } => Err(Error::Denied {
                kind: request.kind,
                reason,
            }),
        }
    }

    fn path_allowed(allowlist: &[PathBuf], scope: &Option<String>) -> bool {
        let Some(path) = scope else {
            return !allowlist.is_empty(); // No scope = any path, allow if list non-empty
        };

        let path = normalize(Path::new(path));
        allowlist
            .iter()
            .any(|root| path.starts_with(normalize(root)))
    }

    fn target_allowed(allowlist: &[String], scope: &Option<String>) -> bool {
        let Some(target) = scope else {
            return !allowlist.is_empty();
        };

        // Match the full target, or the host part without its port.
        let host = target.rsplit_once(':').map_or(target.as_str(), |(h, _)| h);

        for allowed in allowlist {
            if allowed == "*" {
                return true;
            }
            if target == allowed || host == allowed {
                return true;
            }
            if host.ends_with(&format!(".{allowed}")) {
                return true;
            }
        }
        false
    }

    fn command_allowed(allowlist: &[String], scope: &Option<String>) -> bool {
        let Some(cmd) = scope else {
            return !allowlist.is_empty();
        };

        for allowed in allowlist {
            if allowed == "*" {
                return true;
            }
            // Exact match or prefix match (e.g., "git" allows "git status")
            if cmd == allowed || cmd.starts_with(&format!("{allowed} ")) {
                return true;
            }
        }
        false
    }
}

/// Lexical normalization: absolutize against the working directory and fold
/// `.`/`..` components, without touching the filesystem. Symlinks are not
/// resolved; the sandbox treats the path the evaluated code names as the
/// path being requested.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
