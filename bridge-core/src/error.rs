use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Group,
    Sensor,
    Scene,
    Rule,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Group => "group",
            ResourceKind::Sensor => "sensor",
            ResourceKind::Scene => "scene",
            ResourceKind::Rule => "rule",
        })
    }
}

/// Failures reported by a bridge. None of them are retried.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },
    #[error("{kind} {name:?} rejected: {reason}")]
    Rejected { kind: ResourceKind, name: String, reason: String },
    #[error("failed to delete {kind} {id}: {reason}")]
    DeleteFailed { kind: ResourceKind, id: String, reason: String },
    #[error("bridge transport error: {0}")]
    Transport(String),
}

impl BridgeError {
    pub fn not_found(kind: ResourceKind, id: impl fmt::Display) -> Self {
        BridgeError::NotFound { kind, id: id.to_string() }
    }

    pub fn rejected(kind: ResourceKind, name: &str, reason: impl Into<String>) -> Self {
        BridgeError::Rejected { kind, name: name.to_string(), reason: reason.into() }
    }
}
