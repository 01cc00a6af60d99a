//! Error types for the resolution engine

use std::fmt;
use thiserror::Error;

/// Kind of named entity an operation was addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Permission,
    Role,
    Capability,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permission => write!(f, "permission"),
            Self::Role => write!(f, "role"),
            Self::Capability => write!(f, "capability"),
        }
    }
}

/// Resolution engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// No entity with the given name exists under the guard.
    ///
    /// Expected control flow for administrative lookups; `can` never
    /// raises it (an absent permission simply resolves to `false`).
    #[error("{kind} not found: '{name}' (guard '{guard}')")]
    NotFound {
        kind: EntityKind,
        name: String,
        guard: String,
    },

    /// Duplicate create under the same `(name, guard)` key.
    #[error("{kind} already exists: '{name}' (guard '{guard}')")]
    AlreadyExists {
        kind: EntityKind,
        name: String,
        guard: String,
    },

    /// Attempt to associate entities across different guards.
    #[error("guard mismatch: cannot attach '{attached}' (guard '{attached_guard}') to '{target}' (guard '{target_guard}')")]
    GuardMismatch {
        target: String,
        target_guard: String,
        attached: String,
        attached_guard: String,
    },

    /// Role inheritance graph contains a cycle.
    #[error("circular role inheritance detected at '{0}'")]
    CircularRoleInheritance(String),

    /// Cache backend failure. Propagated to the caller rather than being
    /// interpreted as "no grants exist".
    #[error("cache error: {0}")]
    Cache(String),

    /// Grant store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, Error>;
