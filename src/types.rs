//! Core data model: entities, subject/context references, grant rows
//!
//! Entities have value semantics with identity by primary key; the grant
//! store owns them. Subjects and contexts are never owned by the engine,
//! only referenced through tagged pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A named permission, unique on `(name, guard)`.
///
/// `name` is an opaque, application-defined string (e.g. `article:edit`).
/// When wildcards are enabled a name may itself be a pattern grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    /// Namespace partition separating authentication realms ("web", "api").
    pub guard: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(name: impl Into<String>, guard: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            guard: guard.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A role, unique on `(name, guard)`. Owns many-to-many relations to
/// permissions and, when capabilities are enabled, to capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub guard: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, guard: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            guard: guard.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A named, reusable bundle of permissions assignable to roles or
/// (when enabled) directly to subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub id: Uuid,
    pub name: String,
    pub guard: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Capability {
    pub fn new(name: impl Into<String>, guard: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            guard: guard.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Polymorphic reference to an external principal (`("user", "1")`).
///
/// The engine never resolves the type tag to a concrete entity; that is
/// the caller's boundary concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: String,
    pub subject_id: String,
}

impl SubjectRef {
    pub fn new(subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.subject_type, self.subject_id)
    }
}

/// Scoping key for multi-tenant grants (`("team", "7")`). `None` in an
/// association row denotes the global (unscoped) record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextRef {
    pub context_type: String,
    pub context_id: String,
}

impl ContextRef {
    pub fn new(context_type: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            context_type: context_type.into(),
            context_id: context_id.into(),
        }
    }
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.context_type, self.context_id)
    }
}

/// Direct permission grant to a subject, optionally context-scoped.
/// Unique on the full key tuple; carries no payload besides the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission_id: Uuid,
    pub subject: SubjectRef,
    pub context: Option<ContextRef>,
}

/// Role assignment to a subject, optionally context-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role_id: Uuid,
    pub subject: SubjectRef,
    pub context: Option<ContextRef>,
}

/// Direct capability assignment to a subject. Capability assignments are
/// never context-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityAssignment {
    pub capability_id: Uuid,
    pub subject: SubjectRef,
}

/// Role together with its relation id sets, as loaded into the
/// resolution cache in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub role: Role,
    pub permission_ids: Vec<Uuid>,
    pub capability_ids: Vec<Uuid>,
}

/// Capability together with its permission id set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub capability: Capability,
    pub permission_ids: Vec<Uuid>,
}
