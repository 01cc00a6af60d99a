//! Grant store collaborator contract
//!
//! Persistence of entities and their association rows is an external
//! concern; the engine only depends on this trait. Implementations must
//! enforce `(name, guard)` uniqueness on create and cascade-delete
//! association rows together with their entity.

use crate::error::Result;
use crate::types::{
    Capability, CapabilityAssignment, CapabilityRecord, Permission, PermissionGrant, Role,
    RoleAssignment, RoleRecord, SubjectRef,
};
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;

pub use memory::InMemoryGrantStore;

/// Storage contract for entities, relations, and subject associations.
///
/// Association writes (`insert_*`, `attach_*`) are idempotent: inserting a
/// row that already exists is a no-op, not an error. Entity creation is
/// not: a duplicate `(name, guard)` fails with `Error::AlreadyExists`.
#[async_trait]
pub trait GrantStore: Send + Sync {
    // Entities

    async fn create_permission(&self, permission: Permission) -> Result<()>;
    async fn find_permission(&self, name: &str, guard: &str) -> Result<Option<Permission>>;
    /// Deletes the permission and cascades all of its association rows.
    async fn delete_permission(&self, name: &str, guard: &str) -> Result<()>;

    async fn create_role(&self, role: Role) -> Result<()>;
    async fn find_role(&self, name: &str, guard: &str) -> Result<Option<Role>>;
    async fn delete_role(&self, name: &str, guard: &str) -> Result<()>;

    async fn create_capability(&self, capability: Capability) -> Result<()>;
    async fn find_capability(&self, name: &str, guard: &str) -> Result<Option<Capability>>;
    async fn delete_capability(&self, name: &str, guard: &str) -> Result<()>;

    // Entity-to-entity relations

    async fn attach_permission_to_role(&self, role_id: Uuid, permission_id: Uuid) -> Result<()>;
    async fn detach_permission_from_role(&self, role_id: Uuid, permission_id: Uuid) -> Result<()>;

    async fn attach_capability_to_role(&self, role_id: Uuid, capability_id: Uuid) -> Result<()>;
    async fn detach_capability_from_role(&self, role_id: Uuid, capability_id: Uuid) -> Result<()>;

    async fn attach_permission_to_capability(
        &self,
        capability_id: Uuid,
        permission_id: Uuid,
    ) -> Result<()>;
    async fn detach_permission_from_capability(
        &self,
        capability_id: Uuid,
        permission_id: Uuid,
    ) -> Result<()>;

    // Subject associations

    async fn insert_permission_grant(&self, grant: PermissionGrant) -> Result<()>;
    async fn remove_permission_grant(&self, grant: &PermissionGrant) -> Result<()>;

    async fn insert_role_assignment(&self, assignment: RoleAssignment) -> Result<()>;
    async fn remove_role_assignment(&self, assignment: &RoleAssignment) -> Result<()>;

    async fn insert_capability_assignment(&self, assignment: CapabilityAssignment) -> Result<()>;
    async fn remove_capability_assignment(&self, assignment: &CapabilityAssignment) -> Result<()>;

    /// All direct permission grants held by a subject, across contexts.
    async fn permission_grants_for(&self, subject: &SubjectRef) -> Result<Vec<PermissionGrant>>;

    /// All role assignments held by a subject, across contexts.
    async fn role_assignments_for(&self, subject: &SubjectRef) -> Result<Vec<RoleAssignment>>;

    /// All direct capability assignments held by a subject.
    async fn capability_assignments_for(
        &self,
        subject: &SubjectRef,
    ) -> Result<Vec<CapabilityAssignment>>;

    // Snapshot loads for cache population

    async fn load_permissions(&self) -> Result<Vec<Permission>>;
    async fn load_roles(&self) -> Result<Vec<RoleRecord>>;
    async fn load_capabilities(&self) -> Result<Vec<CapabilityRecord>>;
}
