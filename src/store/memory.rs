//! In-memory grant store
//!
//! Reference implementation of [`GrantStore`] backed by hash maps behind a
//! `tokio::sync::RwLock`. Suitable for tests and single-process use; a
//! relational backend implements the same trait elsewhere.

use super::GrantStore;
use crate::error::{EntityKind, Error, Result};
use crate::types::{
    Capability, CapabilityAssignment, CapabilityRecord, Permission, PermissionGrant, Role,
    RoleAssignment, RoleRecord, SubjectRef,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    permissions: HashMap<Uuid, Permission>,
    roles: HashMap<Uuid, Role>,
    capabilities: HashMap<Uuid, Capability>,

    role_permissions: HashSet<(Uuid, Uuid)>,
    role_capabilities: HashSet<(Uuid, Uuid)>,
    capability_permissions: HashSet<(Uuid, Uuid)>,

    permission_grants: Vec<PermissionGrant>,
    role_assignments: Vec<RoleAssignment>,
    capability_assignments: Vec<CapabilityAssignment>,
}

impl Tables {
    fn permission_id(&self, name: &str, guard: &str) -> Option<Uuid> {
        self.permissions
            .values()
            .find(|p| p.name == name && p.guard == guard)
            .map(|p| p.id)
    }

    fn role_id(&self, name: &str, guard: &str) -> Option<Uuid> {
        self.roles
            .values()
            .find(|r| r.name == name && r.guard == guard)
            .map(|r| r.id)
    }

    fn capability_id(&self, name: &str, guard: &str) -> Option<Uuid> {
        self.capabilities
            .values()
            .find(|c| c.name == name && c.guard == guard)
            .map(|c| c.id)
    }

    fn cascade_permission(&mut self, id: Uuid) {
        self.role_permissions.retain(|(_, p)| *p != id);
        self.capability_permissions.retain(|(_, p)| *p != id);
        self.permission_grants.retain(|g| g.permission_id != id);
    }

    fn cascade_role(&mut self, id: Uuid) {
        self.role_permissions.retain(|(r, _)| *r != id);
        self.role_capabilities.retain(|(r, _)| *r != id);
        self.role_assignments.retain(|a| a.role_id != id);
    }

    fn cascade_capability(&mut self, id: Uuid) {
        self.role_capabilities.retain(|(_, c)| *c != id);
        self.capability_permissions.retain(|(c, _)| *c != id);
        self.capability_assignments.retain(|a| a.capability_id != id);
    }
}

/// In-memory [`GrantStore`] implementation.
pub struct InMemoryGrantStore {
    tables: RwLock<Tables>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryGrantStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn create_permission(&self, permission: Permission) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .permission_id(&permission.name, &permission.guard)
            .is_some()
        {
            return Err(Error::AlreadyExists {
                kind: EntityKind::Permission,
                name: permission.name,
                guard: permission.guard,
            });
        }
        tables.permissions.insert(permission.id, permission);
        Ok(())
    }

    async fn find_permission(&self, name: &str, guard: &str) -> Result<Option<Permission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .permissions
            .values()
            .find(|p| p.name == name && p.guard == guard)
            .cloned())
    }

    async fn delete_permission(&self, name: &str, guard: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let id = tables
            .permission_id(name, guard)
            .ok_or_else(|| Error::NotFound {
                kind: EntityKind::Permission,
                name: name.to_string(),
                guard: guard.to_string(),
            })?;
        tables.permissions.remove(&id);
        tables.cascade_permission(id);
        Ok(())
    }

    async fn create_role(&self, role: Role) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.role_id(&role.name, &role.guard).is_some() {
            return Err(Error::AlreadyExists {
                kind: EntityKind::Role,
                name: role.name,
                guard: role.guard,
            });
        }
        tables.roles.insert(role.id, role);
        Ok(())
    }

    async fn find_role(&self, name: &str, guard: &str) -> Result<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .values()
            .find(|r| r.name == name && r.guard == guard)
            .cloned())
    }

    async fn delete_role(&self, name: &str, guard: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let id = tables.role_id(name, guard).ok_or_else(|| Error::NotFound {
            kind: EntityKind::Role,
            name: name.to_string(),
            guard: guard.to_string(),
        })?;
        tables.roles.remove(&id);
        tables.cascade_role(id);
        Ok(())
    }

    async fn create_capability(&self, capability: Capability) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .capability_id(&capability.name, &capability.guard)
            .is_some()
        {
            return Err(Error::AlreadyExists {
                kind: EntityKind::Capability,
                name: capability.name,
                guard: capability.guard,
            });
        }
        tables.capabilities.insert(capability.id, capability);
        Ok(())
    }

    async fn find_capability(&self, name: &str, guard: &str) -> Result<Option<Capability>> {
        let tables = self.tables.read().await;
        Ok(tables
            .capabilities
            .values()
            .find(|c| c.name == name && c.guard == guard)
            .cloned())
    }

    async fn delete_capability(&self, name: &str, guard: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let id = tables
            .capability_id(name, guard)
            .ok_or_else(|| Error::NotFound {
                kind: EntityKind::Capability,
                name: name.to_string(),
                guard: guard.to_string(),
            })?;
        tables.capabilities.remove(&id);
        tables.cascade_capability(id);
        Ok(())
    }

    async fn attach_permission_to_role(&self, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.role_permissions.insert((role_id, permission_id));
        Ok(())
    }

    async fn detach_permission_from_role(&self, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.role_permissions.remove(&(role_id, permission_id));
        Ok(())
    }

    async fn attach_capability_to_role(&self, role_id: Uuid, capability_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.role_capabilities.insert((role_id, capability_id));
        Ok(())
    }

    async fn detach_capability_from_role(&self, role_id: Uuid, capability_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.role_capabilities.remove(&(role_id, capability_id));
        Ok(())
    }

    async fn attach_permission_to_capability(
        &self,
        capability_id: Uuid,
        permission_id: Uuid,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .capability_permissions
            .insert((capability_id, permission_id));
        Ok(())
    }

    async fn detach_permission_from_capability(
        &self,
        capability_id: Uuid,
        permission_id: Uuid,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .capability_permissions
            .remove(&(capability_id, permission_id));
        Ok(())
    }

    async fn insert_permission_grant(&self, grant: PermissionGrant) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.permission_grants.contains(&grant) {
            tables.permission_grants.push(grant);
        }
        Ok(())
    }

    async fn remove_permission_grant(&self, grant: &PermissionGrant) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.permission_grants.retain(|g| g != grant);
        Ok(())
    }

    async fn insert_role_assignment(&self, assignment: RoleAssignment) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.role_assignments.contains(&assignment) {
            tables.role_assignments.push(assignment);
        }
        Ok(())
    }

    async fn remove_role_assignment(&self, assignment: &RoleAssignment) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.role_assignments.retain(|a| a != assignment);
        Ok(())
    }

    async fn insert_capability_assignment(&self, assignment: CapabilityAssignment) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.capability_assignments.contains(&assignment) {
            tables.capability_assignments.push(assignment);
        }
        Ok(())
    }

    async fn remove_capability_assignment(&self, assignment: &CapabilityAssignment) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.capability_assignments.retain(|a| a != assignment);
        Ok(())
    }

    async fn permission_grants_for(&self, subject: &SubjectRef) -> Result<Vec<PermissionGrant>> {
        let tables = self.tables.read().await;
        Ok(tables
            .permission_grants
            .iter()
            .filter(|g| &g.subject == subject)
            .cloned()
            .collect())
    }

    async fn role_assignments_for(&self, subject: &SubjectRef) -> Result<Vec<RoleAssignment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .role_assignments
            .iter()
            .filter(|a| &a.subject == subject)
            .cloned()
            .collect())
    }

    async fn capability_assignments_for(
        &self,
        subject: &SubjectRef,
    ) -> Result<Vec<CapabilityAssignment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .capability_assignments
            .iter()
            .filter(|a| &a.subject == subject)
            .cloned()
            .collect())
    }

    async fn load_permissions(&self) -> Result<Vec<Permission>> {
        let tables = self.tables.read().await;
        Ok(tables.permissions.values().cloned().collect())
    }

    async fn load_roles(&self) -> Result<Vec<RoleRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .values()
            .map(|role| RoleRecord {
                role: role.clone(),
                permission_ids: tables
                    .role_permissions
                    .iter()
                    .filter(|(r, _)| *r == role.id)
                    .map(|(_, p)| *p)
                    .collect(),
                capability_ids: tables
                    .role_capabilities
                    .iter()
                    .filter(|(r, _)| *r == role.id)
                    .map(|(_, c)| *c)
                    .collect(),
            })
            .collect())
    }

    async fn load_capabilities(&self) -> Result<Vec<CapabilityRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .capabilities
            .values()
            .map(|capability| CapabilityRecord {
                capability: capability.clone(),
                permission_ids: tables
                    .capability_permissions
                    .iter()
                    .filter(|(c, _)| *c == capability.id)
                    .map(|(_, p)| *p)
                    .collect(),
            })
            .collect())
    }
}
