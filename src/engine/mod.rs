//! Permission resolution engine
//!
//! Orchestrates the four-path decision rule over the resolution cache and
//! the subject's association rows:
//!
//! ```text
//! can(subject, permission, context)
//!   → direct grant
//!   → via role
//!   → via capability through role
//!   → via capability directly
//! ```
//!
//! Each path applies the exact-or-wildcard name test and short-circuits on
//! the first success. Context-qualified checks restrict to rows in that
//! context first; with global fallback enabled the four paths re-run
//! against unscoped rows when nothing context-specific matched.
//!
//! Entity collections come from the [`ResolutionCache`]; the subject's own
//! rows are read fresh from the [`GrantStore`] per check. A naive check is
//! therefore O(subject's roles + capabilities) — batch-loading beyond that
//! is the caller's concern.
//!
//! Every write operation invalidates the cache before returning success;
//! a stale read after a successful write is a correctness bug here, not an
//! eventual-consistency window.

use crate::cache::{CacheBackend, CacheStats, MemoryCacheBackend, ResolutionCache};
use crate::error::{EntityKind, Error, Result};
use crate::hierarchy::{ResolvedRole, RoleDeclaration, RoleHierarchyResolver};
use crate::matcher::WildcardMatcher;
use crate::store::GrantStore;
use crate::types::{
    Capability, CapabilityAssignment, CapabilityRecord, ContextRef, Permission, PermissionGrant,
    Role, RoleAssignment, RoleRecord, SubjectRef,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Engine configuration and feature toggles.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Guard used by operations that do not take one explicitly.
    pub default_guard: String,

    /// Treat permission names containing `*` segments as pattern grants.
    pub enable_wildcards: bool,

    /// Evaluate capability paths (3 and 4) at all.
    pub enable_capabilities: bool,

    /// Allow capabilities to be assigned directly to subjects (path 4).
    pub enable_direct_capability_assignment: bool,

    /// Honor the context argument on checks and grants.
    pub enable_contexts: bool,

    /// Let unscoped grants satisfy context-qualified checks when no
    /// context-specific grant exists.
    pub global_fallback: bool,

    /// Key prefix for the resolution cache.
    pub cache_prefix: String,

    /// TTL backstop for populated cache collections.
    pub cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_guard: "web".to_string(),
            enable_wildcards: false,
            enable_capabilities: true,
            enable_direct_capability_assignment: true,
            enable_contexts: true,
            global_fallback: true,
            cache_prefix: crate::cache::DEFAULT_PREFIX.to_string(),
            cache_ttl: crate::cache::DEFAULT_TTL,
        }
    }
}

/// Which of the four paths satisfied a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantPath {
    Direct,
    ViaRole { role: String },
    ViaRoleCapability { role: String, capability: String },
    ViaCapability { capability: String },
}

/// The concrete grant that satisfied a check, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGrant {
    /// The granted permission entity (possibly a pattern grant).
    pub permission: Permission,
    pub path: GrantPath,
}

/// The RBAC resolution engine.
pub struct Engine {
    store: Arc<dyn GrantStore>,
    cache: ResolutionCache,
    matcher: WildcardMatcher,
    hierarchy: RoleHierarchyResolver,
    config: EngineConfig,
}

impl Engine {
    /// Engine with default configuration and a process-local cache backend.
    pub fn new(store: Arc<dyn GrantStore>) -> Self {
        Self::with_config(
            EngineConfig::default(),
            store,
            Arc::new(MemoryCacheBackend::new()),
        )
    }

    pub fn with_config(
        config: EngineConfig,
        store: Arc<dyn GrantStore>,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let cache = ResolutionCache::with_settings(
            Arc::clone(&store),
            backend,
            config.cache_prefix.clone(),
            config.cache_ttl,
        );
        Self {
            store,
            cache,
            matcher: WildcardMatcher::new(),
            hierarchy: RoleHierarchyResolver::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn matcher(&self) -> &WildcardMatcher {
        &self.matcher
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------

    /// Does the subject hold `permission` under the default guard?
    ///
    /// Never raises `NotFound`: an absent permission resolves to `false`.
    pub async fn can(
        &self,
        subject: &SubjectRef,
        permission: &str,
        context: Option<&ContextRef>,
    ) -> Result<bool> {
        self.can_with_guard(subject, permission, &self.config.default_guard, context)
            .await
    }

    pub async fn can_with_guard(
        &self,
        subject: &SubjectRef,
        permission: &str,
        guard: &str,
        context: Option<&ContextRef>,
    ) -> Result<bool> {
        Ok(self
            .resolve_grant(subject, permission, guard, context)
            .await?
            .is_some())
    }

    /// Like [`can`](Self::can), but returns the concrete grant that
    /// satisfied the check.
    pub async fn resolve_grant(
        &self,
        subject: &SubjectRef,
        permission: &str,
        guard: &str,
        context: Option<&ContextRef>,
    ) -> Result<Option<ResolvedGrant>> {
        let context = self.effective_context(context);
        let snapshot = self.snapshot(subject, guard).await?;

        for scope in self.scopes(context) {
            if let Some(resolved) = self.evaluate(&snapshot, permission, scope) {
                debug!(
                    subject = %subject,
                    permission,
                    guard,
                    path = ?resolved.path,
                    "permission check allowed"
                );
                return Ok(Some(resolved));
            }
        }

        debug!(subject = %subject, permission, guard, "permission check denied");
        Ok(None)
    }

    /// Materialize the subject's full resolved permission set under the
    /// default guard, for listing and UI. Pattern grants are included
    /// alongside their concrete expansions against the known permission
    /// names.
    pub async fn granted_permissions(
        &self,
        subject: &SubjectRef,
        context: Option<&ContextRef>,
    ) -> Result<Vec<Permission>> {
        self.granted_permissions_with_guard(subject, &self.config.default_guard, context)
            .await
    }

    pub async fn granted_permissions_with_guard(
        &self,
        subject: &SubjectRef,
        guard: &str,
        context: Option<&ContextRef>,
    ) -> Result<Vec<Permission>> {
        let context = self.effective_context(context);
        let snapshot = self.snapshot(subject, guard).await?;

        let all_names: Vec<String> = snapshot
            .permissions
            .values()
            .map(|p| p.name.clone())
            .collect();

        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut granted: Vec<Permission> = Vec::new();
        for scope in self.scopes(context) {
            for candidate in self.candidates(&snapshot, scope) {
                if seen.insert(candidate.id) {
                    granted.push(candidate.clone());
                }
                if self.config.enable_wildcards && self.matcher.is_wildcard(&candidate.name) {
                    for name in self.matcher.expand(&candidate.name, &all_names) {
                        if let Some(expanded) =
                            snapshot.permissions.values().find(|p| p.name == name)
                        {
                            if seen.insert(expanded.id) {
                                granted.push(expanded.clone());
                            }
                        }
                    }
                }
            }
        }

        granted.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(granted)
    }

    // ------------------------------------------------------------------
    // Entity administration
    // ------------------------------------------------------------------

    pub async fn create_permission(&self, name: &str, guard: &str) -> Result<Permission> {
        let permission = Permission::new(name, guard);
        self.store.create_permission(permission.clone()).await?;
        self.cache.invalidate().await?;
        Ok(permission)
    }

    pub async fn find_or_create_permission(&self, name: &str, guard: &str) -> Result<Permission> {
        if let Some(existing) = self.store.find_permission(name, guard).await? {
            return Ok(existing);
        }
        match self.create_permission(name, guard).await {
            Ok(permission) => Ok(permission),
            // Lost a create race; the row exists now.
            Err(Error::AlreadyExists { .. }) => self
                .store
                .find_permission(name, guard)
                .await?
                .ok_or_else(|| Error::Store(format!("permission '{}' vanished mid-create", name))),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_permission(&self, name: &str, guard: &str) -> Result<()> {
        self.store.delete_permission(name, guard).await?;
        self.cache.invalidate().await
    }

    pub async fn create_role(&self, name: &str, guard: &str) -> Result<Role> {
        let role = Role::new(name, guard);
        self.store.create_role(role.clone()).await?;
        self.cache.invalidate().await?;
        Ok(role)
    }

    pub async fn find_or_create_role(&self, name: &str, guard: &str) -> Result<Role> {
        if let Some(existing) = self.store.find_role(name, guard).await? {
            return Ok(existing);
        }
        match self.create_role(name, guard).await {
            Ok(role) => Ok(role),
            Err(Error::AlreadyExists { .. }) => self
                .store
                .find_role(name, guard)
                .await?
                .ok_or_else(|| Error::Store(format!("role '{}' vanished mid-create", name))),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_role(&self, name: &str, guard: &str) -> Result<()> {
        self.store.delete_role(name, guard).await?;
        self.cache.invalidate().await
    }

    pub async fn create_capability(&self, name: &str, guard: &str) -> Result<Capability> {
        let capability = Capability::new(name, guard);
        self.store.create_capability(capability.clone()).await?;
        self.cache.invalidate().await?;
        Ok(capability)
    }

    pub async fn find_or_create_capability(&self, name: &str, guard: &str) -> Result<Capability> {
        if let Some(existing) = self.store.find_capability(name, guard).await? {
            return Ok(existing);
        }
        match self.create_capability(name, guard).await {
            Ok(capability) => Ok(capability),
            Err(Error::AlreadyExists { .. }) => self
                .store
                .find_capability(name, guard)
                .await?
                .ok_or_else(|| Error::Store(format!("capability '{}' vanished mid-create", name))),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_capability(&self, name: &str, guard: &str) -> Result<()> {
        self.store.delete_capability(name, guard).await?;
        self.cache.invalidate().await
    }

    // ------------------------------------------------------------------
    // Entity-to-entity relations
    // ------------------------------------------------------------------

    /// Attach a permission to a role. Both must share a guard; a
    /// cross-guard attachment fails fast instead of silently succeeding.
    pub async fn attach_permission_to_role(
        &self,
        role: &Role,
        permission: &Permission,
    ) -> Result<()> {
        self.require_same_guard(&role.name, &role.guard, &permission.name, &permission.guard)?;
        self.store
            .attach_permission_to_role(role.id, permission.id)
            .await?;
        self.cache.invalidate().await
    }

    pub async fn detach_permission_from_role(
        &self,
        role: &Role,
        permission: &Permission,
    ) -> Result<()> {
        self.store
            .detach_permission_from_role(role.id, permission.id)
            .await?;
        self.cache.invalidate().await
    }

    pub async fn attach_permission_to_capability(
        &self,
        capability: &Capability,
        permission: &Permission,
    ) -> Result<()> {
        self.require_same_guard(
            &capability.name,
            &capability.guard,
            &permission.name,
            &permission.guard,
        )?;
        self.store
            .attach_permission_to_capability(capability.id, permission.id)
            .await?;
        self.cache.invalidate().await
    }

    pub async fn detach_permission_from_capability(
        &self,
        capability: &Capability,
        permission: &Permission,
    ) -> Result<()> {
        self.store
            .detach_permission_from_capability(capability.id, permission.id)
            .await?;
        self.cache.invalidate().await
    }

    pub async fn attach_capability_to_role(
        &self,
        role: &Role,
        capability: &Capability,
    ) -> Result<()> {
        self.require_same_guard(&role.name, &role.guard, &capability.name, &capability.guard)?;
        self.store
            .attach_capability_to_role(role.id, capability.id)
            .await?;
        self.cache.invalidate().await
    }

    pub async fn detach_capability_from_role(
        &self,
        role: &Role,
        capability: &Capability,
    ) -> Result<()> {
        self.store
            .detach_capability_from_role(role.id, capability.id)
            .await?;
        self.cache.invalidate().await
    }

    // ------------------------------------------------------------------
    // Subject grants
    // ------------------------------------------------------------------

    /// Grant a permission directly to a subject under the default guard.
    /// Idempotent: re-granting is a no-op that still invalidates the
    /// cache.
    pub async fn grant(
        &self,
        permission: &str,
        subject: &SubjectRef,
        context: Option<&ContextRef>,
    ) -> Result<()> {
        self.grant_with_guard(permission, &self.config.default_guard, subject, context)
            .await
    }

    pub async fn grant_with_guard(
        &self,
        permission: &str,
        guard: &str,
        subject: &SubjectRef,
        context: Option<&ContextRef>,
    ) -> Result<()> {
        let entity = self.require_permission(permission, guard).await?;
        self.store
            .insert_permission_grant(PermissionGrant {
                permission_id: entity.id,
                subject: subject.clone(),
                context: self.effective_context(context).cloned(),
            })
            .await?;
        self.cache.invalidate().await
    }

    pub async fn revoke(
        &self,
        permission: &str,
        subject: &SubjectRef,
        context: Option<&ContextRef>,
    ) -> Result<()> {
        self.revoke_with_guard(permission, &self.config.default_guard, subject, context)
            .await
    }

    pub async fn revoke_with_guard(
        &self,
        permission: &str,
        guard: &str,
        subject: &SubjectRef,
        context: Option<&ContextRef>,
    ) -> Result<()> {
        let entity = self.require_permission(permission, guard).await?;
        self.store
            .remove_permission_grant(&PermissionGrant {
                permission_id: entity.id,
                subject: subject.clone(),
                context: self.effective_context(context).cloned(),
            })
            .await?;
        self.cache.invalidate().await
    }

    pub async fn assign_role(
        &self,
        role: &str,
        subject: &SubjectRef,
        context: Option<&ContextRef>,
    ) -> Result<()> {
        self.assign_role_with_guard(role, &self.config.default_guard, subject, context)
            .await
    }

    pub async fn assign_role_with_guard(
        &self,
        role: &str,
        guard: &str,
        subject: &SubjectRef,
        context: Option<&ContextRef>,
    ) -> Result<()> {
        let entity = self.require_role(role, guard).await?;
        self.store
            .insert_role_assignment(RoleAssignment {
                role_id: entity.id,
                subject: subject.clone(),
                context: self.effective_context(context).cloned(),
            })
            .await?;
        self.cache.invalidate().await
    }

    pub async fn remove_role(
        &self,
        role: &str,
        subject: &SubjectRef,
        context: Option<&ContextRef>,
    ) -> Result<()> {
        self.remove_role_with_guard(role, &self.config.default_guard, subject, context)
            .await
    }

    pub async fn remove_role_with_guard(
        &self,
        role: &str,
        guard: &str,
        subject: &SubjectRef,
        context: Option<&ContextRef>,
    ) -> Result<()> {
        let entity = self.require_role(role, guard).await?;
        self.store
            .remove_role_assignment(&RoleAssignment {
                role_id: entity.id,
                subject: subject.clone(),
                context: self.effective_context(context).cloned(),
            })
            .await?;
        self.cache.invalidate().await
    }

    /// Assign a capability directly to a subject under the default guard.
    /// Capability assignments are always unscoped.
    pub async fn assign_capability(&self, capability: &str, subject: &SubjectRef) -> Result<()> {
        self.assign_capability_with_guard(capability, &self.config.default_guard, subject)
            .await
    }

    pub async fn assign_capability_with_guard(
        &self,
        capability: &str,
        guard: &str,
        subject: &SubjectRef,
    ) -> Result<()> {
        let entity = self.require_capability(capability, guard).await?;
        self.store
            .insert_capability_assignment(CapabilityAssignment {
                capability_id: entity.id,
                subject: subject.clone(),
            })
            .await?;
        self.cache.invalidate().await
    }

    pub async fn remove_capability(&self, capability: &str, subject: &SubjectRef) -> Result<()> {
        self.remove_capability_with_guard(capability, &self.config.default_guard, subject)
            .await
    }

    pub async fn remove_capability_with_guard(
        &self,
        capability: &str,
        guard: &str,
        subject: &SubjectRef,
    ) -> Result<()> {
        let entity = self.require_capability(capability, guard).await?;
        self.store
            .remove_capability_assignment(&CapabilityAssignment {
                capability_id: entity.id,
                subject: subject.clone(),
            })
            .await?;
        self.cache.invalidate().await
    }

    /// Force cache eviction. Safe to call at any time; mostly useful when
    /// an out-of-band writer touched the grant store.
    pub async fn invalidate_cache(&self) -> Result<()> {
        self.cache.invalidate().await
    }

    // ------------------------------------------------------------------
    // Declarative synchronization
    // ------------------------------------------------------------------

    /// Resolve a declared role hierarchy and write it into the grant
    /// store under the default guard. Existing roles and permissions are
    /// updated in place rather than failing with `AlreadyExists`.
    pub async fn sync_roles(
        &self,
        declarations: &[RoleDeclaration],
    ) -> Result<Vec<ResolvedRole>> {
        let guard = self.config.default_guard.clone();
        let resolved = self.hierarchy.resolve(declarations)?;

        for role in &resolved {
            let role_entity = self.find_or_create_role(&role.name, &guard).await?;
            for permission_name in role.all_permissions() {
                let permission = self
                    .find_or_create_permission(permission_name, &guard)
                    .await?;
                // Store-level attach: guards are equal by construction.
                self.store
                    .attach_permission_to_role(role_entity.id, permission.id)
                    .await?;
            }
        }

        self.cache.invalidate().await?;
        info!(roles = resolved.len(), guard = %guard, "role declarations synchronized");
        Ok(resolved)
    }

    /// Resolve a declared hierarchy without writing anything.
    pub fn resolve_role_hierarchy(
        &self,
        declarations: &[RoleDeclaration],
    ) -> Result<Vec<ResolvedRole>> {
        self.hierarchy.resolve(declarations)
    }

    // ------------------------------------------------------------------
    // Decision internals
    // ------------------------------------------------------------------

    fn effective_context<'a>(&self, context: Option<&'a ContextRef>) -> Option<&'a ContextRef> {
        if self.config.enable_contexts {
            context
        } else {
            None
        }
    }

    /// Scopes to evaluate, in order: the supplied context first, then the
    /// global scope when fallback applies. Without a context only the
    /// global scope is considered.
    fn scopes<'a>(&self, context: Option<&'a ContextRef>) -> Vec<Option<&'a ContextRef>> {
        match context {
            Some(ctx) if self.config.global_fallback => vec![Some(ctx), None],
            Some(ctx) => vec![Some(ctx)],
            None => vec![None],
        }
    }

    fn name_matches(&self, candidate: &Permission, requested: &str) -> bool {
        if self.config.enable_wildcards {
            self.matcher.matches(&candidate.name, requested)
        } else {
            candidate.name == requested
        }
    }

    async fn snapshot(&self, subject: &SubjectRef, guard: &str) -> Result<Snapshot> {
        let permissions: HashMap<Uuid, Permission> = self
            .cache
            .permissions_for_guard(guard)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let roles: HashMap<Uuid, RoleRecord> = self
            .cache
            .roles_for_guard(guard)
            .await?
            .into_iter()
            .map(|r| (r.role.id, r))
            .collect();
        let capabilities: HashMap<Uuid, CapabilityRecord> = if self.config.enable_capabilities {
            self.cache
                .capabilities_for_guard(guard)
                .await?
                .into_iter()
                .map(|c| (c.capability.id, c))
                .collect()
        } else {
            HashMap::new()
        };

        let grants = self.store.permission_grants_for(subject).await?;
        let assignments = self.store.role_assignments_for(subject).await?;
        let capability_assignments = if self.config.enable_capabilities
            && self.config.enable_direct_capability_assignment
        {
            self.store.capability_assignments_for(subject).await?
        } else {
            Vec::new()
        };

        Ok(Snapshot {
            permissions,
            roles,
            capabilities,
            grants,
            assignments,
            capability_assignments,
        })
    }

    /// One pass of the four-path rule against a single scope.
    fn evaluate(
        &self,
        snapshot: &Snapshot,
        requested: &str,
        scope: Option<&ContextRef>,
    ) -> Option<ResolvedGrant> {
        // Path 1: direct grant
        for grant in snapshot.grants_in_scope(scope) {
            if let Some(permission) = snapshot.permissions.get(&grant.permission_id) {
                if self.name_matches(permission, requested) {
                    return Some(ResolvedGrant {
                        permission: permission.clone(),
                        path: GrantPath::Direct,
                    });
                }
            }
        }

        // Path 2: via role
        for role in snapshot.roles_in_scope(scope) {
            for permission_id in &role.permission_ids {
                if let Some(permission) = snapshot.permissions.get(permission_id) {
                    if self.name_matches(permission, requested) {
                        return Some(ResolvedGrant {
                            permission: permission.clone(),
                            path: GrantPath::ViaRole {
                                role: role.role.name.clone(),
                            },
                        });
                    }
                }
            }
        }

        if !self.config.enable_capabilities {
            return None;
        }

        // Path 3: via capability through role
        for role in snapshot.roles_in_scope(scope) {
            for capability_id in &role.capability_ids {
                let Some(capability) = snapshot.capabilities.get(capability_id) else {
                    continue;
                };
                for permission_id in &capability.permission_ids {
                    if let Some(permission) = snapshot.permissions.get(permission_id) {
                        if self.name_matches(permission, requested) {
                            return Some(ResolvedGrant {
                                permission: permission.clone(),
                                path: GrantPath::ViaRoleCapability {
                                    role: role.role.name.clone(),
                                    capability: capability.capability.name.clone(),
                                },
                            });
                        }
                    }
                }
            }
        }

        // Path 4: via capability directly. Capability assignments carry no
        // context, so they participate in the global scope only.
        if scope.is_none() && self.config.enable_direct_capability_assignment {
            for assignment in &snapshot.capability_assignments {
                let Some(capability) = snapshot.capabilities.get(&assignment.capability_id) else {
                    continue;
                };
                for permission_id in &capability.permission_ids {
                    if let Some(permission) = snapshot.permissions.get(permission_id) {
                        if self.name_matches(permission, requested) {
                            return Some(ResolvedGrant {
                                permission: permission.clone(),
                                path: GrantPath::ViaCapability {
                                    capability: capability.capability.name.clone(),
                                },
                            });
                        }
                    }
                }
            }
        }

        None
    }

    /// Every permission entity reachable by the subject in one scope,
    /// without wildcard expansion.
    fn candidates<'a>(
        &self,
        snapshot: &'a Snapshot,
        scope: Option<&ContextRef>,
    ) -> Vec<&'a Permission> {
        let mut ids: Vec<Uuid> = Vec::new();

        for grant in snapshot.grants_in_scope(scope) {
            ids.push(grant.permission_id);
        }
        for role in snapshot.roles_in_scope(scope) {
            ids.extend(&role.permission_ids);
            if self.config.enable_capabilities {
                for capability_id in &role.capability_ids {
                    if let Some(capability) = snapshot.capabilities.get(capability_id) {
                        ids.extend(&capability.permission_ids);
                    }
                }
            }
        }
        if scope.is_none()
            && self.config.enable_capabilities
            && self.config.enable_direct_capability_assignment
        {
            for assignment in &snapshot.capability_assignments {
                if let Some(capability) = snapshot.capabilities.get(&assignment.capability_id) {
                    ids.extend(&capability.permission_ids);
                }
            }
        }

        ids.into_iter()
            .filter_map(|id| snapshot.permissions.get(&id))
            .collect()
    }

    fn require_same_guard(
        &self,
        target: &str,
        target_guard: &str,
        attached: &str,
        attached_guard: &str,
    ) -> Result<()> {
        if target_guard != attached_guard {
            return Err(Error::GuardMismatch {
                target: target.to_string(),
                target_guard: target_guard.to_string(),
                attached: attached.to_string(),
                attached_guard: attached_guard.to_string(),
            });
        }
        Ok(())
    }

    async fn require_permission(&self, name: &str, guard: &str) -> Result<Permission> {
        self.store
            .find_permission(name, guard)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: EntityKind::Permission,
                name: name.to_string(),
                guard: guard.to_string(),
            })
    }

    async fn require_role(&self, name: &str, guard: &str) -> Result<Role> {
        self.store
            .find_role(name, guard)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: EntityKind::Role,
                name: name.to_string(),
                guard: guard.to_string(),
            })
    }

    async fn require_capability(&self, name: &str, guard: &str) -> Result<Capability> {
        self.store
            .find_capability(name, guard)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: EntityKind::Capability,
                name: name.to_string(),
                guard: guard.to_string(),
            })
    }
}

/// Per-check view: cached entity collections plus the subject's own rows.
struct Snapshot {
    permissions: HashMap<Uuid, Permission>,
    roles: HashMap<Uuid, RoleRecord>,
    capabilities: HashMap<Uuid, CapabilityRecord>,
    grants: Vec<PermissionGrant>,
    assignments: Vec<RoleAssignment>,
    capability_assignments: Vec<CapabilityAssignment>,
}

impl Snapshot {
    fn grants_in_scope<'a>(
        &'a self,
        scope: Option<&'a ContextRef>,
    ) -> impl Iterator<Item = &'a PermissionGrant> {
        self.grants
            .iter()
            .filter(move |g| g.context.as_ref() == scope)
    }

    fn roles_in_scope<'a>(
        &'a self,
        scope: Option<&'a ContextRef>,
    ) -> impl Iterator<Item = &'a RoleRecord> {
        self.assignments
            .iter()
            .filter(move |a| a.context.as_ref() == scope)
            .filter_map(move |a| self.roles.get(&a.role_id))
    }
}
