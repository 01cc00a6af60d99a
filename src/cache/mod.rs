//! Resolution cache: read-through projection of the grant store
//!
//! Three fixed keys (`<prefix>.permissions`, `<prefix>.roles`,
//! `<prefix>.capabilities`) each hold the full serialized collection
//! across all guards; per-guard and by-name lookups filter in memory.
//! Holding whole collections under one key avoids skew between a
//! "by-guard" entry and a "by-id" entry.
//!
//! Population is lazy and single-flight: the first read after an
//! invalidation reloads from the grant store under a mutex with a
//! double-check, so concurrent misses trigger exactly one reload.
//! `invalidate()` must run synchronously with every write to the store,
//! before that write reports success.

use crate::error::{Error, Result};
use crate::store::GrantStore;
use crate::types::{CapabilityRecord, Permission, RoleRecord};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub mod backend;

pub use backend::{CacheBackend, MemoryCacheBackend};

/// Default TTL for populated collections. Invalidation normally arrives
/// long before this; the TTL is a backstop, not the consistency story.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default key prefix
pub const DEFAULT_PREFIX: &str = "warden.resolution";

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub reloads: usize,
    pub invalidations: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Read-through cache over a [`GrantStore`].
pub struct ResolutionCache {
    store: Arc<dyn GrantStore>,
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    ttl: Duration,
    /// Single-flight guard for population; one reload per miss storm.
    reload_lock: tokio::sync::Mutex<()>,
    stats: DashMap<&'static str, usize>,
}

impl ResolutionCache {
    pub fn new(store: Arc<dyn GrantStore>, backend: Arc<dyn CacheBackend>) -> Self {
        Self::with_settings(store, backend, DEFAULT_PREFIX, DEFAULT_TTL)
    }

    pub fn with_settings(
        store: Arc<dyn GrantStore>,
        backend: Arc<dyn CacheBackend>,
        prefix: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            prefix: prefix.into(),
            ttl,
            reload_lock: tokio::sync::Mutex::new(()),
            stats: DashMap::new(),
        }
    }

    /// All permissions across guards.
    pub async fn permissions(&self) -> Result<Vec<Permission>> {
        let store = Arc::clone(&self.store);
        self.read_through("permissions", move || async move {
            store.load_permissions().await
        })
        .await
    }

    /// All roles (with relation id sets) across guards.
    pub async fn roles(&self) -> Result<Vec<RoleRecord>> {
        let store = Arc::clone(&self.store);
        self.read_through("roles", move || async move { store.load_roles().await })
            .await
    }

    /// All capabilities (with permission id sets) across guards.
    pub async fn capabilities(&self) -> Result<Vec<CapabilityRecord>> {
        let store = Arc::clone(&self.store);
        self.read_through("capabilities", move || async move {
            store.load_capabilities().await
        })
        .await
    }

    /// Permissions under one guard.
    pub async fn permissions_for_guard(&self, guard: &str) -> Result<Vec<Permission>> {
        Ok(self
            .permissions()
            .await?
            .into_iter()
            .filter(|p| p.guard == guard)
            .collect())
    }

    /// Roles under one guard.
    pub async fn roles_for_guard(&self, guard: &str) -> Result<Vec<RoleRecord>> {
        Ok(self
            .roles()
            .await?
            .into_iter()
            .filter(|r| r.role.guard == guard)
            .collect())
    }

    /// Capabilities under one guard.
    pub async fn capabilities_for_guard(&self, guard: &str) -> Result<Vec<CapabilityRecord>> {
        Ok(self
            .capabilities()
            .await?
            .into_iter()
            .filter(|c| c.capability.guard == guard)
            .collect())
    }

    pub async fn permission_by_name(&self, name: &str, guard: &str) -> Result<Option<Permission>> {
        Ok(self
            .permissions()
            .await?
            .into_iter()
            .find(|p| p.name == name && p.guard == guard))
    }

    pub async fn role_by_name(&self, name: &str, guard: &str) -> Result<Option<RoleRecord>> {
        Ok(self
            .roles()
            .await?
            .into_iter()
            .find(|r| r.role.name == name && r.role.guard == guard))
    }

    pub async fn capability_by_name(
        &self,
        name: &str,
        guard: &str,
    ) -> Result<Option<CapabilityRecord>> {
        Ok(self
            .capabilities()
            .await?
            .into_iter()
            .find(|c| c.capability.name == name && c.capability.guard == guard))
    }

    /// Evict all three collection keys. Idempotent; safe on an empty cache.
    ///
    /// Holds the reload lock while forgetting, so an in-flight population
    /// that snapshotted the store before a write can never land its stale
    /// payload after this eviction completes.
    pub async fn invalidate(&self) -> Result<()> {
        let _guard = self.reload_lock.lock().await;
        for kind in ["permissions", "roles", "capabilities"] {
            self.backend.forget(&self.key(kind)).await?;
        }
        self.increment("invalidations");
        debug!("resolution cache invalidated");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stat("hits"),
            misses: self.stat("misses"),
            reloads: self.stat("reloads"),
            invalidations: self.stat("invalidations"),
        }
    }

    fn key(&self, kind: &str) -> String {
        format!("{}.{}", self.prefix, kind)
    }

    /// Fetch a collection from the backend, reloading from the grant
    /// store on miss. The reload is single-flight: the lock is taken,
    /// the backend is re-checked, and only then does one task reload.
    async fn read_through<T, F, Fut>(&self, kind: &'static str, load: F) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<T>>>,
    {
        let key = self.key(kind);

        if let Some(payload) = self.backend.get(&key).await? {
            self.increment("hits");
            return deserialize(kind, &payload);
        }
        self.increment("misses");

        let _guard = self.reload_lock.lock().await;

        // Another task may have repopulated while we waited.
        if let Some(payload) = self.backend.get(&key).await? {
            return deserialize(kind, &payload);
        }

        let collection = load().await?;
        let payload = serde_json::to_string(&collection)
            .map_err(|e| Error::Cache(format!("failed to serialize {}: {}", kind, e)))?;
        self.backend.put(&key, payload, self.ttl).await?;
        self.increment("reloads");
        info!(kind, count = collection.len(), "resolution cache populated");

        Ok(collection)
    }

    fn increment(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

fn deserialize<T: DeserializeOwned>(kind: &str, payload: &str) -> Result<Vec<T>> {
    serde_json::from_str(payload)
        .map_err(|e| Error::Cache(format!("failed to deserialize {}: {}", kind, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGrantStore;
    use crate::types::{
        Capability, CapabilityAssignment, PermissionGrant, Role, RoleAssignment, SubjectRef,
    };
    use async_trait::async_trait;
    use tokio::sync::Semaphore;
    use uuid::Uuid;

    fn cache_over(store: Arc<InMemoryGrantStore>) -> ResolutionCache {
        ResolutionCache::new(store, Arc::new(MemoryCacheBackend::new()))
    }

    /// Delegating store whose `load_permissions` parks between reading the
    /// inner store and returning, so a test can interleave writes with an
    /// in-flight cache population.
    struct GatedStore {
        inner: InMemoryGrantStore,
        load_entered: Semaphore,
        load_release: Semaphore,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: InMemoryGrantStore::new(),
                load_entered: Semaphore::new(0),
                load_release: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl GrantStore for GatedStore {
        async fn create_permission(&self, permission: Permission) -> Result<()> {
            self.inner.create_permission(permission).await
        }
        async fn find_permission(&self, name: &str, guard: &str) -> Result<Option<Permission>> {
            self.inner.find_permission(name, guard).await
        }
        async fn delete_permission(&self, name: &str, guard: &str) -> Result<()> {
            self.inner.delete_permission(name, guard).await
        }
        async fn create_role(&self, role: Role) -> Result<()> {
            self.inner.create_role(role).await
        }
        async fn find_role(&self, name: &str, guard: &str) -> Result<Option<Role>> {
            self.inner.find_role(name, guard).await
        }
        async fn delete_role(&self, name: &str, guard: &str) -> Result<()> {
            self.inner.delete_role(name, guard).await
        }
        async fn create_capability(&self, capability: Capability) -> Result<()> {
            self.inner.create_capability(capability).await
        }
        async fn find_capability(&self, name: &str, guard: &str) -> Result<Option<Capability>> {
            self.inner.find_capability(name, guard).await
        }
        async fn delete_capability(&self, name: &str, guard: &str) -> Result<()> {
            self.inner.delete_capability(name, guard).await
        }
        async fn attach_permission_to_role(
            &self,
            role_id: Uuid,
            permission_id: Uuid,
        ) -> Result<()> {
            self.inner
                .attach_permission_to_role(role_id, permission_id)
                .await
        }
        async fn detach_permission_from_role(
            &self,
            role_id: Uuid,
            permission_id: Uuid,
        ) -> Result<()> {
            self.inner
                .detach_permission_from_role(role_id, permission_id)
                .await
        }
        async fn attach_capability_to_role(
            &self,
            role_id: Uuid,
            capability_id: Uuid,
        ) -> Result<()> {
            self.inner
                .attach_capability_to_role(role_id, capability_id)
                .await
        }
        async fn detach_capability_from_role(
            &self,
            role_id: Uuid,
            capability_id: Uuid,
        ) -> Result<()> {
            self.inner
                .detach_capability_from_role(role_id, capability_id)
                .await
        }
        async fn attach_permission_to_capability(
            &self,
            capability_id: Uuid,
            permission_id: Uuid,
        ) -> Result<()> {
            self.inner
                .attach_permission_to_capability(capability_id, permission_id)
                .await
        }
        async fn detach_permission_from_capability(
            &self,
            capability_id: Uuid,
            permission_id: Uuid,
        ) -> Result<()> {
            self.inner
                .detach_permission_from_capability(capability_id, permission_id)
                .await
        }
        async fn insert_permission_grant(&self, grant: PermissionGrant) -> Result<()> {
            self.inner.insert_permission_grant(grant).await
        }
        async fn remove_permission_grant(&self, grant: &PermissionGrant) -> Result<()> {
            self.inner.remove_permission_grant(grant).await
        }
        async fn insert_role_assignment(&self, assignment: RoleAssignment) -> Result<()> {
            self.inner.insert_role_assignment(assignment).await
        }
        async fn remove_role_assignment(&self, assignment: &RoleAssignment) -> Result<()> {
            self.inner.remove_role_assignment(assignment).await
        }
        async fn insert_capability_assignment(
            &self,
            assignment: CapabilityAssignment,
        ) -> Result<()> {
            self.inner.insert_capability_assignment(assignment).await
        }
        async fn remove_capability_assignment(
            &self,
            assignment: &CapabilityAssignment,
        ) -> Result<()> {
            self.inner.remove_capability_assignment(assignment).await
        }
        async fn permission_grants_for(
            &self,
            subject: &SubjectRef,
        ) -> Result<Vec<PermissionGrant>> {
            self.inner.permission_grants_for(subject).await
        }
        async fn role_assignments_for(&self, subject: &SubjectRef) -> Result<Vec<RoleAssignment>> {
            self.inner.role_assignments_for(subject).await
        }
        async fn capability_assignments_for(
            &self,
            subject: &SubjectRef,
        ) -> Result<Vec<CapabilityAssignment>> {
            self.inner.capability_assignments_for(subject).await
        }
        async fn load_permissions(&self) -> Result<Vec<Permission>> {
            let snapshot = self.inner.load_permissions().await;
            self.load_entered.add_permits(1);
            self.load_release.acquire().await.unwrap().forget();
            snapshot
        }
        async fn load_roles(&self) -> Result<Vec<RoleRecord>> {
            self.inner.load_roles().await
        }
        async fn load_capabilities(&self) -> Result<Vec<CapabilityRecord>> {
            self.inner.load_capabilities().await
        }
    }

    /// Backend whose reads fail, for the outage-propagation contract.
    struct UnavailableBackend;

    #[async_trait]
    impl CacheBackend for UnavailableBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Cache("backend unavailable".to_string()))
        }
        async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
            Err(Error::Cache("backend unavailable".to_string()))
        }
        async fn forget(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn first_read_populates_from_store() {
        let store = Arc::new(InMemoryGrantStore::new());
        store
            .create_permission(Permission::new("article:edit", "web"))
            .await
            .unwrap();

        let cache = cache_over(Arc::clone(&store));
        let permissions = cache.permissions().await.unwrap();
        assert_eq!(permissions.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.reloads, 1);

        // Second read is served from the backend.
        cache.permissions().await.unwrap();
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().reloads, 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let store = Arc::new(InMemoryGrantStore::new());
        let cache = cache_over(Arc::clone(&store));

        assert!(cache.permissions().await.unwrap().is_empty());

        store
            .create_permission(Permission::new("article:edit", "web"))
            .await
            .unwrap();

        // Stale until invalidated.
        assert!(cache.permissions().await.unwrap().is_empty());

        cache.invalidate().await.unwrap();
        assert_eq!(cache.permissions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalidate_on_empty_cache_is_idempotent() {
        let store = Arc::new(InMemoryGrantStore::new());
        let cache = cache_over(store);
        cache.invalidate().await.unwrap();
        cache.invalidate().await.unwrap();
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[tokio::test]
    async fn guard_filtering_happens_in_memory() {
        let store = Arc::new(InMemoryGrantStore::new());
        store
            .create_permission(Permission::new("article:edit", "web"))
            .await
            .unwrap();
        store
            .create_permission(Permission::new("article:edit", "api"))
            .await
            .unwrap();

        let cache = cache_over(store);
        assert_eq!(cache.permissions_for_guard("web").await.unwrap().len(), 1);
        assert_eq!(cache.permissions_for_guard("api").await.unwrap().len(), 1);
        assert!(cache
            .permission_by_name("article:edit", "admin")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn invalidation_fences_an_in_flight_reload() {
        let store = Arc::new(GatedStore::new());
        let cache = Arc::new(ResolutionCache::new(
            Arc::clone(&store) as Arc<dyn GrantStore>,
            Arc::new(MemoryCacheBackend::new()),
        ));

        // Reader misses and parks inside the store load, holding a
        // snapshot taken before the write below.
        let reader = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.permissions().await.unwrap() }
        });
        store.load_entered.acquire().await.unwrap().forget();

        // Write lands while the reload is in flight; its invalidation
        // must block until that reload either lands or is evicted.
        store
            .inner
            .create_permission(Permission::new("article:edit", "web"))
            .await
            .unwrap();
        let invalidator = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.invalidate().await.unwrap() }
        });

        store.load_release.add_permits(1);
        let raced = reader.await.unwrap();
        assert!(raced.is_empty());
        invalidator.await.unwrap();

        // A read after the completed write + invalidation must observe
        // the new state, never the raced pre-write snapshot.
        store.load_release.add_permits(1);
        assert_eq!(cache.permissions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backend_failure_propagates_as_error() {
        let store = Arc::new(InMemoryGrantStore::new());
        store
            .create_permission(Permission::new("article:edit", "web"))
            .await
            .unwrap();

        let cache = ResolutionCache::new(store, Arc::new(UnavailableBackend));
        let result = cache.permissions().await;
        // An outage is a hard error, never an empty grant set.
        assert!(matches!(result, Err(Error::Cache(_))));
    }

    #[tokio::test]
    async fn concurrent_misses_reload_once() {
        let store = Arc::new(InMemoryGrantStore::new());
        store
            .create_permission(Permission::new("article:edit", "web"))
            .await
            .unwrap();

        let cache = Arc::new(cache_over(store));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(
                async move { cache.permissions().await.unwrap() },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().len(), 1);
        }

        assert_eq!(cache.stats().reloads, 1);
    }
}
