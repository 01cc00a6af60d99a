//! # Warden
//!
//! Role-based authorization resolution engine with guards, capabilities,
//! and context scoping.
//!
//! ## Features
//!
//! - **Four-path resolution**: direct grants, roles, capabilities through
//!   roles, and capabilities assigned directly
//! - **Guards** partition entities into independent namespaces
//! - **Context scoping** with configurable global fallback
//! - **Wildcard grants** (`article:*`) with a compiled-pattern cache
//! - **Read-through resolution cache** invalidated synchronously on write
//! - **Declarative role hierarchies** with cycle detection
//! - **Async-first design** using the Tokio runtime
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use warden::{Engine, InMemoryGrantStore, SubjectRef};
//!
//! #[tokio::main]
//! async fn main() -> warden::Result<()> {
//!     let engine = Engine::new(Arc::new(InMemoryGrantStore::new()));
//!
//!     let permission = engine.create_permission("article:edit", "web").await?;
//!     let role = engine.create_role("editor", "web").await?;
//!     engine.attach_permission_to_role(&role, &permission).await?;
//!
//!     let alice = SubjectRef::new("user", "alice");
//!     engine.assign_role("editor", &alice, None).await?;
//!
//!     assert!(engine.can(&alice, "article:edit", None).await?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod matcher;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheBackend, CacheStats, MemoryCacheBackend, ResolutionCache};
pub use engine::{Engine, EngineConfig, GrantPath, ResolvedGrant};
pub use error::{EntityKind, Error, Result};
pub use hierarchy::{ResolvedRole, RoleDeclaration, RoleHierarchyResolver};
pub use matcher::WildcardMatcher;
pub use store::{GrantStore, InMemoryGrantStore};
pub use types::{
    Capability, CapabilityAssignment, CapabilityRecord, ContextRef, Permission, PermissionGrant,
    Role, RoleAssignment, RoleRecord, SubjectRef,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
