//! Role hierarchy resolver
//!
//! Computes each declared role's transitive permission set from
//! `inherits_from` edges. Depth-first with memoization so shared ancestors
//! in a DAG are resolved exactly once; a "currently resolving" marker set
//! detects cycles. A cycle fails the whole pass: no partial hierarchy is
//! produced, since a cycle is a configuration bug to fix, not tolerate.
//!
//! Parent names not present in the declaration set are skipped silently;
//! they may belong to another module that resolves at a later stage.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A declared role, as supplied by an external configuration source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDeclaration {
    pub name: String,

    /// Permission names granted directly on this role.
    #[serde(default)]
    pub direct_permissions: Vec<String>,

    /// Names of roles this role inherits permissions from.
    #[serde(default)]
    pub inherits_from: Vec<String>,
}

impl RoleDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direct_permissions: Vec::new(),
            inherits_from: Vec::new(),
        }
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.direct_permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn inherits<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inherits_from
            .extend(parents.into_iter().map(Into::into));
        self
    }
}

/// A declaration plus its computed inherited permission set.
///
/// `inherited_permissions` is a deduplicated, order-insensitive set
/// (stored sorted) and excludes the role's own direct permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRole {
    pub name: String,
    pub direct_permissions: Vec<String>,
    pub inherits_from: Vec<String>,
    pub inherited_permissions: Vec<String>,
}

impl ResolvedRole {
    /// Direct and inherited permissions as one deduplicated set.
    pub fn all_permissions(&self) -> BTreeSet<&str> {
        self.direct_permissions
            .iter()
            .map(String::as_str)
            .chain(self.inherited_permissions.iter().map(String::as_str))
            .collect()
    }
}

/// Resolves declared role hierarchies into transitive permission sets.
pub struct RoleHierarchyResolver;

impl RoleHierarchyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve every declaration, preserving input order.
    ///
    /// # Errors
    ///
    /// `Error::CircularRoleInheritance` on any inheritance cycle; no
    /// output is produced for any role in that case.
    pub fn resolve(&self, declarations: &[RoleDeclaration]) -> Result<Vec<ResolvedRole>> {
        let by_name: HashMap<&str, &RoleDeclaration> = declarations
            .iter()
            .map(|d| (d.name.as_str(), d))
            .collect();

        let mut pass = Pass {
            by_name: &by_name,
            memo: HashMap::new(),
            resolving: HashSet::new(),
        };

        declarations
            .iter()
            .map(|declaration| {
                let full = pass.full_set(&declaration.name)?;
                let inherited: Vec<String> = full
                    .into_iter()
                    .filter(|p| !declaration.direct_permissions.contains(p))
                    .collect();
                Ok(ResolvedRole {
                    name: declaration.name.clone(),
                    direct_permissions: declaration.direct_permissions.clone(),
                    inherits_from: declaration.inherits_from.clone(),
                    inherited_permissions: inherited,
                })
            })
            .collect()
    }
}

impl Default for RoleHierarchyResolver {
    fn default() -> Self {
        Self::new()
    }
}

struct Pass<'a> {
    by_name: &'a HashMap<&'a str, &'a RoleDeclaration>,
    /// Fully resolved (direct + inherited) sets, computed once per role.
    memo: HashMap<String, BTreeSet<String>>,
    /// Roles on the current DFS path; re-entering one is a cycle.
    resolving: HashSet<String>,
}

impl Pass<'_> {
    fn full_set(&mut self, name: &str) -> Result<BTreeSet<String>> {
        if let Some(memoized) = self.memo.get(name) {
            return Ok(memoized.clone());
        }
        if self.resolving.contains(name) {
            return Err(Error::CircularRoleInheritance(name.to_string()));
        }

        let Some(declaration) = self.by_name.get(name) else {
            // Unknown parent: defined elsewhere, resolves at a later stage.
            return Ok(BTreeSet::new());
        };

        self.resolving.insert(name.to_string());

        let mut set: BTreeSet<String> =
            declaration.direct_permissions.iter().cloned().collect();
        for parent in &declaration.inherits_from {
            set.extend(self.full_set(parent)?);
        }

        self.resolving.remove(name);
        self.memo.insert(name.to_string(), set.clone());
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_without_parents_has_empty_inherited_set() {
        let resolver = RoleHierarchyResolver::new();
        let declarations =
            vec![RoleDeclaration::new("editor").with_permissions(["post:publish"])];

        let resolved = resolver.resolve(&declarations).unwrap();
        assert_eq!(resolved[0].direct_permissions, vec!["post:publish"]);
        assert!(resolved[0].inherited_permissions.is_empty());
    }

    #[test]
    fn linear_chain_unions_ancestor_permissions() {
        let resolver = RoleHierarchyResolver::new();
        let declarations = vec![
            RoleDeclaration::new("admin")
                .with_permissions(["user:ban"])
                .inherits(["editor"]),
            RoleDeclaration::new("editor")
                .with_permissions(["post:edit"])
                .inherits(["viewer"]),
            RoleDeclaration::new("viewer").with_permissions(["post:view"]),
        ];

        let resolved = resolver.resolve(&declarations).unwrap();
        let admin = &resolved[0];
        assert_eq!(admin.inherited_permissions, vec!["post:edit", "post:view"]);
        assert_eq!(
            admin.all_permissions(),
            ["post:edit", "post:view", "user:ban"].into_iter().collect()
        );
    }

    #[test]
    fn diamond_graph_deduplicates() {
        // lead inherits both dev and ops, which share a common base.
        let resolver = RoleHierarchyResolver::new();
        let declarations = vec![
            RoleDeclaration::new("base").with_permissions(["profile:view"]),
            RoleDeclaration::new("dev")
                .with_permissions(["deploy:staging"])
                .inherits(["base"]),
            RoleDeclaration::new("ops")
                .with_permissions(["deploy:prod"])
                .inherits(["base"]),
            RoleDeclaration::new("lead").inherits(["dev", "ops"]),
        ];

        let resolved = resolver.resolve(&declarations).unwrap();
        let lead = &resolved[3];
        assert_eq!(
            lead.inherited_permissions,
            vec!["deploy:prod", "deploy:staging", "profile:view"]
        );
    }

    #[test]
    fn unknown_parent_is_skipped() {
        let resolver = RoleHierarchyResolver::new();
        let declarations = vec![RoleDeclaration::new("editor")
            .with_permissions(["post:edit"])
            .inherits(["defined-elsewhere"])];

        let resolved = resolver.resolve(&declarations).unwrap();
        assert!(resolved[0].inherited_permissions.is_empty());
    }

    #[test]
    fn two_role_cycle_fails_whole_pass() {
        let resolver = RoleHierarchyResolver::new();
        let declarations = vec![
            RoleDeclaration::new("admin").inherits(["editor"]),
            RoleDeclaration::new("editor").inherits(["admin"]),
        ];

        let result = resolver.resolve(&declarations);
        assert!(matches!(result, Err(Error::CircularRoleInheritance(_))));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let resolver = RoleHierarchyResolver::new();
        let declarations = vec![RoleDeclaration::new("ouroboros").inherits(["ouroboros"])];

        let result = resolver.resolve(&declarations);
        assert!(matches!(result, Err(Error::CircularRoleInheritance(name)) if name == "ouroboros"));
    }

    #[test]
    fn longer_cycle_is_detected() {
        let resolver = RoleHierarchyResolver::new();
        let declarations = vec![
            RoleDeclaration::new("a").inherits(["b"]),
            RoleDeclaration::new("b").inherits(["c"]),
            RoleDeclaration::new("c").inherits(["a"]),
            RoleDeclaration::new("standalone").with_permissions(["p:q"]),
        ];

        // A cycle anywhere fails the pass, even for roles off the cycle.
        assert!(resolver.resolve(&declarations).is_err());
    }

    #[test]
    fn shared_ancestor_resolved_once_with_consistent_output() {
        let resolver = RoleHierarchyResolver::new();
        let mut declarations = vec![RoleDeclaration::new("root").with_permissions(["base:read"])];
        for i in 0..20 {
            declarations.push(RoleDeclaration::new(format!("child{}", i)).inherits(["root"]));
        }

        let resolved = resolver.resolve(&declarations).unwrap();
        for child in &resolved[1..] {
            assert_eq!(child.inherited_permissions, vec!["base:read"]);
        }
    }

    #[test]
    fn direct_permissions_are_excluded_from_inherited() {
        let resolver = RoleHierarchyResolver::new();
        let declarations = vec![
            RoleDeclaration::new("parent").with_permissions(["post:edit", "post:view"]),
            RoleDeclaration::new("child")
                .with_permissions(["post:edit"])
                .inherits(["parent"]),
        ];

        let resolved = resolver.resolve(&declarations).unwrap();
        assert_eq!(resolved[1].inherited_permissions, vec!["post:view"]);
    }
}
