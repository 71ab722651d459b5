//! In-memory permission graph.
//!
//! Permissions form a tree under the root permission (`*:*`, its own parent).
//! Grants map a permission id to the permittees it was granted to directly.
//! A permittee holds a permission when the permission or one of its ancestors
//! was granted to the permittee or one of its identity ancestors.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;

use super::{PermissionId, PermitteeId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("permission {0} is already registered")]
    DuplicateRegistration(PermissionId),
    #[error("Permission not found: {0}")]
    NoSuchPermission(PermissionId),
}

/// A registered permission node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    id: PermissionId,
    description: String,
    parent: PermissionId,
}

impl Permission {
    pub fn id(&self) -> &PermissionId {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Id of the parent permission. The root is its own parent.
    pub fn parent_id(&self) -> &PermissionId {
        &self.parent
    }

    pub fn is_root(&self) -> bool {
        self.id == self.parent
    }
}

/// Thread-safe registry of permissions and grants.
///
/// Grant lists are copy-on-write: readers clone an `Arc` and never block
/// writers for longer than a pointer swap.
#[derive(Debug)]
pub struct PermissionService {
    permissions: RwLock<IndexMap<PermissionId, Permission>>,
    grants: RwLock<HashMap<PermissionId, Arc<[PermitteeId]>>>,
}

impl Default for PermissionService {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionService {
    pub fn new() -> Self {
        let root = Permission {
            id: PermissionId::root(),
            description: "The root permission".to_string(),
            parent: PermissionId::root(),
        };
        let mut permissions = IndexMap::new();
        permissions.insert(root.id.clone(), root);
        Self {
            permissions: RwLock::new(permissions),
            grants: RwLock::new(HashMap::new()),
        }
    }

    pub fn root_permission(&self) -> Permission {
        Permission {
            id: PermissionId::root(),
            description: "The root permission".to_string(),
            parent: PermissionId::root(),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a new permission under `parent`.
    ///
    /// Duplicate detection and insertion happen under one write lock.
    pub fn register(
        &self,
        id: PermissionId,
        description: impl Into<String>,
        parent: &PermissionId,
    ) -> Result<Permission, PermissionError> {
        let mut permissions = self.permissions.write();
        if permissions.contains_key(&id) {
            return Err(PermissionError::DuplicateRegistration(id));
        }
        if !permissions.contains_key(parent) {
            return Err(PermissionError::NoSuchPermission(parent.clone()));
        }
        let permission = Permission {
            id: id.clone(),
            description: description.into(),
            parent: parent.clone(),
        };
        permissions.insert(id, permission.clone());
        tracing::debug!(permission = %permission.id, parent = %parent, "registered permission");
        Ok(permission)
    }

    /// Like [`register`](Self::register), but an existing permission with the
    /// same id is returned unchanged.
    pub fn register_or_get(
        &self,
        id: PermissionId,
        description: impl Into<String>,
        parent: &PermissionId,
    ) -> Result<Permission, PermissionError> {
        if let Some(existing) = self.permissions.read().get(&id) {
            return Ok(existing.clone());
        }
        match self.register(id.clone(), description, parent) {
            Err(PermissionError::DuplicateRegistration(_)) => self.get_or_fail(&id),
            other => other,
        }
    }

    pub fn get(&self, id: &PermissionId) -> Option<Permission> {
        self.permissions.read().get(id).cloned()
    }

    pub fn get_or_fail(&self, id: &PermissionId) -> Result<Permission, PermissionError> {
        self.get(id)
            .ok_or_else(|| PermissionError::NoSuchPermission(id.clone()))
    }

    /// Snapshot of every registered permission, root first, then in
    /// registration order.
    pub fn registered_permissions(&self) -> Vec<Permission> {
        self.permissions.read().values().cloned().collect()
    }

    /// `id` followed by each ancestor up to and including the root.
    /// Empty when `id` is not registered.
    pub fn ancestors_with_self(&self, id: &PermissionId) -> Vec<PermissionId> {
        let permissions = self.permissions.read();
        let mut chain = Vec::new();
        let mut current = match permissions.get(id) {
            Some(p) => p,
            None => return chain,
        };
        loop {
            chain.push(current.id.clone());
            if current.is_root() {
                break;
            }
            match permissions.get(&current.parent) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        chain
    }

    // ========================================================================
    // Grants
    // ========================================================================

    /// Grant `id` to `permittee`. Granting twice is a no-op.
    pub fn grant(&self, permittee: PermitteeId, id: &PermissionId) -> Result<(), PermissionError> {
        self.get_or_fail(id)?;
        let mut grants = self.grants.write();
        let entry = grants.entry(id.clone()).or_insert_with(|| Arc::from(Vec::new()));
        if entry.contains(&permittee) {
            return Ok(());
        }
        let mut next = entry.to_vec();
        next.push(permittee);
        *entry = Arc::from(next);
        tracing::debug!(permittee = %permittee, permission = %id, "granted permission");
        Ok(())
    }

    /// Revoke `id` from `permittee`.
    ///
    /// With `recursive`, grants of every permission in the subtree rooted at
    /// `id` are revoked too. Grants held through identity ancestors are not
    /// touched.
    pub fn cancel(
        &self,
        permittee: PermitteeId,
        id: &PermissionId,
        recursive: bool,
    ) -> Result<(), PermissionError> {
        self.get_or_fail(id)?;
        let targets: Vec<PermissionId> = if recursive {
            self.registered_permissions()
                .into_iter()
                .map(|p| p.id)
                .filter(|p| self.ancestors_with_self(p).contains(id))
                .collect()
        } else {
            vec![id.clone()]
        };

        let mut grants = self.grants.write();
        for target in &targets {
            if let Some(entry) = grants.get_mut(target) {
                if entry.contains(&permittee) {
                    let next: Vec<PermitteeId> =
                        entry.iter().copied().filter(|p| *p != permittee).collect();
                    *entry = Arc::from(next);
                }
            }
        }
        tracing::debug!(
            permittee = %permittee,
            permission = %id,
            recursive,
            "cancelled permission"
        );
        Ok(())
    }

    /// Permittees granted `id` directly.
    pub fn grantees(&self, id: &PermissionId) -> Arc<[PermitteeId]> {
        self.grants
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Core check: any permission in `id`'s ancestor chain granted to any
    /// identity in `permittee`'s ancestor closure.
    pub fn test_permission(&self, permittee: PermitteeId, id: &PermissionId) -> bool {
        let chain = self.ancestors_with_self(id);
        if chain.is_empty() {
            return false;
        }
        let identities = permittee.all_parents_with_self();
        chain.iter().any(|permission| {
            self.grantees(permission)
                .iter()
                .any(|granted| identities.contains(granted))
        })
    }

    /// Like [`test_permission`](Self::test_permission), but the console
    /// always passes.
    pub fn has_permission(&self, permittee: PermitteeId, id: &PermissionId) -> bool {
        permittee == PermitteeId::Console || self.test_permission(permittee, id)
    }

    /// Every registered permission `permittee` holds. Iterates over a snapshot
    /// taken when called; grants made during iteration may or may not show.
    pub fn permitted_permissions(
        &self,
        permittee: PermitteeId,
    ) -> impl Iterator<Item = Permission> + '_ {
        self.registered_permissions()
            .into_iter()
            .filter(move |p| self.test_permission(permittee, &p.id))
    }

    /// Direct grants that apply to `permittee`, paired with the identity the
    /// grant was made to.
    pub fn permitted_permissions_with_source(
        &self,
        permittee: PermitteeId,
    ) -> Vec<(PermitteeId, Permission)> {
        let identities = permittee.all_parents_with_self();
        let mut out = Vec::new();
        for permission in self.registered_permissions() {
            for granted in self.grantees(&permission.id).iter() {
                if identities.contains(granted) {
                    out.push((*granted, permission.clone()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PermitteeId::*;
    use std::thread;

    fn pid(s: &str) -> PermissionId {
        s.parse().unwrap()
    }

    /// root -> a:* -> a:cmd -> a:cmd.sub
    fn sample() -> PermissionService {
        let svc = PermissionService::new();
        svc.register(pid("a:*"), "a", &PermissionId::root()).unwrap();
        svc.register(pid("a:cmd"), "cmd", &pid("a:*")).unwrap();
        svc.register(pid("a:cmd.sub"), "sub", &pid("a:cmd")).unwrap();
        svc.register(pid("b:other"), "other", &PermissionId::root()).unwrap();
        svc
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let svc = sample();
        assert_eq!(
            svc.register(pid("a:cmd"), "again", &PermissionId::root()),
            Err(PermissionError::DuplicateRegistration(pid("a:cmd")))
        );
    }

    #[test]
    fn test_register_or_get_reuses_existing() {
        let svc = sample();
        let again = svc
            .register_or_get(pid("a:cmd"), "ignored", &PermissionId::root())
            .unwrap();
        assert_eq!(again.description(), "cmd");
        assert_eq!(again.parent_id(), &pid("a:*"));
        let fresh = svc
            .register_or_get(pid("a:new"), "new", &pid("a:*"))
            .unwrap();
        assert_eq!(svc.get(&pid("a:new")), Some(fresh));
    }

    #[test]
    fn test_register_requires_known_parent() {
        let svc = PermissionService::new();
        assert!(matches!(
            svc.register(pid("x:y"), "", &pid("x:*")),
            Err(PermissionError::NoSuchPermission(_))
        ));
    }

    #[test]
    fn test_ancestor_walk_stops_at_root() {
        let svc = sample();
        assert_eq!(
            svc.ancestors_with_self(&pid("a:cmd.sub")),
            vec![pid("a:cmd.sub"), pid("a:cmd"), pid("a:*"), PermissionId::root()]
        );
        assert_eq!(
            svc.ancestors_with_self(&PermissionId::root()),
            vec![PermissionId::root()]
        );
        assert!(svc.ancestors_with_self(&pid("nope:nope")).is_empty());
    }

    #[test]
    fn test_grant_unknown_permission_fails() {
        let svc = sample();
        assert_eq!(
            svc.grant(ExactUser(1), &pid("nope:nope")),
            Err(PermissionError::NoSuchPermission(pid("nope:nope")))
        );
        assert_eq!(
            svc.get_or_fail(&pid("nope:nope")).unwrap_err().to_string(),
            "Permission not found: nope:nope"
        );
    }

    #[test]
    fn test_grant_is_inherited_downward_only() {
        let svc = sample();
        svc.grant(ExactUser(1), &pid("a:cmd")).unwrap();
        assert!(svc.test_permission(ExactUser(1), &pid("a:cmd")));
        assert!(svc.test_permission(ExactUser(1), &pid("a:cmd.sub")));
        assert!(!svc.test_permission(ExactUser(1), &pid("a:*")));
        assert!(!svc.test_permission(ExactUser(1), &PermissionId::root()));
        assert!(!svc.test_permission(ExactUser(1), &pid("b:other")));
    }

    #[test]
    fn test_identity_inheritance() {
        let svc = sample();
        svc.grant(AnyGroup, &pid("a:cmd")).unwrap();
        assert!(svc.test_permission(ExactGroup(123), &pid("a:cmd")));
        assert!(!svc.test_permission(ExactUser(123), &pid("a:cmd")));

        svc.grant(ExactUser(5), &pid("b:other")).unwrap();
        assert!(svc.test_permission(ExactMember(9, 5), &pid("b:other")));
        assert!(svc.test_permission(ExactTemp(9, 5), &pid("b:other")));
        assert!(!svc.test_permission(ExactMember(9, 6), &pid("b:other")));
    }

    #[test]
    fn test_grant_is_idempotent() {
        let svc = sample();
        svc.grant(ExactUser(1), &pid("a:cmd")).unwrap();
        svc.grant(ExactUser(1), &pid("a:cmd")).unwrap();
        assert_eq!(svc.grantees(&pid("a:cmd")).len(), 1);
    }

    #[test]
    fn test_cancel_exact_only() {
        let svc = sample();
        svc.grant(ExactUser(1), &pid("a:cmd")).unwrap();
        svc.grant(ExactUser(1), &pid("a:cmd.sub")).unwrap();
        svc.cancel(ExactUser(1), &pid("a:cmd"), false).unwrap();
        assert!(!svc.test_permission(ExactUser(1), &pid("a:cmd")));
        assert!(svc.test_permission(ExactUser(1), &pid("a:cmd.sub")));
    }

    #[test]
    fn test_cancel_recursive_clears_subtree() {
        let svc = sample();
        svc.grant(ExactUser(1), &PermissionId::root()).unwrap();
        svc.grant(ExactUser(1), &pid("a:cmd.sub")).unwrap();
        svc.grant(ExactUser(1), &pid("b:other")).unwrap();
        svc.cancel(ExactUser(1), &PermissionId::root(), true).unwrap();
        for p in svc.registered_permissions() {
            assert!(!svc.test_permission(ExactUser(1), p.id()), "{}", p.id());
        }
    }

    #[test]
    fn test_cancel_does_not_touch_other_permittees() {
        let svc = sample();
        svc.grant(ExactUser(1), &pid("a:cmd")).unwrap();
        svc.grant(ExactUser(2), &pid("a:cmd")).unwrap();
        svc.cancel(ExactUser(1), &pid("a:*"), true).unwrap();
        assert!(svc.test_permission(ExactUser(2), &pid("a:cmd")));
    }

    #[test]
    fn test_console_always_has_permission() {
        let svc = sample();
        assert!(!svc.test_permission(Console, &pid("a:cmd")));
        assert!(svc.has_permission(Console, &pid("a:cmd")));
        assert!(!svc.has_permission(AnyContact, &pid("a:cmd")));
    }

    #[test]
    fn test_permitted_permissions() {
        let svc = sample();
        svc.grant(AnyUser, &pid("a:cmd")).unwrap();
        let ids: Vec<String> = svc
            .permitted_permissions(ExactFriend(3))
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a:cmd", "a:cmd.sub"]);
    }

    #[test]
    fn test_permitted_with_source() {
        let svc = sample();
        svc.grant(AnyUser, &pid("a:cmd")).unwrap();
        svc.grant(ExactUser(3), &pid("b:other")).unwrap();
        let sources = svc.permitted_permissions_with_source(ExactFriend(3));
        assert_eq!(sources.len(), 2);
        assert!(sources.iter().any(|(s, p)| *s == AnyUser && p.id() == &pid("a:cmd")));
        assert!(sources.iter().any(|(s, p)| *s == ExactUser(3) && p.id() == &pid("b:other")));
    }

    #[test]
    fn test_concurrent_registration_and_grants() {
        let svc = Arc::new(PermissionService::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let svc = Arc::clone(&svc);
                thread::spawn(move || {
                    let id = PermissionId::new("t", format!("p{}", i)).unwrap();
                    svc.register(id.clone(), "", &PermissionId::root()).unwrap();
                    for user in 0..50 {
                        svc.grant(ExactUser(user), &id).unwrap();
                    }
                    // everyone races on the same id; exactly one wins
                    svc.register(pid("t:shared"), "", &PermissionId::root()).is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        for i in 0..8 {
            let id = PermissionId::new("t", format!("p{}", i)).unwrap();
            assert_eq!(svc.grantees(&id).len(), 50);
        }
    }
}
