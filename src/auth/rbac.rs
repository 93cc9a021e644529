//! Role-based access control: the closed permission enumeration, role inheritance,
//! and a memoized effective-permission fixpoint (§3).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ApiAccess,
    ApiRateLimitBypass,
    ModelList,
    ModelInference,
    ModelAdmin,
    UserRead,
    UserUpdate,
    UserAdmin,
    BillingRead,
    BillingUpdate,
    BillingAdmin,
    SystemAdmin,
    MonitoringRead,
    MonitoringAdmin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub description: String,
    pub permissions: HashSet<Permission>,
    pub inherits: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RoleTableError {
    #[error("role inheritance cycle detected involving role '{0}'")]
    Cycle(String),
    #[error("role '{0}' inherits from unknown role '{1}'")]
    UnknownParent(String, String),
}

/// The set of roles known to this deployment, with a memoized effective-permission
/// cache invalidated whenever the table is rebuilt (role changes are infrequent
/// administrative operations, not a request-hot-path concern).
pub struct RoleTable {
    roles: HashMap<String, Role>,
    effective_cache: RwLock<HashMap<String, HashSet<Permission>>>,
}

impl RoleTable {
    /// Builds a table from a role list, rejecting cycles and dangling inheritance
    /// at load time rather than discovering them during a permission check.
    pub fn new(roles: Vec<Role>) -> Result<Self, RoleTableError> {
        let by_name: HashMap<String, Role> =
            roles.into_iter().map(|r| (r.name.clone(), r)).collect();

        for role in by_name.values() {
            for parent in &role.inherits {
                if !by_name.contains_key(parent) {
                    return Err(RoleTableError::UnknownParent(
                        role.name.clone(),
                        parent.clone(),
                    ));
                }
            }
        }

        for name in by_name.keys() {
            let mut visiting = HashSet::new();
            detect_cycle(&by_name, name, &mut visiting)?;
        }

        Ok(Self {
            roles: by_name,
            effective_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Effective permissions for a single role: the fixpoint union over its
    /// inheritance closure.
    pub fn effective_permissions(&self, role_name: &str) -> HashSet<Permission> {
        if let Some(cached) = self.effective_cache.read().unwrap().get(role_name) {
            return cached.clone();
        }

        let mut out = HashSet::new();
        let mut stack = vec![role_name.to_string()];
        let mut seen = HashSet::new();
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(role) = self.roles.get(&name) {
                out.extend(role.permissions.iter().copied());
                stack.extend(role.inherits.iter().cloned());
            }
        }

        self.effective_cache
            .write()
            .unwrap()
            .insert(role_name.to_string(), out.clone());
        out
    }

    /// Effective permissions across every role a principal holds.
    pub fn effective_permissions_for(&self, role_names: &[String]) -> HashSet<Permission> {
        let mut out = HashSet::new();
        for name in role_names {
            out.extend(self.effective_permissions(name));
        }
        out
    }

    pub fn authorize(&self, role_names: &[String], permission: Permission) -> bool {
        self.effective_permissions_for(role_names).contains(&permission)
    }

    /// Invalidates the memoized fixpoint, e.g. after an administrative role edit.
    pub fn invalidate_cache(&self) {
        self.effective_cache.write().unwrap().clear();
    }
}

fn detect_cycle(
    roles: &HashMap<String, Role>,
    start: &str,
    visiting: &mut HashSet<String>,
) -> Result<(), RoleTableError> {
    if !visiting.insert(start.to_string()) {
        return Err(RoleTableError::Cycle(start.to_string()));
    }
    if let Some(role) = roles.get(start) {
        for parent in &role.inherits {
            detect_cycle(roles, parent, visiting)?;
        }
    }
    visiting.remove(start);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, perms: &[Permission], inherits: &[&str]) -> Role {
        Role {
            name: name.to_string(),
            description: String::new(),
            permissions: perms.iter().copied().collect(),
            inherits: inherits.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn effective_permissions_follow_inheritance() {
        let table = RoleTable::new(vec![
            role("base", &[Permission::ApiAccess], &[]),
            role("user", &[Permission::ModelInference], &["base"]),
        ])
        .unwrap();

        let effective = table.effective_permissions("user");
        assert!(effective.contains(&Permission::ApiAccess));
        assert!(effective.contains(&Permission::ModelInference));
    }

    #[test]
    fn cycle_is_rejected_at_load_time() {
        let err = RoleTable::new(vec![
            role("a", &[], &["b"]),
            role("b", &[], &["a"]),
        ])
        .unwrap_err();
        assert!(matches!(err, RoleTableError::Cycle(_)));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let err = RoleTable::new(vec![role("a", &[], &["ghost"])]).unwrap_err();
        assert!(matches!(err, RoleTableError::UnknownParent(_, _)));
    }

    #[test]
    fn authorize_checks_across_all_assigned_roles() {
        let table = RoleTable::new(vec![
            role("billing", &[Permission::BillingRead], &[]),
            role("inference", &[Permission::ModelInference], &[]),
        ])
        .unwrap();

        let roles = vec!["billing".to_string(), "inference".to_string()];
        assert!(table.authorize(&roles, Permission::BillingRead));
        assert!(table.authorize(&roles, Permission::ModelInference));
        assert!(!table.authorize(&roles, Permission::SystemAdmin));
    }
}
