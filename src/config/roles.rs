use crate::auth::rbac::{Permission, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Data-driven role table (§3): deployments add or edit roles in
/// `config.toml` without a code change. `RoleTable::new` validates the
/// result (no cycles, no dangling inheritance) at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RolesConfig {
    #[serde(default = "default_roles")]
    pub roles: Vec<Role>,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
        }
    }
}

fn default_roles() -> Vec<Role> {
    vec![
        Role {
            name: "base".to_string(),
            description: "Minimum permissions every authenticated principal holds.".to_string(),
            permissions: HashSet::from([Permission::ApiAccess, Permission::ModelList]),
            inherits: vec![],
        },
        Role {
            name: "user".to_string(),
            description: "Standard inference access.".to_string(),
            permissions: HashSet::from([Permission::ModelInference, Permission::UserRead]),
            inherits: vec!["base".to_string()],
        },
        Role {
            name: "enterprise".to_string(),
            description: "Higher tiers that skip the rate limiter entirely.".to_string(),
            permissions: HashSet::from([Permission::ApiRateLimitBypass, Permission::BillingRead]),
            inherits: vec!["user".to_string()],
        },
        Role {
            name: "admin".to_string(),
            description: "Operators: user, billing, and system administration.".to_string(),
            permissions: HashSet::from([
                Permission::UserAdmin,
                Permission::UserUpdate,
                Permission::ModelAdmin,
                Permission::BillingAdmin,
                Permission::BillingUpdate,
                Permission::SystemAdmin,
                Permission::MonitoringRead,
                Permission::MonitoringAdmin,
            ]),
            inherits: vec!["enterprise".to_string()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RoleTable;

    #[test]
    fn default_roles_build_a_valid_table() {
        let table = RoleTable::new(default_roles()).expect("default roles must not cycle");
        assert!(table.authorize(&["admin".to_string()], Permission::ApiAccess));
        assert!(table.authorize(&["admin".to_string()], Permission::ModelInference));
        assert!(table.authorize(&["admin".to_string()], Permission::SystemAdmin));
        assert!(!table.authorize(&["base".to_string()], Permission::ModelInference));
    }
}
