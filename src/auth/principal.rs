use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
    Research,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Suspended,
    Deleted,
}

/// A tenant identity. `password_hash` is always a PHC-format Argon2id string
/// (§9) — never plaintext, never a weaker fallback hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub contact: String,
    pub tier: Tier,
    pub status: Status,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Names of roles directly assigned to this principal (§3 Role).
    pub roles: Vec<String>,
}

impl Principal {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }
}
