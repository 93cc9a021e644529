//! SQL DDL for the durable store: principals and refresh tokens.
//!
//! Roles themselves are data-driven via config (`RoleTable`, loaded once at
//! startup — role definitions rarely change and runtime reconfiguration is a
//! non-goal); only the per-principal role *assignment* is persisted here,
//! since principal state is mutated by administrative operations at runtime.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS principals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contact TEXT NOT NULL UNIQUE,
    tier TEXT NOT NULL,
    status TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    roles TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_principals_contact ON principals(contact);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    jti TEXT PRIMARY KEY,
    principal_id INTEGER NOT NULL REFERENCES principals(id),
    issued_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_refresh_tokens_principal ON refresh_tokens(principal_id);
"#;
