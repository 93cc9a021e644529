//! TokenService (B): authentication, token issuance/validation/refresh/revocation,
//! and RBAC authorization (§4.1).

pub mod password;
pub mod principal;
pub mod rbac;
pub mod token;

pub use principal::{Principal, Status, Tier};
pub use rbac::{Permission, Role, RoleTable};
pub use token::{AuthError, Claims, RefreshError, TokenService, TokenType, ValidationError};
