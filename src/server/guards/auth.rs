use crate::auth::{Principal, Status, Tier, TokenType, ValidationError};
use crate::server::router::GatewayState;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use serde_json::json;

/// The authenticated principal for the current request, attached by
/// decoding and validating the bearer access token. Carries only what
/// downstream handlers need — the full DB row stays behind `TokenService`.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    pub id: i64,
    pub tier: Tier,
    pub roles: Vec<String>,
}

impl FromRequestParts<GatewayState> for AuthenticatedPrincipal {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &GatewayState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .map(|auth| auth.token().to_string())
            .ok_or(AuthError::MissingToken)?;

        let claims = state
            .tokens
            .validate(&token, TokenType::Access)
            .await
            .map_err(AuthError::Validation)?;

        Ok(AuthenticatedPrincipal {
            id: claims.sub,
            tier: claims.tier,
            roles: claims.roles,
        })
    }
}

impl AuthenticatedPrincipal {
    /// A `Principal` shape suitable for rate-limiter and RBAC checks that
    /// expect the richer type. `status` is always `Active`: an inactive
    /// principal's tokens are never issued in the first place, and an
    /// existing token is revoked the moment an operator suspends the
    /// account (§4.1).
    pub fn as_principal(&self) -> Principal {
        Principal {
            id: self.id,
            contact: String::new(),
            tier: self.tier,
            status: Status::Active,
            password_hash: String::new(),
            roles: self.roles.clone(),
        }
    }
}

pub enum AuthError {
    MissingToken,
    Validation(ValidationError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (reason, code) = match self {
            AuthError::MissingToken => ("missing bearer token", "missing_token"),
            AuthError::Validation(ValidationError::Malformed) => {
                ("malformed token", "malformed")
            }
            AuthError::Validation(ValidationError::BadSignature) => {
                ("bad token signature", "bad_signature")
            }
            AuthError::Validation(ValidationError::WrongType) => {
                ("wrong token type", "wrong_type")
            }
            AuthError::Validation(ValidationError::Expired) => ("token expired", "expired"),
            AuthError::Validation(ValidationError::Revoked) => ("token revoked", "revoked"),
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "type": "authentication_error", "message": reason, "code": code } })),
        )
            .into_response()
    }
}
