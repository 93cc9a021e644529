use crate::auth::token::{AuthError, RefreshError, ValidationError};
use crate::error::GatewayError;
use crate::server::guards::auth::AuthenticatedPrincipal;
use crate::server::router::GatewayState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tensorgate_schema::{JwksResponse, LoginRequest, RefreshRequest, RevokeRequest, TokenPair};

impl From<AuthError> for GatewayError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => GatewayError::Authentication {
                message: "invalid credentials".to_string(),
                code: "invalid_credentials",
            },
            AuthError::Internal(msg) => GatewayError::Internal(msg),
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(e: ValidationError) -> Self {
        let code = match e {
            ValidationError::Malformed => "malformed",
            ValidationError::BadSignature => "bad_signature",
            ValidationError::WrongType => "wrong_type",
            ValidationError::Expired => "expired",
            ValidationError::Revoked => "revoked",
        };
        GatewayError::Authentication {
            message: e.to_string(),
            code,
        }
    }
}

impl From<RefreshError> for GatewayError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::NotFound => GatewayError::Authentication {
                message: e.to_string(),
                code: "not_found",
            },
            RefreshError::Expired => GatewayError::Authentication {
                message: e.to_string(),
                code: "expired",
            },
            RefreshError::Validation(v) => v.into(),
            RefreshError::Internal(msg) => GatewayError::Internal(msg),
        }
    }
}

fn to_wire(pair: crate::auth::token::TokenPair) -> TokenPair {
    TokenPair {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: pair.expires_in,
    }
}

pub async fn login(
    State(state): State<GatewayState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenPair>, GatewayError> {
    let principal = state.tokens.authenticate(&body.email, &body.password).await?;
    let pair = state.tokens.issue(&principal).await?;
    Ok(Json(to_wire(pair)))
}

pub async fn refresh(
    State(state): State<GatewayState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, GatewayError> {
    let pair = state.tokens.refresh(&body.refresh_token).await?;
    Ok(Json(to_wire(pair)))
}

pub async fn revoke(
    State(state): State<GatewayState>,
    _caller: AuthenticatedPrincipal,
    Json(body): Json<RevokeRequest>,
) -> Result<StatusCode, GatewayError> {
    state.tokens.revoke(&body.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn jwks(State(state): State<GatewayState>) -> Json<JwksResponse> {
    Json(state.tokens.jwks())
}
