//! `TokenService` (§4.1): authentication, RS256 issuance/validation, refresh
//! rotation and revocation, and RBAC authorization checks.

use crate::auth::password::{DUMMY_HASH_FOR_TIMING, verify_password};
use crate::auth::principal::{Principal, Status, Tier};
use crate::auth::rbac::{Permission, RoleTable};
use crate::db::{ConsumeOutcome, DbActorHandle, DbPrincipalRow};
use crate::kvstore::KVStore;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tensorgate_schema::JwkKey;
use thiserror::Error;
use uuid::Uuid;

const REVOKED_SET_KEY: &str = "auth:revoked_jti";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub tier: Tier,
    pub roles: Vec<String>,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("wrong token type")]
    WrongType,
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("refresh token not found")]
    NotFound,
    #[error("refresh token expired")]
    Expired,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal error: {0}")]
    Internal(String),
}

struct ActiveKey {
    kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    jwk: JwkKey,
}

/// Signs and verifies bearer tokens with a single RS256 keypair held in
/// memory. Loaded once at startup from a configured PEM, or generated
/// fresh when none is configured.
pub struct TokenService {
    db: DbActorHandle,
    kv: Arc<dyn KVStore>,
    roles: Arc<RoleTable>,
    key: ActiveKey,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenService {
    pub fn new(
        signing_key_path: Option<&str>,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
        db: DbActorHandle,
        kv: Arc<dyn KVStore>,
        roles: Arc<RoleTable>,
    ) -> Result<Self, AuthError> {
        let key = load_active_key(signing_key_path)?;
        Ok(Self {
            db,
            kv,
            roles,
            key,
            access_ttl_seconds,
            refresh_ttl_seconds,
        })
    }

    /// Looks the principal up by email and verifies the password hash,
    /// returning a single uniform error on either a missing account or a
    /// wrong password. On a missing account the dummy hash is still
    /// verified against, so a miss and a wrong password take the same
    /// code path (no account-enumeration timing oracle).
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let row = self
            .db
            .get_principal_by_email(email)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let Some(row) = row else {
            let _ = verify_password(password, &DUMMY_HASH_FOR_TIMING);
            return Err(AuthError::InvalidCredentials);
        };

        let matches = verify_password(password, &row.password_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        let principal = row_to_principal(&row).map_err(AuthError::Internal)?;
        if !principal.is_active() {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(principal)
    }

    /// Signs a fresh access/refresh pair and persists the refresh token row.
    pub async fn issue(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_exp = now + ChronoDuration::seconds(self.access_ttl_seconds);
        let refresh_exp = now + ChronoDuration::seconds(self.refresh_ttl_seconds);

        let access_claims = Claims {
            sub: principal.id,
            tier: principal.tier,
            roles: principal.roles.clone(),
            token_type: TokenType::Access,
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let refresh_jti = Uuid::new_v4().to_string();
        let refresh_claims = Claims {
            sub: principal.id,
            tier: principal.tier,
            roles: principal.roles.clone(),
            token_type: TokenType::Refresh,
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            jti: refresh_jti.clone(),
        };

        let access_token = self
            .sign(&access_claims)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let refresh_token = self
            .sign(&refresh_claims)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        self.db
            .create_refresh_token(refresh_jti, principal.id, now, refresh_exp)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_seconds,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key.kid.clone());
        encode(&header, claims, &self.key.encoding_key)
    }

    /// Decodes and checks `token`, rejecting a wrong token type or a
    /// revoked `jti`. A `KVStore` failure while checking revocation is
    /// treated as revoked: this is an authentication boundary, so it
    /// fails closed rather than silently letting a revoked token through.
    pub async fn validate(
        &self,
        token: &str,
        expected_type: TokenType,
    ) -> Result<Claims, ValidationError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &self.key.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ValidationError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => ValidationError::BadSignature,
                _ => ValidationError::Malformed,
            }
        })?;

        if data.claims.token_type != expected_type {
            return Err(ValidationError::WrongType);
        }

        match self.kv.is_member(REVOKED_SET_KEY, &data.claims.jti).await {
            Ok(true) => return Err(ValidationError::Revoked),
            Ok(false) => {}
            Err(_) => return Err(ValidationError::Revoked),
        }

        Ok(data.claims)
    }

    /// Redeems a refresh token for a new pair. Redemption is atomic inside
    /// the single-writer `DbActor`: the old row is deleted as part of the
    /// same lookup, so at most one of two concurrent calls against the same
    /// token can succeed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let claims = self.validate(refresh_token, TokenType::Refresh).await?;

        let outcome = self
            .db
            .consume_refresh_token(&claims.jti)
            .await
            .map_err(|e| RefreshError::Internal(e.to_string()))?;

        let row = match outcome {
            ConsumeOutcome::Consumed(row) => row,
            ConsumeOutcome::NotFound => return Err(RefreshError::NotFound),
            ConsumeOutcome::Expired => return Err(RefreshError::Expired),
        };

        // The DB row is already gone, but `validate` never looks at the DB —
        // it only checks the JWT signature, expiry, and the revocation set.
        // Add the spent jti there too, so a second `Validate` against the
        // same refresh token (the consumed one) reports `revoked` instead of
        // silently passing on an otherwise still-well-formed JWT.
        let remaining = (claims.exp - Utc::now().timestamp()).max(0);
        let ttl = StdDuration::from_secs(remaining as u64).max(StdDuration::from_secs(1));
        self.kv
            .set_add_with_ttl(REVOKED_SET_KEY, &claims.jti, ttl)
            .await
            .map_err(|e| RefreshError::Internal(e.to_string()))?;

        let principal = row_to_principal(&row).map_err(RefreshError::Internal)?;
        self.issue(&principal)
            .await
            .map_err(|e| RefreshError::Internal(e.to_string()))
    }

    /// Adds `jti` to the revocation set. Idempotent: revoking an already
    /// revoked (or nonexistent) token is not an error. The expiry claim,
    /// when parseable, becomes the set entry's TTL so the revocation set
    /// never outlives the tokens it guards; otherwise it falls back to the
    /// configured refresh TTL.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;

        let Ok(data) = decode::<Claims>(token, &self.key.decoding_key, &validation) else {
            return Ok(());
        };

        let remaining = (data.claims.exp - Utc::now().timestamp()).max(0);
        let ttl = StdDuration::from_secs(remaining as u64).max(StdDuration::from_secs(1));

        self.kv
            .set_add_with_ttl(REVOKED_SET_KEY, &data.claims.jti, ttl)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    pub fn authorize(&self, principal: &Principal, permission: Permission) -> bool {
        self.roles.authorize(&principal.roles, permission)
    }

    pub fn jwks(&self) -> tensorgate_schema::JwksResponse {
        tensorgate_schema::JwksResponse {
            keys: vec![self.key.jwk.clone()],
        }
    }
}

fn row_to_principal(row: &DbPrincipalRow) -> Result<Principal, String> {
    let tier: Tier = serde_json::from_value(serde_json::Value::String(row.tier.clone()))
        .map_err(|e| format!("corrupt tier column: {e}"))?;
    let status: Status = serde_json::from_value(serde_json::Value::String(row.status.clone()))
        .map_err(|e| format!("corrupt status column: {e}"))?;
    let roles: Vec<String> =
        serde_json::from_str(&row.roles).map_err(|e| format!("corrupt roles column: {e}"))?;

    Ok(Principal {
        id: row.id,
        contact: row.contact.clone(),
        tier,
        status,
        password_hash: row.password_hash.clone(),
        roles,
    })
}

fn load_active_key(signing_key_path: Option<&str>) -> Result<ActiveKey, AuthError> {
    let private = match signing_key_path {
        Some(path) => {
            let pem = std::fs::read_to_string(path)
                .map_err(|e| AuthError::Internal(format!("failed to read signing key: {e}")))?;
            RsaPrivateKey::from_pkcs8_pem(&pem)
                .map_err(|e| AuthError::Internal(format!("invalid signing key PEM: {e}")))?
        }
        None => {
            RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
                .map_err(|e| AuthError::Internal(format!("failed to generate signing key: {e}")))?
        }
    };

    let pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AuthError::Internal(format!("failed to encode signing key: {e}")))?;
    let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| AuthError::Internal(format!("failed to load encoding key: {e}")))?;

    let public = private.to_public_key();
    let n = URL_SAFE_NO_PAD.encode(public.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public.e().to_bytes_be());
    let decoding_key = DecodingKey::from_rsa_components(&n, &e)
        .map_err(|err| AuthError::Internal(format!("failed to build decoding key: {err}")))?;

    let kid = Uuid::new_v4().to_string();
    let jwk = JwkKey {
        kty: "RSA".to_string(),
        use_: "sig".to_string(),
        kid: kid.clone(),
        alg: "RS256".to_string(),
        n,
        e,
    };

    Ok(ActiveKey {
        kid,
        encoding_key,
        decoding_key,
        jwk,
    })
}
