use crate::db::models::{DbPrincipalRow, DbRefreshTokenRow};
use crate::db::schema::SQLITE_INIT;
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::info;

/// Outcome of redeeming a refresh token: consumption is atomic (the row is
/// deleted as part of the same lookup) so a token can never be replayed even
/// under concurrent refresh attempts.
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    Consumed(DbPrincipalRow),
    NotFound,
    Expired,
}

#[derive(Debug)]
pub enum DbActorMessage {
    GetPrincipalByEmail(String, RpcReplyPort<Result<Option<DbPrincipalRow>, GatewayError>>),

    GetPrincipalById(i64, RpcReplyPort<Result<Option<DbPrincipalRow>, GatewayError>>),

    CreatePrincipal {
        contact: String,
        tier: String,
        password_hash: String,
        roles: String,
        reply: RpcReplyPort<Result<i64, GatewayError>>,
    },

    CreateRefreshToken {
        jti: String,
        principal_id: i64,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        reply: RpcReplyPort<Result<(), GatewayError>>,
    },

    /// Atomically deletes and returns the refresh token row, so redemption
    /// and invalidation happen in one step.
    ConsumeRefreshToken(String, RpcReplyPort<Result<ConsumeOutcome, GatewayError>>),

    RevokeRefreshToken(String, RpcReplyPort<Result<(), GatewayError>>),
}

#[derive(Clone)]
pub struct DbActorHandle {
    actor: ActorRef<DbActorMessage>,
}

impl DbActorHandle {
    pub async fn get_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<DbPrincipalRow>, GatewayError> {
        ractor::call!(
            self.actor,
            DbActorMessage::GetPrincipalByEmail,
            email.to_string()
        )
        .map_err(|e| GatewayError::Ractor(format!("GetPrincipalByEmail RPC failed: {e}")))?
    }

    pub async fn get_principal_by_id(
        &self,
        id: i64,
    ) -> Result<Option<DbPrincipalRow>, GatewayError> {
        ractor::call!(self.actor, DbActorMessage::GetPrincipalById, id)
            .map_err(|e| GatewayError::Ractor(format!("GetPrincipalById RPC failed: {e}")))?
    }

    pub async fn create_principal(
        &self,
        contact: String,
        tier: String,
        password_hash: String,
        roles: String,
    ) -> Result<i64, GatewayError> {
        ractor::call!(self.actor, |reply| DbActorMessage::CreatePrincipal {
            contact,
            tier,
            password_hash,
            roles,
            reply,
        })
        .map_err(|e| GatewayError::Ractor(format!("CreatePrincipal RPC failed: {e}")))?
    }

    pub async fn create_refresh_token(
        &self,
        jti: String,
        principal_id: i64,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        ractor::call!(self.actor, |reply| DbActorMessage::CreateRefreshToken {
            jti,
            principal_id,
            issued_at,
            expires_at,
            reply,
        })
        .map_err(|e| GatewayError::Ractor(format!("CreateRefreshToken RPC failed: {e}")))?
    }

    pub async fn consume_refresh_token(&self, jti: &str) -> Result<ConsumeOutcome, GatewayError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ConsumeRefreshToken,
            jti.to_string()
        )
        .map_err(|e| GatewayError::Ractor(format!("ConsumeRefreshToken RPC failed: {e}")))?
    }

    pub async fn revoke_refresh_token(&self, jti: &str) -> Result<(), GatewayError> {
        ractor::call!(
            self.actor,
            DbActorMessage::RevokeRefreshToken,
            jti.to_string()
        )
        .map_err(|e| GatewayError::Ractor(format!("RevokeRefreshToken RPC failed: {e}")))?
    }
}

struct DbActorState {
    pool: SqlitePool,
}

struct DbActor;

#[ractor::async_trait]
impl Actor for DbActor {
    type Msg = DbActorMessage;
    type State = DbActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("DbActor initialized");
        Ok(DbActorState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DbActorMessage::GetPrincipalByEmail(email, reply) => {
                let res = self.get_principal_by_email(&state.pool, &email).await;
                let _ = reply.send(res);
            }
            DbActorMessage::GetPrincipalById(id, reply) => {
                let res = self.get_principal_by_id(&state.pool, id).await;
                let _ = reply.send(res);
            }
            DbActorMessage::CreatePrincipal {
                contact,
                tier,
                password_hash,
                roles,
                reply,
            } => {
                let res = self
                    .create_principal(&state.pool, &contact, &tier, &password_hash, &roles)
                    .await;
                let _ = reply.send(res);
            }
            DbActorMessage::CreateRefreshToken {
                jti,
                principal_id,
                issued_at,
                expires_at,
                reply,
            } => {
                let res = self
                    .create_refresh_token(&state.pool, &jti, principal_id, issued_at, expires_at)
                    .await;
                let _ = reply.send(res);
            }
            DbActorMessage::ConsumeRefreshToken(jti, reply) => {
                let res = self.consume_refresh_token(&state.pool, &jti).await;
                let _ = reply.send(res);
            }
            DbActorMessage::RevokeRefreshToken(jti, reply) => {
                let res = self.revoke_refresh_token(&state.pool, &jti).await;
                let _ = reply.send(res);
            }
        }
        Ok(())
    }
}

impl DbActor {
    async fn get_principal_by_email(
        &self,
        pool: &SqlitePool,
        email: &str,
    ) -> Result<Option<DbPrincipalRow>, GatewayError> {
        let row = sqlx::query_as::<_, DbPrincipalRow>(
            "SELECT id, contact, tier, status, password_hash, roles FROM principals WHERE contact = ?",
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    async fn get_principal_by_id(
        &self,
        pool: &SqlitePool,
        id: i64,
    ) -> Result<Option<DbPrincipalRow>, GatewayError> {
        let row = sqlx::query_as::<_, DbPrincipalRow>(
            "SELECT id, contact, tier, status, password_hash, roles FROM principals WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    async fn create_principal(
        &self,
        pool: &SqlitePool,
        contact: &str,
        tier: &str,
        password_hash: &str,
        roles: &str,
    ) -> Result<i64, GatewayError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO principals (contact, tier, status, password_hash, roles)
            VALUES (?, ?, 'active', ?, ?)
            RETURNING id
            "#,
        )
        .bind(contact)
        .bind(tier)
        .bind(password_hash)
        .bind(roles)
        .fetch_one(pool)
        .await?;

        Ok(id)
    }

    async fn create_refresh_token(
        &self,
        pool: &SqlitePool,
        jti: &str,
        principal_id: i64,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (jti, principal_id, issued_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(principal_id)
        .bind(issued_at.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn consume_refresh_token(
        &self,
        pool: &SqlitePool,
        jti: &str,
    ) -> Result<ConsumeOutcome, GatewayError> {
        let mut tx = pool.begin().await?;

        let Some(token) =
            sqlx::query_as::<_, DbRefreshTokenRow>(
                "SELECT jti, principal_id, expires_at FROM refresh_tokens WHERE jti = ?",
            )
            .bind(jti)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(ConsumeOutcome::NotFound);
        };

        sqlx::query("DELETE FROM refresh_tokens WHERE jti = ?")
            .bind(jti)
            .execute(&mut *tx)
            .await?;

        let expires_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&token.expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| GatewayError::Internal(format!("corrupt refresh token expiry: {e}")))?;

        if expires_at <= Utc::now() {
            tx.commit().await?;
            return Ok(ConsumeOutcome::Expired);
        }

        let principal = sqlx::query_as::<_, DbPrincipalRow>(
            "SELECT id, contact, tier, status, password_hash, roles FROM principals WHERE id = ?",
        )
        .bind(token.principal_id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        match principal {
            Some(p) => Ok(ConsumeOutcome::Consumed(p)),
            None => Ok(ConsumeOutcome::NotFound),
        }
    }

    async fn revoke_refresh_token(
        &self,
        pool: &SqlitePool,
        jti: &str,
    ) -> Result<(), GatewayError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE jti = ?")
            .bind(jti)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// Spawn the database actor and return a cloneable handle.
///
/// The registered name carries a unique suffix (rather than a bare
/// `"DbActor"`) so a process that spawns more than one actor — every test
/// binary with more than one `#[tokio::test]` touching the database — never
/// collides with ractor's process-wide name registry.
pub async fn spawn(database_url: &str) -> DbActorHandle {
    let name = format!("DbActor-{}", uuid::Uuid::new_v4());
    let (actor, _jh) = ractor::Actor::spawn(Some(name), DbActor, database_url.to_string())
        .await
        .expect("failed to spawn DbActor");

    DbActorHandle { actor }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), GatewayError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
