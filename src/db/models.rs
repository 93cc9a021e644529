use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct DbPrincipalRow {
    pub id: i64,
    pub contact: String,
    pub tier: String,
    pub status: String,
    pub password_hash: String,
    pub roles: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRefreshTokenRow {
    pub jti: String,
    pub principal_id: i64,
    pub expires_at: String,
}
