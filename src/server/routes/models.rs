use crate::auth::TokenType;
use crate::error::GatewayError;
use crate::model_catalog::MODEL_REGISTRY;
use crate::server::router::GatewayState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tensorgate_schema::ModelList;

/// `GET /v1/models` — bearer is accepted but not required; the catalog isn't
/// principal-specific so an absent header short-circuits straight to 200.
/// A *present* bearer is still validated: a caller that sends a revoked or
/// malformed token gets rejected rather than silently ignored.
pub async fn list_models(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Json<ModelList>, GatewayError> {
    if let Some(auth) = headers.typed_get::<Authorization<Bearer>>() {
        state.tokens.validate(auth.token(), TokenType::Access).await?;
    }

    let created = chrono::Utc::now().timestamp();
    Ok(Json(ModelList::from_names(
        MODEL_REGISTRY.names(),
        "tensorgate",
        created,
    )))
}
