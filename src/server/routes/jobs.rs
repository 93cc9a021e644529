use crate::error::GatewayError;
use crate::server::guards::auth::AuthenticatedPrincipal;
use crate::server::router::GatewayState;
use axum::extract::{Path, State};
use axum::http::StatusCode;

/// `DELETE /v1/jobs/{id}` — cancels a queued or running job. Only the
/// owning principal may cancel it; everyone else gets `permission_error`,
/// matching the ownership language in the job entity's description.
pub async fn cancel_job(
    State(state): State<GatewayState>,
    caller: AuthenticatedPrincipal,
    Path(job_id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state.scheduler.cancel(&job_id, caller.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
