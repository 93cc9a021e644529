use crate::auth::Permission;
use crate::backend::ExecuteRequest;
use crate::error::GatewayError;
use crate::scheduler::Dispatch;
use crate::server::guards::auth::AuthenticatedPrincipal;
use crate::server::router::GatewayState;
use crate::stream::StreamMultiplexer;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tensorgate_schema::{ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use tokio_stream::StreamExt;

fn rate_limit_headers(resp: &mut Response, decision: &crate::ratelimiter::Decision) {
    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset_at_unix.to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
}

/// `POST /v1/chat/completions` — the six-step admission pipeline: bearer
/// auth (via the `AuthenticatedPrincipal` extractor), permission check,
/// rate limit, body validation, then dispatch to the scheduler.
pub async fn chat_completions(
    State(state): State<GatewayState>,
    caller: AuthenticatedPrincipal,
    Json(body): Json<ChatCompletionRequest>,
) -> Result<Response, GatewayError> {
    let principal = caller.as_principal();

    if !state.tokens.authorize(&principal, Permission::ModelInference) {
        return Err(GatewayError::Permission(
            "missing model.inference permission".to_string(),
        ));
    }

    let decision = state
        .rate_limiter
        .allow(&principal)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    if !decision.allowed {
        let retry_after = (decision.reset_at_unix - chrono::Utc::now().timestamp()).max(1);
        let mut resp = GatewayError::RateLimited.into_response();
        rate_limit_headers(&mut resp, &decision);
        if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
            resp.headers_mut().insert(header::RETRY_AFTER, v);
        }
        return Ok(resp);
    }

    if body.model.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("model must not be empty".to_string()));
    }
    if body.messages.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }

    crate::utils::logging::with_pretty_json_debug(&body, |json| {
        tracing::debug!(principal_id = principal.id, "chat completion request\n{json}");
    });

    let stream = body.stream;
    let request = ExecuteRequest {
        model: body.model.clone(),
        messages: body.messages.clone(),
        max_tokens: body.max_tokens,
        temperature: body.temperature,
    };

    let (_job_id, dispatch) = state
        .scheduler
        .submit(principal.id, request, stream, state.admission_deadline)
        .await?;

    let mut resp = match dispatch {
        Dispatch::Blocking(rx) => {
            let outcome = rx.await.map_err(|_| {
                GatewayError::Internal("scheduler dropped the response channel".to_string())
            })?;
            let result = outcome?;
            let body = ChatCompletionResponse {
                id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
                object: "chat.completion".to_string(),
                created: chrono::Utc::now().timestamp(),
                model: body.model,
                choices: vec![ChatChoice {
                    index: 0,
                    message: ChatMessage {
                        role: "assistant".to_string(),
                        content: result.text,
                        extra: Default::default(),
                    },
                    finish_reason: "stop".to_string(),
                }],
                usage: result.usage,
            };
            Json(body).into_response()
        }
        Dispatch::Streaming(rx) => {
            let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
            let created = chrono::Utc::now().timestamp();
            let multiplexer = StreamMultiplexer::new(id, body.model, created, rx);
            let byte_stream = multiplexer.map(|chunk| {
                let text = chunk.unwrap_or_else(|e| {
                    format!("data: {{\"error\":{{\"message\":{:?}}}}}\n\n", e.to_string())
                });
                Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(text))
            });
            let mut resp = Response::new(Body::from_stream(byte_stream));
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/event-stream"),
            );
            resp.headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            resp
        }
    };

    rate_limit_headers(&mut resp, &decision);
    *resp.status_mut() = StatusCode::OK;
    Ok(resp)
}
