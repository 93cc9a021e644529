use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tensorgate::auth::{RoleTable, TokenService};
use tensorgate::db::DbActorHandle;
use tensorgate::gpu::{Gib, GpuPool};
use tensorgate::job::JobRegistry;
use tensorgate::kvstore::{KVStore, MemoryKvStore};
use tensorgate::queue::{BoundedWorkQueue, WorkQueue};
use tensorgate::ratelimiter::RateLimiter;
use tensorgate::scheduler::Scheduler;
use tensorgate::server::router::{GatewayState, gateway_router};
use tower::ServiceExt;

// NOTE: `tensorgate::db::spawn()` registers its ractor actor under a unique
// per-call name (see `DESIGN.md`), so more than one spawn per test binary is
// safe.

async fn temp_database_url(label: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "tensorgate-{label}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    format!("sqlite:{}", path.display())
}

async fn build_state(label: &str) -> (GatewayState, DbActorHandle) {
    let db = tensorgate::db::spawn(&temp_database_url(label).await).await;
    let kv: Arc<dyn KVStore> = Arc::new(MemoryKvStore::default());
    let roles =
        Arc::new(RoleTable::new(tensorgate::config::RolesConfig::default().roles).unwrap());

    let tokens = Arc::new(
        TokenService::new(None, 900, 2_592_000, db.clone(), kv.clone(), roles.clone()).unwrap(),
    );
    let rate_limiter = Arc::new(RateLimiter::new(
        kv.clone(),
        roles.clone(),
        tensorgate::config::TiersConfig::default(),
    ));

    let mut model_memory = BTreeMap::new();
    model_memory.insert("gpt-4o-mini".to_string(), 8);
    let gpu_pool = GpuPool::new([("gpu0".to_string(), Gib(80))], model_memory, true);

    let queue: Arc<dyn WorkQueue> = Arc::new(BoundedWorkQueue::new(16));
    let jobs = JobRegistry::new(kv.clone(), Duration::from_secs(3600));
    let backend = Arc::new(tensorgate::backend::MockBackend);
    let metrics = tensorgate::metrics::noop();

    let scheduler = Arc::new(Scheduler::new(gpu_pool, jobs, backend, metrics.clone(), queue));
    scheduler.spawn_workers(2);

    let state = GatewayState {
        tokens,
        rate_limiter,
        scheduler,
        roles,
        metrics,
        admission_deadline: Duration::from_secs(5),
    };
    (state, db)
}

/// Inserts a principal row directly through the DB actor, bypassing a public
/// signup endpoint this gateway doesn't expose.
async fn seed_principal(db: &DbActorHandle, roles: &[&str]) -> (String, &'static str) {
    let email = format!("user-{}@example.com", uuid::Uuid::new_v4());
    let password = "correct horse battery staple";
    let password_hash = tensorgate::auth::password::hash_password(password).unwrap();
    let roles_json = serde_json::to_string(roles).unwrap();

    db.create_principal(email.clone(), "free".to_string(), password_hash, roles_json)
        .await
        .unwrap();

    (email, password)
}

#[tokio::test]
async fn health_route_is_unauthenticated() {
    let (state, _db) = build_state("health").await;
    let app = gateway_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn models_route_lists_the_catalog() {
    let (state, _db) = build_state("models").await;
    let app = gateway_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["object"], "list");
}

#[tokio::test]
async fn chat_completions_requires_a_bearer_token() {
    let (state, _db) = build_state("chat-noauth").await;
    let app = gateway_router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"model":"gpt-4o-mini","messages":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_unknown_email_is_rejected() {
    let (state, _db) = build_state("login-unknown").await;
    let app = gateway_router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"email":"nobody@example.com","password":"wrong"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn jwks_route_exposes_the_active_signing_key() {
    let (state, _db) = build_state("jwks").await;
    let app = gateway_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/v1/auth/jwks").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["keys"].as_array().unwrap().len(), 1);
    assert_eq!(value["keys"][0]["kty"], "RSA");
}

#[tokio::test]
async fn login_then_chat_completion_round_trip() {
    let (state, db) = build_state("round-trip").await;
    let (email, password) = seed_principal(&db, &["user"]).await;
    let app = gateway_router(state);

    let login_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": email, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(login_resp.status(), StatusCode::OK);
    let login_body = to_bytes(login_resp.into_body(), usize::MAX).await.unwrap();
    let pair: serde_json::Value = serde_json::from_slice(&login_body).unwrap();
    let access_token = pair["access_token"].as_str().unwrap().to_string();

    let chat_resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {access_token}"))
                .body(Body::from(
                    serde_json::json!({
                        "model": "gpt-4o-mini",
                        "messages": [{"role": "user", "content": "hello there"}],
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(chat_resp.status(), StatusCode::OK);
    assert!(chat_resp.headers().get("x-ratelimit-limit").is_some());
    let chat_body = to_bytes(chat_resp.into_body(), usize::MAX).await.unwrap();
    let completion: serde_json::Value = serde_json::from_slice(&chat_body).unwrap();
    assert_eq!(completion["object"], "chat.completion");
    assert!(
        completion["choices"][0]["message"]["content"]
            .as_str()
            .unwrap()
            .contains("hello there")
    );
}

#[tokio::test]
async fn revoking_the_access_token_rejects_a_later_models_call() {
    let (state, db) = build_state("revoke-models").await;
    let (email, password) = seed_principal(&db, &["user"]).await;
    let app = gateway_router(state);

    let login_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": email, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let login_body = to_bytes(login_resp.into_body(), usize::MAX).await.unwrap();
    let pair: serde_json::Value = serde_json::from_slice(&login_body).unwrap();
    let access_token = pair["access_token"].as_str().unwrap().to_string();

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/models")
                .header("authorization", format!("Bearer {access_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let revoke_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/revoke")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {access_token}"))
                .body(Body::from(
                    serde_json::json!({ "token": access_token }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(revoke_resp.status(), StatusCode::NO_CONTENT);

    let second = app
        .oneshot(
            Request::builder()
                .uri("/v1/models")
                .header("authorization", format!("Bearer {access_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    let body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"]["type"], "authentication_error");
    assert_eq!(value["error"]["code"], "revoked");
}

#[tokio::test]
async fn models_route_without_a_bearer_token_still_succeeds() {
    let (state, _db) = build_state("models-noauth").await;
    let app = gateway_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_completion_is_forbidden_without_inference_permission() {
    let (state, db) = build_state("forbidden").await;
    let (email, password) = seed_principal(&db, &["base"]).await;
    let app = gateway_router(state);

    let login_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": email, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let login_body = to_bytes(login_resp.into_body(), usize::MAX).await.unwrap();
    let pair: serde_json::Value = serde_json::from_slice(&login_body).unwrap();
    let access_token = pair["access_token"].as_str().unwrap().to_string();

    let chat_resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {access_token}"))
                .body(Body::from(
                    serde_json::json!({
                        "model": "gpt-4o-mini",
                        "messages": [{"role": "user", "content": "hi"}],
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(chat_resp.status(), StatusCode::FORBIDDEN);
}
