use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tensorgate::auth::{RoleTable, TokenService};
use tensorgate::backend::MockBackend;
use tensorgate::gpu::{Gib, GpuPool};
use tensorgate::job::JobRegistry;
use tensorgate::kvstore::{KVStore, MemoryKvStore};
use tensorgate::queue::{BoundedWorkQueue, WorkQueue};
use tensorgate::ratelimiter::RateLimiter;
use tensorgate::scheduler::Scheduler;
use tensorgate::server::router::{GatewayState, gateway_router};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The server binary requires a real config file describing at least one GPU device.
    // (Library code uses `config::CONFIG` which is best-effort and does not validate.)
    let cfg = tensorgate::config::Config::from_toml();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let db = tensorgate::db::spawn(cfg.basic.database_url.as_str()).await;
    let kv: Arc<dyn KVStore> = Arc::new(MemoryKvStore::default());
    let roles = Arc::new(
        RoleTable::new(cfg.roles.roles.clone()).expect("config.toml roles table is malformed"),
    );

    let tokens = Arc::new(
        TokenService::new(
            cfg.basic.signing_key_path.as_deref(),
            cfg.basic.access_ttl_seconds,
            cfg.basic.refresh_ttl_seconds,
            db,
            kv.clone(),
            roles.clone(),
        )
        .expect("failed to initialize signing key"),
    );

    let rate_limiter = Arc::new(RateLimiter::new(kv.clone(), roles.clone(), cfg.tiers.clone()));

    let device_count = cfg.gpu_pool.devices.len();
    let devices = cfg
        .gpu_pool
        .devices
        .iter()
        .map(|d| (d.id.clone(), Gib(d.total_memory)));
    let gpu_pool = GpuPool::new(
        devices,
        cfg.gpu_pool.model_memory.clone(),
        cfg.gpu_pool.allow_model_sharing,
    );

    let queue: Arc<dyn WorkQueue> = Arc::new(BoundedWorkQueue::new(cfg.basic.queue_capacity));
    let jobs = JobRegistry::new(kv.clone(), Duration::from_secs(cfg.basic.job_ttl_seconds));
    let backend = Arc::new(MockBackend);
    let metrics = tensorgate::metrics::noop();

    let scheduler = Arc::new(Scheduler::new(
        gpu_pool,
        jobs,
        backend,
        metrics.clone(),
        queue,
    ));
    scheduler.spawn_workers((2 * device_count).max(1));

    let state = GatewayState {
        tokens,
        rate_limiter,
        scheduler,
        roles,
        metrics,
        admission_deadline: Duration::from_millis(cfg.basic.admission_deadline_ms),
    };
    let app = gateway_router(state);

    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { /* ... */ },
        _ = terminate => { /* ... */ },
    }
}
