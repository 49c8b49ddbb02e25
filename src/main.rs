use anyhow::Context;
use api_server::{create_router, AppState};
use chain_client::AdapterRegistry;
use config_manager::SystemConfig;
use job_orchestrator::WalletTracker;
use persistence_layer::{JobQueue, PostgresStore, WalletStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wallet_tracker=debug".into()),
        )
        .init();

    let config = SystemConfig::load().context("failed to load configuration")?;
    info!("Starting wallet tracker");

    let store = PostgresStore::new(&config.database.postgres_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    store
        .init_schema()
        .await
        .context("failed to initialize database schema")?;
    let store: Arc<dyn WalletStore> = Arc::new(store);

    let queue = Arc::new(
        JobQueue::new(&config.redis.url)
            .await
            .context("failed to connect to Redis")?,
    );

    let registry = AdapterRegistry::from_config(&config.chains, config.tracking.page_limit)
        .context("failed to build chain adapters")?;

    let tracker = Arc::new(WalletTracker::new(
        registry,
        store.clone(),
        queue.clone(),
        config.tracking.clone(),
    ));

    let consumer = tracker.clone();
    tokio::spawn(async move {
        consumer.run_consumer().await;
    });

    let state = AppState {
        config: config.clone(),
        tracker,
        store,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .context("API server terminated")?;

    Ok(())
}
