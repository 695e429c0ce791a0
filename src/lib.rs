pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::config::{PersistenceBackend, Settings};
use crate::core::{redis::RedisHandle, state::AppState, telemetry, time::SystemClock};
use crate::repositories::{memory::MemoryStore, pg_store::PgStore, Stores};
use crate::services::scoring;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let stores = open_stores(&settings).await?;
    let redis = connect_redis(&settings).await;
    let scorer = scoring::from_settings(&settings)?;

    let state = AppState::new(settings, redis.clone(), stores, Arc::new(SystemClock), scorer);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        backend = state.settings().persistence().backend.as_str(),
        "Examhall API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    if settings.persistence().backend == PersistenceBackend::Memory {
        tracing::warn!("Worker running against an in-memory store sees no API attempts");
    }

    let stores = open_stores(&settings).await?;
    let redis = connect_redis(&settings).await;
    let scorer = scoring::from_settings(&settings)?;

    let state = AppState::new(settings, redis.clone(), stores, Arc::new(SystemClock), scorer);

    let result = tasks::scheduler::run(state).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

async fn open_stores(settings: &Settings) -> anyhow::Result<Stores> {
    match settings.persistence().backend {
        PersistenceBackend::Postgres => {
            let pool = db::init_pool(settings).await?;
            db::run_migrations(&pool).await?;
            Ok(Stores::single(PgStore::new(pool)))
        }
        PersistenceBackend::Memory => {
            let store = MemoryStore::new();
            if let Some(path) = settings.persistence().seed_path.as_deref() {
                store.seed_from_file(path).await?;
            }
            Ok(Stores::single(store))
        }
    }
}

async fn connect_redis(settings: &Settings) -> RedisHandle {
    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; answer rate limiting disabled");
    } else {
        tracing::info!("Redis connected successfully");
    }
    redis
}
