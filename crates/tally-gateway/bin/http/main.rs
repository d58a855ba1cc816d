mod cli;

use crate::cli::{CacheBackendArg, StorageBackendArg, CLI};
use clap::Parser;
use std::sync::Arc;
use tally_cache::{InMemoryCounterCache, RedisCounterCache, TimeoutCache};
use tally_core::{CounterCache, LinkStore};
use tally_gateway::{App, AppState};
use tally_redirector::{RedirectorService, VisitAggregator};
use tally_storage::{InMemoryLinkStore, MySqlLinkStore};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CLI::try_parse()?;
    tally_telemetry::init(config.log_format)?;

    let settings = config.visit_settings();
    settings.validate()?;

    info!(
        listen_addr = %config.listen_addr,
        storage_backend = %config.storage,
        cache_backend = %config.cache,
        flush_threshold = settings.flush_threshold,
        window_secs = config.window_secs,
        "starting gateway server"
    );

    let store: Arc<dyn LinkStore> = match config.storage {
        StorageBackendArg::InMemory => Arc::new(InMemoryLinkStore::new()),
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .as_deref()
                .ok_or("mysql dsn is required when storage backend is mysql")?;
            let store = MySqlLinkStore::connect(mysql_dsn).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
    };

    let cache: Arc<dyn CounterCache> = match config.cache {
        CacheBackendArg::InMemory => Arc::new(InMemoryCounterCache::new()),
        CacheBackendArg::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .ok_or("redis url is required when cache backend is redis")?;
            Arc::new(RedisCounterCache::connect(redis_url).await?)
        }
    };
    let cache = TimeoutCache::new(cache, settings.cache_timeout);

    let aggregator = VisitAggregator::new(cache, Arc::clone(&store), settings);
    let flusher = aggregator.flusher();
    let service = RedirectorService::new(Arc::clone(&store), aggregator)
        .with_dispatch(config.visit_dispatch());

    let (stop_flusher, mut flusher_stopped) = watch::channel(false);
    let tick = config.flush_tick();
    let flusher_task = tokio::spawn(async move {
        flusher
            .run(tick, async move {
                let _ = flusher_stopped.changed().await;
            })
            .await;
    });

    let generator = Arc::new(config.code_generator());
    let state = AppState::new(Arc::new(service), store, config.public_base_url)
        .with_generator(generator);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(listen_addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped, flushing pending visit counts");
    let _ = stop_flusher.send(true);
    flusher_task.await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
