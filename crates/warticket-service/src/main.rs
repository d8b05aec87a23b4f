//! War-ticket Service - order placement, payment confirmation and ticket fulfillment
//!
//! This is the main entry point for the warticket service.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warticket_service::{
    create_router, AppState, PdfTicketRenderer, RetryPolicy, ServiceConfig, StoreBackend,
    TicketWorker,
};
use warticket_store::{
    BlobStore, CounterCache, FsBlobStore, JobQueue, MemoryBlobStore, MemoryCache, MemoryQueue,
    MemoryStore, PgStore, RateLimiter, RedisCache, RedisQueue, RedisRateLimiter, Store, UrlSigner,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warticket=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting war-ticket service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        store_backend = ?config.store_backend,
        redis_configured = %config.redis_url.is_some(),
        blob_dir = ?config.blob_dir,
        fulfillment_queue = %config.fulfillment_queue,
        run_worker = %config.run_worker,
        "Service configuration loaded"
    );

    let store = open_store(&config).await?;

    let mut rate_limiter: Option<Arc<dyn RateLimiter>> = None;
    let (cache, queue): (Arc<dyn CounterCache>, Arc<dyn JobQueue>) = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis");
            rate_limiter = Some(Arc::new(RedisRateLimiter::connect(url).await?));
            (
                Arc::new(RedisCache::connect(url).await?),
                Arc::new(RedisQueue::connect(url).await?),
            )
        }
        None => {
            tracing::warn!("REDIS_URL not set - using in-process stock cache and queue");
            (Arc::new(MemoryCache::new()), Arc::new(MemoryQueue::new()))
        }
    };

    let signer = UrlSigner::new(
        config.blob_signing_secret.as_bytes(),
        config.public_base_url.clone(),
    );
    let blobs: Arc<dyn BlobStore> = match &config.blob_dir {
        Some(dir) => {
            tracing::info!(path = %dir, "Opening filesystem blob store");
            Arc::new(FsBlobStore::open(dir, signer).await?)
        }
        None => {
            tracing::warn!("BLOB_DIR not set - rendered tickets are kept in memory");
            Arc::new(MemoryBlobStore::new(signer))
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = if config.run_worker {
        let worker = TicketWorker::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&blobs),
            Arc::new(PdfTicketRenderer::new()),
            config.fulfillment_queue.clone(),
            RetryPolicy::new(
                config.max_delivery_attempts,
                config.retry_initial_backoff,
                config.retry_max_backoff,
            ),
        );
        Some(tokio::spawn(async move {
            if let Err(e) = worker.run(shutdown_rx).await {
                tracing::error!(error = %e, "Ticket worker exited with error");
            }
        }))
    } else {
        tracing::info!("Ticket worker disabled");
        None
    };

    let mut state = AppState::new(config.clone(), store, cache, queue, blobs);
    if let Some(limiter) = rate_limiter {
        state = state.with_rate_limiter(limiter);
    }
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("HTTP server stopped, draining ticket worker");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Ticket worker task failed");
        }
    }

    Ok(())
}

async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, BoxError> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store - data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL is required for the postgres backend")?;
            tracing::info!(max_connections = config.database_max_connections, "Connecting to PostgreSQL");
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Rocks => open_rocks(&config.data_dir),
    }
}

#[cfg(feature = "rocksdb-backend")]
fn open_rocks(data_dir: &str) -> Result<Arc<dyn Store>, BoxError> {
    tracing::info!(path = %data_dir, "Opening RocksDB store");
    Ok(Arc::new(warticket_store::RocksStore::open(data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_rocks(_data_dir: &str) -> Result<Arc<dyn Store>, BoxError> {
    Err("STORE_BACKEND=rocksdb requires building with the rocksdb-backend feature".into())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
