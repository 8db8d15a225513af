//! Studio Blockchain indexer entrypoint.
//!
//! Wires the C1 RPC pool, C2 store, C4 classifier, C5 ingestor driver and
//! C6 metadata resolver into one process, then serves the C8 query facade
//! over a small `axum` router. Every background task shares one
//! [`CancellationToken`] flipped by [`SigDown`] on SIGTERM/SIGINT, the same
//! shutdown shape as the teacher's `facilitator/src/run.rs`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use studio_indexer::classifier::ContractClassifier;
use studio_indexer::config::Config;
use studio_indexer::error::IndexerError;
use studio_indexer::ingestor::Ingestor;
use studio_indexer::nft::MetadataQueue;
use studio_indexer::query::QueryFacade;
use studio_indexer::query::routes::{self, AppState};
use studio_indexer::rpc::{RpcPool, health};
use studio_indexer::util::SigDown;
use studio_indexer_store::Store;

#[tokio::main]
async fn main() -> Result<(), IndexerError> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;

    let rpc_urls: Vec<url::Url> = config.rpc.urls.iter().map(|u| u.inner().clone()).collect();
    let pool: Arc<RpcPool> = Arc::new(RpcPool::new(rpc_urls)?);

    let sig_down = SigDown::try_new()?;
    let cancel = sig_down.cancellation_token();

    sanity_check_chain_id(&pool, config.rpc.chain_id, &cancel).await;

    let store = Store::connect(&config.db.connection_string(), 10).await?;
    store.migrate().await?;

    let classifier = Arc::new(ContractClassifier::new(pool.clone()));

    let metadata_queue = MetadataQueue::new(config.metadata.queue_capacity);
    let metadata_workers = studio_indexer::nft::spawn_workers(
        metadata_queue.clone(),
        pool.clone(),
        store.clone(),
        config.metadata.worker_pool,
        cancel.clone(),
    );

    let health_prober = tokio::spawn(health::run(pool.clone(), cancel.clone()));

    let ingestor = Arc::new(Ingestor::new(
        pool.clone(),
        store.clone(),
        classifier.clone(),
        metadata_queue.clone(),
        config.indexer.start_block,
        config.indexer.confirmations,
        config.indexer.batch_window,
        config.indexer.poll_interval_secs,
    ));
    let ingestor_task = {
        let ingestor = ingestor.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = ingestor.run(cancel).await {
                tracing::error!(%error, "ingestor exited with an error");
            }
        })
    };

    let facade = Arc::new(QueryFacade::new(store.clone(), pool.clone()));
    let app_state = AppState { facade, pool: pool.clone() };

    let router: Router = Router::new()
        .merge(routes::routes().with_state(app_state))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| IndexerError::Unavailable(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(%addr, "studio-indexer listening");

    let shutdown_token = cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await
        .map_err(|e| IndexerError::Unavailable(format!("http server error: {e}")))?;

    cancel.cancel();
    let _ = ingestor_task.await;
    let _ = health_prober.await;
    for worker in metadata_workers {
        let _ = worker.await;
    }
    sig_down.recv().await;

    Ok(())
}

/// §6.4: `rpc.chainId` is only a startup sanity-check, not a hard
/// precondition — a mismatch is logged, never fatal, since misreporting
/// `eth_chainId` is a known quirk of some private clique networks.
async fn sanity_check_chain_id(pool: &Arc<RpcPool>, expected: u64, cancel: &CancellationToken) {
    match pool.call::<(), String>("eth_chainId", (), cancel).await {
        Ok(hex) => {
            let trimmed = hex.trim_start_matches("0x");
            match u64::from_str_radix(trimmed, 16) {
                Ok(actual) if actual == expected => {
                    tracing::info!(chain_id = actual, "rpc endpoint chain id confirmed");
                }
                Ok(actual) => {
                    tracing::warn!(expected, actual, "rpc endpoint reported unexpected chain id");
                }
                Err(_) => {
                    tracing::warn!(%hex, "eth_chainId returned a non-hex value");
                }
            }
        }
        Err(error) => {
            tracing::warn!(%error, "could not reach rpc endpoint for chain id sanity check");
        }
    }
}
