//! Background endpoint health prober (§4.1: "a background task probes every
//! endpoint every 60s via current block number, updates a per-endpoint
//! health flag for reporting only — it does not affect routing").

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::pool::SharedRpcPool;

const PROBE_INTERVAL: Duration = Duration::from_secs(60);

/// Runs until `cancel` fires. Intended to be spawned once per process
/// alongside the ingestor driver.
pub async fn run(pool: SharedRpcPool, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(PROBE_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("rpc health prober shutting down");
                return;
            }
            _ = ticker.tick() => {
                probe_all(&pool).await;
            }
        }
    }
}

async fn probe_all(pool: &SharedRpcPool) {
    for index in 0..pool.endpoint_count() {
        let Some(url) = pool.endpoint_url(index).cloned() else {
            continue;
        };
        match pool.probe_block_number(index).await {
            Ok(height) => {
                tracing::debug!(%url, height, "rpc endpoint healthy");
                pool.mark_health(index, true);
            }
            Err(error) => {
                tracing::warn!(%url, %error, "rpc endpoint probe failed");
                pool.mark_health(index, false);
            }
        }
    }
}
