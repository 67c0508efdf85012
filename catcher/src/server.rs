use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use health::{ComponentStatus, HealthHandle, HealthRegistry};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::{Config, DedupBackend};
use crate::dedup::memory::MemoryDedupStore;
use crate::dedup::redis::RedisDedupStore;
use crate::dedup::DedupStore;
use crate::prometheus::setup_metrics_recorder;
use crate::router;
use crate::sinks::kafka::KafkaSink;
use crate::sinks::print::PrintSink;
use crate::sinks::RecordSink;

const DEDUP_PING_INTERVAL: Duration = Duration::from_secs(10);

fn create_sink(
    config: &Config,
    liveness: &HealthRegistry,
) -> anyhow::Result<Arc<dyn RecordSink + Send + Sync>> {
    if config.print_sink {
        // Print sink is only used for local debug, don't allow a container with it to run on prod
        liveness
            .register("print_sink".to_string(), Duration::from_secs(30))
            .report_status(ComponentStatus::Unhealthy);

        Ok(Arc::new(PrintSink {}))
    } else {
        let sink_liveness = liveness.register("rdkafka".to_string(), Duration::from_secs(30));
        let sink = KafkaSink::new(config.kafka.clone(), sink_liveness)
            .context("failed to start Kafka sink")?;
        Ok(Arc::new(sink))
    }
}

type SharedDedupStore = Arc<dyn DedupStore + Send + Sync>;

/// Returns the store and, for remote backends, the task pinging it for the liveness check.
async fn create_dedup_store(
    config: &Config,
    liveness: &HealthRegistry,
) -> anyhow::Result<(SharedDedupStore, Option<JoinHandle<()>>)> {
    match config.dedup.dedup_backend {
        DedupBackend::Memory => {
            warn!("using the in-memory dedup store, duplicates are only caught within this process");
            Ok((Arc::new(MemoryDedupStore::new(config.dedup.ttl())), None))
        }
        DedupBackend::Redis => {
            let store: SharedDedupStore = Arc::new(
                RedisDedupStore::connect(&config.dedup)
                    .await
                    .context("failed to connect to the dedup store")?,
            );
            let handle = liveness.register("redis".to_string(), Duration::from_secs(30));
            let pinger = tokio::spawn(dedup_liveness_loop(store.clone(), handle));
            Ok((store, Some(pinger)))
        }
    }
}

async fn dedup_liveness_loop(store: SharedDedupStore, handle: HealthHandle) {
    loop {
        match store.ping().await {
            Ok(()) => handle.report_healthy(),
            Err(err) => warn!("dedup store ping failed: {}", err),
        }
        tokio::time::sleep(DEDUP_PING_INTERVAL).await;
    }
}

/// Stops the ping loop and drops the last reference to the store, which
/// closes its connection. Returns false if something still holds the store.
async fn close_dedup_store(store: SharedDedupStore, pinger: Option<JoinHandle<()>>) -> bool {
    if let Some(pinger) = pinger {
        pinger.abort();
        if let Err(err) = pinger.await {
            if !err.is_cancelled() {
                error!("dedup liveness task failed: {}", err);
            }
        }
    }

    if Arc::strong_count(&store) > 1 {
        warn!("dedup store still referenced at shutdown, not closed");
        return false;
    }
    drop(store);
    info!("dedup store closed");
    true
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if config.webhook_token.is_empty() {
        anyhow::bail!("CATCHER_HTTP_WEBHOOK_TOKEN must not be empty");
    }

    let liveness =
        HealthRegistry::new_with_strategy("liveness", config.healthcheck_strategy.clone());

    let (dedup, pinger) = create_dedup_store(&config, &liveness).await?;
    let sink = create_sink(&config, &liveness)?;
    let tasks = TaskTracker::new();

    // Don't install metrics unless asked to
    // Installing a global recorder when catcher is used as a library (during tests etc)
    // does not work well.
    let metrics = if config.export_prometheus {
        Some(setup_metrics_recorder().context("failed to install the metrics recorder")?)
    } else {
        None
    };

    let app = router::router(
        liveness,
        sink.clone(),
        dedup.clone(),
        &config.webhook_token,
        tasks.clone(),
        config.max_body_size_bytes,
        metrics,
    );

    info!("listening on {:?}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")?;

    // Batches whose request was dropped can still be publishing
    tasks.close();
    info!(pending = tasks.len(), "waiting for in-flight batches");
    tasks.wait().await;

    info!("flushing sink before exit");
    let flushed = tokio::task::spawn_blocking(move || sink.flush()).await;
    match flushed {
        Ok(Ok(())) => info!("sink flushed"),
        Ok(Err(err)) => error!("failed to flush sink: {:#}", err),
        Err(err) => error!("sink flush task failed: {}", err),
    }

    close_dedup_store(dedup, pinger).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::Claim;
    use crate::fingerprint::DedupKey;

    #[tokio::test]
    async fn close_stops_the_liveness_loop() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("redis".to_string(), Duration::from_secs(30));
        let store: SharedDedupStore = Arc::new(MemoryDedupStore::default());
        let pinger = tokio::spawn(dedup_liveness_loop(store.clone(), handle));

        // First ping happens right away
        for _ in 0..50 {
            if registry.get_status().healthy {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registry.get_status().healthy);
        assert_eq!(Arc::strong_count(&store), 2);

        assert!(close_dedup_store(store, Some(pinger)).await);
    }

    #[tokio::test]
    async fn close_reports_a_store_still_in_use() {
        let store: SharedDedupStore = Arc::new(MemoryDedupStore::default());
        let in_use = store.clone();

        assert!(!close_dedup_store(store, None).await);
        let key = DedupKey::from_canonical(b"still usable");
        assert_eq!(in_use.claim(&key).await.unwrap(), Claim::FirstSeen);
    }
}
