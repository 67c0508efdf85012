use std::future::ready;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use health::HealthRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

use crate::dedup::DedupStore;
use crate::metrics_middleware::track_metrics;
use crate::sinks::RecordSink;
use crate::webhook_endpoint;

pub const VPC_FLOW_LOGS_PATH: &str = "/aws/logs/vpc/webhook";

#[derive(Clone)]
pub struct State {
    pub sink: Arc<dyn RecordSink + Send + Sync>,
    pub dedup: Arc<dyn DedupStore + Send + Sync>,
    pub access_key: Arc<str>,
    /// Batch tasks outlive their request, shutdown waits on them
    pub tasks: TaskTracker,
}

async fn index() -> &'static str {
    "catcher"
}

pub fn router(
    liveness: HealthRegistry,
    sink: Arc<dyn RecordSink + Send + Sync>,
    dedup: Arc<dyn DedupStore + Send + Sync>,
    access_key: &str,
    tasks: TaskTracker,
    max_body_size_bytes: usize,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let state = State {
        sink,
        dedup,
        access_key: Arc::from(access_key),
        tasks,
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route(
            VPC_FLOW_LOGS_PATH,
            post(webhook_endpoint::vpc_flow_logs)
                .layer(DefaultBodyLimit::max(max_body_size_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't expose metrics unless asked to
    if let Some(recorder_handle) = metrics {
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
