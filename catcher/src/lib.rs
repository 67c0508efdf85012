pub mod api;
pub mod config;
pub mod dedup;
pub mod fingerprint;
pub mod firehose;
pub mod flow_log;
pub mod metrics_middleware;
pub mod pipeline;
pub mod prometheus;
pub mod record;
pub mod router;
pub mod server;
pub mod sinks;
pub mod token;
pub mod webhook_endpoint;
