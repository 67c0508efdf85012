use std::net::SocketAddr;
use std::time::Duration;

use envconfig::Envconfig;
use health::HealthStrategy;
use tracing::Level;

#[derive(Debug, PartialEq, Clone)]
pub enum DedupBackend {
    Redis,
    Memory,
}

impl std::str::FromStr for DedupBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "redis" => Ok(DedupBackend::Redis),
            "memory" => Ok(DedupBackend::Memory),
            _ => Err(format!("Unknown dedup backend: {s}, must be redis or memory")),
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:8080")]
    pub address: SocketAddr,

    // Must match the access key configured on the Firehose delivery stream
    #[envconfig(from = "CATCHER_HTTP_WEBHOOK_TOKEN")]
    pub webhook_token: String,

    #[envconfig(default = "4194304")]
    pub max_body_size_bytes: usize,

    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(nested = true)]
    pub dedup: DedupConfig,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    pub otel_url: Option<String>,

    #[envconfig(default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(default = "catcher")]
    pub otel_service_name: String,

    #[envconfig(default = "info")]
    pub log_level: Level,

    #[envconfig(default = "ALL")]
    pub healthcheck_strategy: HealthStrategy,
}

#[derive(Envconfig, Clone)]
pub struct DedupConfig {
    #[envconfig(default = "redis")]
    pub dedup_backend: DedupBackend,
    #[envconfig(default = "redis://localhost:6379/")]
    pub redis_url: String,
    #[envconfig(default = "vpc_flow_log:")]
    pub redis_key_prefix: String,
    #[envconfig(default = "1000")]
    pub redis_response_timeout_ms: u64, // 0 disables the timeout
    #[envconfig(default = "0")]
    pub dedup_ttl_seconds: u64, // 0 keeps entries until an operator clears the store
}

impl DedupConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.dedup_ttl_seconds > 0).then(|| Duration::from_secs(self.dedup_ttl_seconds))
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        (self.redis_response_timeout_ms > 0)
            .then(|| Duration::from_millis(self.redis_response_timeout_ms))
    }
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic
    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes
    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds
    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd
    #[envconfig(default = "all")]
    pub kafka_producer_acks: String,
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,
    #[envconfig(default = "logs")]
    pub kafka_topic: String,
    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup_config(ttl: u64, timeout_ms: u64) -> DedupConfig {
        DedupConfig {
            dedup_backend: DedupBackend::Redis,
            redis_url: "redis://localhost:6379/".to_string(),
            redis_key_prefix: "vpc_flow_log:".to_string(),
            redis_response_timeout_ms: timeout_ms,
            dedup_ttl_seconds: ttl,
        }
    }

    #[test]
    fn zero_ttl_means_no_expiry() {
        assert_eq!(dedup_config(0, 0).ttl(), None);
        assert_eq!(
            dedup_config(3600, 0).ttl(),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn zero_timeout_disables_it() {
        assert_eq!(dedup_config(0, 0).response_timeout(), None);
        assert_eq!(
            dedup_config(0, 250).response_timeout(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn dedup_backend_from_str() {
        assert_eq!("redis".parse::<DedupBackend>(), Ok(DedupBackend::Redis));
        assert_eq!(" MEMORY ".parse::<DedupBackend>(), Ok(DedupBackend::Memory));
        assert!("memcached".parse::<DedupBackend>().is_err());
    }
}
