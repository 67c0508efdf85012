use std::time::Duration;

use async_trait::async_trait;
use health::HealthHandle;
use metrics::{counter, gauge};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tracing::{debug, error, info, info_span, instrument, Instrument};

use crate::api::CatcherError;
use crate::config::KafkaConfig;
use crate::flow_log::ProcessedRecord;
use crate::prometheus::report_dropped_records;
use crate::sinks::RecordSink;

struct KafkaContext {
    liveness: HealthHandle,
}

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        // Stats callbacks only fire while the librdkafka main loop is running
        self.liveness.report_healthy();

        gauge!("catcher_kafka_callback_queue_depth").set(stats.replyq as f64);
        gauge!("catcher_kafka_producer_queue_depth").set(stats.msg_cnt as f64);
        gauge!("catcher_kafka_producer_queue_depth_limit").set(stats.msg_max as f64);
        gauge!("catcher_kafka_producer_queue_bytes").set(stats.msg_size as f64);
        gauge!("catcher_kafka_producer_queue_bytes_limit").set(stats.msg_size_max as f64);

        for (_, stats) in stats.brokers {
            let id_string = format!("{}", stats.nodeid);
            gauge!(
                "catcher_kafka_broker_requests_pending",
                "broker" => id_string.clone()
            )
            .set(stats.outbuf_cnt as f64);
            gauge!(
                "catcher_kafka_broker_responses_awaiting",
                "broker" => id_string.clone()
            )
            .set(stats.waitresp_cnt as f64);
            counter!(
                "catcher_kafka_broker_tx_errors_total",
                "broker" => id_string.clone()
            )
            .absolute(stats.txerrs);
            counter!(
                "catcher_kafka_broker_rx_errors_total",
                "broker" => id_string
            )
            .absolute(stats.rxerrs);
        }
    }
}

#[derive(Clone)]
pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaSink {
    pub fn new(config: KafkaConfig, liveness: HealthHandle) -> anyhow::Result<KafkaSink> {
        info!("connecting to Kafka brokers at {}...", config.kafka_hosts);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .set("compression.codec", &config.kafka_compression_codec)
            .set("acks", &config.kafka_producer_acks)
            .set(
                "queue.buffering.max.kbytes",
                (config.kafka_producer_queue_mib * 1024).to_string(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> =
            client_config.create_with_context(KafkaContext { liveness })?;

        // Ping the cluster to make sure we can reach brokers, fail after 10 seconds
        producer.client().fetch_metadata(
            Some("__consumer_offsets"),
            Timeout::After(Duration::new(10, 0)),
        )?;
        info!(topic = config.kafka_topic, "connected to Kafka brokers");

        Ok(KafkaSink {
            producer,
            topic: config.kafka_topic,
        })
    }

    fn kafka_send(&self, record: &ProcessedRecord) -> Result<DeliveryFuture, CatcherError> {
        // Keyed by fingerprint so redelivered duplicates share a partition
        match self.producer.send_result(
            FutureRecord::to(self.topic.as_str())
                .payload(record.payload.as_str())
                .key(record.key.as_str()),
        ) {
            Ok(ack) => Ok(ack),
            Err((e, _)) => match e.rdkafka_error_code() {
                Some(RDKafkaErrorCode::MessageSizeTooLarge) => {
                    report_dropped_records("kafka_message_size", 1);
                    Err(CatcherError::NonRetryableSinkError)
                }
                _ => {
                    report_dropped_records("kafka_write_error", 1);
                    error!("failed to produce record: {}", e);
                    Err(CatcherError::RetryableSinkError)
                }
            },
        }
    }

    async fn process_ack(delivery: DeliveryFuture) -> Result<(), CatcherError> {
        match delivery.await {
            Err(_) => {
                // Cancelled due to timeout while retrying
                counter!("catcher_kafka_produce_errors_total").increment(1);
                error!("failed to produce to Kafka before write timeout");
                Err(CatcherError::RetryableSinkError)
            }
            Ok(Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge), _))) => {
                report_dropped_records("kafka_message_size", 1);
                Err(CatcherError::NonRetryableSinkError)
            }
            Ok(Err((err, _))) => {
                counter!("catcher_kafka_produce_errors_total").increment(1);
                error!("failed to produce to Kafka: {}", err);
                Err(CatcherError::RetryableSinkError)
            }
            Ok(Ok(_)) => {
                counter!("catcher_records_published_total").increment(1);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RecordSink for KafkaSink {
    #[instrument(skip_all, fields(key = %record.key))]
    async fn send(&self, record: &ProcessedRecord) -> Result<(), CatcherError> {
        let ack = self.kafka_send(record)?;
        Self::process_ack(ack).instrument(info_span!("ack_wait")).await
    }

    fn flush(&self) -> anyhow::Result<()> {
        self.producer.flush(Duration::new(30, 0))?;
        Ok(())
    }
}
