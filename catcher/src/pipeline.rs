use metrics::{counter, histogram};
use tracing::{debug, error, warn};

use crate::api::CatcherError;
use crate::dedup::{Claim, DedupStore};
use crate::firehose::RawRecord;
use crate::flow_log::ProcessedRecord;
use crate::prometheus::report_dropped_records;
use crate::record::decode_and_parse;
use crate::sinks::RecordSink;

/// What happened to the records of one delivered batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub published: usize,
    pub deduplicated: usize,
}

/// Decodes every record of the batch up front. Nothing is claimed or
/// published if a single record is rejected.
pub fn prepare_batch(records: &[RawRecord]) -> Result<Vec<ProcessedRecord>, CatcherError> {
    records
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let record = decode_and_parse(raw).map_err(|source| {
                report_dropped_records("invalid_record", 1);
                CatcherError::InvalidRecord { index, source }
            })?;
            ProcessedRecord::new(record).map_err(|e| {
                error!("failed to serialize flow log record {}: {}", index, e);
                CatcherError::NonRetryableSinkError
            })
        })
        .collect()
}

/// Runs a delivered batch through claim and publish, in record order.
///
/// A record is published only by the request that claimed its fingerprint
/// first. When publishing fails the claim is released so the redelivered
/// batch can publish it, and the whole request fails.
pub async fn process_batch(
    dedup: &(dyn DedupStore + Send + Sync),
    sink: &(dyn RecordSink + Send + Sync),
    records: &[RawRecord],
) -> Result<BatchSummary, CatcherError> {
    counter!("catcher_records_received_total").increment(records.len() as u64);
    histogram!("catcher_webhook_batch_size").record(records.len() as f64);

    let processed = prepare_batch(records)?;
    let mut summary = BatchSummary {
        received: processed.len(),
        ..Default::default()
    };

    for record in &processed {
        match dedup.claim(&record.key).await {
            Ok(Claim::FirstSeen) => {}
            Ok(Claim::AlreadySeen) => {
                debug!(key = %record.key, "dropping duplicate record");
                counter!("catcher_records_deduplicated_total").increment(1);
                summary.deduplicated += 1;
                continue;
            }
            Err(err) => {
                error!("failed to claim record fingerprint: {}", err);
                return Err(CatcherError::DedupStoreUnavailable(err));
            }
        }

        if let Err(err) = sink.send(record).await {
            warn!(key = %record.key, "failed to publish record, releasing claim: {}", err);
            if let Err(release_err) = dedup.release(&record.key).await {
                counter!("catcher_dedup_release_failures_total").increment(1);
                error!(
                    key = %record.key,
                    "failed to release claim, record will be treated as a duplicate: {}",
                    release_err
                );
            }
            return Err(err);
        }
        summary.published += 1;
    }

    Ok(summary)
}
