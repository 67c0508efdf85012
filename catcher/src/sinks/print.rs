use async_trait::async_trait;
use metrics::counter;
use tracing::info;

use crate::api::CatcherError;
use crate::flow_log::ProcessedRecord;
use crate::sinks::RecordSink;

pub struct PrintSink {}

#[async_trait]
impl RecordSink for PrintSink {
    async fn send(&self, record: &ProcessedRecord) -> Result<(), CatcherError> {
        info!(key = %record.key, "record: {}", record.payload);
        counter!("catcher_records_published_total").increment(1);
        Ok(())
    }
}
