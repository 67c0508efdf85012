use async_trait::async_trait;

use crate::api::CatcherError;
use crate::flow_log::ProcessedRecord;

pub mod kafka;
pub mod print;

/// Outbound side of the catcher: hands one unique record to the durable queue.
///
/// `send` must only return `Ok` once the broker acknowledged the write,
/// the record's dedup claim is kept from that point on.
#[async_trait]
pub trait RecordSink {
    async fn send(&self, record: &ProcessedRecord) -> Result<(), CatcherError>;

    /// Blocks until buffered records are written out. Called once on shutdown.
    fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
