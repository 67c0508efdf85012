use serde::{Deserialize, Serialize};

use crate::api::CatcherError;

/// Header carrying the shared secret configured on the Firehose delivery stream.
pub const ACCESS_KEY_HEADER: &str = "x-amz-firehose-access-key";
/// Header Firehose sets to the same value as the body `requestId`.
pub const REQUEST_ID_HEADER: &str = "x-amz-firehose-request-id";

/// One record of a Firehose HTTP endpoint delivery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawRecord {
    pub data: String,
}

/// Request body of a Firehose HTTP endpoint delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBatch {
    pub request_id: Option<String>,
    pub timestamp: Option<i64>,
    pub records: Vec<RawRecord>,
}

// `records` must be present, an empty list is a valid batch
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBatch {
    request_id: Option<String>,
    timestamp: Option<i64>,
    records: Option<Vec<RawRecord>>,
}

impl WebhookBatch {
    pub fn from_bytes(body: &[u8]) -> Result<WebhookBatch, CatcherError> {
        let raw: RawBatch = serde_json::from_slice(body).map_err(|e| {
            tracing::debug!("failed to parse webhook body: {}", e);
            CatcherError::InvalidBatch(e.to_string())
        })?;

        let records = raw
            .records
            .ok_or_else(|| CatcherError::InvalidBatch("missing field `records`".to_string()))?;

        Ok(WebhookBatch {
            request_id: raw.request_id,
            timestamp: raw.timestamp,
            records,
        })
    }
}
