use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::{debug, error, instrument, warn, Instrument, Span};

use crate::api::{CatcherError, WebhookResponse};
use crate::firehose::{WebhookBatch, ACCESS_KEY_HEADER, REQUEST_ID_HEADER};
use crate::pipeline::process_batch;
use crate::router;
use crate::token::verify_access_key;

/// Firehose HTTP endpoint delivery for VPC flow logs.
///
/// Authenticates before looking at the body. Any error makes Firehose
/// redeliver the whole batch, records published before the failure are
/// then dropped by the dedup store. The batch keeps running to completion
/// if the request is dropped.
#[instrument(
    skip_all,
    fields(
        request_id,
        batch_size,
    )
)]
pub async fn vpc_flow_logs(
    state: State<router::State>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, CatcherError> {
    let provided = headers
        .get(ACCESS_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(err) = verify_access_key(&state.access_key, provided) {
        warn!("rejected webhook delivery with a missing or invalid access key");
        return Err(err);
    }

    let batch = WebhookBatch::from_bytes(&body)?;

    let request_id = batch.request_id.clone().or_else(|| {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    });
    if let Some(request_id) = &request_id {
        Span::current().record("request_id", request_id.as_str());
    }
    Span::current().record("batch_size", batch.records.len());

    // Claim and publish run detached from the request: a client hanging up
    // mid-batch must not leave a record claimed but never published.
    let dedup = state.dedup.clone();
    let sink = state.sink.clone();
    let records = batch.records;
    let task = state.tasks.spawn(
        async move { process_batch(dedup.as_ref(), sink.as_ref(), &records).await }
            .in_current_span(),
    );
    let summary = match task.await {
        Ok(result) => result?,
        Err(err) => {
            error!("webhook batch task failed: {}", err);
            return Err(CatcherError::RetryableSinkError);
        }
    };
    debug!(
        published = summary.published,
        deduplicated = summary.deduplicated,
        "processed webhook batch"
    );

    Ok(Json(WebhookResponse::success()))
}
