//! Synchronous HTTP front door. Accepts a scan payload directly,
//! bypassing the queue and object store, and feeds the same publisher.

use axum::{
    body::Bytes as AxumBytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decode::gunzip;
use crate::publish::Batcher;
use crate::scan::parse;
use crate::transform::Transformer;

#[derive(Clone)]
pub struct HttpState {
    pub transformer: Arc<Transformer>,
    pub batcher: Arc<Batcher>,
}

#[derive(Debug, serde::Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub records: usize,
    pub dropped: usize,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/v1/scans", post(handle_scans))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

async fn handle_scans(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: AxumBytes,
) -> Result<Json<IngestResponse>, (StatusCode, String)> {
    let is_gzipped = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    debug!(body_size = body.len(), is_gzipped, "handling scan request");

    let body = if is_gzipped {
        gunzip(&body).map_err(|e| {
            warn!(error = %e, "request decompression failed");
            (StatusCode::BAD_REQUEST, format!("decompress error: {e}"))
        })?
    } else {
        body.to_vec()
    };

    let json = String::from_utf8(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("utf-8 error: {e}")))?;
    let scan = parse(&json).map_err(|e| {
        warn!(error = %e, "request parse failed");
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;

    let candidates = scan.wifi_connected_events.len()
        + scan
            .scan_results
            .iter()
            .map(|result| result.results.len())
            .sum::<usize>();

    let batch_id = Uuid::new_v4().to_string();
    let records = state.transformer.transform(&scan, &batch_id);
    let emitted = records.len();
    for record in &records {
        state.batcher.publish(record).await;
    }
    state.batcher.flush().await;

    info!(records = emitted, dropped = candidates - emitted, "scan request complete");
    Ok(Json(IngestResponse {
        status: "ok",
        records: emitted,
        dropped: candidates - emitted,
    }))
}
