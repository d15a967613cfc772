// tests/pipeline_flow.rs
//
// Pipeline-level dispositions: happy path through to recorded batches,
// permanent payload errors, and fetch failures.

mod helpers;

use base64::{engine::general_purpose::STANDARD, Engine};
use helpers::{encode_payload, mixed_scan_json, now_ms, settle, MockObject, MockStore, RecordingSender};
use scan2stream::config::FilterConfig;
use scan2stream::ingest::notification::ObjectRef;
use scan2stream::metrics::Counters;
use scan2stream::pipeline::{Outcome, Pipeline};
use scan2stream::publish::{BatchLimits, Batcher};
use scan2stream::transform::Transformer;
use std::sync::Arc;

struct Fixture {
    pipeline: Pipeline,
    sender: Arc<RecordingSender>,
    counters: Arc<Counters>,
}

fn fixture(store: MockStore) -> Fixture {
    let counters = Arc::new(Counters::new());
    let sender = RecordingSender::new();
    let batcher = Batcher::new(
        BatchLimits::default(),
        sender.clone(),
        8,
        counters.clone(),
    );
    let transformer = Arc::new(Transformer::new(FilterConfig::default(), counters.clone()));
    let pipeline = Pipeline::new(Arc::new(store), transformer, batcher, counters.clone());
    Fixture {
        pipeline,
        sender,
        counters,
    }
}

fn object(key: &str) -> ObjectRef {
    ObjectRef {
        bucket: "scans".to_string(),
        key: key.to_string(),
        size: None,
        etag: None,
    }
}

#[tokio::test]
async fn happy_path_publishes_measurements() {
    let payload = encode_payload(&mixed_scan_json(now_ms()));
    let fx = fixture(MockStore::new().with("scan-1.gz", MockObject::Bytes(payload)));

    let outcome = fx.pipeline.process(&object("scan-1.gz")).await;
    settle().await;

    assert_eq!(outcome, Outcome::Ok);
    let records = fx.sender.records().await;
    assert_eq!(records.len(), 6);
    assert!(records
        .iter()
        .all(|r| r["processing_batch_id"].is_string()));
    // NDJSON framing: every line ends with a newline.
    for batch in fx.sender.batches().await {
        for line in batch {
            assert_eq!(line[line.len() - 1], b'\n');
        }
    }
}

#[tokio::test]
async fn valid_base64_invalid_gzip_is_dropped() {
    let not_gzip = STANDARD.encode(b"this is not a gzip stream").into_bytes();
    let fx = fixture(MockStore::new().with("corrupt.gz", MockObject::Bytes(not_gzip)));

    let outcome = fx.pipeline.process(&object("corrupt.gz")).await;
    settle().await;

    assert_eq!(outcome, Outcome::Drop);
    assert!(fx.sender.batches().await.is_empty());
    assert_eq!(fx.counters.get("payload_decode_error"), 1);
}

#[tokio::test]
async fn unparseable_json_is_dropped() {
    let payload = encode_payload("{this is not json");
    let fx = fixture(MockStore::new().with("bad.gz", MockObject::Bytes(payload)));

    let outcome = fx.pipeline.process(&object("bad.gz")).await;

    assert_eq!(outcome, Outcome::Drop);
    assert_eq!(fx.counters.get("payload_parse_error"), 1);
}

#[tokio::test]
async fn missing_object_is_dropped() {
    let fx = fixture(MockStore::new());

    let outcome = fx.pipeline.process(&object("gone.gz")).await;

    assert_eq!(outcome, Outcome::Drop);
    assert_eq!(fx.counters.get("fetch_permanent_error"), 1);
}

#[tokio::test]
async fn transient_fetch_failure_is_retriable() {
    let fx = fixture(MockStore::new().with("flaky.gz", MockObject::Transient));

    let outcome = fx.pipeline.process(&object("flaky.gz")).await;

    assert_eq!(outcome, Outcome::Retriable);
    assert_eq!(fx.counters.get("fetch_transient_error"), 1);
    assert!(fx.sender.batches().await.is_empty());
}

#[tokio::test]
async fn empty_payload_yields_ok_with_no_records() {
    let payload = encode_payload("{}");
    let fx = fixture(MockStore::new().with("empty.gz", MockObject::Bytes(payload)));

    let outcome = fx.pipeline.process(&object("empty.gz")).await;
    settle().await;

    assert_eq!(outcome, Outcome::Ok);
    assert!(fx.sender.batches().await.is_empty());
}
