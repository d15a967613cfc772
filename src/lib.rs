// src/lib.rs

pub mod config;
pub mod decode;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod publish;
pub mod scan;
pub mod schema;
pub mod store;
pub mod transform;
pub mod validate;

// Re-export tracing for use in other modules
pub use tracing;

pub use config::Config;
pub use decode::{decode, DecodeError};
pub use http::{build_router, HttpState};
pub use ingest::notification::{parse_notification, ObjectRef};
pub use ingest::IngestLoop;
pub use metrics::{CounterSink, Counters};
pub use pipeline::{Outcome, Pipeline};
pub use publish::{
    BatchLimits, BatchStatus, Batcher, DeadLetterSink, DeliveryOutcome, DeliverySender,
    ErrorClass, FirehoseSender, LoggingDeadLetter,
};
pub use scan::{parse, ScanData};
pub use schema::{ConnectionStatus, Measurement};
pub use store::{FetchError, ObjectStore, S3Store};
pub use transform::Transformer;
pub use validate::{HotspotCheck, Validator};

/// Initialize tracing subscriber for the binary and tests.
/// Uses RUST_LOG env var for filtering (defaults to info).
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true))
        .with(filter)
        .init();
}
