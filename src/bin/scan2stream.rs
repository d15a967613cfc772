//! scan2stream service entry point.
//!
//! Wires the queue-driven ingest loop and the optional HTTP front door
//! to a shared publisher, and owns the process exit codes: 0 clean
//! shutdown, 1 configuration error, 2 dependency failure at startup.

use clap::Parser;
use scan2stream::config::Config;
use scan2stream::http::{build_router, HttpState};
use scan2stream::ingest::IngestLoop;
use scan2stream::metrics::Counters;
use scan2stream::pipeline::Pipeline;
use scan2stream::publish::{BatchLimits, Batcher, FirehoseSender, LoggingDeadLetter};
use scan2stream::store::S3Store;
use scan2stream::transform::Transformer;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "scan2stream")]
#[command(about = "WiFi-scan ingestion worker for Kinesis Firehose")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = scan2stream::config::CONFIG_FILENAME)]
    config: String,

    /// Source queue URL (overrides queue.url)
    #[arg(long, env = "SCAN2STREAM_QUEUE_URL")]
    queue_url: Option<String>,

    /// Delivery stream name (overrides delivery.stream_name)
    #[arg(long, env = "SCAN2STREAM_STREAM_NAME")]
    stream_name: Option<String>,

    /// HTTP listen address for the synchronous ingest endpoint
    #[arg(long, env = "SCAN2STREAM_HTTP_ADDR")]
    http_addr: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    scan2stream::init_tracing();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "invalid configuration");
            return ExitCode::from(1);
        }
    };

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "startup dependency failure");
            ExitCode::from(2)
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = if std::path::Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };
    if let Some(queue_url) = &cli.queue_url {
        config.queue.url = Some(queue_url.clone());
        config.queue.name = None;
    }
    if let Some(stream_name) = &cli.stream_name {
        config.delivery.stream_name = stream_name.clone();
    }
    if let Some(http_addr) = &cli.http_addr {
        config.http.addr = Some(http_addr.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &config.object_store.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    if let Some(profile) = &config.object_store.profile {
        loader = loader.profile_name(profile);
    }
    let aws_config = loader.load().await;

    let mut s3_builder = aws_sdk_s3::config::Builder::from(&aws_config);
    if let Some(endpoint) = &config.object_store.endpoint {
        s3_builder = s3_builder.endpoint_url(endpoint).force_path_style(true);
    }
    let s3 = aws_sdk_s3::Client::from_conf(s3_builder.build());
    let sqs = aws_sdk_sqs::Client::new(&aws_config);
    let firehose = aws_sdk_firehose::Client::new(&aws_config);

    let queue_url = match (&config.queue.url, &config.queue.name) {
        (Some(url), _) => url.clone(),
        (None, Some(name)) => {
            let response = sqs
                .get_queue_url()
                .queue_name(name)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("failed to resolve queue {name}: {e}"))?;
            response
                .queue_url
                .ok_or_else(|| anyhow::anyhow!("queue {name} has no URL"))?
        }
        (None, None) => unreachable!("checked by Config::validate"),
    };

    let metrics = Arc::new(Counters::new());
    let dead_letter = Arc::new(LoggingDeadLetter::new(metrics.clone()));
    let sender = Arc::new(FirehoseSender::new(
        firehose,
        config.delivery.stream_name.clone(),
        config.delivery.max_attempts,
        dead_letter,
        metrics.clone(),
    ));
    let batcher = Batcher::new(
        BatchLimits {
            max_batch_count: config.delivery.max_batch_size,
            max_batch_bytes: config.delivery.max_batch_size_bytes,
            max_record_bytes: config.delivery.max_record_size_bytes,
        },
        sender,
        config.delivery.max_in_flight_batches,
        metrics.clone(),
    );
    let linger = batcher.start_linger(Duration::from_millis(config.delivery.max_linger_ms));

    let transformer = Arc::new(Transformer::new(config.filter.clone(), metrics.clone()));
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(S3Store::new(s3)),
        transformer.clone(),
        batcher.clone(),
        metrics.clone(),
    ));

    if let Some(addr) = &config.http.addr {
        let router = build_router(HttpState {
            transformer: transformer.clone(),
            batcher: batcher.clone(),
        });
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind http listener on {addr}: {e}"))?;
        info!(%addr, "http front door listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "http server terminated");
            }
        });
    }

    let ingest = Arc::new(IngestLoop::new(
        sqs,
        queue_url,
        config.queue.clone(),
        config.workers.clone(),
        config.shutdown.clone(),
        pipeline,
        batcher.clone(),
        metrics.clone(),
    ));
    ingest.run().await;

    linger.abort();
    info!(counters = ?metrics.snapshot(), "final counters");
    Ok(())
}
