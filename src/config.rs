//! Service configuration: TOML file with serde defaults, merged with
//! CLI/environment overrides in the binary.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "scan2stream.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub workers: WorkersConfig,
    pub object_store: ObjectStoreConfig,
    pub delivery: DeliveryConfig,
    pub filter: FilterConfig,
    pub shutdown: ShutdownConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Full queue URL. Exactly one of `url`/`name` must be set.
    pub url: Option<String>,
    /// Queue name, resolved to a URL at startup.
    pub name: Option<String>,
    pub poll_wait_seconds: i32,
    pub batch_size: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: None,
            name: None,
            poll_wait_seconds: 20,
            batch_size: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub concurrency: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Named credentials profile; the default AWS provider chain is
    /// used when unset.
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub stream_name: String,
    /// Hard caps mirroring the Firehose PutRecordBatch limits.
    pub max_batch_size: usize,
    pub max_batch_size_bytes: usize,
    pub max_record_size_bytes: usize,
    pub max_linger_ms: u64,
    pub max_in_flight_batches: usize,
    pub max_attempts: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            max_batch_size: 500,
            max_batch_size_bytes: 4_000_000,
            max_record_size_bytes: 1_000_000,
            max_linger_ms: 200,
            max_in_flight_batches: 8,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_rssi: i64,
    pub max_rssi: i64,
    /// Meters. Accuracy equal to the threshold is accepted.
    pub max_location_accuracy: f64,
    pub connected_quality_weight: f64,
    pub scan_quality_weight: f64,
    pub low_link_speed_quality_weight: f64,
    pub mobile_hotspot: MobileHotspotConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_rssi: -100,
            max_rssi: 0,
            max_location_accuracy: 150.0,
            connected_quality_weight: 2.0,
            scan_quality_weight: 1.0,
            low_link_speed_quality_weight: 0.5,
            mobile_hotspot: MobileHotspotConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MobileHotspotConfig {
    pub enabled: bool,
    /// Uppercase `XX:XX:XX` OUI prefixes.
    pub oui_blacklist: HashSet<String>,
    pub action: HotspotAction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HotspotAction {
    #[default]
    Exclude,
    Flag,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub grace_period_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address for the synchronous ingest endpoint, e.g.
    /// `127.0.0.1:4319`. The HTTP front door is disabled when unset.
    pub addr: Option<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.as_ref().display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.queue.url, &self.queue.name) {
            (None, None) => anyhow::bail!("one of queue.url or queue.name must be set"),
            (Some(_), Some(_)) => {
                anyhow::bail!("queue.url and queue.name are mutually exclusive")
            }
            _ => {}
        }
        if self.delivery.stream_name.is_empty() {
            anyhow::bail!("delivery.stream_name is required");
        }
        if !(1..=10).contains(&self.queue.batch_size) {
            anyhow::bail!("queue.batch_size must be between 1 and 10");
        }
        if self.delivery.max_record_size_bytes > self.delivery.max_batch_size_bytes {
            anyhow::bail!(
                "delivery.max_record_size_bytes exceeds delivery.max_batch_size_bytes"
            );
        }
        if self.workers.concurrency == 0 {
            anyhow::bail!("workers.concurrency must be at least 1");
        }
        if self.delivery.max_in_flight_batches == 0 {
            anyhow::bail!("delivery.max_in_flight_batches must be at least 1");
        }
        if self.filter.min_rssi > self.filter.max_rssi {
            anyhow::bail!("filter.min_rssi exceeds filter.max_rssi");
        }
        Ok(())
    }
}
