#![allow(dead_code)] // Test helpers appear unused when compiled independently

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use scan2stream::publish::{DeliveryOutcome, DeliverySender};
use scan2stream::store::{FetchError, ObjectStore};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// The mixed payload from the happy-path scenario: two connected events
/// plus one scan snapshot with four entries.
pub fn mixed_scan_json(now: i64) -> String {
    format!(
        r#"{{
            "manufacturer": "Google",
            "model": "Pixel 8",
            "device": "shiba",
            "osVersion": "14",
            "appNameVersion": "collector/2.1",
            "dataVersion": "3",
            "wifiConnectedEvents": [
                {{
                    "timestamp": {now},
                    "eventId": "evt-1",
                    "eventType": "CONNECTED",
                    "isCaptive": false,
                    "wifiConnectedInfo": {{
                        "bssid": "B8:F8:53:C0:1E:FF",
                        "ssid": "cafe",
                        "rssi": -58,
                        "linkSpeed": 433,
                        "frequency": 5180
                    }},
                    "location": {{"latitude": 52.1, "longitude": 4.9, "accuracy": 10.0}}
                }},
                {{
                    "timestamp": {now},
                    "eventId": "evt-2",
                    "eventType": "CONNECTED",
                    "wifiConnectedInfo": {{
                        "bssid": "AA:BB:CC:DD:EE:FF",
                        "ssid": "office",
                        "rssi": -45,
                        "linkSpeed": 866,
                        "frequency": 5745
                    }},
                    "location": {{"latitude": 52.1, "longitude": 4.9, "accuracy": 10.0}}
                }}
            ],
            "scanResults": [
                {{
                    "timestamp": {now},
                    "location": {{"latitude": 52.1, "longitude": 4.9, "accuracy": 10.0}},
                    "results": [
                        {{"ssid": "cafe", "bssid": "b8:f8:53:c0:1e:ff", "scantime": {now}, "rssi": -58}},
                        {{"ssid": "office", "bssid": "aa:bb:cc:dd:ee:ff", "scantime": {now}, "rssi": -45}},
                        {{"ssid": "guest", "bssid": "11:22:33:44:55:66", "scantime": {now}, "rssi": -72}},
                        {{"ssid": "far", "bssid": "99:88:77:66:55:44", "scantime": {now}, "rssi": -85}}
                    ]
                }}
            ]
        }}"#
    )
}

/// Encode a JSON payload the way producers upload it:
/// base64(gzip(utf8)).
pub fn encode_payload(json: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes()).unwrap();
    STANDARD.encode(encoder.finish().unwrap()).into_bytes()
}

/// Delivery sender that records every batch it receives.
pub struct RecordingSender {
    batches: Mutex<Vec<Vec<Bytes>>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
        })
    }

    pub async fn batches(&self) -> Vec<Vec<Bytes>> {
        self.batches.lock().await.clone()
    }

    /// All recorded records, in emission order, parsed back to JSON.
    pub async fn records(&self) -> Vec<serde_json::Value> {
        self.batches()
            .await
            .concat()
            .iter()
            .map(|line| serde_json::from_slice(&line[..line.len() - 1]).unwrap())
            .collect()
    }
}

#[async_trait::async_trait]
impl DeliverySender for RecordingSender {
    async fn deliver(&self, batch: Vec<Bytes>) -> DeliveryOutcome {
        let delivered = batch.len();
        self.batches.lock().await.push(batch);
        DeliveryOutcome {
            delivered,
            failed: 0,
        }
    }
}

/// Canned object-store responses keyed by object key.
#[derive(Clone)]
pub enum MockObject {
    Bytes(Vec<u8>),
    NotFound,
    Transient,
}

pub struct MockStore {
    objects: HashMap<String, MockObject>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, object: MockObject) -> Self {
        self.objects.insert(key.to_string(), object);
        self
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockStore {
    async fn get(&self, _bucket: &str, key: &str) -> Result<Bytes, FetchError> {
        match self.objects.get(key) {
            Some(MockObject::Bytes(bytes)) => Ok(Bytes::from(bytes.clone())),
            Some(MockObject::NotFound) | None => {
                Err(FetchError::NotFound(format!("no such key: {key}")))
            }
            Some(MockObject::Transient) => {
                Err(FetchError::Transient("connection reset".to_string()))
            }
        }
    }
}

/// Find an available TCP port
pub async fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Best-effort check for whether binding to loopback is permitted in the current sandbox.
pub async fn can_bind_loopback() -> bool {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => false,
        Err(_) => true, // treat other errors as non-fatal for skipping
    }
}

/// Let spawned delivery tasks drain.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
