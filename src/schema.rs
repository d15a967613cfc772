//! The flat measurement record the pipeline emits.
//!
//! One JSON object per line, snake_case keys, timestamps as integer
//! epoch-milliseconds and `ingestion_timestamp` as an RFC-3339 string.
//! Absent optional values serialize as null.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    Scan,
}

#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    // identity
    pub bssid: String,
    pub measurement_timestamp: i64,
    pub event_id: String,
    // device
    pub device_id: String,
    pub device_model: Option<String>,
    pub device_manufacturer: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    // location
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub location_accuracy: Option<f64>,
    pub location_timestamp: Option<i64>,
    pub location_provider: Option<String>,
    pub location_source: Option<String>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    // signal
    pub ssid: Option<String>,
    pub rssi: i64,
    pub frequency: Option<i64>,
    pub scan_timestamp: Option<i64>,
    // status
    pub connection_status: ConnectionStatus,
    pub quality_weight: f64,
    // connected-only, null on SCAN rows
    pub link_speed: Option<i64>,
    pub channel_width: Option<i64>,
    pub center_freq0: Option<i64>,
    pub center_freq1: Option<i64>,
    pub capabilities: Option<String>,
    pub is_80211mc_responder: Option<bool>,
    pub is_passpoint_network: Option<bool>,
    pub operator_friendly_name: Option<String>,
    pub venue_name: Option<String>,
    pub is_captive: Option<bool>,
    pub num_scan_results: Option<i64>,
    // processing
    pub ingestion_timestamp: String,
    pub data_version: Option<String>,
    pub processing_batch_id: String,
    pub quality_score: f64,
}
