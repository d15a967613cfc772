//! Typed model of the uploaded scan payload.
//!
//! The parser is deliberately tolerant: optional fields may be absent or
//! null, collections default to empty, and unknown top-level fields are
//! ignored. Anything stricter belongs in validation, not here.

use serde::{Deserialize, Deserializer};

#[derive(Debug)]
pub struct ParseError(serde_json::Error);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scan payload parse error: {}", self.0)
    }
}

/// Parse a decoded JSON string into [`ScanData`]. Parse errors are
/// permanent; a payload that does not parse will never parse.
pub fn parse(json: &str) -> Result<ScanData, ParseError> {
    serde_json::from_str(json).map_err(ParseError)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanData {
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub os_name: Option<String>,
    #[serde(default)]
    pub sdk_int: Option<String>,
    #[serde(default)]
    pub app_name_version: Option<String>,
    #[serde(default)]
    pub data_version: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub wifi_connected_events: Vec<ConnectedEvent>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub scan_results: Vec<ScanResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedEvent {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub is_captive: Option<bool>,
    #[serde(default)]
    pub wifi_connected_info: Option<WifiConnectedInfo>,
    #[serde(default)]
    pub location: Option<LocationData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiConnectedInfo {
    #[serde(default)]
    pub bssid: Option<String>,
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub rssi: Option<i64>,
    #[serde(default)]
    pub frequency: Option<i64>,
    #[serde(default)]
    pub link_speed: Option<i64>,
    #[serde(default)]
    pub channel_width: Option<i64>,
    #[serde(default)]
    pub center_freq0: Option<i64>,
    #[serde(default)]
    pub center_freq1: Option<i64>,
    #[serde(default)]
    pub capabilities: Option<String>,
    #[serde(default, rename = "is80211mcResponder")]
    pub is_80211mc_responder: Option<bool>,
    #[serde(default)]
    pub is_passpoint_network: Option<bool>,
    #[serde(default)]
    pub operator_friendly_name: Option<String>,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub num_of_scan_results: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub location: Option<LocationData>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub results: Vec<ScanEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEntry {
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub bssid: Option<String>,
    #[serde(default)]
    pub scantime: Option<i64>,
    #[serde(default)]
    pub rssi: Option<i64>,
    #[serde(default)]
    pub frequency: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationData {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub bearing: Option<f64>,
}

/// JSON null and JSON absence both mean "no elements".
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
