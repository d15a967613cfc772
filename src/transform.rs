//! Flattens a parsed scan payload into measurement records.
//!
//! Connected events and scan-result entries each become at most one
//! record; a record that fails any validation step is dropped without
//! affecting its siblings. Order within each source collection is
//! preserved.

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use crate::config::{FilterConfig, HotspotAction};
use crate::metrics::CounterSink;
use crate::scan::{ConnectedEvent, ScanData, ScanEntry, ScanResult};
use crate::schema::{ConnectionStatus, Measurement};
use crate::validate::{HotspotCheck, Validator};

/// Link speeds below this, paired with a strong signal, indicate a
/// congested or tethered access point.
const LOW_LINK_SPEED_MBPS: i64 = 50;
const STRONG_RSSI_DBM: i64 = -70;

pub struct Transformer {
    filter: FilterConfig,
    validator: Validator,
    metrics: Arc<dyn CounterSink>,
}

/// Per-call context shared by every record of one payload.
struct RecordContext {
    device_id: String,
    ingestion_timestamp: String,
    batch_id: String,
}

impl Transformer {
    pub fn new(filter: FilterConfig, metrics: Arc<dyn CounterSink>) -> Self {
        let validator = Validator::new(filter.clone(), metrics.clone());
        Self {
            filter,
            validator,
            metrics,
        }
    }

    /// Flatten one payload into measurements, stamped with the worker's
    /// processing batch id. `ingestion_timestamp` is computed once per
    /// call.
    pub fn transform(&self, scan: &ScanData, batch_id: &str) -> Vec<Measurement> {
        let ctx = RecordContext {
            device_id: device_id(scan),
            ingestion_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            batch_id: batch_id.to_string(),
        };

        let mut out = Vec::new();
        for event in &scan.wifi_connected_events {
            match self.connected_measurement(scan, event, &ctx) {
                Some(m) => {
                    self.metrics.incr("records_connected");
                    out.push(m);
                }
                None => self.metrics.incr("records_dropped"),
            }
        }
        for result in &scan.scan_results {
            for entry in &result.results {
                match self.scan_measurement(scan, result, entry, &ctx) {
                    Some(m) => {
                        self.metrics.incr("records_scan");
                        out.push(m);
                    }
                    None => self.metrics.incr("records_dropped"),
                }
            }
        }
        debug!(
            connected = scan.wifi_connected_events.len(),
            scan_entries = scan
                .scan_results
                .iter()
                .map(|r| r.results.len())
                .sum::<usize>(),
            emitted = out.len(),
            "payload transformed"
        );
        out
    }

    fn connected_measurement(
        &self,
        scan: &ScanData,
        event: &ConnectedEvent,
        ctx: &RecordContext,
    ) -> Option<Measurement> {
        let info = event.wifi_connected_info.as_ref()?;
        let bssid = self.validator.validate_bssid(info.bssid.as_deref())?;
        if !self.validator.validate_rssi(info.rssi) {
            return None;
        }
        if !self.validator.validate_location(event.location.as_ref()) {
            return None;
        }
        if !self.validator.validate_timestamp(event.timestamp) {
            return None;
        }
        if self.excluded_hotspot(&bssid) {
            return None;
        }

        let timestamp = event.timestamp?;
        let rssi = info.rssi?;
        let location = event.location.as_ref()?;
        let (latitude, longitude) = (location.latitude?, location.longitude?);

        let mut quality_weight = self.filter.connected_quality_weight;
        if let Some(link_speed) = info.link_speed {
            if link_speed < LOW_LINK_SPEED_MBPS && rssi > STRONG_RSSI_DBM {
                quality_weight = self.filter.low_link_speed_quality_weight;
            }
        }

        let event_id = event
            .event_id
            .clone()
            .unwrap_or_else(|| generate_event_id(timestamp, info.bssid.as_deref().unwrap_or("")));

        Some(Measurement {
            bssid,
            measurement_timestamp: timestamp,
            event_id,
            device_id: ctx.device_id.clone(),
            device_model: scan.model.clone(),
            device_manufacturer: scan.manufacturer.clone(),
            os_version: scan.os_version.clone(),
            app_version: scan.app_name_version.clone(),
            latitude,
            longitude,
            altitude: location.altitude,
            location_accuracy: location.accuracy,
            location_timestamp: location.time,
            location_provider: location.provider.clone(),
            location_source: location.source.clone(),
            speed: location.speed,
            bearing: location.bearing,
            ssid: clean_ssid(info.ssid.as_deref()),
            rssi,
            frequency: info.frequency,
            scan_timestamp: Some(timestamp),
            connection_status: ConnectionStatus::Connected,
            quality_weight,
            link_speed: info.link_speed,
            channel_width: info.channel_width,
            center_freq0: info.center_freq0,
            center_freq1: info.center_freq1,
            capabilities: info.capabilities.clone(),
            is_80211mc_responder: info.is_80211mc_responder,
            is_passpoint_network: info.is_passpoint_network,
            operator_friendly_name: info.operator_friendly_name.clone(),
            venue_name: info.venue_name.clone(),
            is_captive: event.is_captive,
            num_scan_results: info.num_of_scan_results,
            ingestion_timestamp: ctx.ingestion_timestamp.clone(),
            data_version: scan.data_version.clone(),
            processing_batch_id: ctx.batch_id.clone(),
            quality_score: quality_score(location.accuracy, Some(rssi)),
        })
    }

    fn scan_measurement(
        &self,
        scan: &ScanData,
        result: &ScanResult,
        entry: &ScanEntry,
        ctx: &RecordContext,
    ) -> Option<Measurement> {
        let bssid = self.validator.validate_bssid(entry.bssid.as_deref())?;
        if !self.validator.validate_rssi(entry.rssi) {
            return None;
        }
        if !self.validator.validate_location(result.location.as_ref()) {
            return None;
        }
        if !self.validator.validate_timestamp(result.timestamp) {
            return None;
        }
        if self.excluded_hotspot(&bssid) {
            return None;
        }

        let timestamp = result.timestamp?;
        let rssi = entry.rssi?;
        let location = result.location.as_ref()?;
        let (latitude, longitude) = (location.latitude?, location.longitude?);

        Some(Measurement {
            bssid,
            measurement_timestamp: timestamp,
            event_id: generate_event_id(timestamp, entry.bssid.as_deref().unwrap_or("")),
            device_id: ctx.device_id.clone(),
            device_model: scan.model.clone(),
            device_manufacturer: scan.manufacturer.clone(),
            os_version: scan.os_version.clone(),
            app_version: scan.app_name_version.clone(),
            latitude,
            longitude,
            altitude: location.altitude,
            location_accuracy: location.accuracy,
            location_timestamp: location.time,
            location_provider: location.provider.clone(),
            location_source: location.source.clone(),
            speed: location.speed,
            bearing: location.bearing,
            ssid: clean_ssid(entry.ssid.as_deref()),
            rssi,
            frequency: entry.frequency,
            scan_timestamp: entry.scantime,
            connection_status: ConnectionStatus::Scan,
            quality_weight: self.filter.scan_quality_weight,
            link_speed: None,
            channel_width: None,
            center_freq0: None,
            center_freq1: None,
            capabilities: None,
            is_80211mc_responder: None,
            is_passpoint_network: None,
            operator_friendly_name: None,
            venue_name: None,
            is_captive: None,
            num_scan_results: None,
            ingestion_timestamp: ctx.ingestion_timestamp.clone(),
            data_version: scan.data_version.clone(),
            processing_batch_id: ctx.batch_id.clone(),
            quality_score: quality_score(location.accuracy, Some(rssi)),
        })
    }

    fn excluded_hotspot(&self, bssid: &str) -> bool {
        match self.validator.detect_mobile_hotspot(bssid) {
            HotspotCheck::Detected {
                action: HotspotAction::Exclude,
                oui,
            } => {
                debug!(%bssid, %oui, "mobile hotspot excluded");
                self.metrics.incr("hotspot_excluded");
                true
            }
            HotspotCheck::Detected {
                action: HotspotAction::Flag,
                oui,
            } => {
                debug!(%bssid, %oui, "mobile hotspot flagged");
                self.metrics.incr("hotspot_flagged");
                false
            }
            _ => false,
        }
    }
}

/// Stable device fingerprint: SHA-256 of `manufacturer|model|device|os`,
/// with empty strings for missing components.
pub fn device_id(scan: &ScanData) -> String {
    sha256_hex(
        format!(
            "{}|{}|{}|{}",
            scan.manufacturer.as_deref().unwrap_or(""),
            scan.model.as_deref().unwrap_or(""),
            scan.device.as_deref().unwrap_or(""),
            scan.os_version.as_deref().unwrap_or(""),
        )
        .as_bytes(),
    )
}

/// Synthetic event id for scan entries. Hashes the pre-normalization
/// BSSID; a BSSID listed twice in one snapshot collides by design.
pub fn generate_event_id(timestamp: i64, bssid: &str) -> String {
    sha256_hex(format!("{}:{}", timestamp, bssid).as_bytes())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Strip NUL bytes and surrounding whitespace; empty SSIDs become null.
fn clean_ssid(raw: Option<&str>) -> Option<String> {
    let cleaned = raw?.replace('\u{0}', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn quality_score(accuracy: Option<f64>, rssi: Option<i64>) -> f64 {
    let mut score = 0.5;
    if let Some(accuracy) = accuracy {
        score += 0.3 * (1.0 - accuracy / 100.0).max(0.0);
    }
    if let Some(rssi) = rssi {
        score += 0.2 * ((rssi as f64 + 100.0) / 100.0).max(0.0);
    }
    score.clamp(0.5, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Counters;
    use crate::scan::{LocationData, WifiConnectedInfo};

    fn transformer() -> Transformer {
        Transformer::new(FilterConfig::default(), Arc::new(Counters::new()))
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn location() -> LocationData {
        LocationData {
            latitude: Some(52.1),
            longitude: Some(4.9),
            accuracy: Some(10.0),
            ..LocationData::default()
        }
    }

    fn connected_event(bssid: &str, rssi: i64) -> ConnectedEvent {
        ConnectedEvent {
            timestamp: Some(now_ms()),
            event_id: Some(format!("evt-{}", bssid)),
            event_type: Some("CONNECTED".into()),
            is_captive: Some(false),
            wifi_connected_info: Some(WifiConnectedInfo {
                bssid: Some(bssid.into()),
                ssid: Some("cafe".into()),
                rssi: Some(rssi),
                link_speed: Some(433),
                frequency: Some(5180),
                ..WifiConnectedInfo::default()
            }),
            location: Some(location()),
        }
    }

    fn scan_snapshot(entries: &[(&str, i64)]) -> ScanResult {
        ScanResult {
            timestamp: Some(now_ms()),
            location: Some(location()),
            results: entries
                .iter()
                .map(|(bssid, rssi)| ScanEntry {
                    ssid: Some("net".into()),
                    bssid: Some((*bssid).into()),
                    scantime: Some(now_ms()),
                    rssi: Some(*rssi),
                    frequency: Some(2412),
                })
                .collect(),
        }
    }

    #[test]
    fn connected_event_produces_connected_record() {
        let scan = ScanData {
            manufacturer: Some("Google".into()),
            model: Some("Pixel 8".into()),
            wifi_connected_events: vec![connected_event("B8-F8-53-C0-1E-FF", -58)],
            ..ScanData::default()
        };
        let records = transformer().transform(&scan, "batch-1");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.bssid, "b8:f8:53:c0:1e:ff");
        assert_eq!(record.connection_status, ConnectionStatus::Connected);
        assert_eq!(record.quality_weight, 2.0);
        assert_eq!(record.link_speed, Some(433));
        assert_eq!(record.processing_batch_id, "batch-1");
    }

    #[test]
    fn scan_entries_produce_scan_records_in_order() {
        let scan = ScanData {
            scan_results: vec![scan_snapshot(&[
                ("11:22:33:44:55:66", -72),
                ("99:88:77:66:55:44", -85),
            ])],
            ..ScanData::default()
        };
        let records = transformer().transform(&scan, "b");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bssid, "11:22:33:44:55:66");
        assert_eq!(records[1].bssid, "99:88:77:66:55:44");
        assert!(records
            .iter()
            .all(|r| r.connection_status == ConnectionStatus::Scan));
        assert!(records.iter().all(|r| r.quality_weight == 1.0));
        assert!(records.iter().all(|r| r.link_speed.is_none()));
    }

    #[test]
    fn low_link_speed_with_strong_signal_reduces_weight() {
        let mut event = connected_event("b8:f8:53:c0:1e:ff", -58);
        event.wifi_connected_info.as_mut().unwrap().link_speed = Some(20);
        let scan = ScanData {
            wifi_connected_events: vec![event],
            ..ScanData::default()
        };
        let records = transformer().transform(&scan, "b");
        assert_eq!(records[0].quality_weight, 0.5);
    }

    #[test]
    fn low_link_speed_with_weak_signal_keeps_connected_weight() {
        let mut event = connected_event("b8:f8:53:c0:1e:ff", -80);
        event.wifi_connected_info.as_mut().unwrap().link_speed = Some(20);
        let scan = ScanData {
            wifi_connected_events: vec![event],
            ..ScanData::default()
        };
        let records = transformer().transform(&scan, "b");
        assert_eq!(records[0].quality_weight, 2.0);
    }

    #[test]
    fn event_without_wifi_info_is_dropped() {
        let scan = ScanData {
            wifi_connected_events: vec![ConnectedEvent {
                timestamp: Some(now_ms()),
                location: Some(location()),
                ..ConnectedEvent::default()
            }],
            ..ScanData::default()
        };
        assert!(transformer().transform(&scan, "b").is_empty());
    }

    #[test]
    fn invalid_sibling_does_not_abort_others() {
        let scan = ScanData {
            scan_results: vec![scan_snapshot(&[
                ("ff:ff:ff:ff:ff:ff", -60),
                ("11:22:33:44:55:66", -150),
                ("99:88:77:66:55:44", -85),
            ])],
            ..ScanData::default()
        };
        let records = transformer().transform(&scan, "b");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bssid, "99:88:77:66:55:44");
    }

    #[test]
    fn duplicate_bssid_across_sources_yields_two_records() {
        let scan = ScanData {
            wifi_connected_events: vec![connected_event("b8:f8:53:c0:1e:ff", -58)],
            scan_results: vec![scan_snapshot(&[("b8:f8:53:c0:1e:ff", -60)])],
            ..ScanData::default()
        };
        let records = transformer().transform(&scan, "b");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].connection_status, ConnectionStatus::Connected);
        assert_eq!(records[1].connection_status, ConnectionStatus::Scan);
    }

    #[test]
    fn device_id_is_deterministic() {
        let scan = ScanData {
            manufacturer: Some("Google".into()),
            model: Some("Pixel 8".into()),
            device: Some("shiba".into()),
            os_version: Some("14".into()),
            ..ScanData::default()
        };
        assert_eq!(device_id(&scan), device_id(&scan.clone()));

        let other = ScanData {
            os_version: Some("15".into()),
            ..scan.clone()
        };
        assert_ne!(device_id(&scan), device_id(&other));
        // missing components hash as empty strings, not as a panic
        assert_eq!(device_id(&ScanData::default()).len(), 64);
    }

    #[test]
    fn scan_event_id_hashes_timestamp_and_bssid() {
        assert_eq!(
            generate_event_id(1000, "AA:BB:CC:DD:EE:FF"),
            generate_event_id(1000, "AA:BB:CC:DD:EE:FF")
        );
        assert_ne!(
            generate_event_id(1000, "AA:BB:CC:DD:EE:FF"),
            generate_event_id(1001, "AA:BB:CC:DD:EE:FF")
        );
    }

    #[test]
    fn ssid_cleaning() {
        assert_eq!(clean_ssid(Some("  cafe\u{0} ")), Some("cafe".into()));
        assert_eq!(clean_ssid(Some("\u{0}\u{0}")), None);
        assert_eq!(clean_ssid(Some("   ")), None);
        assert_eq!(clean_ssid(None), None);
    }

    #[test]
    fn quality_score_bounds() {
        // perfect accuracy + strong signal caps at 1.0
        assert_eq!(quality_score(Some(0.0), Some(0)), 1.0);
        // missing terms leave the base
        assert_eq!(quality_score(None, None), 0.5);
        // far accuracy contributes nothing below the base
        assert_eq!(quality_score(Some(500.0), None), 0.5);
        let mid = quality_score(Some(10.0), Some(-58));
        assert!(mid > 0.5 && mid < 1.0);
    }

    #[test]
    fn hotspot_exclude_drops_matching_oui() {
        let mut filter = FilterConfig::default();
        filter.mobile_hotspot.enabled = true;
        filter.mobile_hotspot.oui_blacklist.insert("B8:F8:53".into());
        let transformer = Transformer::new(filter, Arc::new(Counters::new()));

        let scan = ScanData {
            wifi_connected_events: vec![
                connected_event("b8:f8:53:c0:1e:ff", -58),
                connected_event("aa:bb:cc:dd:ee:ff", -45),
            ],
            ..ScanData::default()
        };
        let records = transformer.transform(&scan, "b");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bssid, "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn hotspot_flag_keeps_record() {
        let mut filter = FilterConfig::default();
        filter.mobile_hotspot.enabled = true;
        filter.mobile_hotspot.oui_blacklist.insert("B8:F8:53".into());
        filter.mobile_hotspot.action = HotspotAction::Flag;
        let metrics = Arc::new(Counters::new());
        let transformer = Transformer::new(filter, metrics.clone());

        let scan = ScanData {
            wifi_connected_events: vec![connected_event("b8:f8:53:c0:1e:ff", -58)],
            ..ScanData::default()
        };
        assert_eq!(transformer.transform(&scan, "b").len(), 1);
        assert_eq!(metrics.get("hotspot_flagged"), 1);
    }
}
