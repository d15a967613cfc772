//! Field-level validation and MAC-OUI mobile-hotspot detection.

use chrono::Utc;
use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::config::{FilterConfig, HotspotAction};
use crate::metrics::CounterSink;
use crate::scan::LocationData;

const MAX_MEASUREMENT_AGE_MS: i64 = 365 * 24 * 60 * 60 * 1000;

fn bssid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-f]{2}(:[0-9a-f]{2}){5}$").expect("bssid pattern is valid")
    })
}

/// Result of a mobile-hotspot lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotspotCheck {
    NotChecked,
    NotDetected,
    Detected { oui: String, action: HotspotAction },
}

pub struct Validator {
    filter: FilterConfig,
    metrics: Arc<dyn CounterSink>,
}

impl Validator {
    pub fn new(filter: FilterConfig, metrics: Arc<dyn CounterSink>) -> Self {
        Self { filter, metrics }
    }

    /// Normalize (lowercase, `-` → `:`) and validate a BSSID. Returns the
    /// normalized form, or None when missing, malformed, all-zeros, or
    /// the broadcast address.
    pub fn validate_bssid(&self, raw: Option<&str>) -> Option<String> {
        let normalized = raw.map(normalize_bssid)?;
        let ok = bssid_pattern().is_match(&normalized)
            && normalized != "00:00:00:00:00:00"
            && normalized != "ff:ff:ff:ff:ff:ff";
        if ok {
            self.metrics.incr("validate_bssid_pass");
            Some(normalized)
        } else {
            self.metrics.incr("validate_bssid_fail");
            None
        }
    }

    pub fn validate_rssi(&self, rssi: Option<i64>) -> bool {
        let ok = rssi
            .map(|r| r >= self.filter.min_rssi && r <= self.filter.max_rssi)
            .unwrap_or(false);
        self.metrics.incr(if ok {
            "validate_rssi_pass"
        } else {
            "validate_rssi_fail"
        });
        ok
    }

    pub fn validate_location(&self, location: Option<&LocationData>) -> bool {
        let ok = location.map(|loc| self.location_ok(loc)).unwrap_or(false);
        self.metrics.incr(if ok {
            "validate_location_pass"
        } else {
            "validate_location_fail"
        });
        ok
    }

    fn location_ok(&self, location: &LocationData) -> bool {
        let coords_valid = matches!(
            (location.latitude, location.longitude),
            (Some(lat), Some(lon))
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
        );
        if !coords_valid {
            return false;
        }
        match location.accuracy {
            Some(accuracy) => accuracy <= self.filter.max_location_accuracy,
            None => true,
        }
    }

    /// Accepts timestamps up to now (inclusive) and no older than one
    /// year (inclusive lower bound).
    pub fn validate_timestamp(&self, timestamp_ms: Option<i64>) -> bool {
        let now = Utc::now().timestamp_millis();
        let ok = timestamp_ms
            .map(|ts| ts <= now && ts >= now - MAX_MEASUREMENT_AGE_MS)
            .unwrap_or(false);
        self.metrics.incr(if ok {
            "validate_timestamp_pass"
        } else {
            "validate_timestamp_fail"
        });
        ok
    }

    /// Look up the BSSID's OUI in the configured blacklist. Expects a
    /// normalized (lowercase, colon-separated) BSSID.
    pub fn detect_mobile_hotspot(&self, bssid: &str) -> HotspotCheck {
        let hotspot = &self.filter.mobile_hotspot;
        if !hotspot.enabled {
            return HotspotCheck::NotChecked;
        }
        let oui = bssid.get(..8).map(str::to_uppercase).unwrap_or_default();
        if hotspot.oui_blacklist.contains(&oui) {
            self.metrics.incr("hotspot_detected");
            HotspotCheck::Detected {
                oui,
                action: hotspot.action,
            }
        } else {
            HotspotCheck::NotDetected
        }
    }
}

pub fn normalize_bssid(raw: &str) -> String {
    raw.trim().to_lowercase().replace('-', ":")
}
