//! Terminal configuration.
//!
//! Layers, lowest to highest precedence:
//! 1. built-in defaults,
//! 2. values saved in the local store (`local_settings`, category `terminal`),
//! 3. an optional connection string handed out by the back office,
//! 4. `AFRIPOS_*` environment variables.

use base64::prelude::*;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::connectivity::MonitorSettings;
use crate::db::OfflineStore;
use crate::error::{PosError, PosResult};
use crate::remote::{normalize_base_url, RestRemote, DEFAULT_TIMEOUT};

const SETTINGS_CATEGORY: &str = "terminal";
const ENV_PREFIX: &str = "AFRIPOS_";

pub const DEFAULT_CASHIER_NAME: &str = "POS";

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalConfig {
    pub backend_url: String,
    pub api_key: String,
    pub seller_id: String,
    pub cashier_name: String,
    pub request_timeout: Duration,
    pub probe_interval: Duration,
    pub safety_net_interval: Duration,
    pub paper_width_mm: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        let monitor = MonitorSettings::default();
        Self {
            backend_url: String::new(),
            api_key: String::new(),
            seller_id: String::new(),
            cashier_name: DEFAULT_CASHIER_NAME.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            probe_interval: monitor.probe_interval,
            safety_net_interval: monitor.safety_net_interval,
            paper_width_mm: 80,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection string
// ---------------------------------------------------------------------------

/// Decode a connection string: plain JSON, or URL-safe / standard base64 of
/// JSON, possibly with whitespace and missing padding.
fn decode_connection_string_payload(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str::<Value>(trimmed).ok();
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('{') {
        return serde_json::from_str::<Value>(&compact).ok();
    }
    if compact.len() < 20 {
        return None;
    }

    let base64 = compact.replace('-', "+").replace('_', "/");
    let padded = format!(
        "{}{}",
        base64,
        "=".repeat((4usize.wrapping_sub(base64.len() % 4)) % 4)
    );
    let decoded = BASE64_STANDARD.decode(padded).ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}

fn string_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Fields carried by a back-office connection string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pub url: Option<String>,
    pub key: Option<String>,
    pub seller_id: Option<String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> PosResult<Self> {
        let payload = decode_connection_string_payload(raw)
            .ok_or_else(|| PosError::Config("connection string is not valid JSON or base64".into()))?;
        let parsed = Self {
            url: string_field(&payload, &["url"]).map(|u| normalize_base_url(&u)),
            key: string_field(&payload, &["key"]),
            seller_id: string_field(&payload, &["sid", "sellerId"]),
        };
        if parsed == Self::default() {
            return Err(PosError::Config("connection string has no known fields".into()));
        }
        Ok(parsed)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn parse_secs(name: &str, raw: &str) -> PosResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| PosError::Config(format!("{name} must be a positive number of seconds, got {raw:?}")))
}

fn parse_width(raw: &str) -> PosResult<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|w| (40..=120).contains(w))
        .ok_or_else(|| PosError::Config(format!("paper_width_mm must be 40-120, got {raw:?}")))
}

impl TerminalConfig {
    /// Set one field by its settings key. Unknown keys are ignored.
    fn apply(&mut self, key: &str, value: &str) -> PosResult<()> {
        match key {
            "backend_url" if value.trim().is_empty() => self.backend_url.clear(),
            "backend_url" => self.backend_url = normalize_base_url(value),
            "api_key" => self.api_key = value.trim().to_string(),
            "seller_id" => self.seller_id = value.trim().to_string(),
            "cashier_name" => {
                let name = value.trim();
                self.cashier_name = if name.is_empty() {
                    DEFAULT_CASHIER_NAME.to_string()
                } else {
                    name.to_string()
                };
            }
            "request_timeout_secs" => self.request_timeout = parse_secs(key, value)?,
            "probe_interval_secs" => self.probe_interval = parse_secs(key, value)?,
            "safety_net_interval_secs" => self.safety_net_interval = parse_secs(key, value)?,
            "paper_width_mm" => self.paper_width_mm = parse_width(value)?,
            other => debug!(key = other, "Ignoring unknown terminal setting"),
        }
        Ok(())
    }

    fn entries(&self) -> [(&'static str, String); 8] {
        [
            ("backend_url", self.backend_url.clone()),
            ("api_key", self.api_key.clone()),
            ("seller_id", self.seller_id.clone()),
            ("cashier_name", self.cashier_name.clone()),
            ("request_timeout_secs", self.request_timeout.as_secs().to_string()),
            ("probe_interval_secs", self.probe_interval.as_secs().to_string()),
            ("safety_net_interval_secs", self.safety_net_interval.as_secs().to_string()),
            ("paper_width_mm", self.paper_width_mm.to_string()),
        ]
    }

    const KEYS: [&'static str; 8] = [
        "backend_url",
        "api_key",
        "seller_id",
        "cashier_name",
        "request_timeout_secs",
        "probe_interval_secs",
        "safety_net_interval_secs",
        "paper_width_mm",
    ];

    /// Resolve the configuration from the store, an optional connection
    /// string and the process environment.
    pub fn load(store: &OfflineStore, connection_string: Option<&str>) -> PosResult<Self> {
        let mut config = Self::default();

        for key in Self::KEYS {
            if let Some(value) = store.get_setting(SETTINGS_CATEGORY, key)? {
                config.apply(key, &value)?;
            }
        }

        if let Some(raw) = connection_string.filter(|r| !r.trim().is_empty()) {
            let conn = ConnectionString::parse(raw)?;
            if let Some(url) = conn.url {
                config.backend_url = url;
            }
            if let Some(key) = conn.key {
                config.api_key = key;
            }
            if let Some(seller_id) = conn.seller_id {
                config.seller_id = seller_id;
            }
        }

        for key in Self::KEYS {
            let var = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase());
            if let Ok(value) = std::env::var(&var) {
                debug!(var = %var, "Terminal setting overridden from environment");
                config.apply(key, &value)?;
            }
        }

        info!(
            backend_url = %config.backend_url,
            seller_id = %config.seller_id,
            has_api_key = !config.api_key.is_empty(),
            "Terminal configuration loaded"
        );
        Ok(config)
    }

    /// Persist every field to the local store.
    pub fn save(&self, store: &OfflineStore) -> PosResult<()> {
        for (key, value) in self.entries() {
            store.set_setting(SETTINGS_CATEGORY, key, &value)?;
        }
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        !self.backend_url.is_empty() && !self.api_key.is_empty() && !self.seller_id.is_empty()
    }

    pub fn remote(&self) -> PosResult<RestRemote> {
        if !self.is_configured() {
            return Err(PosError::Config(
                "backend_url, api_key and seller_id are required".into(),
            ));
        }
        RestRemote::new(&self.backend_url, &self.api_key, self.request_timeout)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            probe_interval: self.probe_interval,
            safety_net_interval: self.safety_net_interval,
        }
    }
}
