//! TOML-based engine configuration.
//!
//! Holds the tunables of the three loops:
//! - scale listener address, quiet window and unit conversion
//! - remote activity source and its poll cadence
//! - aggregation cadence and moving-average width
//! - optional fixed UTC offset for local-day bucketing
//!
//! Configuration is stored at `~/.config/calorie-minder/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::clock::LocalZone;
use crate::error::ConfigError;

/// Environment variable consulted when `activity.access_token` is empty.
pub const ACCESS_TOKEN_ENV: &str = "CALORIE_MINDER_ACCESS_TOKEN";

/// Scale listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_quiet_window_secs")]
    pub quiet_window_secs: u64,
    #[serde(default = "default_subject_id")]
    pub subject_id: String,
    /// Grams per unit reported by the scale.
    #[serde(default = "default_grams_per_unit")]
    pub grams_per_unit: f64,
}

/// Remote activity source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_activity_poll_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_data_source_id")]
    pub data_source_id: String,
    /// Fetch start used when no interval is stored yet.
    #[serde(default = "default_epoch_start_nanos")]
    pub epoch_start_nanos: i64,
    #[serde(default)]
    pub access_token: String,
}

/// Daily aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_aggregation_poll_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_moving_average_days")]
    pub moving_average_days: usize,
}

/// Local calendar configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Minutes east of UTC. The system zone is used when unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/calorie-minder/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub clock: ClockConfig,
}

// Default functions
fn default_bind_addr() -> String {
    "0.0.0.0:6000".into()
}
fn default_quiet_window_secs() -> u64 {
    60
}
fn default_subject_id() -> String {
    "default".into()
}
fn default_grams_per_unit() -> f64 {
    1000.0
}
fn default_activity_poll_secs() -> u64 {
    13 * 60
}
fn default_base_url() -> String {
    "https://www.googleapis.com/fitness/v1".into()
}
fn default_user_id() -> String {
    "me".into()
}
fn default_data_source_id() -> String {
    "derived:com.google.calories.expended:com.google.android.gms:merge_calories_expended".into()
}
fn default_epoch_start_nanos() -> i64 {
    // 2022-10-01T00:00:00Z
    1_664_582_400_000_000_000
}
fn default_aggregation_poll_secs() -> u64 {
    3 * 60
}
fn default_moving_average_days() -> usize {
    7
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            quiet_window_secs: default_quiet_window_secs(),
            subject_id: default_subject_id(),
            grams_per_unit: default_grams_per_unit(),
        }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_activity_poll_secs(),
            base_url: default_base_url(),
            user_id: default_user_id(),
            data_source_id: default_data_source_id(),
            epoch_start_nanos: default_epoch_start_nanos(),
            access_token: String::new(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_aggregation_poll_secs(),
            moving_average_days: default_moving_average_days(),
        }
    }
}

impl ScaleConfig {
    pub fn quiet_window(&self) -> Duration {
        Duration::from_secs(self.quiet_window_secs)
    }
}

impl ActivityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Bearer token from the config file, falling back to the environment.
    pub fn resolved_access_token(&self) -> Option<String> {
        if !self.access_token.is_empty() {
            return Some(self.access_token.clone());
        }
        std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
    }
}

impl AggregationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".into(),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Number(_) | serde_json::Value::Null => {
                    if value.is_empty() || value == "none" {
                        serde_json::Value::Null
                    } else if let Ok(n) = value.parse::<i64>() {
                        serde_json::Value::Number(n.into())
                    } else if let Ok(n) = value.parse::<f64>() {
                        serde_json::Number::from_f64(n)
                            .map(serde_json::Value::Number)
                            .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                    } else {
                        return Err(invalid(format!("cannot parse '{value}' as number")));
                    }
                }
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    return Err(invalid("cannot replace a whole section".into()));
                }
                serde_json::Value::String(_) => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Location of the config file inside the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, writing defaults when the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or is
    /// invalid, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(err) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Check the invariants the loops rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.into(),
            message: message.into(),
        };
        if self.activity.poll_interval_secs == 0 {
            return Err(invalid("activity.poll_interval_secs", "must be greater than 0"));
        }
        if self.aggregation.poll_interval_secs == 0 {
            return Err(invalid("aggregation.poll_interval_secs", "must be greater than 0"));
        }
        if self.aggregation.moving_average_days == 0 {
            return Err(invalid("aggregation.moving_average_days", "must be at least 1"));
        }
        if !(self.scale.grams_per_unit.is_finite() && self.scale.grams_per_unit > 0.0) {
            return Err(invalid("scale.grams_per_unit", "must be a positive number"));
        }
        if self.scale.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid("scale.bind_addr", "must be an address like 0.0.0.0:6000"));
        }
        if url::Url::parse(&self.activity.base_url).is_err() {
            return Err(invalid("activity.base_url", "must be an absolute URL"));
        }
        if self.zone().is_none() {
            return Err(invalid("clock.utc_offset_minutes", "must be within ±24 hours"));
        }
        Ok(())
    }

    /// Zone used to derive local calendar dates.
    pub fn zone(&self) -> Option<LocalZone> {
        LocalZone::from_offset_minutes(self.clock.utc_offset_minutes)
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving. Returns error if the key is
    /// unknown or the result fails validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Flattened `key = value` listing of every setting.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }
}
