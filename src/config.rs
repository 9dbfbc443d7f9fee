//! Per-record-kind tracking configuration.
//!
//! `TrackingConfig` carries the switches that change how dirty state turns into
//! writes (partial writes, timestamp bookkeeping, optimistic locking) and how
//! temporal attributes are cast. A schema owns one; the write planner receives
//! it at call time. Applications can load defaults from `config/config.toml` or
//! environment variables using `TrackingConfig::load()`.

use crate::error::TrackingError;
use chrono::FixedOffset;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "CHANGEGUARD";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackingConfig {
    /// Write only changed attributes (inserts and updates)
    #[serde(default = "default_true")]
    pub partial_writes: bool,
    /// Present timestamps in `default_time_zone`
    #[serde(default = "default_true")]
    pub time_zone_aware_attributes: bool,
    /// `UTC`, `Z` or an offset such as `+01:00`
    #[serde(default = "default_time_zone")]
    pub default_time_zone: String,
    /// Timestamp attributes kept in UTC even when zone awareness is on
    #[serde(default)]
    pub skip_time_zone_conversion_for_attributes: Vec<String>,
    /// Fill create/update timestamps when writing
    #[serde(default = "default_true")]
    pub record_timestamps: bool,
    #[serde(default = "default_create_timestamps")]
    pub create_timestamp_attributes: Vec<String>,
    #[serde(default = "default_update_timestamps")]
    pub update_timestamp_attributes: Vec<String>,
    #[serde(default = "default_locking_column")]
    pub locking_column: String,
    /// Bump and check `locking_column` on updates when the attribute exists
    #[serde(default = "default_true")]
    pub lock_optimistically: bool,
}

fn default_true() -> bool {
    true
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_create_timestamps() -> Vec<String> {
    vec!["created_at".to_string(), "created_on".to_string()]
}

fn default_update_timestamps() -> Vec<String> {
    vec!["updated_at".to_string(), "updated_on".to_string()]
}

fn default_locking_column() -> String {
    "lock_version".to_string()
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            partial_writes: default_true(),
            time_zone_aware_attributes: default_true(),
            default_time_zone: default_time_zone(),
            skip_time_zone_conversion_for_attributes: Vec::new(),
            record_timestamps: default_true(),
            create_timestamp_attributes: default_create_timestamps(),
            update_timestamp_attributes: default_update_timestamps(),
            locking_column: default_locking_column(),
            lock_optimistically: default_true(),
        }
    }
}

impl TrackingConfig {
    /// Load the tracking configuration from `config/config.toml`, falling back to env vars.
    ///
    /// Settings live under the `tracking` section; environment variables use the
    /// `CHANGEGUARD__TRACKING__` prefix (e.g. `CHANGEGUARD__TRACKING__PARTIAL_WRITES=false`).
    /// A missing section yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        match Self::from_builder(builder) {
            Ok(cfg) => Ok(cfg),
            Err(err) => {
                // An unreadable file should not take env configuration down with it
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!(
                        "failed to load {}, falling back to env: {}",
                        CONFIG_FILE,
                        err
                    );
                }
                Self::from_builder(
                    Config::builder()
                        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__")),
                )
                .map_err(|env_err| {
                    ConfigError::Message(format!(
                        "Failed to load tracking configuration from file and env: {}, then env-only error: {}",
                        err, env_err
                    ))
                })
            }
        }
    }

    /// Build from an arbitrary set of sources (used by `load()` and tests).
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings = builder.build()?;
        match settings.get::<TrackingConfig>("tracking") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(TrackingConfig::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Tracking configuration could not be loaded: {}",
                e
            ))),
        }
    }

    /// Parse `default_time_zone` into an offset
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::InvalidSchema` if the zone is not `UTC`, `Z` or `±HH:MM`.
    pub fn time_zone(&self) -> Result<FixedOffset, TrackingError> {
        parse_offset(&self.default_time_zone).ok_or_else(|| {
            TrackingError::InvalidSchema(format!(
                "unsupported default_time_zone {:?}",
                self.default_time_zone
            ))
        })
    }

    /// Zone applied to a timestamp attribute, `None` when it stays in UTC.
    pub(crate) fn zone_for(&self, attribute: &str) -> Result<Option<FixedOffset>, TrackingError> {
        if !self.time_zone_aware_attributes
            || self
                .skip_time_zone_conversion_for_attributes
                .iter()
                .any(|a| a == attribute)
        {
            return Ok(None);
        }
        self.time_zone().map(Some)
    }
}

fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let zone = zone.trim();
    if zone.eq_ignore_ascii_case("utc") || zone == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
