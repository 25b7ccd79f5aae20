//! Configuration management for evsolar
//!
//! Settings are loaded once at startup: built-in defaults, then an optional
//! YAML file, then environment variables (a `.env` file is read first if one
//! exists). The result is validated before the driver starts; any problem is
//! fatal.

mod defaults;
mod env;

use crate::error::{EvSolarError, Result};
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Solar/battery power-flow API
    pub power: PowerConfig,

    /// Emporia cloud account and charger
    pub emporia: EmporiaConfig,

    /// Decision thresholds
    pub thresholds: ThresholdsConfig,

    /// Charging current while charging
    pub rate: RateConfig,

    /// Charging window
    pub schedule: ScheduleConfig,

    /// Outbound HTTP settings
    pub http: HttpConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// IANA timezone for schedule evaluation, or "local"
    pub timezone: String,

    /// While this file exists automatic control is suspended
    pub disable_file: Option<String>,

    /// DNS name whose TXT record suspends automatic control unless it reads `False` or `0`
    pub disable_dns_txt: Option<String>,
}

/// Which vendor API reports solar production, site load and battery reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    /// pyPowerwall proxy in front of a Tesla Powerwall gateway
    PypowerwallProxy,
    /// SolarEdge monitoring API
    SolarEdge,
}

impl std::str::FromStr for PowerSource {
    type Err = EvSolarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pypowerwall_proxy" | "pypowerwall" => Ok(Self::PypowerwallProxy),
            "solar_edge" | "solaredge" => Ok(Self::SolarEdge),
            other => Err(EvSolarError::validation(
                "power.source",
                format!("unknown data source: {}", other),
            )),
        }
    }
}

/// Power-flow API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub source: PowerSource,

    /// pyPowerwall proxy base URL
    pub pypowerwall_base_url: String,

    /// SolarEdge site id
    pub solaredge_site: String,

    /// SolarEdge API key
    #[serde(skip_serializing)]
    pub solaredge_key: String,

    /// SolarEdge API base URL
    pub solaredge_base_url: String,
}

/// Emporia account and charger parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmporiaConfig {
    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,

    /// Where session tokens are kept between restarts
    pub token_file: String,

    /// Charger device gid; first charger on the account when unset
    pub device_gid: Option<u64>,

    /// Fixed charging rate applied when charging is enabled; overrides rate tracking
    pub charge_rate_amps: Option<u32>,

    /// Emporia API base URL
    pub api_base_url: String,

    /// Cognito identity provider endpoint
    pub cognito_url: String,

    /// Cognito app client id
    pub cognito_client_id: String,
}

/// Decision thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Minimum surplus before charging starts
    pub start_surplus_watts: f64,

    /// Band below the start threshold that must be crossed before stopping
    pub hysteresis_watts: f64,

    /// Minimum home battery reserve to allow charging
    pub min_battery_reserve_percent: f64,

    /// Consecutive qualifying cycles before starting
    pub start_confirm_cycles: usize,

    /// Consecutive qualifying cycles before stopping
    pub stop_confirm_cycles: usize,
}

/// Charging current tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Follow the available solar power with the charging current
    pub tracking: bool,

    pub min_amps: u32,

    pub max_amps: u32,

    /// Cycles averaged for the tracked current
    pub smooth_cycles: usize,

    /// Added to the computed current; may be negative
    pub offset_amps: i32,

    /// Supply voltage used to turn watts into amps
    pub line_voltage: f64,
}

/// Charging window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Fixed window start (HH:MM or HH:MM:SS); overrides daylight
    pub start: Option<String>,

    /// Fixed window end (HH:MM or HH:MM:SS)
    pub end: Option<String>,

    /// Latitude for the sunrise/sunset window
    pub latitude: Option<f64>,

    /// Longitude for the sunrise/sunset window
    pub longitude: Option<f64>,

    /// sunrisesunset.io endpoint
    pub sunrise_api_url: String,
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Upper bound for a whole decision cycle in seconds
    pub cycle_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional log file; rotated daily
    pub file: Option<String>,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to stdout
    pub console_output: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from file and environment, then validate
    pub fn load() -> Result<Self> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();

        let mut config = match Self::locate_file() {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn locate_file() -> Option<String> {
        if let Ok(path) = std::env::var("EVSOLAR_CONFIG")
            && !path.trim().is_empty()
        {
            return Some(path);
        }
        [
            "evsolar.yaml",
            "/data/evsolar.yaml",
            "/etc/evsolar/config.yaml",
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
        .map(str::to_string)
    }

    /// Save configuration to a YAML file (secrets are not written)
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.http.cycle_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.power.source {
            PowerSource::PypowerwallProxy => {
                if self.power.pypowerwall_base_url.trim().is_empty() {
                    return Err(EvSolarError::validation(
                        "power.pypowerwall_base_url",
                        "base URL cannot be empty",
                    ));
                }
            }
            PowerSource::SolarEdge => {
                if self.power.solaredge_site.trim().is_empty() {
                    return Err(EvSolarError::validation(
                        "power.solaredge_site",
                        "SOLAREDGE_SITE is required for the solar_edge source",
                    ));
                }
                if self.power.solaredge_key.trim().is_empty() {
                    return Err(EvSolarError::validation(
                        "power.solaredge_key",
                        "SOLAREDGE_KEY is required for the solar_edge source",
                    ));
                }
            }
        }

        if self.emporia.username.trim().is_empty() {
            return Err(EvSolarError::validation(
                "emporia.username",
                "EMPORIA_USER is required",
            ));
        }
        if self.emporia.password.is_empty() {
            return Err(EvSolarError::validation(
                "emporia.password",
                "EMPORIA_PASSWORD is required",
            ));
        }
        if let Some(amps) = self.emporia.charge_rate_amps
            && !(MIN_CHARGE_RATE_AMPS..=MAX_CHARGE_RATE_AMPS).contains(&amps)
        {
            return Err(EvSolarError::validation(
                "emporia.charge_rate_amps",
                format!(
                    "must be within {}..={} A",
                    MIN_CHARGE_RATE_AMPS, MAX_CHARGE_RATE_AMPS
                ),
            ));
        }

        self.validate_rate()?;

        let t = &self.thresholds;
        if !t.start_surplus_watts.is_finite() || t.start_surplus_watts <= 0.0 {
            return Err(EvSolarError::validation(
                "thresholds.start_surplus_watts",
                "Must be positive",
            ));
        }
        if !t.hysteresis_watts.is_finite() || t.hysteresis_watts < 0.0 {
            return Err(EvSolarError::validation(
                "thresholds.hysteresis_watts",
                "Must not be negative",
            ));
        }
        if !(0.0..=100.0).contains(&t.min_battery_reserve_percent) {
            return Err(EvSolarError::validation(
                "thresholds.min_battery_reserve_percent",
                "Must be within 0..=100",
            ));
        }
        if t.start_confirm_cycles == 0 || t.stop_confirm_cycles == 0 {
            return Err(EvSolarError::validation(
                "thresholds.confirm_cycles",
                "Must be at least 1",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(EvSolarError::validation(
                "poll_interval_secs",
                "Must be greater than 0",
            ));
        }
        if self.http.timeout_secs == 0 || self.http.cycle_timeout_secs == 0 {
            return Err(EvSolarError::validation(
                "http",
                "Timeouts must be greater than 0",
            ));
        }

        self.validate_schedule()?;
        crate::schedule::parse_timezone(&self.timezone)?;
        crate::logging::parse_log_level(&self.logging.level)?;
        Ok(())
    }

    fn validate_rate(&self) -> Result<()> {
        let r = &self.rate;
        let range = MIN_CHARGE_RATE_AMPS..=MAX_CHARGE_RATE_AMPS;
        if !range.contains(&r.min_amps) || !range.contains(&r.max_amps) {
            return Err(EvSolarError::validation(
                "rate",
                format!(
                    "MIN_AMPS and MAX_AMPS must be within {}..={} A",
                    MIN_CHARGE_RATE_AMPS, MAX_CHARGE_RATE_AMPS
                ),
            ));
        }
        if r.min_amps > r.max_amps {
            return Err(EvSolarError::validation(
                "rate",
                "MIN_AMPS must not exceed MAX_AMPS",
            ));
        }
        if r.smooth_cycles == 0 {
            return Err(EvSolarError::validation(
                "rate.smooth_cycles",
                "Must be at least 1",
            ));
        }
        if !r.line_voltage.is_finite() || r.line_voltage <= 0.0 {
            return Err(EvSolarError::validation(
                "rate.line_voltage",
                "Must be positive",
            ));
        }
        Ok(())
    }

    fn validate_schedule(&self) -> Result<()> {
        let s = &self.schedule;
        match (&s.start, &s.end) {
            (Some(start), Some(end)) => {
                parse_clock_time("schedule.start", start)?;
                parse_clock_time("schedule.end", end)?;
            }
            (None, None) => {}
            _ => {
                return Err(EvSolarError::validation(
                    "schedule",
                    "SCHEDULE_START and SCHEDULE_END must be set together",
                ));
            }
        }
        match (s.latitude, s.longitude) {
            (Some(lat), Some(lng)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                    return Err(EvSolarError::validation(
                        "schedule.location",
                        "latitude/longitude out of range",
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(EvSolarError::validation(
                    "schedule.location",
                    "LOCATION_LAT and LOCATION_LNG must be set together",
                ));
            }
        }
        Ok(())
    }
}

/// Emporia EVSEs refuse rates outside this range
pub const MIN_CHARGE_RATE_AMPS: u32 = 6;
pub const MAX_CHARGE_RATE_AMPS: u32 = 48;

/// Parse a wall-clock time such as `07:30` or `18:45:00`
///
/// A full ISO 8601 datetime (`2025-01-01T08:00:00`) is accepted too; only
/// its time of day is used.
pub fn parse_clock_time(field: &str, value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    let datetime = |fmt| NaiveDateTime::parse_from_str(value, fmt).map(|dt| dt.time());
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .or_else(|_| datetime("%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| datetime("%Y-%m-%d %H:%M:%S"))
        .or_else(|_| datetime("%Y-%m-%dT%H:%M"))
        .map_err(|e| EvSolarError::validation(field, format!("'{}': {}", value, e)))
}
