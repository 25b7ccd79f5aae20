//! Telemetry readings and the read-only client contract
//!
//! Every adapter performs one authenticated request per call and hands back
//! a normalized reading. All failures come back as [`EvSolarError::Fetch`],
//! the decision loop treats them identically and skips the cycle.

pub mod power;

use crate::error::{EvSolarError, Result};
use chrono::{DateTime, Utc};
use std::fmt;

/// Where a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Solar production (inverter)
    Solar,
    /// Total site consumption, charger included
    SiteLoad,
    /// Home battery state of charge
    Battery,
    /// EV charger draw/status
    Charger,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solar => "solar",
            Self::SiteLoad => "site_load",
            Self::Battery => "battery",
            Self::Charger => "charger",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of a reading's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Watts,
    Percent,
}

/// A single timestamped measurement, held only for one decision cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub source: Source,
    pub value: f64,
    pub unit: Unit,
    pub taken_at: DateTime<Utc>,
}

impl Reading {
    /// Power reading taken now
    pub fn watts(source: Source, value: f64) -> Self {
        Self {
            source,
            value,
            unit: Unit::Watts,
            taken_at: Utc::now(),
        }
    }

    /// Percentage reading taken now
    pub fn percent(source: Source, value: f64) -> Self {
        Self {
            source,
            value,
            unit: Unit::Percent,
            taken_at: Utc::now(),
        }
    }

    /// Reject NaN/inf values so they never reach the decision rule
    pub fn checked(self) -> Result<Self> {
        if self.value.is_finite() {
            Ok(self)
        } else {
            Err(EvSolarError::fetch(
                self.source,
                format!("non-finite value {}", self.value),
            ))
        }
    }
}

/// Solar production together with the site load from the same request
#[derive(Debug, Clone, PartialEq)]
pub struct SolarReading {
    pub production: Reading,
    pub site_load: Reading,
}

/// What the charger reports about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargerStatus {
    /// Whether the charger is switched on
    pub charger_on: bool,
    /// Whether a vehicle is plugged in
    pub car_connected: bool,
    /// Configured charging rate in amps
    pub charging_rate_amps: u32,
    /// Vendor status label, for logs
    pub label: String,
}

/// Charger draw together with the status it was read alongside
#[derive(Debug, Clone, PartialEq)]
pub struct ChargerReading {
    pub draw: Reading,
    pub status: ChargerStatus,
}

/// Read-only telemetry adapter
#[async_trait::async_trait]
pub trait TelemetryClient: Send + Sync {
    type Output: Send;

    /// Which source this client reads
    fn source(&self) -> Source;

    /// Fetch the latest reading
    async fn fetch_reading(&self) -> Result<Self::Output>;
}

pub type SolarClient = Box<dyn TelemetryClient<Output = SolarReading>>;
pub type BatteryClient = Box<dyn TelemetryClient<Output = Reading>>;
pub type ChargerClient = Box<dyn TelemetryClient<Output = ChargerReading>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_constructors_tag_units() {
        let r = Reading::watts(Source::Solar, 1200.0);
        assert_eq!(r.unit, Unit::Watts);
        let r = Reading::percent(Source::Battery, 55.0);
        assert_eq!(r.unit, Unit::Percent);
        assert_eq!(r.source.to_string(), "battery");
    }

    #[test]
    fn checked_rejects_nan() {
        let err = Reading::watts(Source::Charger, f64::NAN).checked().unwrap_err();
        assert!(matches!(
            err,
            EvSolarError::Fetch {
                origin: Source::Charger,
                ..
            }
        ));
        assert!(Reading::watts(Source::Charger, 0.0).checked().is_ok());
    }
}
