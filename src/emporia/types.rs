//! Emporia API payloads

use crate::error::{EvSolarError, Result};
use crate::telemetry::{ChargerStatus, Source};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Icon Emporia shows while a vehicle is plugged in
pub const CAR_CONNECTED_ICON: &str = "CarConnected";

/// Per-second kWh to watts
pub const KWH_PER_SECOND_TO_WATTS: f64 = 3_600_000.0;

/// EV charger object as returned by `/customers/devices/status`
///
/// The same object is sent back on `PUT /devices/evcharger`, so fields this
/// crate does not interpret are kept in `extra` and round-trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvCharger {
    pub device_gid: u64,

    pub charger_on: bool,

    #[serde(default)]
    pub charging_rate: u32,

    #[serde(default)]
    pub max_charging_rate: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_detail_text: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EvCharger {
    pub fn car_connected(&self) -> bool {
        self.icon.as_deref() == Some(CAR_CONNECTED_ICON)
    }

    /// Human readable status for logs
    pub fn label(&self) -> String {
        [&self.status, &self.icon_label, &self.icon_detail_text]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" / ")
    }

    pub fn to_status(&self) -> ChargerStatus {
        ChargerStatus {
            charger_on: self.charger_on,
            car_connected: self.car_connected(),
            charging_rate_amps: self.charging_rate,
            label: self.label(),
        }
    }

    /// Apply a desired on/off state, and the rate when switching on
    pub fn with_desired(mut self, enabled: bool, rate_amps: Option<u32>) -> Self {
        self.charger_on = enabled;
        match rate_amps {
            Some(rate) if enabled => self.with_rate(rate),
            _ => self,
        }
    }

    /// Set the charging rate, capped at what the charger allows
    pub fn with_rate(mut self, rate_amps: u32) -> Self {
        self.charging_rate = if self.max_charging_rate > 0 {
            rate_amps.min(self.max_charging_rate)
        } else {
            rate_amps
        };
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevicesStatus {
    #[serde(default)]
    ev_chargers: Vec<EvCharger>,
}

/// Pick the configured charger (or the first one) from a status response
pub fn select_charger(body: &str, device_gid: Option<u64>) -> Result<EvCharger> {
    let status: DevicesStatus = serde_json::from_str(body).map_err(|e| {
        EvSolarError::fetch(Source::Charger, format!("malformed devices status: {}", e))
    })?;
    let found = match device_gid {
        Some(gid) => status.ev_chargers.into_iter().find(|c| c.device_gid == gid),
        None => status.ev_chargers.into_iter().next(),
    };
    found.ok_or_else(|| match device_gid {
        Some(gid) => EvSolarError::fetch(
            Source::Charger,
            format!("no EV charger with device gid {} on this account", gid),
        ),
        None => EvSolarError::fetch(Source::Charger, "no EV charger on this account"),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUsage {
    /// kWh over the requested scale; null when the meter has no data yet
    #[serde(default)]
    pub usage: Option<f64>,

    #[serde(default)]
    pub nested_devices: Vec<DeviceUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUsage {
    #[serde(default)]
    pub device_gid: Option<u64>,

    #[serde(default)]
    pub channel_usages: Vec<ChannelUsage>,
}

#[derive(Debug, Deserialize)]
struct DeviceListUsages {
    #[serde(default)]
    devices: Vec<DeviceUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageResponse {
    device_list_usages: DeviceListUsages,
}

/// Sum channel usage across devices, nested devices included
pub fn sum_usage(devices: &[DeviceUsage]) -> f64 {
    devices
        .iter()
        .flat_map(|d| d.channel_usages.iter())
        .map(|c| {
            let own = c.usage.filter(|u| u.is_finite()).unwrap_or(0.0);
            own + sum_usage(&c.nested_devices)
        })
        .sum()
}

/// Parse a per-second `getDeviceListUsages` response into watts
pub fn parse_usage_watts(body: &str) -> Result<f64> {
    let resp: UsageResponse = serde_json::from_str(body).map_err(|e| {
        EvSolarError::fetch(Source::Charger, format!("malformed device usage: {}", e))
    })?;
    Ok(sum_usage(&resp.device_list_usages.devices) * KWH_PER_SECOND_TO_WATTS)
}
