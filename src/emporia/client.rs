//! Emporia charger telemetry and control

use super::auth::Session;
use super::types::{EvCharger, parse_usage_watts, select_charger};
use crate::charger::ChargerControl;
use crate::config::EmporiaConfig;
use crate::error::{EvSolarError, Result};
use crate::http::{build_client, join_url, read_text};
use crate::logging::{LogContext, get_logger_with_context};
use crate::telemetry::{ChargerClient, ChargerReading, Reading, Source, TelemetryClient};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const AUTH_HEADER: &str = "authtoken";

/// Authenticated Emporia API access shared by telemetry and control
pub struct EmporiaApi {
    http: reqwest::Client,
    base_url: String,
    device_gid: Option<u64>,
    session: Mutex<Session>,
    last_charger: Mutex<Option<EvCharger>>,
    logger: crate::logging::StructuredLogger,
}

impl EmporiaApi {
    pub fn new(cfg: &EmporiaConfig, timeout: Duration) -> Result<Self> {
        let http = build_client(timeout)?;
        let session = Session::new(http.clone(), cfg);
        let gid = cfg
            .device_gid
            .map_or_else(|| "first".to_string(), |gid| gid.to_string());
        Ok(Self {
            http,
            base_url: cfg.api_base_url.trim().to_string(),
            device_gid: cfg.device_gid,
            session: Mutex::new(session),
            last_charger: Mutex::new(None),
            logger: get_logger_with_context(LogContext::new("emporia").with_field("gid", gid)),
        })
    }

    /// Send a request with the session token, re-authenticating once if
    /// the API rejects it
    async fn send_authed<F>(&self, build: F) -> Result<String>
    where
        F: Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder + Send,
    {
        let mut session = self.session.lock().await;
        let token = session.ensure_token().await?;
        let resp = build(&self.http, &token).send().await?;
        match read_text(resp).await {
            Err(EvSolarError::Auth { message }) => {
                self.logger
                    .info(&format!("Emporia rejected session ({}), re-authenticating", message));
                let token = session.reauthenticate().await?;
                let resp = build(&self.http, &token).send().await?;
                read_text(resp).await
            }
            other => other,
        }
    }

    /// Fetch the charger object and remember it for the next update
    pub async fn charger_status(&self) -> Result<EvCharger> {
        let url = join_url(&self.base_url, "/customers/devices/status");
        let body = self
            .send_authed(|http, token| http.get(url.as_str()).header(AUTH_HEADER, token))
            .await?;
        let charger = select_charger(&body, self.device_gid)?;
        *self.last_charger.lock().await = Some(charger.clone());
        Ok(charger)
    }

    /// Current draw of the charger in watts, from the per-second usage
    pub async fn charger_draw_watts(&self, device_gid: u64, instant: DateTime<Utc>) -> Result<f64> {
        let url = join_url(&self.base_url, "/AppAPI");
        let gids = device_gid.to_string();
        let instant = instant.to_rfc3339_opts(SecondsFormat::Secs, true);
        let body = self
            .send_authed(|http, token| {
                http.get(url.as_str())
                    .header(AUTH_HEADER, token)
                    .query(&[
                        ("apiMethod", "getDeviceListUsages"),
                        ("deviceGids", gids.as_str()),
                        ("instant", instant.as_str()),
                        ("scale", "1S"),
                        ("energyUnit", "KilowattHours"),
                    ])
            })
            .await?;
        parse_usage_watts(&body)
    }

    /// Status plus draw; draw is only queried while the charger is on
    pub async fn read_charger(&self) -> Result<ChargerReading> {
        let charger = self.charger_status().await?;
        let watts = if charger.charger_on {
            self.charger_draw_watts(charger.device_gid, Utc::now())
                .await?
        } else {
            0.0
        };
        let status = charger.to_status();
        self.logger.debug(&format!(
            "Charger {} on={} car={} rate={}A draw={:.0}W",
            charger.device_gid, status.charger_on, status.car_connected, status.charging_rate_amps, watts
        ));
        Ok(ChargerReading {
            draw: Reading::watts(Source::Charger, watts).checked()?,
            status,
        })
    }

    /// Switch the charger on or off; `rate_amps` is applied when switching on
    pub async fn update_charger(&self, enabled: bool, rate_amps: Option<u32>) -> Result<()> {
        let charger = self.cached_charger().await?;
        self.put_charger(charger.with_desired(enabled, rate_amps)).await
    }

    /// Change the charging rate, leaving the on/off state alone
    pub async fn update_rate(&self, rate_amps: u32) -> Result<()> {
        let charger = self.cached_charger().await?;
        self.put_charger(charger.with_rate(rate_amps)).await
    }

    async fn cached_charger(&self) -> Result<EvCharger> {
        let cached = self.last_charger.lock().await.clone();
        match cached {
            Some(c) => Ok(c),
            None => self.charger_status().await,
        }
    }

    async fn put_charger(&self, charger: EvCharger) -> Result<()> {
        let url = join_url(&self.base_url, "/devices/evcharger");
        let body = self
            .send_authed(|http, token| {
                http.put(url.as_str())
                    .header(AUTH_HEADER, token)
                    .json(&charger)
            })
            .await?;
        let updated = match serde_json::from_str::<EvCharger>(&body) {
            Ok(updated) => updated,
            Err(_) => charger,
        };
        *self.last_charger.lock().await = Some(updated);
        Ok(())
    }
}

/// Emporia charger handle; clones share one session
#[derive(Clone)]
pub struct EmporiaCharger {
    api: Arc<EmporiaApi>,
}

impl EmporiaCharger {
    pub fn new(api: Arc<EmporiaApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl TelemetryClient for EmporiaCharger {
    type Output = ChargerReading;

    fn source(&self) -> Source {
        Source::Charger
    }

    async fn fetch_reading(&self) -> Result<ChargerReading> {
        self.api
            .read_charger()
            .await
            .map_err(|e| e.into_fetch(Source::Charger))
    }
}

#[async_trait::async_trait]
impl ChargerControl for EmporiaCharger {
    async fn set_charging_enabled(&self, desired: bool, rate_amps: Option<u32>) -> Result<()> {
        self.api
            .update_charger(desired, rate_amps)
            .await
            .map_err(EvSolarError::into_command)
    }

    async fn set_charging_rate(&self, amps: u32) -> Result<()> {
        self.api
            .update_rate(amps)
            .await
            .map_err(EvSolarError::into_command)
    }
}

/// Build the charger telemetry client and control adapter over one session
pub fn build_charger(
    cfg: &EmporiaConfig,
    timeout: Duration,
) -> Result<(ChargerClient, Box<dyn ChargerControl>)> {
    let charger = EmporiaCharger::new(Arc::new(EmporiaApi::new(cfg, timeout)?));
    let telemetry: ChargerClient = Box::new(charger.clone());
    let control: Box<dyn ChargerControl> = Box::new(charger);
    Ok((telemetry, control))
}
