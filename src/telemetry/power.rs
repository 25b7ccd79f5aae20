//! Power-flow adapters: solar production, site load and battery reserve
//!
//! Two vendors are supported, selected by `power.source`:
//! a pyPowerwall proxy in front of a Tesla gateway, and the SolarEdge
//! monitoring API.

use super::{BatteryClient, Reading, SolarClient, SolarReading, Source, TelemetryClient};
use crate::config::{PowerConfig, PowerSource};
use crate::error::{EvSolarError, Result};
use crate::http::{build_client, join_url, read_text};
use crate::logging::get_logger;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Vendor API reporting production, load and reserve
#[async_trait::async_trait]
pub trait PowerFlowApi: Send + Sync {
    /// Vendor name for logs
    fn name(&self) -> &'static str;

    async fn solar(&self) -> Result<SolarReading>;

    async fn battery_reserve(&self) -> Result<Reading>;
}

/// Solar telemetry client over a power-flow API
pub struct SolarTelemetry<A: ?Sized>(pub Arc<A>);

/// Battery reserve telemetry client over a power-flow API
pub struct BatteryTelemetry<A: ?Sized>(pub Arc<A>);

#[async_trait::async_trait]
impl<A: PowerFlowApi + ?Sized> TelemetryClient for SolarTelemetry<A> {
    type Output = SolarReading;

    fn source(&self) -> Source {
        Source::Solar
    }

    async fn fetch_reading(&self) -> Result<SolarReading> {
        self.0.solar().await.map_err(|e| e.into_fetch(Source::Solar))
    }
}

#[async_trait::async_trait]
impl<A: PowerFlowApi + ?Sized> TelemetryClient for BatteryTelemetry<A> {
    type Output = Reading;

    fn source(&self) -> Source {
        Source::Battery
    }

    async fn fetch_reading(&self) -> Result<Reading> {
        self.0
            .battery_reserve()
            .await
            .map_err(|e| e.into_fetch(Source::Battery))
    }
}

/// Build the solar and battery clients for the configured vendor
pub fn build_clients(cfg: &PowerConfig, timeout: Duration) -> Result<(SolarClient, BatteryClient)> {
    let api: Arc<dyn PowerFlowApi> = match cfg.source {
        PowerSource::PypowerwallProxy => {
            Arc::new(PypowerwallProxy::new(&cfg.pypowerwall_base_url, timeout)?)
        }
        PowerSource::SolarEdge => Arc::new(SolarEdge::new(
            &cfg.solaredge_base_url,
            &cfg.solaredge_site,
            &cfg.solaredge_key,
            timeout,
        )?),
    };
    get_logger("power").info(&format!("Using {} for solar and battery", api.name()));
    let solar: SolarClient = Box::new(SolarTelemetry(api.clone()));
    let battery: BatteryClient = Box::new(BatteryTelemetry(api));
    Ok((solar, battery))
}

// ── pyPowerwall proxy ──

#[derive(Debug, Deserialize)]
struct Meter {
    instant_power: f64,
}

#[derive(Debug, Deserialize)]
struct Aggregates {
    solar: Meter,
    load: Meter,
}

#[derive(Debug, Deserialize)]
struct StateOfEnergy {
    percentage: f64,
}

/// Parse a `/aggregates` response
pub fn parse_aggregates(body: &str) -> Result<SolarReading> {
    let agg: Aggregates = serde_json::from_str(body)
        .map_err(|e| EvSolarError::fetch(Source::Solar, format!("malformed aggregates: {}", e)))?;
    Ok(SolarReading {
        production: Reading::watts(Source::Solar, agg.solar.instant_power).checked()?,
        site_load: Reading::watts(Source::SiteLoad, agg.load.instant_power).checked()?,
    })
}

/// Parse a `/soe` response
pub fn parse_soe(body: &str) -> Result<Reading> {
    let soe: StateOfEnergy = serde_json::from_str(body)
        .map_err(|e| EvSolarError::fetch(Source::Battery, format!("malformed soe: {}", e)))?;
    Reading::percent(Source::Battery, soe.percentage).checked()
}

/// pyPowerwall proxy client
pub struct PypowerwallProxy {
    http: reqwest::Client,
    base_url: String,
    logger: crate::logging::StructuredLogger,
}

impl PypowerwallProxy {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.trim().to_string(),
            logger: get_logger("pypowerwall"),
        })
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = join_url(&self.base_url, path);
        self.logger.debug(&format!("GET {}", url));
        let resp = self.http.get(&url).send().await?;
        read_text(resp).await
    }
}

#[async_trait::async_trait]
impl PowerFlowApi for PypowerwallProxy {
    fn name(&self) -> &'static str {
        "pyPowerwall proxy"
    }

    async fn solar(&self) -> Result<SolarReading> {
        let body = self.get_text("/aggregates").await?;
        parse_aggregates(&body)
    }

    async fn battery_reserve(&self) -> Result<Reading> {
        let body = self.get_text("/soe").await?;
        parse_soe(&body)
    }
}

// ── SolarEdge monitoring API ──

#[derive(Debug, Deserialize)]
struct FlowElement {
    #[serde(rename = "currentPower")]
    current_power: f64,
    #[serde(rename = "chargeLevel")]
    charge_level: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SiteCurrentPowerFlow {
    #[serde(default = "default_unit")]
    unit: String,
    #[serde(rename = "PV")]
    pv: FlowElement,
    #[serde(rename = "LOAD")]
    load: FlowElement,
    #[serde(rename = "STORAGE")]
    storage: Option<FlowElement>,
}

fn default_unit() -> String {
    "kW".to_string()
}

#[derive(Debug, Deserialize)]
struct PowerFlowResponse {
    #[serde(rename = "siteCurrentPowerFlow")]
    flow: SiteCurrentPowerFlow,
}

fn unit_scale(unit: &str) -> Option<f64> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "w" => Some(1.0),
        "kw" => Some(1_000.0),
        "mw" => Some(1_000_000.0),
        _ => None,
    }
}

fn parse_power_flow(body: &str, origin: Source) -> Result<SiteCurrentPowerFlow> {
    let resp: PowerFlowResponse = serde_json::from_str(body).map_err(|e| {
        EvSolarError::fetch(origin, format!("malformed currentPowerFlow: {}", e))
    })?;
    Ok(resp.flow)
}

/// Parse a `currentPowerFlow` response into solar and site load readings
pub fn parse_solaredge_solar(body: &str) -> Result<SolarReading> {
    let flow = parse_power_flow(body, Source::Solar)?;
    let scale = unit_scale(&flow.unit).ok_or_else(|| {
        EvSolarError::fetch(Source::Solar, format!("unknown power unit '{}'", flow.unit))
    })?;
    Ok(SolarReading {
        production: Reading::watts(Source::Solar, flow.pv.current_power * scale).checked()?,
        site_load: Reading::watts(Source::SiteLoad, flow.load.current_power * scale).checked()?,
    })
}

/// Parse a `currentPowerFlow` response into the storage charge level
///
/// A site without a `STORAGE` element (or without its charge level) reads
/// as an empty battery, so only a zero reserve minimum lets it charge.
pub fn parse_solaredge_reserve(body: &str) -> Result<Reading> {
    let flow = parse_power_flow(body, Source::Battery)?;
    let level = flow.storage.and_then(|s| s.charge_level).unwrap_or(0.0);
    Reading::percent(Source::Battery, level).checked()
}

/// Solar and reserve come from the same endpoint; one response serves both
/// reads of a cycle instead of spending two calls of the daily quota.
const SOLAREDGE_REUSE_WINDOW: Duration = Duration::from_secs(5);

/// SolarEdge monitoring API client
pub struct SolarEdge {
    http: reqwest::Client,
    base_url: String,
    site: String,
    api_key: String,
    last_body: tokio::sync::Mutex<Option<(Instant, String)>>,
    logger: crate::logging::StructuredLogger,
}

impl SolarEdge {
    pub fn new(base_url: &str, site: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.trim().to_string(),
            site: site.trim().to_string(),
            api_key: api_key.trim().to_string(),
            last_body: tokio::sync::Mutex::new(None),
            logger: get_logger("solaredge"),
        })
    }

    async fn current_power_flow(&self) -> Result<String> {
        let mut cached = self.last_body.lock().await;
        if let Some((at, body)) = cached.as_ref()
            && at.elapsed() < SOLAREDGE_REUSE_WINDOW
        {
            return Ok(body.clone());
        }

        let url = join_url(
            &self.base_url,
            &format!("/site/{}/currentPowerFlow", self.site),
        );
        self.logger.debug(&format!("GET {}", url));
        let resp = self
            .http
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?;
        let body = read_text(resp).await?;
        *cached = Some((Instant::now(), body.clone()));
        Ok(body)
    }
}

#[async_trait::async_trait]
impl PowerFlowApi for SolarEdge {
    fn name(&self) -> &'static str {
        "SolarEdge"
    }

    async fn solar(&self) -> Result<SolarReading> {
        let body = self.current_power_flow().await?;
        parse_solaredge_solar(&body)
    }

    async fn battery_reserve(&self) -> Result<Reading> {
        let body = self.current_power_flow().await?;
        parse_solaredge_reserve(&body)
    }
}
