//! Charging window and manual suspension
//!
//! The window limits automatic charging to a time of day: a fixed
//! `start`..`end` (which may wrap midnight), today's sunrise..sunset for a
//! configured location, or always. A disable file suspends automatic control
//! while it exists, and so does a DNS TXT record whose value is anything but
//! `False` or `0`.

use crate::config::{ScheduleConfig, parse_clock_time};
use crate::error::{EvSolarError, Result};
use crate::http::{build_client, read_text};
use crate::logging::get_logger;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Minutes before retrying a failed sunrise/sunset lookup
const DAYLIGHT_RETRY_MINUTES: i64 = 15;

/// Timezone used to evaluate wall-clock windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
    /// The host's local timezone
    Local,
    Named(chrono_tz::Tz),
}

impl Timezone {
    /// Wall-clock time in this timezone
    pub fn local_datetime(&self, now: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::Local => now.with_timezone(&chrono::Local).naive_local(),
            Self::Named(tz) => now.with_timezone(tz).naive_local(),
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Local => None,
            Self::Named(tz) => Some(tz.name()),
        }
    }
}

/// Parse `local` or an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Timezone> {
    let name = name.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("local") {
        return Ok(Timezone::Local);
    }
    name.parse::<chrono_tz::Tz>()
        .map(Timezone::Named)
        .map_err(|e| EvSolarError::validation("timezone", format!("'{}': {}", name, e)))
}

/// When automatic charging is allowed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChargingWindow {
    Always,
    Fixed { start: NaiveTime, end: NaiveTime },
    Daylight { latitude: f64, longitude: f64 },
}

impl ChargingWindow {
    /// A fixed schedule takes precedence over a location
    pub fn from_config(cfg: &ScheduleConfig) -> Result<Self> {
        if let (Some(start), Some(end)) = (&cfg.start, &cfg.end) {
            return Ok(Self::Fixed {
                start: parse_clock_time("schedule.start", start)?,
                end: parse_clock_time("schedule.end", end)?,
            });
        }
        if let (Some(latitude), Some(longitude)) = (cfg.latitude, cfg.longitude) {
            return Ok(Self::Daylight {
                latitude,
                longitude,
            });
        }
        Ok(Self::Always)
    }
}

impl fmt::Display for ChargingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Fixed { start, end } => write!(f, "{}-{}", start, end),
            Self::Daylight {
                latitude,
                longitude,
            } => write!(f, "sunrise-sunset at {:.4},{:.4}", latitude, longitude),
        }
    }
}

/// Whether `t` falls in `start..=end`, wrapping midnight when `end < start`
///
/// Equal bounds mean the whole day.
pub fn time_in_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start == end {
        true
    } else if start < end {
        start <= t && t <= end
    } else {
        t >= start || t <= end
    }
}

/// Sunrise and sunset for one local day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Daylight {
    pub date: NaiveDate,
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
}

impl Daylight {
    pub fn contains(&self, t: NaiveTime) -> bool {
        time_in_window(t, self.sunrise, self.sunset)
    }
}

#[derive(Debug, Deserialize)]
struct SunResults {
    date: String,
    sunrise: Option<String>,
    sunset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SunResponse {
    results: SunResults,
}

fn parse_sun_time(field: &str, value: Option<&str>) -> Result<NaiveTime> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EvSolarError::network(format!("sunrise API returned no {}", field)))?;
    NaiveTime::parse_from_str(value, "%I:%M:%S %p")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| EvSolarError::network(format!("bad {} '{}': {}", field, value, e)))
}

/// Parse a sunrisesunset.io response
pub fn parse_sunrise_response(body: &str) -> Result<Daylight> {
    let resp: SunResponse = serde_json::from_str(body)?;
    let date = NaiveDate::parse_from_str(resp.results.date.trim(), "%Y-%m-%d")?;
    Ok(Daylight {
        date,
        sunrise: parse_sun_time("sunrise", resp.results.sunrise.as_deref())?,
        sunset: parse_sun_time("sunset", resp.results.sunset.as_deref())?,
    })
}

/// Source of sunrise/sunset times
#[async_trait::async_trait]
pub trait DaylightSource: Send + Sync {
    async fn daylight(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
        timezone: Timezone,
    ) -> Result<Daylight>;
}

/// sunrisesunset.io client
pub struct SunriseSunsetApi {
    http: reqwest::Client,
    base_url: String,
}

impl SunriseSunsetApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: base_url.trim().to_string(),
        })
    }
}

#[async_trait::async_trait]
impl DaylightSource for SunriseSunsetApi {
    async fn daylight(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
        timezone: Timezone,
    ) -> Result<Daylight> {
        let mut query = vec![
            ("lat", latitude.to_string()),
            ("lng", longitude.to_string()),
            ("date", date.format("%Y-%m-%d").to_string()),
        ];
        if let Some(tz) = timezone.name() {
            query.push(("timezone", tz.to_string()));
        }
        let resp = self
            .http
            .get(self.base_url.as_str())
            .query(&query)
            .send()
            .await?;
        let body = read_text(resp).await?;
        parse_sunrise_response(&body)
    }
}

/// Source of the remote disable switch
#[async_trait::async_trait]
pub trait DisableRecord: Send + Sync {
    /// First TXT string published under `name`, `None` when there is no record
    async fn txt(&self, name: &str) -> Result<Option<String>>;
}

/// TXT lookups through the system resolver
pub struct DnsTxt {
    resolver: TokioAsyncResolver,
}

impl DnsTxt {
    /// Use the host resolver configuration, or public defaults when unreadable
    pub fn from_system() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { resolver }
    }
}

#[async_trait::async_trait]
impl DisableRecord for DnsTxt {
    async fn txt(&self, name: &str) -> Result<Option<String>> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup.iter().find_map(|txt| {
                txt.txt_data()
                    .first()
                    .map(|data| String::from_utf8_lossy(data).into_owned())
            })),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(None),
            Err(e) => Err(EvSolarError::network(format!("TXT lookup for {}: {}", name, e))),
        }
    }
}

/// Whether a disable record value suspends control
///
/// Only `False` (any case) and `0` leave control enabled.
pub fn txt_disables(value: &str) -> bool {
    let value = value.trim();
    !(value.eq_ignore_ascii_case("false") || value == "0")
}

/// What the schedule allows right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    /// Outside the charging window; charging is stopped
    Closed,
    /// Disable file or record present; the charger is left alone
    Suspended,
}

/// Charging window evaluation with cached daylight times
pub struct Schedule {
    window: ChargingWindow,
    timezone: Timezone,
    disable_file: Option<PathBuf>,
    disable_record: Option<(String, Box<dyn DisableRecord>)>,
    daylight_source: Option<Box<dyn DaylightSource>>,
    daylight: Option<Daylight>,
    next_lookup: Option<NaiveDateTime>,
    was_suspended: bool,
    logger: crate::logging::StructuredLogger,
}

impl Schedule {
    pub fn new(window: ChargingWindow, timezone: Timezone) -> Self {
        Self {
            window,
            timezone,
            disable_file: None,
            disable_record: None,
            daylight_source: None,
            daylight: None,
            next_lookup: None,
            was_suspended: false,
            logger: get_logger("schedule"),
        }
    }

    /// Build from configuration, with sunrisesunset.io for daylight windows
    pub fn from_config(cfg: &crate::config::Config) -> Result<Self> {
        let window = ChargingWindow::from_config(&cfg.schedule)?;
        let timezone = parse_timezone(&cfg.timezone)?;
        let mut schedule = Self::new(window, timezone);
        if let Some(path) = cfg.disable_file.as_deref().filter(|p| !p.trim().is_empty()) {
            schedule = schedule.with_disable_file(path);
        }
        if let Some(name) = cfg.disable_dns_txt.as_deref().filter(|n| !n.trim().is_empty()) {
            schedule = schedule.with_disable_record(name.trim(), Box::new(DnsTxt::from_system()));
        }
        if matches!(window, ChargingWindow::Daylight { .. }) {
            let api = SunriseSunsetApi::new(&cfg.schedule.sunrise_api_url, cfg.http_timeout())?;
            schedule = schedule.with_daylight_source(Box::new(api));
        }
        Ok(schedule)
    }

    pub fn with_disable_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.disable_file = Some(path.into());
        self
    }

    pub fn with_disable_record(mut self, name: &str, source: Box<dyn DisableRecord>) -> Self {
        self.disable_record = Some((name.to_string(), source));
        self
    }

    pub fn with_daylight_source(mut self, source: Box<dyn DaylightSource>) -> Self {
        self.daylight_source = Some(source);
        self
    }

    pub fn window(&self) -> ChargingWindow {
        self.window
    }

    /// Last known daylight times
    pub fn daylight(&self) -> Option<Daylight> {
        self.daylight
    }

    async fn suspended(&mut self) -> bool {
        let by_file = self.disable_file.as_ref().is_some_and(|p| p.exists());
        let by_record = !by_file && self.record_disables().await;
        let suspended = by_file || by_record;
        if suspended != self.was_suspended {
            if by_file {
                self.logger
                    .warn("Disable file present, automatic control suspended");
            } else if by_record {
                self.logger
                    .warn("Disable record set, automatic control suspended");
            } else {
                self.logger.info("Automatic control resumed");
            }
            self.was_suspended = suspended;
        }
        suspended
    }

    /// A failed lookup or missing record leaves control enabled
    async fn record_disables(&self) -> bool {
        let Some((name, source)) = self.disable_record.as_ref() else {
            return false;
        };
        match source.txt(name).await {
            Ok(Some(value)) => txt_disables(&value),
            Ok(None) => false,
            Err(e) => {
                self.logger.debug(&format!("Disable record not read: {}", e));
                false
            }
        }
    }

    /// Evaluate the gate at `now`
    pub async fn gate(&mut self, now: DateTime<Utc>) -> Gate {
        if self.suspended().await {
            return Gate::Suspended;
        }
        let local = self.timezone.local_datetime(now);
        let open = match self.window {
            ChargingWindow::Always => true,
            ChargingWindow::Fixed { start, end } => time_in_window(local.time(), start, end),
            ChargingWindow::Daylight {
                latitude,
                longitude,
            } => {
                self.refresh_daylight(latitude, longitude, local).await;
                // Without any known daylight times the gate stays open
                self.daylight.is_none_or(|d| d.contains(local.time()))
            }
        };
        if open { Gate::Open } else { Gate::Closed }
    }

    async fn refresh_daylight(&mut self, latitude: f64, longitude: f64, local: NaiveDateTime) {
        if self.daylight.is_some_and(|d| d.date == local.date()) {
            return;
        }
        if self.next_lookup.is_some_and(|at| local < at) {
            return;
        }
        let Some(source) = self.daylight_source.as_ref() else {
            return;
        };
        match source
            .daylight(latitude, longitude, local.date(), self.timezone)
            .await
        {
            Ok(daylight) => {
                self.logger.info(&format!(
                    "Daylight window for {}: {} - {}",
                    daylight.date, daylight.sunrise, daylight.sunset
                ));
                self.daylight = Some(daylight);
                self.next_lookup = None;
            }
            Err(e) => {
                self.logger.warn(&format!(
                    "Sunrise/sunset lookup failed, keeping previous window: {}",
                    e
                ));
                self.next_lookup = Some(local + ChronoDuration::minutes(DAYLIGHT_RETRY_MINUTES));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn fixed_window_bounds_are_inclusive() {
        assert!(time_in_window(hm(9, 0), hm(9, 0), hm(17, 0)));
        assert!(time_in_window(hm(17, 0), hm(9, 0), hm(17, 0)));
        assert!(!time_in_window(hm(17, 1), hm(9, 0), hm(17, 0)));
    }

    #[test]
    fn only_false_or_zero_keep_control_enabled() {
        assert!(!txt_disables("False"));
        assert!(!txt_disables("false"));
        assert!(!txt_disables(" 0 "));
        assert!(txt_disables("True"));
        assert!(txt_disables("1"));
        assert!(txt_disables("maintenance"));
    }

    #[test]
    fn parses_named_and_local_timezones() {
        assert_eq!(parse_timezone("local").unwrap(), Timezone::Local);
        assert_eq!(
            parse_timezone("America/Denver").unwrap(),
            Timezone::Named(chrono_tz::America::Denver)
        );
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn fixed_schedule_wins_over_location() {
        let cfg = ScheduleConfig {
            start: Some("08:00".into()),
            end: Some("18:00".into()),
            latitude: Some(40.0),
            longitude: Some(-105.0),
            ..ScheduleConfig::default()
        };
        assert_eq!(
            ChargingWindow::from_config(&cfg).unwrap(),
            ChargingWindow::Fixed {
                start: hm(8, 0),
                end: hm(18, 0)
            }
        );
    }
}
