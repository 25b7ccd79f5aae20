use super::*;
use std::str::FromStr;

/// Parse `key` into `T`, turning a bad value into a validation error
fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| EvSolarError::validation(key, format!("'{}': {}", raw, e)))
}

fn parse_flag(raw: &str) -> bool {
    let raw = raw.trim();
    raw.eq_ignore_ascii_case("true") || raw.parse::<i64>().map(|n| n != 0).unwrap_or(false)
}

/// Non-empty value of `key`
fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Overlay environment variables onto this configuration
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(&lookup, key);

        if let Some(v) = get("POWER_API_SOURCE") {
            self.power.source = v.parse()?;
        }
        if let Some(v) = get("PYPOWERWALL_PROXY_BASE_URL") {
            self.power.pypowerwall_base_url = v;
        }
        if let Some(v) = get("SOLAREDGE_SITE") {
            self.power.solaredge_site = v;
        }
        if let Some(v) = get("SOLAREDGE_KEY") {
            self.power.solaredge_key = v;
        }
        if let Some(v) = get("SOLAREDGE_BASE_URL") {
            self.power.solaredge_base_url = v;
        }

        if let Some(v) = get("EMPORIA_USER") {
            self.emporia.username = v;
        }
        if let Some(v) = get("EMPORIA_PASSWORD") {
            self.emporia.password = v;
        }
        if let Some(v) = get("EMPORIA_ACCESS_FILE") {
            self.emporia.token_file = v;
        }
        if let Some(v) = get("EMPORIA_DEVICE_GID") {
            self.emporia.device_gid = Some(parse_var("EMPORIA_DEVICE_GID", &v)?);
        }
        if let Some(v) = get("CHARGE_RATE_AMPS") {
            self.emporia.charge_rate_amps = Some(parse_var("CHARGE_RATE_AMPS", &v)?);
        }

        if let Some(v) = get("START_THRESHOLD_WATTS") {
            self.thresholds.start_surplus_watts = parse_var("START_THRESHOLD_WATTS", &v)?;
        }
        if let Some(v) = get("HYSTERESIS_WATTS") {
            self.thresholds.hysteresis_watts = parse_var("HYSTERESIS_WATTS", &v)?;
        }
        if let Some(v) = get("MIN_BATTERY_RESERVE") {
            self.thresholds.min_battery_reserve_percent = parse_var("MIN_BATTERY_RESERVE", &v)?;
        }
        if let Some(v) = get("WAIT_START") {
            self.thresholds.start_confirm_cycles = parse_var("WAIT_START", &v)?;
        }
        if let Some(v) = get("WAIT_STOP") {
            self.thresholds.stop_confirm_cycles = parse_var("WAIT_STOP", &v)?;
        }

        if let Some(v) = get("FREQ") {
            self.poll_interval_secs = parse_var("FREQ", &v)?;
        }
        if let Some(v) = get("HTTP_TIMEOUT") {
            self.http.timeout_secs = parse_var("HTTP_TIMEOUT", &v)?;
        }
        if let Some(v) = get("TIMEZONE") {
            self.timezone = v;
        }

        if let Some(v) = get("SCHEDULE_START") {
            self.schedule.start = Some(v);
        }
        if let Some(v) = get("SCHEDULE_END") {
            self.schedule.end = Some(v);
        }
        if let Some(v) = get("LOCATION_LAT") {
            self.schedule.latitude = Some(parse_var("LOCATION_LAT", &v)?);
        }
        if let Some(v) = get("LOCATION_LNG") {
            self.schedule.longitude = Some(parse_var("LOCATION_LNG", &v)?);
        }
        if let Some(v) = get("DISABLE_FILE") {
            self.disable_file = Some(v);
        }
        if let Some(v) = get("DISABLE_DNS_TXT") {
            self.disable_dns_txt = Some(v.trim().to_string());
        }

        if let Some(v) = get("RATE_TRACKING") {
            self.rate.tracking = parse_flag(&v);
        }
        if let Some(v) = get("MIN_AMPS") {
            self.rate.min_amps = parse_var("MIN_AMPS", &v)?;
        }
        if let Some(v) = get("MAX_AMPS") {
            self.rate.max_amps = parse_var("MAX_AMPS", &v)?;
        }
        if let Some(v) = get("SMOOTH") {
            self.rate.smooth_cycles = parse_var("SMOOTH", &v)?;
        }
        if let Some(v) = get("OFFSET_AMPS") {
            self.rate.offset_amps = parse_var("OFFSET_AMPS", &v)?;
        }
        if let Some(v) = get("LINE_VOLTAGE") {
            self.rate.line_voltage = parse_var("LINE_VOLTAGE", &v)?;
        }

        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("LOG_FILE") {
            self.logging.file = Some(v);
        }
        // VERBOSE wins over LOG_LEVEL
        if let Some(v) = get("VERBOSE")
            && parse_flag(&v)
        {
            self.logging.level = "DEBUG".to_string();
        }

        Ok(())
    }
}
