use evsolar::config::{Config, PowerSource};
use std::collections::HashMap;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn env_overrides_fill_the_config() {
    let mut config = Config::default();
    config
        .apply_env_overrides(lookup(&[
            ("POWER_API_SOURCE", "solar_edge"),
            ("SOLAREDGE_SITE", "123456"),
            ("SOLAREDGE_KEY", "ABCDEF"),
            ("EMPORIA_USER", "owner@example.com"),
            ("EMPORIA_PASSWORD", "hunter2"),
            ("EMPORIA_DEVICE_GID", "424242"),
            ("CHARGE_RATE_AMPS", "16"),
            ("START_THRESHOLD_WATTS", "2000"),
            ("HYSTERESIS_WATTS", "500"),
            ("MIN_BATTERY_RESERVE", "35"),
            ("WAIT_START", "3"),
            ("WAIT_STOP", "2"),
            ("FREQ", "60"),
            ("TIMEZONE", "Europe/Amsterdam"),
            ("SCHEDULE_START", "08:00"),
            ("SCHEDULE_END", "18:30"),
        ]))
        .unwrap();

    assert_eq!(config.power.source, PowerSource::SolarEdge);
    assert_eq!(config.power.solaredge_site, "123456");
    assert_eq!(config.emporia.device_gid, Some(424_242));
    assert_eq!(config.emporia.charge_rate_amps, Some(16));
    assert!((config.thresholds.start_surplus_watts - 2000.0).abs() < f64::EPSILON);
    assert!((config.thresholds.hysteresis_watts - 500.0).abs() < f64::EPSILON);
    assert!((config.thresholds.min_battery_reserve_percent - 35.0).abs() < f64::EPSILON);
    assert_eq!(config.thresholds.start_confirm_cycles, 3);
    assert_eq!(config.thresholds.stop_confirm_cycles, 2);
    assert_eq!(config.poll_interval_secs, 60);
    assert_eq!(config.schedule.end.as_deref(), Some("18:30"));
    assert!(config.validate().is_ok());
}

#[test]
fn missing_credentials_fail_validation() {
    let mut config = Config::default();
    config
        .apply_env_overrides(lookup(&[("EMPORIA_USER", "owner@example.com")]))
        .unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("EMPORIA_PASSWORD"));
}

#[test]
fn empty_values_are_ignored() {
    let mut config = Config::default();
    config
        .apply_env_overrides(lookup(&[("FREQ", "  "), ("TIMEZONE", "")]))
        .unwrap();
    assert_eq!(config.poll_interval_secs, 30);
    assert_eq!(config.timezone, "local");
}

#[test]
fn bad_numbers_name_the_variable() {
    let mut config = Config::default();
    let err = config
        .apply_env_overrides(lookup(&[("START_THRESHOLD_WATTS", "lots")]))
        .unwrap_err();
    assert!(err.to_string().contains("START_THRESHOLD_WATTS"));

    let err = Config::default()
        .apply_env_overrides(lookup(&[("POWER_API_SOURCE", "sunpower")]))
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("sunpower"));
}

#[test]
fn verbose_switches_to_debug() {
    let mut config = Config::default();
    config
        .apply_env_overrides(lookup(&[("LOG_LEVEL", "WARN"), ("VERBOSE", "1")]))
        .unwrap();
    assert_eq!(config.logging.level, "DEBUG");

    let mut config = Config::default();
    config
        .apply_env_overrides(lookup(&[("VERBOSE", "false")]))
        .unwrap();
    assert_eq!(config.logging.level, "INFO");
}

#[test]
fn yaml_file_roundtrip_keeps_secrets_out() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let mut config = Config::default();
    config.emporia.username = "owner@example.com".into();
    config.emporia.password = "hunter2".into();
    config.thresholds.start_surplus_watts = 1800.0;
    config.save_to_file(tmp.path()).unwrap();

    let written = std::fs::read_to_string(tmp.path()).unwrap();
    assert!(!written.contains("hunter2"));

    let loaded = Config::from_file(tmp.path()).unwrap();
    assert_eq!(loaded.emporia.username, "owner@example.com");
    assert!((loaded.thresholds.start_surplus_watts - 1800.0).abs() < f64::EPSILON);
    assert!(loaded.validate().is_err());
}

#[test]
fn partial_yaml_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        tmp.path(),
        "emporia:\n  username: a@b.c\n  password: pw\nthresholds:\n  hysteresis_watts: 250\n",
    )
    .unwrap();
    let config = Config::from_file(tmp.path()).unwrap();
    assert!((config.thresholds.hysteresis_watts - 250.0).abs() < f64::EPSILON);
    assert!((config.thresholds.start_surplus_watts - 1500.0).abs() < f64::EPSILON);
    assert!(config.validate().is_ok());
}

#[test]
fn schedule_accepts_iso_datetimes() {
    use chrono::NaiveTime;
    use evsolar::schedule::ChargingWindow;

    let mut config = Config::default();
    config
        .apply_env_overrides(lookup(&[
            ("EMPORIA_USER", "owner@example.com"),
            ("EMPORIA_PASSWORD", "hunter2"),
            ("SCHEDULE_START", "2025-01-01T08:00:00"),
            ("SCHEDULE_END", "2025-01-01 17:45:00"),
        ]))
        .unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(
        ChargingWindow::from_config(&config.schedule).unwrap(),
        ChargingWindow::Fixed {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 45, 0).unwrap(),
        }
    );

    config.schedule.start = Some("2025-13-01T08:00:00".into());
    assert!(config.validate().is_err());
}

#[test]
fn rate_settings_from_env() {
    let mut config = Config::default();
    config
        .apply_env_overrides(lookup(&[
            ("EMPORIA_USER", "owner@example.com"),
            ("EMPORIA_PASSWORD", "hunter2"),
            ("MIN_AMPS", "8"),
            ("MAX_AMPS", "32"),
            ("SMOOTH", "3"),
            ("OFFSET_AMPS", "-2"),
            ("LINE_VOLTAGE", "230"),
            ("DISABLE_DNS_TXT", "evsolar-disable.example.net"),
        ]))
        .unwrap();
    assert!(config.rate.tracking);
    assert_eq!(config.rate.min_amps, 8);
    assert_eq!(config.rate.max_amps, 32);
    assert_eq!(config.rate.smooth_cycles, 3);
    assert_eq!(config.rate.offset_amps, -2);
    assert!((config.rate.line_voltage - 230.0).abs() < f64::EPSILON);
    assert_eq!(
        config.disable_dns_txt.as_deref(),
        Some("evsolar-disable.example.net")
    );
    assert!(config.validate().is_ok());

    config
        .apply_env_overrides(lookup(&[("RATE_TRACKING", "false")]))
        .unwrap();
    assert!(!config.rate.tracking);
}

#[test]
fn rate_limits_are_validated() {
    let mut config = Config::default();
    config.emporia.username = "owner@example.com".into();
    config.emporia.password = "hunter2".into();
    config.rate.min_amps = 20;
    config.rate.max_amps = 10;
    assert!(config.validate().is_err());

    config.rate.min_amps = 4;
    config.rate.max_amps = 16;
    assert!(config.validate().is_err());

    config.rate.min_amps = 6;
    config.rate.smooth_cycles = 0;
    assert!(config.validate().is_err());
}
