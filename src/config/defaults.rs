use super::*;

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            source: PowerSource::PypowerwallProxy,
            pypowerwall_base_url: "http://localhost:8675".to_string(),
            solaredge_site: String::new(),
            solaredge_key: String::new(),
            solaredge_base_url: "https://monitoringapi.solaredge.com".to_string(),
        }
    }
}

impl Default for EmporiaConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            token_file: ".credentials/emporia-access.json".to_string(),
            device_gid: None,
            charge_rate_amps: None,
            api_base_url: "https://api.emporiaenergy.com".to_string(),
            cognito_url: "https://cognito-idp.us-east-2.amazonaws.com/".to_string(),
            cognito_client_id: "4qte47jbstod8apnfic0bunmrq".to_string(),
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            start_surplus_watts: 1500.0,
            hysteresis_watts: 300.0,
            min_battery_reserve_percent: 20.0,
            start_confirm_cycles: 1,
            stop_confirm_cycles: 1,
        }
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            tracking: true,
            min_amps: MIN_CHARGE_RATE_AMPS,
            max_amps: MAX_CHARGE_RATE_AMPS,
            smooth_cycles: 5,
            offset_amps: 0,
            line_voltage: 240.0,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            latitude: None,
            longitude: None,
            sunrise_api_url: "https://api.sunrisesunset.io/json".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            cycle_timeout_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: None,
            backup_count: 5,
            console_output: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            power: PowerConfig::default(),
            emporia: EmporiaConfig::default(),
            thresholds: ThresholdsConfig::default(),
            rate: RateConfig::default(),
            schedule: ScheduleConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            poll_interval_secs: 30,
            timezone: "local".to_string(),
            disable_file: Some("volume/disable".to_string()),
            disable_dns_txt: None,
        }
    }
}
