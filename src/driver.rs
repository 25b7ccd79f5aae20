//! Decision loop driver
//!
//! Owns the telemetry clients, the confirmed charger, the surplus and
//! charger headroom histories and the current [`ChargeDecision`]. Cycles
//! run one after another on a fixed interval; nothing here is shared with
//! another task.

mod cycle;
mod runtime;
mod types;

pub use runtime::shutdown_signal;
pub use types::{CycleOutcome, CycleStats, DriverComponents};

use crate::charger::{ChargerControl, ConfirmedCharger};
use crate::config::Config;
use crate::controls::{ChargeDecision, RatePolicy, SurplusWindow, Thresholds};
use crate::error::Result;
use crate::logging::get_logger;
use crate::schedule::Schedule;
use crate::telemetry::{BatteryClient, ChargerClient, SolarClient};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Charge-on-surplus driver
pub struct ChargeDriver {
    solar: SolarClient,
    battery: BatteryClient,
    charger_telemetry: ChargerClient,
    charger: ConfirmedCharger<Box<dyn ChargerControl>>,
    thresholds: Thresholds,
    window: SurplusWindow,
    rate: RatePolicy,
    /// Power the charger may draw while the surplus stays at the stop threshold
    available: SurplusWindow,
    decision: ChargeDecision,
    /// Set while the charger disagrees with what evsolar last confirmed
    overridden: bool,
    schedule: Schedule,
    poll_interval: Duration,
    cycle_timeout: Duration,
    stats: CycleStats,
    logger: crate::logging::StructuredLogger,
}

impl ChargeDriver {
    /// Assemble a driver from already built components
    pub fn new(
        components: DriverComponents,
        thresholds: Thresholds,
        schedule: Schedule,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            solar: components.solar,
            battery: components.battery,
            charger_telemetry: components.charger_telemetry,
            charger: ConfirmedCharger::new(components.charger_control),
            window: SurplusWindow::for_thresholds(&thresholds),
            thresholds,
            rate: RatePolicy::Unmanaged,
            available: SurplusWindow::new(1),
            decision: ChargeDecision::idle(now),
            overridden: false,
            schedule,
            poll_interval: Duration::from_secs(30),
            cycle_timeout: Duration::from_secs(60),
            stats: CycleStats::default(),
            logger: get_logger("driver"),
        }
    }

    /// Build the vendor adapters described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.http_timeout();
        let (solar, battery) = crate::telemetry::power::build_clients(&config.power, timeout)?;
        let (charger_telemetry, charger_control) =
            crate::emporia::build_charger(&config.emporia, timeout)?;
        let components = DriverComponents {
            solar,
            battery,
            charger_telemetry,
            charger_control,
        };
        let driver = Self::new(
            components,
            Thresholds::from_config(&config.thresholds),
            Schedule::from_config(config)?,
            Utc::now(),
        )
        .with_timing(config.poll_interval(), config.cycle_timeout())
        .with_rate_policy(RatePolicy::from_config(
            &config.rate,
            config.emporia.charge_rate_amps,
        ));
        Ok(driver)
    }

    pub fn with_timing(mut self, poll_interval: Duration, cycle_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.cycle_timeout = cycle_timeout;
        self
    }

    pub fn with_rate_policy(mut self, rate: RatePolicy) -> Self {
        self.available = SurplusWindow::new(rate.history_len());
        self.rate = rate;
        self
    }

    pub fn decision(&self) -> ChargeDecision {
        self.decision
    }

    /// Last charger state acknowledged by the charger
    pub fn confirmed(&self) -> Option<bool> {
        self.charger.confirmed()
    }

    /// Commands that reached the charger adapter
    pub fn commands_sent(&self) -> u64 {
        self.charger.commands_sent()
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }
}
