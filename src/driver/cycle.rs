use super::ChargeDriver;
use super::types::CycleOutcome;
use crate::charger::CommandOutcome;
use crate::controls::{
    ChargeState, DecisionInputs, Evaluation, estimate_base_load, evaluate, surplus_watts,
};
use crate::error::EvSolarError;
use crate::schedule::Gate;
use crate::telemetry::{ChargerReading, Source};
use chrono::{DateTime, Utc};

impl ChargeDriver {
    /// Run one decision cycle at `now`
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let outcome = self.cycle(now).await;
        self.stats.record(&outcome);
        outcome
    }

    /// Count a cycle that did not finish in time
    pub(crate) fn record_timeout(&mut self) {
        self.logger.warn(&format!(
            "Cycle exceeded {}s, skipped",
            self.cycle_timeout.as_secs()
        ));
        self.stats.record(&CycleOutcome::TimedOut);
    }

    async fn cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        match self.schedule.gate(now).await {
            Gate::Open => {}
            Gate::Closed => return self.wind_down(now).await,
            Gate::Suspended => return self.hands_off(),
        }

        let solar = match self.solar.fetch_reading().await {
            Ok(r) => r,
            Err(e) => return self.skip(Source::Solar, &e),
        };
        let battery = match self.battery.fetch_reading().await {
            Ok(r) => r,
            Err(e) => return self.skip(Source::Battery, &e),
        };
        let charger = match self.charger_telemetry.fetch_reading().await {
            Ok(r) => r,
            Err(e) => return self.skip(Source::Charger, &e),
        };

        if let Some(outcome) = self.sync_with_charger(&charger, now) {
            return outcome;
        }

        if !charger.status.car_connected {
            self.logger.info(&format!(
                "No vehicle connected ({}), holding {}",
                charger.status.label, self.decision.state
            ));
            self.clear_history();
            return CycleOutcome::NoVehicle;
        }

        let draw = charger.draw.value;
        let base_load = estimate_base_load(solar.site_load.value, draw);
        let surplus = surplus_watts(solar.production.value, base_load, draw);
        self.window.push(surplus);
        self.available
            .push(surplus + draw - self.thresholds.stop_threshold_watts());

        let inputs = DecisionInputs::new(surplus, battery.value);
        let evaluation = evaluate(self.decision, &inputs, &self.thresholds, &self.window, now);
        self.logger.info(&format!(
            "solar={:.0}W load={:.0}W ev={:.0}W@{}A surplus={:.0}W reserve={:.1}% -> {} ({})",
            solar.production.value,
            base_load,
            draw,
            charger.status.charging_rate_amps,
            surplus,
            battery.value,
            evaluation.decision.state,
            evaluation.reason
        ));
        self.apply(evaluation, Some(charger.status.charging_rate_amps))
            .await
    }

    /// Outside the window: stop charging if needed, otherwise do nothing
    async fn wind_down(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        self.clear_history();
        if !self.decision.is_charging() && self.charger.confirmed() != Some(true) {
            self.logger.debug("Outside the charging window, nothing to do");
            return CycleOutcome::Gated(Gate::Closed);
        }
        let evaluation = evaluate(
            self.decision,
            &DecisionInputs::window_closed(),
            &self.thresholds,
            &self.window,
            now,
        );
        self.logger.info(&format!(
            "Charging window closed -> {} ({})",
            evaluation.decision.state, evaluation.reason
        ));
        self.apply(evaluation, None).await
    }

    /// Suspended: no readings, no commands
    ///
    /// The charger may be operated by hand meanwhile, so its state is read
    /// afresh once control resumes.
    fn hands_off(&mut self) -> CycleOutcome {
        self.clear_history();
        self.charger.forget();
        self.overridden = false;
        self.logger
            .debug("Automatic control suspended, leaving the charger alone");
        CycleOutcome::Gated(Gate::Suspended)
    }

    /// Store the decision and drive the charger to match it
    async fn apply(&mut self, evaluation: Evaluation, current_amps: Option<u32>) -> CycleOutcome {
        if evaluation.changed {
            self.logger.info(&format!(
                "Decision {} -> {}: {}",
                self.decision.state, evaluation.decision.state, evaluation.reason
            ));
        }
        self.decision = evaluation.decision;
        let charging = self.decision.is_charging();
        let start_amps = if charging {
            self.rate.start_amps(&self.available)
        } else {
            None
        };

        let command = match self.charger.set_charging_enabled(charging, start_amps).await {
            Ok(command) => command,
            Err(e) => {
                self.logger
                    .warn(&format!("Charger not updated, retrying next cycle: {}", e));
                return CycleOutcome::CommandFailed { evaluation };
            }
        };
        let rate_amps = match (command, current_amps) {
            (CommandOutcome::Sent, _) => start_amps,
            (CommandOutcome::AlreadyConfirmed, Some(current)) if charging => {
                self.adjust_rate(current).await
            }
            (CommandOutcome::AlreadyConfirmed, _) => None,
        };
        CycleOutcome::Decided {
            evaluation,
            command,
            rate_amps,
        }
    }

    /// Follow the available power while charging; never switches the charger
    async fn adjust_rate(&mut self, current_amps: u32) -> Option<u32> {
        let amps = self.rate.adjustment(&self.available, current_amps)?;
        // A failure is logged by the charger wrapper; telemetry still shows
        // the old rate so the next cycle tries again
        self.charger
            .set_charging_rate(current_amps, amps)
            .await
            .ok()
            .map(|()| amps)
    }

    /// Compare the charger with the last confirmed state
    ///
    /// Returns an outcome when the cycle must stop here because the charger
    /// was switched outside evsolar. Control resumes once the charger is
    /// back in the confirmed state.
    fn sync_with_charger(
        &mut self,
        charger: &ChargerReading,
        now: DateTime<Utc>,
    ) -> Option<CycleOutcome> {
        let actual = charger.status.charger_on;
        match self.charger.confirmed() {
            None => {
                self.logger.info(&format!(
                    "Charger is {} ({})",
                    on_off(actual),
                    charger.status.label
                ));
                self.charger.observe(actual);
                self.decision = self
                    .decision
                    .adopt(ChargeState::from_enabled(actual), now);
                self.clear_history();
                None
            }
            Some(confirmed) if confirmed == actual => {
                if self.overridden {
                    self.logger.info(&format!(
                        "Charger is {} again, resuming automatic control",
                        on_off(actual)
                    ));
                    self.overridden = false;
                }
                None
            }
            Some(confirmed) => {
                if !self.overridden {
                    self.logger.warn(&format!(
                        "Charger switched {} outside evsolar, waiting until it is {} again",
                        on_off(actual),
                        on_off(confirmed)
                    ));
                    self.overridden = true;
                }
                self.clear_history();
                Some(CycleOutcome::ExternalOverride {
                    observed_on: actual,
                })
            }
        }
    }

    fn clear_history(&mut self) {
        self.window.clear();
        self.available.clear();
    }

    fn skip(&self, source: Source, err: &EvSolarError) -> CycleOutcome {
        self.logger.warn(&format!(
            "Skipping cycle, {} reading failed: {}",
            source, err
        ));
        CycleOutcome::FetchFailed(source)
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
