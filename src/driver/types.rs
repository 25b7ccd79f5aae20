use crate::charger::{ChargerControl, CommandOutcome};
use crate::controls::Evaluation;
use crate::schedule::Gate;
use crate::telemetry::{BatteryClient, ChargerClient, SolarClient, Source};

/// Adapters the driver runs against
pub struct DriverComponents {
    pub solar: SolarClient,
    pub battery: BatteryClient,
    pub charger_telemetry: ChargerClient,
    pub charger_control: Box<dyn ChargerControl>,
}

/// What a single cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A reading failed; the decision was left alone
    FetchFailed(Source),
    /// The cycle ran past its deadline
    TimedOut,
    /// Window closed or control suspended with nothing to wind down
    Gated(Gate),
    /// No vehicle plugged in; the decision is held
    NoVehicle,
    /// The charger was switched outside evsolar; waiting for it to match again
    ExternalOverride { observed_on: bool },
    /// The rule ran and the charger matches the decision
    Decided {
        evaluation: Evaluation,
        command: CommandOutcome,
        /// Charging current sent this cycle, with the switch-on or as an adjustment
        rate_amps: Option<u32>,
    },
    /// The rule ran but the charger did not accept the command
    CommandFailed { evaluation: Evaluation },
}

impl CycleOutcome {
    /// Cycles that ended without usable readings
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::FetchFailed(_) | Self::TimedOut)
    }
}

/// Running counters, reported at shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    pub skipped: u64,
    pub timeouts: u64,
    pub command_failures: u64,
    pub transitions: u64,
    pub rate_changes: u64,
    pub overrides: u64,
}

impl CycleStats {
    pub(crate) fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles = self.cycles.saturating_add(1);
        if outcome.is_skip() {
            self.skipped = self.skipped.saturating_add(1);
        }
        match outcome {
            CycleOutcome::TimedOut => self.timeouts = self.timeouts.saturating_add(1),
            CycleOutcome::ExternalOverride { .. } => {
                self.overrides = self.overrides.saturating_add(1);
            }
            CycleOutcome::CommandFailed { evaluation } => {
                self.command_failures = self.command_failures.saturating_add(1);
                if evaluation.changed {
                    self.transitions = self.transitions.saturating_add(1);
                }
            }
            CycleOutcome::Decided {
                evaluation,
                command,
                rate_amps,
            } => {
                if evaluation.changed {
                    self.transitions = self.transitions.saturating_add(1);
                }
                if rate_amps.is_some() && *command == CommandOutcome::AlreadyConfirmed {
                    self.rate_changes = self.rate_changes.saturating_add(1);
                }
            }
            _ => {}
        }
    }
}
