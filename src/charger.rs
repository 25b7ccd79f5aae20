//! Charger control adapter
//!
//! [`ChargerControl`] switches the charger and sets its current.
//! [`ConfirmedCharger`] remembers what the charger last acknowledged so a
//! repeated request for the same state never reaches the vendor API, while a
//! failed command is retried on the next call.

use crate::error::Result;
use crate::logging::get_logger;

/// Start/stop commands for the EV charger
#[async_trait::async_trait]
pub trait ChargerControl: Send + Sync {
    /// Enable or disable charging, applying `rate_amps` when enabling
    async fn set_charging_enabled(&self, desired: bool, rate_amps: Option<u32>) -> Result<()>;

    /// Change the charging current without switching the charger
    async fn set_charging_rate(&self, amps: u32) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: ChargerControl + ?Sized> ChargerControl for Box<T> {
    async fn set_charging_enabled(&self, desired: bool, rate_amps: Option<u32>) -> Result<()> {
        (**self).set_charging_enabled(desired, rate_amps).await
    }

    async fn set_charging_rate(&self, amps: u32) -> Result<()> {
        (**self).set_charging_rate(amps).await
    }
}

/// Outcome of a reconcile call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The charger already had this state; nothing was sent
    AlreadyConfirmed,
    /// A command was sent and acknowledged
    Sent,
}

/// Idempotent wrapper around a [`ChargerControl`]
pub struct ConfirmedCharger<C> {
    inner: C,
    confirmed: Option<bool>,
    commands_sent: u64,
    logger: crate::logging::StructuredLogger,
}

impl<C: ChargerControl> ConfirmedCharger<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            confirmed: None,
            commands_sent: 0,
            logger: get_logger("charger"),
        }
    }

    /// Last state the charger acknowledged, if any
    pub fn confirmed(&self) -> Option<bool> {
        self.confirmed
    }

    pub fn is_confirmed(&self, desired: bool) -> bool {
        self.confirmed == Some(desired)
    }

    /// Record the state reported by charger telemetry
    pub fn observe(&mut self, actual: bool) {
        self.confirmed = Some(actual);
    }

    /// Drop the confirmed state; the next reading is taken as-is
    pub fn forget(&mut self) {
        self.confirmed = None;
    }

    /// Number of commands that actually reached the adapter
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Drive the charger to `desired`, sending at most one command
    ///
    /// On failure the confirmed state is left as it was, so the next call
    /// with the same desired state tries again.
    pub async fn set_charging_enabled(
        &mut self,
        desired: bool,
        rate_amps: Option<u32>,
    ) -> Result<CommandOutcome> {
        if self.is_confirmed(desired) {
            self.logger.trace(&format!(
                "Charger already {}, no command sent",
                on_off(desired)
            ));
            return Ok(CommandOutcome::AlreadyConfirmed);
        }

        self.commands_sent = self.commands_sent.saturating_add(1);
        match self.inner.set_charging_enabled(desired, rate_amps).await {
            Ok(()) => {
                self.confirmed = Some(desired);
                match rate_amps.filter(|_| desired) {
                    Some(amps) => self
                        .logger
                        .info(&format!("Charger switched on at {} A", amps)),
                    None => self
                        .logger
                        .info(&format!("Charger switched {}", on_off(desired))),
                }
                Ok(CommandOutcome::Sent)
            }
            Err(e) => {
                let e = e.into_command();
                self.logger.error(&format!(
                    "Failed to switch charger {}: {}",
                    on_off(desired),
                    e
                ));
                Err(e)
            }
        }
    }

    /// Move a running charge to `amps`
    pub async fn set_charging_rate(&mut self, from_amps: u32, amps: u32) -> Result<()> {
        self.commands_sent = self.commands_sent.saturating_add(1);
        match self.inner.set_charging_rate(amps).await {
            Ok(()) => {
                self.logger
                    .info(&format!("Charging rate {} A -> {} A", from_amps, amps));
                Ok(())
            }
            Err(e) => {
                let e = e.into_command();
                self.logger
                    .warn(&format!("Failed to set charging rate {} A: {}", amps, e));
                Err(e)
            }
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
