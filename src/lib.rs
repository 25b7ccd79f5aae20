//! # evsolar - charge an EV from excess solar
//!
//! Polls a solar/battery monitoring API and an Emporia EV charger, and
//! switches the charger on while there is sustained solar surplus and off
//! again once it is gone.
//!
//! ## Architecture
//!
//! - `config`: YAML/env configuration and validation
//! - `logging`: tracing setup and component loggers
//! - `telemetry`: readings and the read-only client contract, power-flow adapters
//! - `emporia`: Emporia cloud session, charger telemetry and control
//! - `charger`: charger control contract and confirmed-state wrapper
//! - `controls`: the start/stop hysteresis rule
//! - `schedule`: charging window and disable file
//! - `driver`: the polling decision loop
//! - `persistence`: session token storage

pub mod charger;
pub mod config;
pub mod controls;
pub mod driver;
pub mod emporia;
pub mod error;
pub mod http;
pub mod logging;
pub mod persistence;
pub mod schedule;
pub mod telemetry;


// Re-export commonly used types
pub use config::Config;
pub use driver::ChargeDriver;
pub use error::{EvSolarError, Result};
