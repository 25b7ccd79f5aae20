//! Emporia cloud adapter
//!
//! The charger is only reachable through Emporia's cloud. One
//! [`EmporiaApi`] holds the Cognito session and the last charger object seen;
//! [`EmporiaCharger`] hands it out both as charger telemetry and as charger
//! control.

mod auth;
mod client;
pub mod types;

pub use auth::{AuthenticationResult, Session, parse_auth_response};
pub use client::{EmporiaApi, EmporiaCharger, build_charger};
