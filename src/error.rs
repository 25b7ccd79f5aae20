//! Error types and handling for evsolar
//!
//! The decision loop only cares about three kinds of failure: fatal
//! configuration problems at startup, transient telemetry fetch failures
//! (skip the cycle) and charger command failures (retry next cycle). The
//! remaining variants are the raw causes that get folded into those kinds.

use crate::telemetry::Source;
use thiserror::Error;

/// Result type alias for evsolar operations
pub type Result<T> = std::result::Result<T, EvSolarError>;

/// Main error type for evsolar
#[derive(Debug, Error)]
pub enum EvSolarError {
    /// Configuration-related errors (fatal at startup)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors for a single configuration field
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// A telemetry read failed; the cycle is skipped
    #[error("Fetch error ({origin}): {message}")]
    Fetch { origin: Source, message: String },

    /// A charger command failed; the same state is retried next cycle
    #[error("Command error: {message}")]
    Command { message: String },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },
}

impl EvSolarError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new fetch error for a telemetry source
    pub fn fetch<S: Into<String>>(origin: Source, message: S) -> Self {
        Self::Fetch {
            origin,
            message: message.into(),
        }
    }

    /// Create a new charger command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Whether the loop may carry on after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. }
                | Self::Command { .. }
                | Self::Timeout { .. }
                | Self::Auth { .. }
                | Self::Network { .. }
        )
    }

    /// Fold any error raised while reading telemetry into the fetch kind
    pub fn into_fetch(self, origin: Source) -> Self {
        match self {
            Self::Fetch { .. } => self,
            other => Self::fetch(origin, other.to_string()),
        }
    }

    /// Fold any error raised while commanding the charger into the command kind
    pub fn into_command(self) -> Self {
        match self {
            Self::Command { .. } => self,
            other => Self::command(other.to_string()),
        }
    }
}

impl From<std::io::Error> for EvSolarError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for EvSolarError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EvSolarError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for EvSolarError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for EvSolarError {
    fn from(err: chrono::ParseError) -> Self {
        Self::validation("datetime", err.to_string())
    }
}
