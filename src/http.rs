//! Shared HTTP plumbing for the vendor adapters

use crate::error::{EvSolarError, Result};
use reqwest::StatusCode;
use std::time::Duration;

/// User agent sent to every vendor API
pub fn user_agent() -> String {
    format!("evsolar/{}", env!("APP_VERSION"))
}

/// Build a client with the per-request timeout that bounds a stalled vendor
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(user_agent())
        .build()?;
    Ok(client)
}

/// Map a non-success status onto our error kinds
pub fn status_error(status: StatusCode, body: &str) -> EvSolarError {
    let snippet: String = body.chars().take(200).collect();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        EvSolarError::auth(format!("HTTP {}: {}", status, snippet))
    } else {
        EvSolarError::network(format!("HTTP {}: {}", status, snippet))
    }
}

/// Check the status and return the body text
pub async fn read_text(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    Ok(body)
}

/// Join a base URL and a path without doubling the slash
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
