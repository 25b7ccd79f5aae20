//! Cognito session for the Emporia API

use crate::config::EmporiaConfig;
use crate::error::{EvSolarError, Result};
use crate::logging::get_logger;
use crate::persistence::{StoredTokens, TokenStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const INITIATE_AUTH_TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const AMZ_JSON: &str = "application/x-amz-json-1.1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: HashMap<&'a str, &'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

/// Tokens issued by Cognito
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticationResult {
    pub id_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Only issued on a password login
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Parse an `InitiateAuth` response body
pub fn parse_auth_response(body: &str) -> Result<AuthenticationResult> {
    let resp: InitiateAuthResponse = serde_json::from_str(body)
        .map_err(|e| EvSolarError::auth(format!("malformed Cognito response: {}", e)))?;
    match (resp.authentication_result, resp.challenge_name) {
        (Some(result), _) => Ok(result),
        (None, Some(challenge)) => Err(EvSolarError::auth(format!(
            "Cognito requires unsupported challenge {}",
            challenge
        ))),
        (None, None) => Err(EvSolarError::auth("Cognito returned no tokens")),
    }
}

/// Logged-in Emporia session
pub struct Session {
    http: reqwest::Client,
    cognito_url: String,
    client_id: String,
    username: String,
    password: String,
    store: TokenStore,
    tokens: StoredTokens,
    logger: crate::logging::StructuredLogger,
}

impl Session {
    /// Create a session, reusing stored tokens for the same account
    pub fn new(http: reqwest::Client, cfg: &EmporiaConfig) -> Self {
        let logger = get_logger("emporia");
        let store = TokenStore::new(&cfg.token_file);
        let mut tokens = store.load();
        if tokens
            .username
            .as_deref()
            .is_some_and(|u| !u.eq_ignore_ascii_case(cfg.username.trim()))
        {
            logger.info("Stored session belongs to another account, ignoring it");
            tokens = StoredTokens::default();
        }
        if tokens.is_usable() {
            logger.debug("Reusing stored Emporia session");
        }
        Self {
            http,
            cognito_url: cfg.cognito_url.trim().to_string(),
            client_id: cfg.cognito_client_id.trim().to_string(),
            username: cfg.username.trim().to_string(),
            password: cfg.password.clone(),
            store,
            tokens,
            logger,
        }
    }

    /// Current id token, if any
    pub fn id_token(&self) -> Option<&str> {
        self.tokens.id_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Return a usable id token, logging in if there is none
    pub async fn ensure_token(&mut self) -> Result<String> {
        if let Some(token) = self.id_token() {
            return Ok(token.to_string());
        }
        self.reauthenticate().await
    }

    /// Obtain a fresh id token: refresh when possible, else log in
    pub async fn reauthenticate(&mut self) -> Result<String> {
        let refresh_token = self
            .tokens
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty());
        if let Some(refresh_token) = refresh_token {
            match self.refresh(&refresh_token).await {
                Ok(token) => return Ok(token),
                Err(e) => self
                    .logger
                    .warn(&format!("Token refresh failed, logging in again: {}", e)),
            }
        }
        self.login().await
    }

    async fn login(&mut self) -> Result<String> {
        self.logger
            .info(&format!("Logging in to Emporia as {}", self.username));
        let params = HashMap::from([
            ("USERNAME", self.username.as_str()),
            ("PASSWORD", self.password.as_str()),
        ]);
        let result = self.initiate_auth("USER_PASSWORD_AUTH", params).await?;
        Ok(self.apply(result))
    }

    async fn refresh(&mut self, refresh_token: &str) -> Result<String> {
        self.logger.debug("Refreshing Emporia session");
        let params = HashMap::from([("REFRESH_TOKEN", refresh_token)]);
        let result = self.initiate_auth("REFRESH_TOKEN_AUTH", params).await?;
        Ok(self.apply(result))
    }

    async fn initiate_auth(
        &self,
        flow: &str,
        auth_parameters: HashMap<&str, &str>,
    ) -> Result<AuthenticationResult> {
        let request = InitiateAuthRequest {
            auth_flow: flow,
            client_id: &self.client_id,
            auth_parameters,
        };
        let body = serde_json::to_string(&request)?;
        let resp = self
            .http
            .post(self.cognito_url.as_str())
            .header("X-Amz-Target", INITIATE_AUTH_TARGET)
            .header(reqwest::header::CONTENT_TYPE, AMZ_JSON)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            return Err(EvSolarError::auth(format!(
                "Cognito {} failed with HTTP {}: {}",
                flow, status, snippet
            )));
        }
        parse_auth_response(&text)
    }

    fn apply(&mut self, result: AuthenticationResult) -> String {
        let token = result.id_token.clone();
        self.tokens.id_token = Some(result.id_token);
        self.tokens.access_token = result.access_token;
        if result.refresh_token.is_some() {
            self.tokens.refresh_token = result.refresh_token;
        }
        self.tokens.username = Some(self.username.clone());
        if let Err(e) = self.store.save(&self.tokens) {
            self.logger
                .warn(&format!("Could not persist session tokens: {}", e));
        }
        token
    }
}
