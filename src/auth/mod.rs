//! OAuth 2.0 authorization-code flow for the file source provider.
//!
//! [`OAuthClient::authorization_request`] produces the redirect URL plus the `state` and PKCE
//! verifier the session must remember; [`OAuthClient::exchange_code`] trades the callback code
//! for a [`Credential`].

mod credential;

pub use credential::Credential;

use crate::config::Config;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

/// Read-only Drive scope requested during authorization.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Errors raised while authorizing the session or validating its credential.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The session has not completed the authorization flow.
    #[error("Not authenticated. Connect your drive first.")]
    MissingCredential,
    /// The session credential expired or was rejected by the provider.
    #[error("The access credential expired or was revoked. Connect your drive again.")]
    Expired,
    /// Callback `state` did not match the pending authorization request.
    #[error("Authorization state mismatch")]
    StateMismatch,
    /// Provider redirected back with an `error` parameter.
    #[error("Authorization denied: {0}")]
    Denied(String),
    /// Callback carried no authorization code.
    #[error("Missing authorization code")]
    MissingCode,
    /// Endpoint URL failed to parse.
    #[error("Invalid OAuth endpoint URL: {0}")]
    InvalidUrl(String),
    /// Token endpoint could not be reached.
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Token endpoint rejected the exchange.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
}

/// Redirect target plus the secrets the session keeps until the callback arrives.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Fully built authorization URL.
    pub url: String,
    /// Anti-forgery value echoed back by the provider.
    pub state: String,
    /// PKCE verifier sent with the code exchange.
    pub pkce_verifier: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth client for the provider's authorization and token endpoints.
pub struct OAuthClient {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: Url,
    token_url: String,
}

impl OAuthClient {
    /// Construct a client from explicit endpoint settings.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        auth_url: &str,
        token_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let auth_url =
            Url::parse(auth_url).map_err(|error| AuthError::InvalidUrl(error.to_string()))?;
        let http = Client::builder()
            .user_agent("drive-digest/oauth")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_url,
            token_url: token_url.into(),
        })
    }

    /// Construct a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        Self::new(
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
            config.google_redirect_uri.clone(),
            &config.google_auth_url,
            config.google_token_url.clone(),
            config.request_timeout(),
        )
    }

    /// Build a fresh authorization URL with its own `state` and PKCE verifier.
    pub fn authorization_request(&self) -> AuthorizationRequest {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let pkce_verifier = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );

        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", DRIVE_READONLY_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("prompt", "consent")
            .append_pair("state", &state)
            .append_pair("code_challenge", &pkce_challenge(&pkce_verifier))
            .append_pair("code_challenge_method", "S256");

        tracing::info!("Generated authorization URL");
        AuthorizationRequest {
            url: url.into(),
            state,
            pkce_verifier,
        }
    }

    /// Exchange an authorization code for an access credential.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<Credential, AuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", pkce_verifier),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(parsed) => match parsed.error_description {
                    Some(description) => format!("{status} {}: {description}", parsed.error),
                    None => format!("{status} {}", parsed.error),
                },
                Err(_) => format!("{status}: {body}"),
            };
            tracing::error!(%status, "Token exchange rejected");
            return Err(AuthError::TokenExchange(detail));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|error| AuthError::TokenExchange(format!("malformed token response: {error}")))?;
        if token.access_token.trim().is_empty() {
            return Err(AuthError::TokenExchange("empty access token".into()));
        }

        let expires_at = token
            .expires_in
            .map(|seconds| OffsetDateTime::now_utc() + time::Duration::seconds(seconds));
        tracing::info!(expires_in = ?token.expires_in, "Token exchange successful");

        Ok(Credential::new(token.access_token, expires_at)
            .with_refresh_token(token.refresh_token)
            .with_scope(token.scope))
    }
}

/// PKCE S256 challenge for `verifier`.
pub(crate) fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use std::collections::HashMap;

    fn client(token_url: String) -> OAuthClient {
        OAuthClient::new(
            "client-id",
            "client-secret",
            "http://localhost:4100/auth/callback",
            "https://accounts.google.com/o/oauth2/v2/auth",
            token_url,
            Duration::from_secs(5),
        )
        .expect("oauth client")
    }

    #[test]
    fn pkce_challenge_matches_rfc_7636_example() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn authorization_request_carries_state_and_challenge() {
        let client = client("http://127.0.0.1:1/token".into());
        let request = client.authorization_request();
        let url = Url::parse(&request.url).expect("valid url");
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], DRIVE_READONLY_SCOPE);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["state"], request.state);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(
            params["code_challenge"],
            pkce_challenge(&request.pkce_verifier)
        );
        assert_eq!(request.pkce_verifier.len(), 64);

        let other = client.authorization_request();
        assert_ne!(request.state, other.state);
    }

    #[tokio::test]
    async fn exchange_code_returns_credential() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=authorization_code")
                    .body_contains("code=auth-code")
                    .body_contains("code_verifier=verifier");
                then.status(200).json_body(json!({
                    "access_token": "ya29.token",
                    "expires_in": 3599,
                    "refresh_token": "refresh",
                    "scope": DRIVE_READONLY_SCOPE,
                    "token_type": "Bearer"
                }));
            })
            .await;

        let credential = client(server.url("/token"))
            .exchange_code("auth-code", "verifier")
            .await
            .expect("credential");

        mock.assert_async().await;
        assert_eq!(credential.access_token(), "ya29.token");
        assert!(credential.is_valid());
        assert!(credential.has_refresh_token());
    }

    #[tokio::test]
    async fn exchange_code_surfaces_provider_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400).json_body(json!({
                    "error": "invalid_grant",
                    "error_description": "Bad Request"
                }));
            })
            .await;

        let error = client(server.url("/token"))
            .exchange_code("stale", "verifier")
            .await
            .expect_err("invalid grant");
        assert!(
            matches!(&error, AuthError::TokenExchange(message) if message.contains("invalid_grant"))
        );
    }
}
