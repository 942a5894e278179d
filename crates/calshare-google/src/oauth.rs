//! OAuth 2.0 web-application flow for Google APIs.
//!
//! The daemon uses the server-side authorization-code flow: it hands the
//! user an authorization URL carrying a `state` nonce, the consent page
//! redirects to the daemon's registered callback URL, and the code is
//! exchanged here for an access/refresh token pair. The nonce is the only
//! link between the redirect and the chat identity that asked for it, so
//! it is generated from a CSPRNG and used exactly once.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use tracing::{debug, info};

use calshare_core::TokenSet;

use crate::config::GoogleApiConfig;
use crate::error::{ApiError, ApiResult};

/// Nonce length in raw bytes, before base64url encoding.
const NONCE_BYTES: usize = 32;

/// Access-token lifetime assumed when the token endpoint omits
/// `expires_in`.
const FALLBACK_EXPIRES_IN_SECS: i64 = 3600;

/// Generates a cryptographically random, URL-safe correlation nonce.
pub fn generate_nonce() -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..NONCE_BYTES).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// OAuth client for the authorization-code web flow.
#[derive(Debug)]
pub struct OAuthClient {
    config: GoogleApiConfig,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new OAuth client from the given configuration.
    pub fn new(config: GoogleApiConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("failed to create HTTP client");

        Self {
            config,
            http_client,
        }
    }

    /// Builds the authorization URL for the given state nonce.
    ///
    /// `access_type=offline` plus `prompt=consent` makes the grant return a
    /// refresh token; `include_granted_scopes` keeps previously granted
    /// scopes attached.
    pub fn authorization_url(&self, nonce: &str) -> String {
        let scope = self.config.scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&\
             access_type=offline&include_granted_scopes=true&prompt=consent",
            self.config.auth_endpoint,
            urlencoding::encode(&self.config.credentials.client_id),
            urlencoding::encode(&self.config.redirect_url),
            urlencoding::encode(&scope),
            urlencoding::encode(nonce),
        )
    }

    /// Exchanges an authorization code for a complete token set.
    ///
    /// Fails with a permanent error if the authorization server rejects the
    /// code or the response carries no refresh token (a partial token set
    /// is never returned to the caller).
    pub async fn exchange_code(&self, code: &str) -> ApiResult<TokenSet> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];

        let response = self.post_token_endpoint(&params, "token exchange").await?;

        let refresh_token = response.refresh_token.ok_or_else(|| {
            ApiError::invalid_response("token response carried no refresh token")
        })?;

        info!("authorization code exchanged for tokens");
        Ok(TokenSet::new(
            response.access_token,
            refresh_token,
            response.expires_in.unwrap_or(FALLBACK_EXPIRES_IN_SECS),
        ))
    }

    /// Refreshes an access token. Returns the new token and its lifetime
    /// in seconds.
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<(String, i64)> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.post_token_endpoint(&params, "token refresh").await?;

        debug!("access token refreshed");
        Ok((
            response.access_token,
            response.expires_in.unwrap_or(FALLBACK_EXPIRES_IN_SECS),
        ))
    }

    async fn post_token_endpoint(
        &self,
        params: &[(&str, &str)],
        operation: &str,
    ) -> ApiResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.config.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::network(format!("{operation} timed out"))
                } else {
                    ApiError::network(format!("{operation} request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("failed to read {operation} response: {e}")))?;

        if !status.is_success() {
            return Err(token_endpoint_error(status, &body, operation));
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::invalid_response(format!("invalid {operation} response: {e}")))
    }
}

/// Maps a token-endpoint error status. 4xx responses (`invalid_grant` and
/// friends) are permanent authentication failures; 429/5xx are transient.
fn token_endpoint_error(status: reqwest::StatusCode, body: &str, operation: &str) -> ApiError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ApiError::rate_limited(format!("{operation} rate limited: {body}"))
    } else if status.is_server_error() {
        ApiError::server(format!("{operation} failed ({status}): {body}"))
    } else {
        ApiError::authentication(format!("{operation} rejected ({status}): {body}"))
    }
}

/// Response from the OAuth2 token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthCredentials;
    use crate::error::ApiErrorCode;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(token_endpoint: impl Into<String>) -> GoogleApiConfig {
        GoogleApiConfig::new(
            OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret"),
            "https://cal.example.com/oauth2callback",
        )
        .with_token_endpoint(token_endpoint)
    }

    #[test]
    fn nonce_is_unique_and_url_safe() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_ne!(a, b);
        // 32 bytes base64url without padding is 43 characters.
        assert_eq!(a.len(), 43);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }

    #[test]
    fn authorization_url_shape() {
        let client = OAuthClient::new(test_config("http://unused.invalid/token"));
        let url = client.authorization_url("nonce-123");

        assert!(url.starts_with(crate::config::DEFAULT_AUTH_ENDPOINT));
        assert!(url.contains("client_id="));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fcal.example.com%2Foauth2callback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=nonce-123"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("include_granted_scopes=true"));
        assert!(url.contains("prompt=consent"));
    }

    #[tokio::test]
    async fn exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=code-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(test_config(format!("{}/token", server.uri())));
        let tokens = client.exchange_code("code-abc").await.unwrap();

        assert_eq!(tokens.access_token, "at-1");
        assert_eq!(tokens.refresh_token, "rt-1");
        assert!(!tokens.needs_refresh(chrono::Duration::seconds(60)));
    }

    #[tokio::test]
    async fn exchange_code_without_refresh_token_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(test_config(format!("{}/token", server.uri())));
        let err = client.exchange_code("code-abc").await.unwrap_err();
        assert_eq!(err.code(), ApiErrorCode::InvalidResponse);
    }

    #[tokio::test]
    async fn exchange_invalid_grant_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(test_config(format!("{}/token", server.uri())));
        let err = client.exchange_code("stale-code").await.unwrap_err();
        assert_eq!(err.code(), ApiErrorCode::AuthenticationFailed);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn exchange_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = OAuthClient::new(test_config(format!("{}/token", server.uri())));
        let err = client.exchange_code("code").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn refresh_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-2",
                "expires_in": 1800
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(test_config(format!("{}/token", server.uri())));
        let (access_token, expires_in) = client.refresh("rt-1").await.unwrap();
        assert_eq!(access_token, "at-2");
        assert_eq!(expires_in, 1800);
    }

    #[tokio::test]
    async fn refresh_rejection_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been revoked."
            })))
            .mount(&server)
            .await;

        let client = OAuthClient::new(test_config(format!("{}/token", server.uri())));
        let err = client.refresh("revoked").await.unwrap_err();
        assert_eq!(err.code(), ApiErrorCode::AuthenticationFailed);
        assert!(!err.is_retryable());
    }
}
