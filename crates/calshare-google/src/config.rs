//! Google API configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Default OAuth2 authorization endpoint.
pub const DEFAULT_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Default OAuth2 token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Default Calendar API v3 base URL.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Read-write calendar scope; ACL mutation needs write access.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// OAuth 2.0 client credentials.
///
/// Users must register their own OAuth client in the Google Cloud Console;
/// the downloaded credentials JSON is accepted directly.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client id.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

/// Structure of a Google credentials JSON file.
///
/// Supports the Cloud Console download format (an "installed" or "web"
/// section) and the flat format with client_id/client_secret at the root.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    /// Creates credentials from a raw id/secret pair.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Google credentials JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read credentials file: {e}"))?;
        Self::from_json(&content)
    }

    /// Parses credentials from a Google credentials JSON string.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {e}"))?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err("credentials JSON must contain an 'installed'/'web' section \
             or 'client_id'/'client_secret' at the root"
            .to_string())
    }

    /// Checks that the credentials look well-formed.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Immutable configuration for the OAuth and ACL clients.
///
/// Constructed once at startup and injected into the clients; nothing in
/// this crate reads environment variables or other ambient state.
#[derive(Debug, Clone)]
pub struct GoogleApiConfig {
    /// OAuth client credentials.
    pub credentials: OAuthCredentials,

    /// Redirect URL registered with the authorization server. The OAuth
    /// callback listener must be reachable at this URL (TLS terminated by
    /// whatever sits in front of it).
    pub redirect_url: String,

    /// OAuth2 authorization endpoint.
    pub auth_endpoint: String,

    /// OAuth2 token endpoint.
    pub token_endpoint: String,

    /// Calendar API base URL.
    pub api_base_url: String,

    /// OAuth scopes to request.
    pub scopes: Vec<String>,

    /// Timeout applied to every outbound request.
    pub timeout: Duration,

    /// User agent for API requests.
    pub user_agent: String,
}

impl GoogleApiConfig {
    /// Default request timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a configuration with the given credentials and redirect URL,
    /// using the public Google endpoints.
    pub fn new(credentials: OAuthCredentials, redirect_url: impl Into<String>) -> Self {
        Self {
            credentials,
            redirect_url: redirect_url.into(),
            auth_endpoint: DEFAULT_AUTH_ENDPOINT.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            scopes: vec![DEFAULT_SCOPE.to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calshare/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the authorization endpoint.
    pub fn with_auth_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.auth_endpoint = endpoint.into();
        self
    }

    /// Sets the token endpoint.
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    /// Sets the Calendar API base URL.
    pub fn with_api_base_url(mut self, base: impl Into<String>) -> Self {
        self.api_base_url = base.into();
        self
    }

    /// Sets the OAuth scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {e}"))?;

        Url::parse(&self.redirect_url)
            .map_err(|e| format!("invalid redirect URL {:?}: {e}", self.redirect_url))?;

        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }

        Ok(())
    }
}
