//! Calendar list and ACL (sharing) API client.
//!
//! A thin typed wrapper over the calendar service's `calendarList` and
//! `acl` collections. Every call takes the bearer token to use; the client
//! holds no authentication state and never refreshes anything.

use serde::{Deserialize, Serialize};
use tracing::debug;

use calshare_core::ShareRole;

use crate::config::GoogleApiConfig;
use crate::error::{ApiError, ApiResult};

/// Calendar ACL API client.
#[derive(Debug)]
pub struct AclClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl AclClient {
    /// Creates a new client from the given configuration.
    pub fn new(config: &GoogleApiConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("failed to create HTTP client");

        Self {
            http_client,
            base_url: config.api_base_url.clone(),
        }
    }

    /// Lists the calendars visible to the token's account, in the order
    /// the service returns them.
    pub async fn list_calendars(&self, access_token: &str) -> ApiResult<Vec<CalendarListEntry>> {
        let url = format!("{}/users/me/calendarList", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(request_error)?;

        let body = read_success_body(response).await?;
        let list: CalendarListResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::invalid_response(format!("bad calendar list: {e}")))?;

        debug!(count = list.items.len(), "calendars listed");
        Ok(list.items)
    }

    /// Lists the ACL rules of a calendar.
    pub async fn list_rules(
        &self,
        access_token: &str,
        calendar_id: &str,
    ) -> ApiResult<Vec<AclRule>> {
        let url = format!(
            "{}/calendars/{}/acl",
            self.base_url,
            urlencoding::encode(calendar_id)
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(request_error)?;

        let body = read_success_body(response).await?;
        let list: AclListResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::invalid_response(format!("bad ACL list: {e}")))?;

        Ok(list.items)
    }

    /// Inserts (or updates) the ACL rule granting `role` to `email`.
    ///
    /// The service keys ACL rules by scope, so inserting a rule for an
    /// already-granted email updates its role instead of duplicating it.
    pub async fn insert_rule(
        &self,
        access_token: &str,
        calendar_id: &str,
        email: &str,
        role: ShareRole,
    ) -> ApiResult<AclRule> {
        let url = format!(
            "{}/calendars/{}/acl",
            self.base_url,
            urlencoding::encode(calendar_id)
        );

        let rule = serde_json::json!({
            "scope": { "type": "user", "value": email },
            "role": role.as_str(),
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&rule)
            .send()
            .await
            .map_err(request_error)?;

        let body = read_success_body(response).await?;
        let rule: AclRule = serde_json::from_str(&body)
            .map_err(|e| ApiError::invalid_response(format!("bad ACL rule: {e}")))?;

        debug!(calendar_id, email, role = %role, "ACL rule inserted");
        Ok(rule)
    }

    /// Deletes an ACL rule by its rule id.
    ///
    /// Returns a `NotFound` error when the rule no longer exists; callers
    /// deciding deletion is idempotent treat that as success.
    pub async fn delete_rule(
        &self,
        access_token: &str,
        calendar_id: &str,
        rule_id: &str,
    ) -> ApiResult<()> {
        let url = format!(
            "{}/calendars/{}/acl/{}",
            self.base_url,
            urlencoding::encode(calendar_id),
            urlencoding::encode(rule_id)
        );

        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(calendar_id, rule_id, "ACL rule deleted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

/// Maps a reqwest transport failure onto an [`ApiError`].
fn request_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::network("request timeout")
    } else if e.is_connect() {
        ApiError::network(format!("connection failed: {e}"))
    } else {
        ApiError::network(format!("request failed: {e}"))
    }
}

/// Maps a non-success calendar API status onto an [`ApiError`].
fn status_error(status: reqwest::StatusCode, body: &str) -> ApiError {
    use reqwest::StatusCode;

    match status {
        StatusCode::UNAUTHORIZED => ApiError::authentication("access token expired or invalid"),
        StatusCode::FORBIDDEN => ApiError::permission_denied(format!("access denied: {body}")),
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            ApiError::not_found(format!("resource not found: {body}"))
        }
        StatusCode::BAD_REQUEST => ApiError::bad_request(format!("rejected request: {body}")),
        StatusCode::TOO_MANY_REQUESTS => ApiError::rate_limited("rate limit exceeded"),
        s if s.is_server_error() => ApiError::server(format!("API error ({s}): {body}")),
        s => ApiError::invalid_response(format!("unexpected status {s}: {body}")),
    }
}

/// Reads the body of a response, mapping non-success statuses to errors.
async fn read_success_body(response: reqwest::Response) -> ApiResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::network(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    Ok(body)
}

/// A calendar from the calendar list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    /// The calendar id.
    pub id: String,
    /// The calendar summary (name).
    #[serde(default)]
    pub summary: String,
    /// Whether this is the account's primary calendar.
    #[serde(default)]
    pub primary: bool,
    /// The caller's access role on this calendar.
    #[serde(default)]
    pub access_role: Option<String>,
}

impl CalendarListEntry {
    /// True if the token's account owns this calendar.
    pub fn is_owned(&self) -> bool {
        self.access_role.as_deref() == Some("owner")
    }
}

/// The scope of an ACL rule: who it applies to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AclScope {
    /// Scope type: "user", "group", "domain" or "default".
    #[serde(rename = "type", default)]
    pub scope_type: Option<String>,
    /// Scope value; for "user" scopes, the grantee email.
    #[serde(default)]
    pub value: Option<String>,
}

/// An ACL rule of a calendar.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AclRule {
    /// Rule id (e.g. `user:alice@example.com`).
    #[serde(default)]
    pub id: Option<String>,
    /// The granted role ("owner", "writer", "reader", "freeBusyReader").
    #[serde(default)]
    pub role: String,
    /// Who the rule applies to.
    pub scope: AclScope,
}

impl AclRule {
    /// Returns the grantee email for user-scoped rules.
    pub fn grantee_email(&self) -> Option<&str> {
        if self.scope.scope_type.as_deref() == Some("user") {
            self.scope.value.as_deref()
        } else {
            None
        }
    }
}

/// Response from the calendarList endpoint.
#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

/// Response from the acl.list endpoint.
#[derive(Debug, Deserialize)]
struct AclListResponse {
    #[serde(default)]
    items: Vec<AclRule>,
}
