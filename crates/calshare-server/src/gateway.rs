//! Calendar ACL gateway.
//!
//! Sits between the dispatcher and the calendar service. Every operation
//! first obtains a valid access token from the coordinator (which owns
//! token freshness entirely), then performs the remote call with bounded
//! retries for transient failures. Share state is remotely owned: nothing
//! here is cached beyond a single request/response.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use calshare_core::{ChatId, ShareRole};
use calshare_google::{AclClient, ApiError, ApiErrorCode};
use calshare_protocol::{CalendarDescriptor, ShareGrant};

use crate::config::RetryConfig;
use crate::coordinator::{AuthCoordinator, AuthFlowError};
use crate::retry::with_retry;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced by the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Token acquisition failed; propagated unchanged from the
    /// coordinator.
    #[error(transparent)]
    Auth(#[from] AuthFlowError),

    /// The calendar service call failed (after retries, where retrying
    /// was appropriate).
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Gateway over the calendar service's sharing operations.
pub struct AclGateway {
    coordinator: Arc<AuthCoordinator>,
    client: AclClient,
    retry: RetryConfig,
}

impl AclGateway {
    /// Creates a gateway over the given coordinator and ACL client.
    pub fn new(coordinator: Arc<AuthCoordinator>, client: AclClient, retry: RetryConfig) -> Self {
        Self {
            coordinator,
            client,
            retry,
        }
    }

    /// Lists the calendars the identity owns, in service order.
    ///
    /// Only owned calendars are returned: sharing can only be managed on
    /// calendars the account owns.
    pub async fn list_calendars(&self, chat_id: ChatId) -> GatewayResult<Vec<CalendarDescriptor>> {
        let token = self.coordinator.get_valid_token(chat_id).await?;

        let calendars = with_retry(&self.retry, "calendar list", || {
            self.client.list_calendars(&token)
        })
        .await?;

        Ok(calendars
            .into_iter()
            .filter(|c| c.is_owned())
            .map(|c| CalendarDescriptor {
                id: c.id,
                summary: c.summary,
                primary: c.primary,
            })
            .collect())
    }

    /// Lists who a calendar is shared with.
    ///
    /// Owner entries are excluded; only grants this system could have
    /// issued (or could revoke) are reported.
    pub async fn list_shares(
        &self,
        chat_id: ChatId,
        calendar_id: &str,
    ) -> GatewayResult<Vec<ShareGrant>> {
        let token = self.coordinator.get_valid_token(chat_id).await?;

        let rules = with_retry(&self.retry, "ACL list", || {
            self.client.list_rules(&token, calendar_id)
        })
        .await?;

        Ok(rules
            .iter()
            .filter(|r| r.role != "owner")
            .filter_map(|r| {
                let email = r.grantee_email()?;
                let role = r.role.parse::<ShareRole>().ok()?;
                Some(ShareGrant {
                    email: email.to_string(),
                    role,
                })
            })
            .collect())
    }

    /// Grants `role` on a calendar to `email`.
    ///
    /// Idempotent: the service keys ACL rules by grantee scope, so
    /// re-granting an already-shared email updates the role in place
    /// rather than duplicating the grant.
    pub async fn add_share(
        &self,
        chat_id: ChatId,
        calendar_id: &str,
        email: &str,
        role: ShareRole,
    ) -> GatewayResult<()> {
        let token = self.coordinator.get_valid_token(chat_id).await?;

        with_retry(&self.retry, "ACL insert", || {
            self.client.insert_rule(&token, calendar_id, email, role)
        })
        .await?;

        debug!(%chat_id, calendar_id, email, role = %role, "share committed");
        Ok(())
    }

    /// Revokes `email`'s access to a calendar.
    ///
    /// Idempotent: a grantee that is already absent (including one removed
    /// by a concurrent delete between our list and our delete) is a
    /// successful no-op. Returns the number of rules actually removed.
    pub async fn delete_share(
        &self,
        chat_id: ChatId,
        calendar_id: &str,
        email: &str,
    ) -> GatewayResult<usize> {
        let token = self.coordinator.get_valid_token(chat_id).await?;

        let rules = with_retry(&self.retry, "ACL list", || {
            self.client.list_rules(&token, calendar_id)
        })
        .await?;

        let matching: Vec<String> = rules
            .iter()
            .filter(|r| r.grantee_email() == Some(email))
            .filter_map(|r| r.id.clone())
            .collect();

        let mut removed = 0;
        for rule_id in &matching {
            let result = with_retry(&self.retry, "ACL delete", || {
                self.client.delete_rule(&token, calendar_id, rule_id)
            })
            .await;

            match result {
                Ok(()) => removed += 1,
                // Already gone: deletion raced something else, fine.
                Err(e) if e.code() == ApiErrorCode::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        debug!(%chat_id, calendar_id, email, removed, "share removal done");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calshare_core::{AuthState, TokenSet};
    use calshare_google::{GoogleApiConfig, OAuthClient, OAuthCredentials};
    use calshare_store::AuthStore;
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::ServerConfig;

    /// Gateway whose identity 1 is already authorized with a fresh token.
    async fn authorized_gateway(server: &MockServer) -> AclGateway {
        let google = GoogleApiConfig::new(
            OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret"),
            "https://cal.example.com/oauth2callback",
        )
        .with_token_endpoint(format!("{}/token", server.uri()))
        .with_api_base_url(server.uri());

        let store = Arc::new(AuthStore::in_memory().unwrap());
        store
            .put(
                ChatId(1),
                &AuthState::Authorized {
                    tokens: TokenSet::new("at-1", "rt-1", 3600),
                },
            )
            .unwrap();

        let retry = RetryConfig {
            max_attempts: 3,
            initial_backoff: StdDuration::from_millis(1),
            max_backoff: StdDuration::from_millis(2),
            backoff_multiplier: 2.0,
        };
        let config = ServerConfig::default().with_retry(retry.clone());
        let coordinator = Arc::new(AuthCoordinator::new(
            store,
            OAuthClient::new(google.clone()),
            &config,
        ));

        AclGateway::new(coordinator, AclClient::new(&google), retry)
    }

    fn calendar_list_body() -> serde_json::Value {
        serde_json::json!({
            "items": [
                { "id": "primary", "summary": "Mine", "primary": true, "accessRole": "owner" },
                { "id": "team@group.calendar.google.com", "summary": "Team", "accessRole": "writer" },
                { "id": "other@group.calendar.google.com", "summary": "Other", "accessRole": "owner" }
            ]
        })
    }

    #[tokio::test]
    async fn list_calendars_keeps_only_owned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/calendarList"))
            .respond_with(ResponseTemplate::new(200).set_body_json(calendar_list_body()))
            .mount(&server)
            .await;

        let gateway = authorized_gateway(&server).await;
        let calendars = gateway.list_calendars(ChatId(1)).await.unwrap();

        let ids: Vec<_> = calendars.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["primary", "other@group.calendar.google.com"]);
        assert!(calendars[0].primary);
    }

    #[tokio::test]
    async fn list_shares_excludes_owner_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/acl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "id": "user:me@example.com",
                        "role": "owner",
                        "scope": { "type": "user", "value": "me@example.com" }
                    },
                    {
                        "id": "user:alice@example.com",
                        "role": "reader",
                        "scope": { "type": "user", "value": "alice@example.com" }
                    },
                    {
                        "id": "default",
                        "role": "freeBusyReader",
                        "scope": { "type": "default" }
                    }
                ]
            })))
            .mount(&server)
            .await;

        let gateway = authorized_gateway(&server).await;
        let shares = gateway.list_shares(ChatId(1), "primary").await.unwrap();

        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].email, "alice@example.com");
        assert_eq!(shares[0].role, ShareRole::Reader);
    }

    #[tokio::test]
    async fn add_share_twice_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/primary/acl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "user:alice@example.com",
                "role": "reader",
                "scope": { "type": "user", "value": "alice@example.com" }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let gateway = authorized_gateway(&server).await;
        gateway
            .add_share(ChatId(1), "primary", "alice@example.com", ShareRole::Reader)
            .await
            .unwrap();
        gateway
            .add_share(ChatId(1), "primary", "alice@example.com", ShareRole::Reader)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_share_removes_matching_rules() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/acl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "id": "user:alice@example.com",
                        "role": "reader",
                        "scope": { "type": "user", "value": "alice@example.com" }
                    }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/acl/user%3Aalice%40example.com"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = authorized_gateway(&server).await;
        let removed = gateway
            .delete_share(ChatId(1), "primary", "alice@example.com")
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn delete_absent_grantee_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/acl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": []
            })))
            .mount(&server)
            .await;

        let gateway = authorized_gateway(&server).await;
        let removed = gateway
            .delete_share(ChatId(1), "primary", "ghost@example.com")
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn delete_race_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/primary/acl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {
                        "id": "user:alice@example.com",
                        "role": "reader",
                        "scope": { "type": "user", "value": "alice@example.com" }
                    }
                ]
            })))
            .mount(&server)
            .await;
        // The rule vanished between list and delete.
        Mock::given(method("DELETE"))
            .and(path("/calendars/primary/acl/user%3Aalice%40example.com"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gateway = authorized_gateway(&server).await;
        let removed = gateway
            .delete_share(ChatId(1), "primary", "alice@example.com")
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/calendarList"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me/calendarList"))
            .respond_with(ResponseTemplate::new(200).set_body_json(calendar_list_body()))
            .mount(&server)
            .await;

        let gateway = authorized_gateway(&server).await;
        let calendars = gateway.list_calendars(ChatId(1)).await.unwrap();
        assert_eq!(calendars.len(), 2);
    }

    #[tokio::test]
    async fn permanent_rejection_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/locked/acl"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = authorized_gateway(&server).await;
        let err = gateway.list_shares(ChatId(1), "locked").await.unwrap_err();
        match err {
            GatewayError::Api(e) => assert_eq!(e.code(), ApiErrorCode::PermissionDenied),
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_identity_never_reaches_the_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me/calendarList"))
            .respond_with(ResponseTemplate::new(200).set_body_json(calendar_list_body()))
            .expect(0)
            .mount(&server)
            .await;

        let gateway = authorized_gateway(&server).await;
        let err = gateway.list_calendars(ChatId(42)).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Auth(AuthFlowError::NotAuthorized)
        ));
    }
}
