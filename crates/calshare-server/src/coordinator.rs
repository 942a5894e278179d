//! OAuth2 authorization coordinator.
//!
//! Reconciles the two inbound channels — chat commands asking for
//! authorization and redirect callbacks delivering grants — into the
//! per-identity state machine persisted in the store.
//!
//! The correlation nonce is the whole story here: the callback arrives on
//! a separate channel with no chat context, so the nonce embedded in the
//! authorization URL is the only link back to the identity that asked.
//! Consequently a nonce is (a) persisted durably *before* the URL leaves
//! this process, (b) unique across all outstanding grants, and (c)
//! consumed on first lookup so it can never be replayed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use calshare_core::{AuthState, ChatId};
use calshare_google::{ApiError, OAuthClient, generate_nonce};
use calshare_store::{AuthStore, StoreError};

use crate::config::{RetryConfig, ServerConfig};
use crate::retry::with_retry;

/// Result type for coordinator operations.
pub type AuthFlowResult<T> = Result<T, AuthFlowError>;

/// Errors surfaced by the authorization coordinator.
#[derive(Debug, Error)]
pub enum AuthFlowError {
    /// The identity holds no authorization.
    #[error("identity is not authorized")]
    NotAuthorized,

    /// The stored tokens are no longer usable; the user must run the
    /// authorization flow again.
    #[error("stored tokens are no longer usable, reauthorization required")]
    ReauthorizationRequired,

    /// The callback nonce is unknown, expired or already used. Terminal
    /// for that callback; never retried.
    #[error("callback nonce unknown, expired or already used")]
    UnknownOrExpiredNonce,

    /// The authorization server rejected the grant exchange.
    #[error("grant exchange failed: {0}")]
    GrantExchangeFailed(ApiError),

    /// The authorization server was unreachable; worth retrying later.
    /// Stored state is untouched.
    #[error("authorization server unavailable: {0}")]
    RemoteUnavailable(ApiError),

    /// Persistence failed; the operation was aborted.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Coordinates authorization flows and token lifetimes per identity.
pub struct AuthCoordinator {
    store: Arc<AuthStore>,
    oauth: OAuthClient,
    nonce_ttl: Duration,
    refresh_skew: Duration,
    retry: RetryConfig,
    /// Per-identity refresh serialization: concurrent commands from one
    /// user must not race duplicate refresh requests, which can invalidate
    /// each other's tokens at the authorization server.
    refresh_locks: Mutex<HashMap<ChatId, Arc<tokio::sync::Mutex<()>>>>,
}

impl AuthCoordinator {
    /// Creates a coordinator over the given store and OAuth client.
    pub fn new(store: Arc<AuthStore>, oauth: OAuthClient, config: &ServerConfig) -> Self {
        Self {
            store,
            oauth,
            nonce_ttl: Duration::seconds(config.nonce_ttl.as_secs() as i64),
            refresh_skew: Duration::seconds(config.refresh_skew.as_secs() as i64),
            retry: config.retry.clone(),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a new authorization link for an identity.
    ///
    /// The pending grant (with its fresh nonce) is durably persisted
    /// before the URL is built: a URL whose nonce is not on disk could
    /// never be matched after a restart, so it must not exist. Any prior
    /// state for the identity — including an earlier outstanding grant —
    /// is overwritten, which invalidates the earlier link.
    pub fn begin_authorization(&self, chat_id: ChatId) -> AuthFlowResult<String> {
        let nonce = generate_nonce();
        let state = AuthState::PendingGrant {
            nonce: nonce.clone(),
            issued_at: Utc::now(),
        };
        self.store.put(chat_id, &state)?;

        let url = self.oauth.authorization_url(&nonce);
        info!(%chat_id, "authorization link issued");
        Ok(url)
    }

    /// Handles a redirect callback carrying `(nonce, code)`.
    ///
    /// The nonce is consumed immediately on lookup — before the code
    /// exchange — so a second callback with the same nonce always fails,
    /// whether the exchange succeeded or not. On success the identity
    /// becomes `Authorized` with the complete token set; on exchange
    /// failure it stays `Unauthorized`.
    pub async fn handle_callback(&self, nonce: &str, code: &str) -> AuthFlowResult<ChatId> {
        let chat_id = self.consume_nonce(nonce)?;

        let tokens = with_retry(&self.retry, "grant exchange", || {
            self.oauth.exchange_code(code)
        })
        .await
        .map_err(|e| {
            warn!(%chat_id, error = %e, "grant exchange failed");
            AuthFlowError::GrantExchangeFailed(e)
        })?;

        self.store
            .put(chat_id, &AuthState::Authorized { tokens })?;
        info!(%chat_id, "authorization complete");
        Ok(chat_id)
    }

    /// Handles a redirect callback where the user denied the grant (or the
    /// authorization server reported an error). The nonce is consumed; the
    /// identity reverts to `Unauthorized`.
    pub fn handle_callback_denied(&self, nonce: &str) -> AuthFlowResult<ChatId> {
        let chat_id = self.consume_nonce(nonce)?;
        info!(%chat_id, "authorization denied by user");
        Ok(chat_id)
    }

    /// Looks up and invalidates a nonce, enforcing single use and TTL.
    ///
    /// Unknown nonces cover replayed, tampered and stale links alike, and
    /// are logged as potential security events.
    fn consume_nonce(&self, nonce: &str) -> AuthFlowResult<ChatId> {
        let Some((chat_id, state)) = self.store.find_by_nonce(nonce)? else {
            warn!("callback with unknown or already-used nonce");
            return Err(AuthFlowError::UnknownOrExpiredNonce);
        };

        let AuthState::PendingGrant { issued_at, .. } = state else {
            warn!(%chat_id, "nonce resolved to a non-pending record");
            return Err(AuthFlowError::UnknownOrExpiredNonce);
        };

        // Single use: invalidate before anything else can happen.
        self.store.put(chat_id, &AuthState::Unauthorized)?;

        if Utc::now() - issued_at > self.nonce_ttl {
            warn!(%chat_id, "callback for an expired authorization link");
            return Err(AuthFlowError::UnknownOrExpiredNonce);
        }

        Ok(chat_id)
    }

    /// Returns a currently-valid access token for an identity, refreshing
    /// it first when it is within the safety skew of expiry.
    ///
    /// This is the single freshness authority: every gateway call obtains
    /// its token here and the token returned is never already expired.
    /// A permanent refresh rejection clears the stored authorization; a
    /// transient one leaves it untouched.
    pub async fn get_valid_token(&self, chat_id: ChatId) -> AuthFlowResult<String> {
        let state = self.store.get(chat_id)?.unwrap_or(AuthState::Unauthorized);
        let AuthState::Authorized { tokens } = state else {
            return Err(AuthFlowError::NotAuthorized);
        };

        if !tokens.needs_refresh(self.refresh_skew) {
            return Ok(tokens.access_token);
        }

        // Serialize the refresh per identity; everyone else queues here.
        let lock = self.refresh_lock(chat_id);
        let _guard = lock.lock().await;

        // Re-read after acquiring the lock: a queued caller usually finds
        // the token already refreshed by whoever held the lock first.
        let state = self.store.get(chat_id)?.unwrap_or(AuthState::Unauthorized);
        let AuthState::Authorized { mut tokens } = state else {
            return Err(AuthFlowError::NotAuthorized);
        };
        if !tokens.needs_refresh(self.refresh_skew) {
            return Ok(tokens.access_token);
        }

        debug!(%chat_id, "refreshing access token");
        let refreshed = with_retry(&self.retry, "token refresh", || {
            self.oauth.refresh(&tokens.refresh_token)
        })
        .await;

        match refreshed {
            Ok((access_token, expires_in)) => {
                tokens.rotate_access_token(access_token, expires_in);
                self.store
                    .put(chat_id, &AuthState::Authorized { tokens: tokens.clone() })?;
                Ok(tokens.access_token)
            }
            Err(e) if e.is_retryable() => Err(AuthFlowError::RemoteUnavailable(e)),
            Err(e) => {
                // The refresh token itself was rejected. A stale token must
                // never be retried as-is: clear the record so the next
                // command routes the user back to authorization.
                warn!(%chat_id, error = %e, "token refresh rejected, clearing authorization");
                self.store.put(chat_id, &AuthState::Unauthorized)?;
                Err(AuthFlowError::ReauthorizationRequired)
            }
        }
    }

    fn refresh_lock(&self, chat_id: ChatId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock().unwrap();
        locks.entry(chat_id).or_default().clone()
    }
}
