//! Per-identity authorization state machine.
//!
//! Every chat identity owns exactly one [`AuthState`] record. The state
//! moves `Unauthorized -> PendingGrant -> Authorized`, may fall back to
//! `Unauthorized` on nonce expiry, a failed grant exchange or an
//! irrecoverable token refresh, and stays `Authorized` across in-place
//! token refreshes.
//!
//! The enum shape makes the token invariant structural: a record either
//! carries no tokens at all or a complete [`TokenSet`] (access + refresh +
//! expiry). Partial token sets cannot be represented, so they can never be
//! persisted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A complete OAuth2 token set for an authorized identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token presented to the calendar API.
    pub access_token: String,
    /// Long-lived token used to mint new access tokens.
    pub refresh_token: String,
    /// Absolute expiry of `access_token`.
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Creates a token set from a token-endpoint response.
    ///
    /// `expires_in_secs` is the relative lifetime reported by the
    /// authorization server; it is anchored to the current instant.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    /// Returns true if the access token must be refreshed before use.
    ///
    /// `skew` widens the expiry window so a token is refreshed slightly
    /// early rather than presented when it is about to lapse mid-request.
    pub fn needs_refresh(&self, skew: Duration) -> bool {
        Utc::now() + skew >= self.expires_at
    }

    /// Replaces the access token after a refresh, keeping the refresh token.
    pub fn rotate_access_token(&mut self, access_token: impl Into<String>, expires_in_secs: i64) {
        self.access_token = access_token.into();
        self.expires_at = Utc::now() + Duration::seconds(expires_in_secs);
    }
}

/// Coarse status tag for an [`AuthState`], used for persistence and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStatus {
    /// No authorization on record.
    Unauthorized,
    /// An authorization link was issued and its nonce is outstanding.
    PendingGrant,
    /// A complete token set is on record.
    Authorized,
}

impl AuthStatus {
    /// Stable string form, as stored in the database status column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::PendingGrant => "pending_grant",
            Self::Authorized => "authorized",
        }
    }

    /// Parses the stable string form. Returns `None` for unknown tags.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unauthorized" => Some(Self::Unauthorized),
            "pending_grant" => Some(Self::PendingGrant),
            "authorized" => Some(Self::Authorized),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization state of a single chat identity.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// No grant issued, or a previous grant was lost or abandoned.
    Unauthorized,
    /// An authorization link is outstanding; `nonce` is the single-use
    /// correlation token embedded in it.
    PendingGrant {
        nonce: String,
        issued_at: DateTime<Utc>,
    },
    /// The identity holds a complete token set.
    Authorized { tokens: TokenSet },
}

impl AuthState {
    /// Returns the coarse status tag for this state.
    pub fn status(&self) -> AuthStatus {
        match self {
            Self::Unauthorized => AuthStatus::Unauthorized,
            Self::PendingGrant { .. } => AuthStatus::PendingGrant,
            Self::Authorized { .. } => AuthStatus::Authorized,
        }
    }

    /// Returns true if the identity holds tokens.
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized { .. })
    }

    /// Returns the outstanding nonce, if any.
    pub fn pending_nonce(&self) -> Option<&str> {
        match self {
            Self::PendingGrant { nonce, .. } => Some(nonce),
            _ => None,
        }
    }

    /// Returns the token set, if the identity is authorized.
    pub fn tokens(&self) -> Option<&TokenSet> {
        match self {
            Self::Authorized { tokens } => Some(tokens),
            _ => None,
        }
    }
}
