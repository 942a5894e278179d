//! Google OAuth2 and Calendar ACL API clients.
//!
//! Two thin, typed HTTP clients over the external services the daemon
//! talks to:
//!
//! - [`OAuthClient`] — authorization URL construction, authorization-code
//!   exchange and access-token refresh against the OAuth2 token endpoint.
//! - [`AclClient`] — calendar list and ACL (sharing) operations against
//!   the Calendar API, taking a bearer token per call. Token freshness is
//!   never this crate's concern; the coordinator supplies a valid token.
//!
//! All endpoints are configurable through [`GoogleApiConfig`], which also
//! lets tests point the clients at a local mock server.

mod acl;
mod config;
mod error;
mod oauth;

pub use acl::{AclClient, AclRule, AclScope, CalendarListEntry};
pub use config::{GoogleApiConfig, OAuthCredentials};
pub use error::{ApiError, ApiErrorCode, ApiResult};
pub use oauth::{OAuthClient, generate_nonce};
