//! Command dispatcher.
//!
//! A stateless router: every invocation reads whatever it needs from the
//! store, calls the coordinator or the gateway, and produces a [`Reply`].
//! Caller errors (bad arity, malformed grantee) are rejected before any
//! side effect; identities that are obviously unauthorized are
//! short-circuited with a prompt instead of bouncing off the gateway's
//! token check.

use std::sync::Arc;

use tracing::debug;

use calshare_core::{ChatId, is_valid_grantee};
use calshare_google::ApiErrorCode;
use calshare_protocol::{Command, CommandRequest, ErrorCode, Reply};
use calshare_store::AuthStore;

use crate::coordinator::{AuthCoordinator, AuthFlowError};
use crate::gateway::{AclGateway, GatewayError};

/// Routes parsed commands to the coordinator and gateway.
pub struct Dispatcher {
    store: Arc<AuthStore>,
    coordinator: Arc<AuthCoordinator>,
    gateway: Arc<AclGateway>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given components.
    pub fn new(
        store: Arc<AuthStore>,
        coordinator: Arc<AuthCoordinator>,
        gateway: Arc<AclGateway>,
    ) -> Self {
        Self {
            store,
            coordinator,
            gateway,
        }
    }

    /// Handles one inbound command and returns the reply to render.
    pub async fn dispatch(&self, request: &CommandRequest) -> Reply {
        let command = match Command::parse(&request.command, &request.args) {
            Ok(command) => command,
            Err(error) => return Reply::from_error(error),
        };

        let chat_id = request.chat_id;
        debug!(%chat_id, command = %request.command, "dispatching command");

        match command {
            Command::Ping => Reply::Pong,

            Command::Start => self.start(chat_id).await,

            Command::ShowCalendars => match self.short_circuit_unauthorized(chat_id) {
                Some(reply) => reply,
                None => self.list_calendars(chat_id).await,
            },

            Command::ShowShares { calendar_id } => {
                match self.short_circuit_unauthorized(chat_id) {
                    Some(reply) => reply,
                    None => match self.gateway.list_shares(chat_id, &calendar_id).await {
                        Ok(shares) => Reply::Shares {
                            calendar_id,
                            shares,
                        },
                        Err(e) => gateway_error_reply(e),
                    },
                }
            }

            Command::AddShare {
                calendar_id,
                email,
                role,
            } => {
                if !is_valid_grantee(&email) {
                    return Reply::error(
                        ErrorCode::GranteeInvalid,
                        format!("{email:?} is not a valid grantee address"),
                    );
                }
                match self.short_circuit_unauthorized(chat_id) {
                    Some(reply) => reply,
                    None => match self
                        .gateway
                        .add_share(chat_id, &calendar_id, &email, role)
                        .await
                    {
                        Ok(()) => Reply::ShareAdded {
                            calendar_id,
                            email,
                            role,
                        },
                        Err(e) => gateway_error_reply(e),
                    },
                }
            }

            Command::DeleteShare { calendar_id, email } => {
                if !is_valid_grantee(&email) {
                    return Reply::error(
                        ErrorCode::GranteeInvalid,
                        format!("{email:?} is not a valid grantee address"),
                    );
                }
                match self.short_circuit_unauthorized(chat_id) {
                    Some(reply) => reply,
                    None => match self
                        .gateway
                        .delete_share(chat_id, &calendar_id, &email)
                        .await
                    {
                        Ok(_removed) => Reply::ShareDeleted { calendar_id, email },
                        Err(e) => gateway_error_reply(e),
                    },
                }
            }
        }
    }

    /// `start`: hand out an authorization link, or list calendars if the
    /// identity is already authorized.
    async fn start(&self, chat_id: ChatId) -> Reply {
        match self.is_authorized(chat_id) {
            Err(reply) => reply,
            Ok(true) => self.list_calendars(chat_id).await,
            Ok(false) => match self.coordinator.begin_authorization(chat_id) {
                Ok(auth_url) => Reply::AuthorizationPending { auth_url },
                Err(e) => auth_error_reply(e),
            },
        }
    }

    async fn list_calendars(&self, chat_id: ChatId) -> Reply {
        match self.gateway.list_calendars(chat_id).await {
            Ok(calendars) => Reply::Calendars { calendars },
            Err(e) => gateway_error_reply(e),
        }
    }

    /// Returns a prompt reply for identities without authorization, so an
    /// obviously doomed gateway call is never made. Authoritative token
    /// validation still happens in the coordinator.
    fn short_circuit_unauthorized(&self, chat_id: ChatId) -> Option<Reply> {
        match self.is_authorized(chat_id) {
            Err(reply) => Some(reply),
            Ok(true) => None,
            Ok(false) => Some(Reply::error(
                ErrorCode::NotAuthorized,
                "chat is not authorized; send start to authorize first",
            )),
        }
    }

    fn is_authorized(&self, chat_id: ChatId) -> Result<bool, Reply> {
        match self.store.get(chat_id) {
            Ok(state) => Ok(state.is_some_and(|s| s.is_authorized())),
            Err(e) => Err(Reply::error(ErrorCode::StoreUnavailable, e.to_string())),
        }
    }
}

/// Maps a coordinator error onto a protocol error reply.
fn auth_error_reply(e: AuthFlowError) -> Reply {
    let code = match &e {
        AuthFlowError::NotAuthorized => ErrorCode::NotAuthorized,
        AuthFlowError::ReauthorizationRequired => ErrorCode::ReauthorizationRequired,
        AuthFlowError::UnknownOrExpiredNonce => ErrorCode::UnknownOrExpiredNonce,
        AuthFlowError::GrantExchangeFailed(_) => ErrorCode::GrantExchangeFailed,
        AuthFlowError::RemoteUnavailable(_) => ErrorCode::RemoteUnavailable,
        AuthFlowError::Store(_) => ErrorCode::StoreUnavailable,
    };
    Reply::error(code, e.to_string())
}

/// Maps a gateway error onto a protocol error reply.
fn gateway_error_reply(e: GatewayError) -> Reply {
    match e {
        GatewayError::Auth(auth) => auth_error_reply(auth),
        GatewayError::Api(api) => {
            let code = match api.code() {
                ApiErrorCode::NotFound => ErrorCode::CalendarNotFound,
                ApiErrorCode::BadRequest => ErrorCode::GranteeInvalid,
                ApiErrorCode::NetworkError
                | ApiErrorCode::RateLimited
                | ApiErrorCode::ServerError => ErrorCode::RemoteUnavailable,
                ApiErrorCode::AuthenticationFailed
                | ApiErrorCode::PermissionDenied
                | ApiErrorCode::InvalidResponse
                | ApiErrorCode::ConfigurationError => ErrorCode::RemoteRejected,
            };
            Reply::error(code, api.to_string())
        }
    }
}
