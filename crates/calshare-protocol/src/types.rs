//! Request and reply types for the calshare protocol.

use calshare_core::{ChatId, ShareRole};
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

/// Message envelope wrapping all protocol messages.
///
/// Every message exchanged between an adapter and the daemon is wrapped in
/// this envelope, which provides versioning and request correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Protocol version (always "1" for v1).
    pub protocol_version: String,
    /// Unique request id for correlation.
    pub request_id: String,
    /// The actual payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Creates a new envelope with the current protocol version.
    pub fn new(request_id: impl Into<String>, payload: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_id: request_id.into(),
            payload,
        }
    }

    /// Creates a request envelope.
    pub fn request(request_id: impl Into<String>, request: T) -> Self {
        Self::new(request_id, request)
    }

    /// Creates a response envelope.
    pub fn response(request_id: impl Into<String>, response: T) -> Self {
        Self::new(request_id, response)
    }

    /// Checks if this envelope uses a compatible protocol version.
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

/// A command as delivered by a transport adapter: the chat identity plus
/// the raw command name and argument list.
///
/// The daemon parses this into a [`Command`] before acting on it, so
/// arity/shape errors are rejected uniformly regardless of transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// The chat identity issuing the command.
    pub chat_id: ChatId,
    /// Command name, e.g. `"add-share"`.
    pub command: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandRequest {
    /// Creates a command request.
    pub fn new(chat_id: ChatId, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            chat_id,
            command: command.into(),
            args,
        }
    }
}

/// The closed set of commands the daemon understands.
///
/// Adding a command means adding a variant here and a match arm in the
/// dispatcher; there is no string-keyed handler table to fall out of sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Transport liveness probe.
    Ping,
    /// Conversation entry point: authorize, or list calendars if already
    /// authorized.
    Start,
    /// List the user's own calendars.
    ShowCalendars,
    /// List who a calendar is shared with.
    ShowShares { calendar_id: String },
    /// Grant a role on a calendar to an email address.
    AddShare {
        calendar_id: String,
        email: String,
        role: ShareRole,
    },
    /// Revoke a grantee's access to a calendar.
    DeleteShare { calendar_id: String, email: String },
}

impl Command {
    /// Parses a raw `(name, args)` pair, validating arity and argument
    /// shape. Fails with an `InvalidArguments` error descriptor; nothing
    /// else is inspected or mutated on failure.
    pub fn parse(name: &str, args: &[String]) -> Result<Self, ErrorResponse> {
        match name {
            "ping" => {
                expect_arity(name, args, 0)?;
                Ok(Self::Ping)
            }
            "start" => {
                expect_arity(name, args, 0)?;
                Ok(Self::Start)
            }
            "show-calendars" => {
                expect_arity(name, args, 0)?;
                Ok(Self::ShowCalendars)
            }
            "show-share" => {
                expect_arity(name, args, 1)?;
                Ok(Self::ShowShares {
                    calendar_id: args[0].clone(),
                })
            }
            "add-share" => {
                expect_arity(name, args, 3)?;
                let role = args[2].parse::<ShareRole>().map_err(|e| {
                    ErrorResponse::new(ErrorCode::InvalidArguments, e.to_string())
                })?;
                Ok(Self::AddShare {
                    calendar_id: args[0].clone(),
                    email: args[1].clone(),
                    role,
                })
            }
            "delete-share" => {
                expect_arity(name, args, 2)?;
                Ok(Self::DeleteShare {
                    calendar_id: args[0].clone(),
                    email: args[1].clone(),
                })
            }
            other => Err(ErrorResponse::new(
                ErrorCode::InvalidArguments,
                format!("unknown command: {other:?}"),
            )),
        }
    }
}

fn expect_arity(name: &str, args: &[String], expected: usize) -> Result<(), ErrorResponse> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ErrorResponse::new(
            ErrorCode::InvalidArguments,
            format!(
                "{name} takes {expected} argument(s), got {}",
                args.len()
            ),
        ))
    }
}

/// A calendar owned by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDescriptor {
    /// The calendar id, usable in subsequent share commands.
    pub id: String,
    /// Human-readable calendar name.
    pub summary: String,
    /// Whether this is the account's primary calendar.
    #[serde(default)]
    pub primary: bool,
}

/// A sharing grant on a calendar: who can see it, and how much.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareGrant {
    /// Grantee email address.
    pub email: String,
    /// Granted role.
    pub role: ShareRole,
}

/// Replies sent from the daemon back to a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Liveness probe answer.
    Pong,
    /// The identity must authorize first; `auth_url` is the link to show.
    AuthorizationPending { auth_url: String },
    /// The user's own calendars.
    Calendars { calendars: Vec<CalendarDescriptor> },
    /// Current grants on a calendar.
    Shares {
        calendar_id: String,
        shares: Vec<ShareGrant>,
    },
    /// A grant was committed (insert or role update).
    ShareAdded {
        calendar_id: String,
        email: String,
        role: ShareRole,
    },
    /// A grantee was removed (no-op if they were already absent).
    ShareDeleted { calendar_id: String, email: String },
    /// The command failed.
    Error { error: ErrorResponse },
}

impl Reply {
    /// Creates an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorResponse::new(code, message),
        }
    }

    /// Wraps an existing error descriptor.
    pub fn from_error(error: ErrorResponse) -> Self {
        Self::Error { error }
    }
}

/// Machine-readable error category, for the adapter to decide how to
/// present a failure (and whether "try again" is honest advice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Wrong arity or malformed argument; nothing happened.
    InvalidArguments,
    /// The identity has no authorization on record.
    NotAuthorized,
    /// Stored tokens are no longer usable; the user must authorize again.
    ReauthorizationRequired,
    /// The callback carried a nonce that is unknown, expired or reused.
    UnknownOrExpiredNonce,
    /// The authorization server rejected the grant exchange.
    GrantExchangeFailed,
    /// Persistence failed; the operation was aborted.
    StoreUnavailable,
    /// The referenced calendar does not exist or is not accessible.
    CalendarNotFound,
    /// The grantee address is malformed or rejected.
    GranteeInvalid,
    /// The calendar service was unreachable or overloaded; retrying later
    /// may succeed.
    RemoteUnavailable,
    /// The calendar service rejected the operation permanently.
    RemoteRejected,
    /// Unexpected internal failure.
    InternalError,
}

impl ErrorCode {
    /// Returns true if retrying the same command later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable | Self::StoreUnavailable)
    }
}

/// An error descriptor carried in a [`Reply::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub code: ErrorCode,
    /// Diagnostic message (for logs; adapters render their own text).
    pub message: String,
}

impl ErrorResponse {
    /// Creates an error descriptor.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_zero_arg_commands() {
        assert_eq!(Command::parse("ping", &[]).unwrap(), Command::Ping);
        assert_eq!(Command::parse("start", &[]).unwrap(), Command::Start);
        assert_eq!(
            Command::parse("show-calendars", &[]).unwrap(),
            Command::ShowCalendars
        );
    }

    #[test]
    fn parse_show_share() {
        let cmd = Command::parse("show-share", &args(&["work@group.calendar.google.com"]));
        assert_eq!(
            cmd.unwrap(),
            Command::ShowShares {
                calendar_id: "work@group.calendar.google.com".to_string()
            }
        );
    }

    #[test]
    fn parse_add_share() {
        let cmd = Command::parse(
            "add-share",
            &args(&["primary", "alice@example.com", "reader"]),
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::AddShare {
                calendar_id: "primary".to_string(),
                email: "alice@example.com".to_string(),
                role: ShareRole::Reader,
            }
        );
    }

    #[test]
    fn parse_delete_share() {
        let cmd = Command::parse("delete-share", &args(&["primary", "alice@example.com"])).unwrap();
        assert_eq!(
            cmd,
            Command::DeleteShare {
                calendar_id: "primary".to_string(),
                email: "alice@example.com".to_string(),
            }
        );
    }

    #[test]
    fn parse_rejects_wrong_arity() {
        for (name, bad_args) in [
            ("start", args(&["extra"])),
            ("show-share", args(&[])),
            ("show-share", args(&["a", "b"])),
            ("add-share", args(&["cal", "mail@example.com"])),
            ("delete-share", args(&["cal"])),
        ] {
            let err = Command::parse(name, &bad_args).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidArguments, "{name}");
        }
    }

    #[test]
    fn parse_rejects_unknown_command() {
        let err = Command::parse("drop-tables", &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArguments);
        assert!(err.message.contains("unknown command"));
    }

    #[test]
    fn parse_rejects_ungrantable_role() {
        let err =
            Command::parse("add-share", &args(&["cal", "mail@example.com", "owner"])).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArguments);
    }

    #[test]
    fn envelope_version_check() {
        let env = Envelope::request("r1", CommandRequest::new(calshare_core::ChatId(1), "ping", vec![]));
        assert!(env.is_compatible());

        let mut stale = env.clone();
        stale.protocol_version = "0".to_string();
        assert!(!stale.is_compatible());
    }

    #[test]
    fn reply_serde_shape() {
        let reply = Reply::error(ErrorCode::UnknownOrExpiredNonce, "nonce replayed");
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"]["code"], "unknown_or_expired_nonce");

        let back: Reply = serde_json::from_value(json).unwrap();
        assert_eq!(back, reply);
    }

    #[test]
    fn command_request_args_default_to_empty() {
        let json = r#"{"chat_id": 5, "command": "start"}"#;
        let req: CommandRequest = serde_json::from_str(json).unwrap();
        assert!(req.args.is_empty());
    }

    #[test]
    fn retryable_error_codes() {
        assert!(ErrorCode::RemoteUnavailable.is_retryable());
        assert!(ErrorCode::StoreUnavailable.is_retryable());
        assert!(!ErrorCode::RemoteRejected.is_retryable());
        assert!(!ErrorCode::UnknownOrExpiredNonce.is_retryable());
        assert!(!ErrorCode::InvalidArguments.is_retryable());
    }
}
