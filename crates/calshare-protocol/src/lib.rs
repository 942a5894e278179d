//! Wire protocol between chat transport adapters and the calshare daemon.
//!
//! Transport adapters (a Telegram bot process, a test harness, ...) connect
//! to the daemon's Unix socket and exchange length-prefixed JSON messages:
//!
//! - 4 bytes: message length (u32, big-endian)
//! - N bytes: JSON payload
//!
//! Every message is wrapped in an [`Envelope`] carrying the protocol
//! version and a request id for correlation. Requests deliver
//! `(chat id, command name, argument list)`; the daemon answers with a
//! structured [`Reply`] that the adapter renders however it likes — no
//! user-facing text crosses this boundary.

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{decode_message, encode_message};
pub use types::{
    CalendarDescriptor, Command, CommandRequest, Envelope, ErrorCode, ErrorResponse, Reply,
    ShareGrant,
};

/// Protocol version constant.
pub const PROTOCOL_VERSION: &str = "1";

/// Maximum message size (256 KiB).
pub const MAX_MESSAGE_SIZE: u32 = 256 * 1024;
