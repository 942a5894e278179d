//! Chat identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a chat participant.
///
/// This is the opaque numeric chat id assigned by the chat transport
/// (e.g. a Telegram chat id) and is the primary key for all persisted
/// authorization state. Identities are created on first inbound command
/// and never deleted, only updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    /// Returns the raw numeric id.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_serde_is_transparent() {
        let id = ChatId(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");

        let back: ChatId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn chat_id_display() {
        assert_eq!(ChatId(-100123).to_string(), "-100123");
    }
}
