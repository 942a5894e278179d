//! Calendar sharing roles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A calendar access role that can be granted to another user.
///
/// These are the three grantable roles of the calendar ACL. The `owner`
/// role is deliberately absent: ownership is never granted through this
/// system and owner entries are filtered out of share listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShareRole {
    /// See only free/busy blocks, no event details.
    FreeBusyReader,
    /// Read event details.
    Reader,
    /// Read and modify events.
    Writer,
}

impl ShareRole {
    /// The role name as used on the calendar API wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreeBusyReader => "freeBusyReader",
            Self::Reader => "reader",
            Self::Writer => "writer",
        }
    }
}

impl std::fmt::Display for ShareRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role string is not one of the grantable roles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown share role: {0:?} (expected freeBusyReader, reader or writer)")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for ShareRole {
    type Err = UnknownRole;

    /// Parses a role name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "freebusyreader" => Ok(Self::FreeBusyReader),
            "reader" => Ok(Self::Reader),
            "writer" => Ok(Self::Writer),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(ShareRole::FreeBusyReader.as_str(), "freeBusyReader");
        assert_eq!(ShareRole::Reader.as_str(), "reader");
        assert_eq!(ShareRole::Writer.as_str(), "writer");
    }

    #[test]
    fn parse_accepts_wire_names() {
        assert_eq!(
            "freeBusyReader".parse::<ShareRole>().unwrap(),
            ShareRole::FreeBusyReader
        );
        assert_eq!("reader".parse::<ShareRole>().unwrap(), ShareRole::Reader);
        assert_eq!("WRITER".parse::<ShareRole>().unwrap(), ShareRole::Writer);
    }

    #[test]
    fn parse_rejects_owner() {
        assert!("owner".parse::<ShareRole>().is_err());
        assert!("".parse::<ShareRole>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ShareRole::FreeBusyReader).unwrap();
        assert_eq!(json, "\"freeBusyReader\"");

        let role: ShareRole = serde_json::from_str("\"writer\"").unwrap();
        assert_eq!(role, ShareRole::Writer);
    }
}
