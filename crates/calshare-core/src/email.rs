//! Grantee email validation.

use std::sync::OnceLock;

use regex::Regex;

/// One non-empty local part, an `@`, and a dotted domain. Deliberately
/// conservative: the calendar service is the final authority on whether a
/// grantee exists, this only rejects obviously malformed input before any
/// remote call is made.
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s.]+$";

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern must compile"))
}

/// Returns true if `email` has a plausible grantee address shape.
pub fn is_valid_grantee(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && email_regex().is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_addresses() {
        assert!(is_valid_grantee("alice@example.com"));
        assert!(is_valid_grantee("a.b+tag@sub.example.co.uk"));
        assert!(is_valid_grantee("x@y.io"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_grantee(""));
        assert!(!is_valid_grantee("alice"));
        assert!(!is_valid_grantee("alice@"));
        assert!(!is_valid_grantee("@example.com"));
        assert!(!is_valid_grantee("alice@example"));
        assert!(!is_valid_grantee("alice@example."));
        assert!(!is_valid_grantee("alice bob@example.com"));
        assert!(!is_valid_grantee("alice@exa mple.com"));
    }

    #[test]
    fn rejects_oversized_addresses() {
        let local = "a".repeat(250);
        assert!(!is_valid_grantee(&format!("{local}@example.com")));
    }
}
