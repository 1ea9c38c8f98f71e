//! Display initials - the short tag shown on the leaderboard.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of characters in a display tag.
pub const MAX_INITIALS_LEN: usize = 4;

/// Normalize free-text input into display-tag form.
///
/// Trims, uppercases, strips everything that is not an ASCII letter or
/// digit, and truncates to [`MAX_INITIALS_LEN`]. The result may be empty;
/// use [`Initials::parse`] when an empty result must be rejected.
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(MAX_INITIALS_LEN)
        .collect()
}

/// A validated display tag: 1-4 uppercase ASCII alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Initials(String);

impl Initials {
    /// Normalize and validate free-text input.
    ///
    /// Rejects input that normalizes to the empty string.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Err(Error::EmptyInitials);
        }
        Ok(Self(normalized))
    }

    /// The normalized tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Initials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Initials> for String {
    fn from(initials: Initials) -> Self {
        initials.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_and_uppercases() {
        assert_eq!(normalize("  ab!!12cdef"), "AB12");
        assert_eq!(normalize("jd"), "JD");
        assert_eq!(normalize(" a b "), "AB");
    }

    #[test]
    fn normalize_truncates_to_four() {
        assert_eq!(normalize("abcdef"), "ABCD");
        assert_eq!(normalize("a1b2c3"), "A1B2");
    }

    #[test]
    fn normalize_symbols_to_empty() {
        assert_eq!(normalize("***"), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_drops_non_ascii() {
        // Only ASCII alphanumerics survive.
        assert_eq!(normalize("héllo"), "HLLO");
        assert_eq!(normalize("日本語x"), "X");
    }

    #[test]
    fn parse_accepts_valid_input() {
        let initials = Initials::parse("jd42").unwrap();
        assert_eq!(initials.as_str(), "JD42");
        assert_eq!(initials.to_string(), "JD42");
    }

    #[test]
    fn parse_rejects_empty_result() {
        assert!(matches!(Initials::parse("***"), Err(Error::EmptyInitials)));
        assert!(matches!(Initials::parse(""), Err(Error::EmptyInitials)));
    }

    #[test]
    fn serialization_is_transparent() {
        let initials = Initials::parse("ab").unwrap();
        let json = serde_json::to_string(&initials).unwrap();
        assert_eq!(json, r#""AB""#);

        let parsed: Initials = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, initials);
    }
}
