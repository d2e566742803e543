//! Decoding of object keys as they appear in storage notifications.
//!
//! Notification payloads carry keys in form-urlencoded style: spaces become
//! `+` and a handful of reserved characters are percent-escaped. Only that
//! fixed set is decoded; any other escape is left exactly as received.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Escape tokens and the literal each one stands for.
const ESCAPES: &[(&str, &str)] = &[
    ("+", " "),
    ("%21", "!"),
    ("%24", "$"),
    ("%26", "&"),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%2B", "+"),
    ("%40", "@"),
    ("%3A", ":"),
    ("%3B", ";"),
    ("%2C", ","),
    ("%3D", "="),
    ("%3F", "?"),
];

static ESCAPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = ESCAPES
        .iter()
        .map(|(token, _)| regex::escape(token))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).expect("escape tokens form a valid pattern")
});

/// Decode a notification key into the literal object key.
///
/// The input is scanned once, so a decoded `+` (from `%2B`) is never turned
/// into a space afterwards.
pub fn decode(key: &str) -> String {
    decode_cow(key).into_owned()
}

/// Like [`decode`], borrowing the input when nothing needs replacing.
pub fn decode_cow(key: &str) -> Cow<'_, str> {
    ESCAPE_PATTERN.replace_all(key, |caps: &Captures| {
        let token = &caps[0];
        ESCAPES
            .iter()
            .find(|(escape, _)| *escape == token)
            .map(|(_, literal)| *literal)
            .unwrap_or(token)
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_and_escaped_plus() {
        assert_eq!(decode("a%2Bb"), "a+b");
        assert_eq!(decode("a+b"), "a b");
        assert_eq!(decode("a+%2B+b"), "a + b");
    }

    #[test]
    fn test_every_known_escape() {
        for (token, literal) in ESCAPES {
            assert_eq!(decode(&format!("x{token}y")), format!("x{literal}y"));
        }
    }

    #[test]
    fn test_realistic_rds_key() {
        let key = "error/postgresql.log.2024-01-15-10%3A00%3A00+%28copy%29.gz";
        assert_eq!(
            decode(key),
            "error/postgresql.log.2024-01-15-10:00:00 (copy).gz"
        );
    }

    #[test]
    fn test_unknown_escapes_pass_through() {
        assert_eq!(decode("dir%2Ffile%7E.gz"), "dir%2Ffile%7E.gz");
        // Only the uppercase forms are in the table.
        assert_eq!(decode("a%2bb%3a"), "a%2bb%3a");
        assert_eq!(decode("100%"), "100%");
    }

    #[test]
    fn test_decode_is_idempotent_once_tokens_are_gone() {
        for input in ["plain/key.gz", "a%2Cb%3Dc", "a%21b"] {
            let once = decode(input);
            assert_eq!(decode(&once), once);
        }
    }

    #[test]
    fn test_nothing_to_decode_borrows() {
        assert!(matches!(decode_cow("plain.gz"), Cow::Borrowed(_)));
    }
}
