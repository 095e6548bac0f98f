//! Pre-masking regex pass (§4.C step 1): replaces easily identifiable
//! variable tokens with `<*>` before a log body (or span name) is tokenized
//! and handed to the clusterer, stabilizing the tree against numbers, IDs,
//! and timestamps that would otherwise never repeat.

use once_cell::sync::Lazy;
use regex::Regex;

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap()
});

static ISO8601: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?\b").unwrap()
});

static IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap());

static IPV6: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[0-9a-fA-F]{1,4}:){2,7}[0-9a-fA-F]{0,4}\b").unwrap()
});

static HEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b0x[0-9a-f]+\b|\b[0-9a-f]{12,}\b").unwrap());

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\b\d+(?:\.\d+)?[a-zA-Z]*\b").unwrap());

/// Replace numbers, hex blobs, UUIDs, IPv4/IPv6 addresses, and ISO 8601
/// timestamps with the placeholder token `<*>`. Order matters: the more
/// specific patterns (UUID, timestamp, IP) run before the catch-all number
/// pattern so e.g. a UUID isn't shredded into its hyphen-separated digit runs.
/// The number pattern swallows a trailing unit suffix (`50ms`, `10kb`) as
/// part of the same token, since `\b` alone can't close between a digit and
/// an adjoining letter.
pub fn mask(text: &str) -> String {
    let text = UUID.replace_all(text, "<*>");
    let text = ISO8601.replace_all(&text, "<*>");
    let text = IPV6.replace_all(&text, "<*>");
    let text = IPV4.replace_all(&text, "<*>");
    let text = HEX.replace_all(&text, "<*>");
    let text = NUMBER.replace_all(&text, "<*>");
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_trailing_integer() {
        assert_eq!(mask("user 1 failed login"), "user <*> failed login");
    }

    #[test]
    fn masks_uuid_as_single_token() {
        assert_eq!(
            mask("session 550e8400-e29b-41d4-a716-446655440000 expired"),
            "session <*> expired"
        );
    }

    #[test]
    fn masks_ipv4_and_duration() {
        assert_eq!(
            mask("connection from 10.0.0.1 timed out after 50ms"),
            "connection from <*> timed out after <*>"
        );
    }

    #[test]
    fn masks_iso8601_timestamp() {
        assert_eq!(
            mask("retry scheduled at 2024-01-15T10:30:00Z"),
            "retry scheduled at <*>"
        );
    }
}
