use once_cell::sync::Lazy;
use regex::Regex;

// Substitution order matters: timestamps and UUIDs are digit-heavy and
// must be replaced before the bare-number rule; IPv4 before numbers for
// the same reason. Placeholders themselves contain no digits, slashes or
// hex runs, which is what makes the whole normalization idempotent.
static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
        .unwrap()
});
static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});
static HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"0x[0-9a-fA-F]+").unwrap());
static ADDR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").unwrap());
static PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:/[\w.@-]+){2,}/?").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Collapses the variable parts of a log message into placeholders so
/// that structurally identical messages map to one pattern template.
pub fn normalize_message(message: &str) -> String {
    let msg = TIMESTAMP_RE.replace_all(message, "<ts>");
    let msg = UUID_RE.replace_all(&msg, "<uuid>");
    let msg = HEX_RE.replace_all(&msg, "<hex>");
    let msg = ADDR_RE.replace_all(&msg, "<addr>");
    let msg = PATH_RE.replace_all(&msg, "<path>");
    let msg = NUMBER_RE.replace_all(&msg, "<n>");
    msg.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_numbers() {
        assert_eq!(normalize_message("retry 3 of 10"), "retry <n> of <n>");
    }

    #[test]
    fn replaces_hex_addresses() {
        assert_eq!(
            normalize_message("fault at 0xDEADbeef"),
            "fault at <hex>"
        );
    }

    #[test]
    fn replaces_uuids() {
        assert_eq!(
            normalize_message("device 123E4567-e89b-12d3-a456-426614174000 lost"),
            "device <uuid> lost"
        );
    }

    #[test]
    fn replaces_timestamps_before_numbers() {
        assert_eq!(
            normalize_message("started at 2025-12-11T10:00:00.123Z ok"),
            "started at <ts> ok"
        );
        assert_eq!(
            normalize_message("seen 2025-12-11 10:00:00.123456+0000"),
            "seen <ts>"
        );
    }

    #[test]
    fn replaces_ipv4_addresses() {
        assert_eq!(
            normalize_message("connect to 192.168.0.12 failed"),
            "connect to <addr> failed"
        );
    }

    #[test]
    fn replaces_filesystem_paths() {
        assert_eq!(
            normalize_message("wrote /var/mobile/Library/cache.db quickly"),
            "wrote <path> quickly"
        );
    }

    #[test]
    fn mixed_message() {
        assert_eq!(
            normalize_message("req 42 to 10.0.0.1 took 37ms at 0xFF"),
            "req <n> to <addr> took <n>ms at <hex>"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let messages = [
            "retry 3 of 10",
            "fault at 0xDEAD",
            "device 123e4567-e89b-12d3-a456-426614174000",
            "started at 2025-12-11T10:00:00Z",
            "connect to 192.168.0.12",
            "wrote /var/mobile/Library/cache.db",
            "plain message without variables",
        ];
        for message in messages {
            let once = normalize_message(message);
            assert_eq!(normalize_message(&once), once, "not idempotent: {}", message);
        }
    }
}
