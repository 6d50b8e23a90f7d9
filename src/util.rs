use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use once_cell::sync::Lazy;

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^1[3-9]\d{9}$").expect("phone pattern is a valid regex")
});

/// Formats a timestamp as fixed-width RFC 3339 UTC text so stored values sort lexically.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a timestamp written by [`timestamp`], returning `None` on malformed input.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Mainland China mobile numbers: 11 digits, starting with 13-19.
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(phone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_sortable() {
        let early = Utc.with_ymd_and_hms(2024, 7, 1, 6, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let a = timestamp(early);
        let b = timestamp(late);
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(&a), Some(early));
    }

    #[test]
    fn phone_validation() {
        assert!(is_valid_phone("13812345678"));
        assert!(is_valid_phone("19900000000"));
        assert!(!is_valid_phone("12812345678"));
        assert!(!is_valid_phone("1381234567"));
        assert!(!is_valid_phone("138123456789"));
        assert!(!is_valid_phone("1381234567a"));
    }
}
