//! Pure app-identifier checks, run before any network request.

use std::sync::LazyLock;

use regex::Regex;

static PACKAGE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)+$").expect("valid package regex")
});

/// Minimum length of a numeric App Store track id.
const MIN_TRACK_ID_DIGITS: usize = 8;

/// Reverse-DNS identifier such as `com.example.app`. Used for Play package
/// names and App Store bundle ids.
#[must_use]
pub fn is_package_name(app_id: &str) -> bool {
    PACKAGE_NAME_RE.is_match(app_id)
}

/// All-digit App Store track id such as `284882215`.
#[must_use]
pub fn is_track_id(app_id: &str) -> bool {
    app_id.len() >= MIN_TRACK_ID_DIGITS && app_id.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reverse_dns_names() {
        assert!(is_package_name("com.example.app"));
        assert!(is_package_name("org.mozilla.firefox_beta"));
        assert!(is_package_name("A.b"));
    }

    #[test]
    fn rejects_malformed_package_names() {
        for id in ["", "example", "com..app", "1com.example", "com.example.", "com.ex-ample", "com.2app"] {
            assert!(!is_package_name(id), "{id:?} should be rejected");
        }
    }

    #[test]
    fn track_ids_need_eight_digits() {
        assert!(is_track_id("284882215"));
        assert!(is_track_id("12345678"));
        assert!(!is_track_id("1234567"));
        assert!(!is_track_id("12345678a"));
        assert!(!is_track_id(""));
    }
}
