use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

fn assert_invalid(map: &HashMap<&str, &str>, expected_var: &str) {
    let result = build_app_config(lookup_from_map(map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == expected_var),
        "expected InvalidEnvVar({expected_var}), got: {result:?}"
    );
}

// ---------------------------------------------------------------------------
// parse_environment
// ---------------------------------------------------------------------------

#[test]
fn parse_environment_known_values() {
    assert_eq!(parse_environment("development"), Environment::Development);
    assert_eq!(parse_environment("test"), Environment::Test);
    assert_eq!(parse_environment("production"), Environment::Production);
}

#[test]
fn parse_environment_unknown_defaults_to_development() {
    assert_eq!(parse_environment("staging"), Environment::Development);
}

// ---------------------------------------------------------------------------
// defaults
// ---------------------------------------------------------------------------

#[test]
fn build_app_config_uses_defaults_for_empty_env() {
    let map: HashMap<&str, &str> = HashMap::new();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();

    assert_eq!(cfg.env, Environment::Development);
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.request_timeout_secs, 30);
    assert_eq!(cfg.user_agent, DEFAULT_USER_AGENT);
    assert_eq!(cfg.max_retries, 5);
    assert_eq!(cfg.backoff_base_ms, 1_000);
    assert_eq!(cfg.backoff_max_ms, 60_000);
    assert_eq!(cfg.play_min_interval_ms, 1_000);
    assert_eq!(cfg.app_store_min_interval_ms, 2_000);
    assert_eq!(cfg.play_page_size, 100);
    assert_eq!(cfg.max_pages_per_fetch, 10);
    assert_eq!(cfg.max_concurrent_fetches, 2);
    assert_eq!(cfg.default_language, "en");
    assert_eq!(cfg.default_country, "us");
    assert_eq!(cfg.play_base_url, "https://play.google.com");
    assert_eq!(cfg.itunes_base_url, "https://itunes.apple.com");
}

#[test]
fn duration_helpers_convert_units() {
    let map: HashMap<&str, &str> = HashMap::new();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.request_timeout().as_secs(), 30);
    assert_eq!(cfg.backoff_base().as_millis(), 1_000);
    assert_eq!(cfg.backoff_max().as_secs(), 60);
    assert_eq!(cfg.play_min_interval().as_millis(), 1_000);
    assert_eq!(cfg.app_store_min_interval().as_millis(), 2_000);
}

// ---------------------------------------------------------------------------
// overrides
// ---------------------------------------------------------------------------

#[test]
fn build_app_config_applies_overrides() {
    let mut map = HashMap::new();
    map.insert("APPREV_ENV", "production");
    map.insert("APPREV_MAX_RETRIES", "3");
    map.insert("APPREV_APP_STORE_MIN_INTERVAL_MS", "500");
    map.insert("APPREV_DEFAULT_COUNTRY", "GB");
    map.insert("APPREV_PLAY_BASE_URL", "http://127.0.0.1:8080/");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();

    assert_eq!(cfg.env, Environment::Production);
    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.app_store_min_interval_ms, 500);
    assert_eq!(cfg.default_country, "gb");
    assert_eq!(cfg.play_base_url, "http://127.0.0.1:8080");
}

#[test]
fn zero_min_interval_is_allowed() {
    let mut map = HashMap::new();
    map.insert("APPREV_PLAY_MIN_INTERVAL_MS", "0");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.play_min_interval_ms, 0);
}

// ---------------------------------------------------------------------------
// invalid values
// ---------------------------------------------------------------------------

#[test]
fn rejects_non_numeric_timeout() {
    let mut map = HashMap::new();
    map.insert("APPREV_REQUEST_TIMEOUT_SECS", "not-a-number");
    assert_invalid(&map, "APPREV_REQUEST_TIMEOUT_SECS");
}

#[test]
fn rejects_zero_retries() {
    let mut map = HashMap::new();
    map.insert("APPREV_MAX_RETRIES", "0");
    assert_invalid(&map, "APPREV_MAX_RETRIES");
}

#[test]
fn rejects_backoff_cap_below_base() {
    let mut map = HashMap::new();
    map.insert("APPREV_BACKOFF_BASE_MS", "5000");
    map.insert("APPREV_BACKOFF_MAX_MS", "1000");
    assert_invalid(&map, "APPREV_BACKOFF_MAX_MS");
}

#[test]
fn rejects_zero_page_size() {
    let mut map = HashMap::new();
    map.insert("APPREV_PLAY_PAGE_SIZE", "0");
    assert_invalid(&map, "APPREV_PLAY_PAGE_SIZE");
}

#[test]
fn rejects_zero_concurrency() {
    let mut map = HashMap::new();
    map.insert("APPREV_MAX_CONCURRENT_FETCHES", "0");
    assert_invalid(&map, "APPREV_MAX_CONCURRENT_FETCHES");
}

#[test]
fn rejects_malformed_default_language() {
    let mut map = HashMap::new();
    map.insert("APPREV_DEFAULT_LANGUAGE", "english");
    assert_invalid(&map, "APPREV_DEFAULT_LANGUAGE");
}

#[test]
fn rejects_base_url_without_scheme() {
    let mut map = HashMap::new();
    map.insert("APPREV_ITUNES_BASE_URL", "itunes.apple.com");
    assert_invalid(&map, "APPREV_ITUNES_BASE_URL");
}
