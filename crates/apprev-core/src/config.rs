use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

pub(crate) const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Every setting has a default, so an empty environment yields a usable config.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = or_default(var, default)
            .trim()
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(value)
    };

    let locale_code = |var: &str, default: &str| -> Result<String, ConfigError> {
        let value = or_default(var, default).trim().to_ascii_lowercase();
        if value.len() != 2 || !value.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(invalid(var, format!("expected a two-letter code, got \"{value}\"")));
        }
        Ok(value)
    };

    let base_url = |var: &str, default: &str| -> Result<String, ConfigError> {
        let value = or_default(var, default).trim().trim_end_matches('/').to_string();
        if !(value.starts_with("http://") || value.starts_with("https://")) {
            return Err(invalid(var, format!("expected an http(s) URL, got \"{value}\"")));
        }
        Ok(value)
    };

    let env = parse_environment(&or_default("APPREV_ENV", "development"));
    let log_level = or_default("APPREV_LOG_LEVEL", "info");
    let request_timeout_secs = parse_u64("APPREV_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("APPREV_USER_AGENT", DEFAULT_USER_AGENT);

    let max_retries = parse_u32("APPREV_MAX_RETRIES", "5")?;
    if max_retries == 0 {
        return Err(invalid("APPREV_MAX_RETRIES", "must be at least 1".to_string()));
    }
    let backoff_base_ms = parse_u64("APPREV_BACKOFF_BASE_MS", "1000")?;
    let backoff_max_ms = parse_u64("APPREV_BACKOFF_MAX_MS", "60000")?;
    if backoff_max_ms < backoff_base_ms {
        return Err(invalid(
            "APPREV_BACKOFF_MAX_MS",
            format!("must be >= APPREV_BACKOFF_BASE_MS ({backoff_base_ms})"),
        ));
    }

    let play_min_interval_ms = parse_u64("APPREV_PLAY_MIN_INTERVAL_MS", "1000")?;
    let app_store_min_interval_ms = parse_u64("APPREV_APP_STORE_MIN_INTERVAL_MS", "2000")?;
    let play_page_size = parse_positive_usize("APPREV_PLAY_PAGE_SIZE", "100")?;
    let max_pages_per_fetch = parse_positive_usize("APPREV_MAX_PAGES_PER_FETCH", "10")?;
    let max_concurrent_fetches = parse_positive_usize("APPREV_MAX_CONCURRENT_FETCHES", "2")?;

    let default_language = locale_code("APPREV_DEFAULT_LANGUAGE", "en")?;
    let default_country = locale_code("APPREV_DEFAULT_COUNTRY", "us")?;
    let play_base_url = base_url("APPREV_PLAY_BASE_URL", "https://play.google.com")?;
    let itunes_base_url = base_url("APPREV_ITUNES_BASE_URL", "https://itunes.apple.com")?;

    Ok(AppConfig {
        env,
        log_level,
        request_timeout_secs,
        user_agent,
        max_retries,
        backoff_base_ms,
        backoff_max_ms,
        play_min_interval_ms,
        app_store_min_interval_ms,
        play_page_size,
        max_pages_per_fetch,
        max_concurrent_fetches,
        default_language,
        default_country,
        play_base_url,
        itunes_base_url,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
