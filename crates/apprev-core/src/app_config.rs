use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Runtime settings for the review pipeline, read from `APPREV_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Attempts per page request before a source is reported unavailable.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub play_min_interval_ms: u64,
    pub app_store_min_interval_ms: u64,
    pub play_page_size: usize,
    pub max_pages_per_fetch: usize,
    pub max_concurrent_fetches: usize,
    pub default_language: String,
    pub default_country: String,
    pub play_base_url: String,
    pub itunes_base_url: String,
}

impl AppConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    #[must_use]
    pub fn play_min_interval(&self) -> Duration {
        Duration::from_millis(self.play_min_interval_ms)
    }

    #[must_use]
    pub fn app_store_min_interval(&self) -> Duration {
        Duration::from_millis(self.app_store_min_interval_ms)
    }
}
