//! Domain model and configuration shared by the review pipeline crates.

mod app_config;
mod config;
mod error;
mod filters;
mod reviews;
mod store;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{ConfigError, CoreError};
pub use filters::{FilterError, FilterSpec, ResponseMode};
pub use reviews::{DeveloperResponse, FetchDiagnostics, FetchResult, Review};
pub use store::Store;
