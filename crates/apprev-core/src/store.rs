use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// The marketplace a review was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    /// Google Play.
    Android,
    /// Apple App Store.
    Ios,
}

impl Store {
    pub const ALL: [Store; 2] = [Store::Android, Store::Ios];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Store::Android => "android",
            Store::Ios => "ios",
        }
    }
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Store {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" | "play" | "google_play" => Ok(Store::Android),
            "ios" | "appstore" | "app_store" => Ok(Store::Ios),
            _ => Err(CoreError::UnknownStore(s.to_owned())),
        }
    }
}
