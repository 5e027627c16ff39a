pub mod error;
pub mod filter;
mod http;
pub mod normalize;
pub mod orchestrator;
pub mod rate_limit;
pub mod sources;
pub mod validate;

pub use error::{FetchError, ScraperError};
pub use orchestrator::{FetchRequest, ReviewFetcher};
pub use rate_limit::{retry_with_backoff, Clock, ManualClock, RateLimiter, SourcePolicy, TokioClock};
pub use sources::{
    AppInfo, AppStoreAdapter, FetchContext, PageQuery, PlayAdapter, RawPage, RawReview,
    ReviewSort, SourceAdapter,
};
