//! Page fetch layer for marketindex.com.au.
//!
//! Supplies rendered-or-raw HTML for a URL together with a success flag,
//! checking an optional CSS wait condition and honouring a per-call cache mode.

mod cache;
mod client;
mod errors;
mod fetch;
mod user_agent;

pub use self::cache::PageCache;
pub use self::client::HttpFetcher;
pub use self::errors::Error;
pub use self::fetch::{CacheMode, FetchOutcome, FetchRequest, PageFetcher};
pub use self::user_agent::get_user_agent;
