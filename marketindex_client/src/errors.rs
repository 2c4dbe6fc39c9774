//! Error types for the fetch layer.

/// Errors raised while fetching a single page.
///
/// These never escape [`crate::PageFetcher::fetch`]; they are rendered into
/// the `error` text of a failed [`crate::FetchOutcome`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The URL could not be parsed.
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    /// Transport failure, including timeouts.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("request failed with status {status}")]
    HttpStatus { status: u16 },
    /// The wait selector is not valid CSS.
    #[error("invalid wait selector `{0}`")]
    InvalidSelector(String),
    /// The page loaded but no element matched the wait selector.
    #[error("wait condition `{selector}` not satisfied")]
    WaitCondition { selector: String },
}

impl Error {
    /// True when the failure was the per-request timeout elapsing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_timeout())
    }
}
