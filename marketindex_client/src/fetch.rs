//! Request/response shapes shared by every page fetcher.

use std::future::Future;
use std::time::Duration;

/// Default page timeout when a request does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Whether a fetch may be answered from a previously fetched copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Reuse a cached copy when present; cache the page after fetching.
    #[default]
    Enabled,
    /// Always hit the network; the fresh page replaces any cached copy.
    Bypass,
}

/// One page fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// CSS selector that must match at least one element for the fetch to count as loaded.
    pub wait_for: Option<String>,
    pub timeout: Duration,
    /// Script to run once the page has loaded (scroll to trigger lazy rendering).
    pub render_script: Option<String>,
    pub cache_mode: CacheMode,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait_for: None,
            timeout: DEFAULT_TIMEOUT,
            render_script: None,
            cache_mode: CacheMode::default(),
        }
    }

    pub fn wait_for(mut self, selector: impl Into<String>) -> Self {
        self.wait_for = Some(selector.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn render_script(mut self, script: impl Into<String>) -> Self {
        self.render_script = Some(script.into());
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }
}

/// Result of a fetch. Failures are data, not errors: callers decide what a
/// missing page means for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub success: bool,
    pub html: Option<String>,
    pub error: Option<String>,
    pub from_cache: bool,
}

impl FetchOutcome {
    pub fn loaded(html: String) -> Self {
        Self {
            success: true,
            html: Some(html),
            error: None,
            from_cache: false,
        }
    }

    pub fn cached(html: String) -> Self {
        Self {
            from_cache: true,
            ..Self::loaded(html)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            html: None,
            error: Some(error.into()),
            from_cache: false,
        }
    }

    /// The page body, only when the fetch succeeded.
    pub fn page(&self) -> Option<&str> {
        if self.success {
            self.html.as_deref()
        } else {
            None
        }
    }
}

/// Anything that can turn a [`FetchRequest`] into page HTML.
pub trait PageFetcher {
    fn fetch(&self, request: &FetchRequest) -> impl Future<Output = FetchOutcome> + Send;
}

impl<T: PageFetcher + Sync> PageFetcher for &T {
    fn fetch(&self, request: &FetchRequest) -> impl Future<Output = FetchOutcome> + Send {
        (**self).fetch(request)
    }
}
