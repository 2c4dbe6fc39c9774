//! HTTP transport for page fetches.

use std::time::Duration;

use scraper::{Html, Selector};
use url::Url;

use crate::{
    cache::PageCache,
    fetch::{CacheMode, FetchOutcome, FetchRequest, PageFetcher},
    user_agent::get_user_agent,
    Error,
};

/// Page fetcher over plain HTTP with an in-memory page cache.
///
/// Sends browser-like headers and a randomized user agent. The wait
/// condition is checked against the returned document; a render script
/// cannot run without a browser and is only logged.
pub struct HttpFetcher {
    http: reqwest::Client,
    cache: PageCache,
}

impl HttpFetcher {
    /// Creates a fetcher whose cached pages live for `cache_ttl`.
    pub fn new(cache_ttl: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .build()?;
        Ok(Self {
            http,
            cache: PageCache::new(cache_ttl),
        })
    }

    /// Number of pages currently cached.
    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    async fn fetch_html(&self, request: &FetchRequest) -> Result<String, Error> {
        let url = Url::parse(&request.url).map_err(|source| Error::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;

        if let Some(script) = &request.render_script {
            tracing::debug!(url = %url, script = %script, "render script not executed over HTTP");
        }

        let resp = self
            .http
            .get(url)
            .timeout(request.timeout)
            .header("user-agent", get_user_agent())
            .header("accept", "text/html,application/xhtml+xml")
            .header("accept-language", "en-AU,en;q=0.9")
            .header("upgrade-insecure-requests", "1")
            .header("cache-control", "no-cache")
            .header("pragma", "no-cache")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
            });
        }

        let html = resp.text().await?;

        if let Some(selector) = &request.wait_for {
            if !selector_matches(&html, selector)? {
                return Err(Error::WaitCondition {
                    selector: selector.clone(),
                });
            }
        }

        Ok(html)
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let wait_for = request.wait_for.as_deref();
        if request.cache_mode == CacheMode::Enabled {
            match self.cache.lookup(&request.url, wait_for) {
                Ok(Some(html)) => {
                    tracing::debug!(url = %request.url, "page served from cache");
                    return FetchOutcome::cached(html);
                }
                Ok(None) => {}
                Err(err) => return FetchOutcome::failed(err.to_string()),
            }
        }

        match self.fetch_html(request).await {
            Ok(html) => {
                self.cache.store(request.url.clone(), html.clone(), wait_for);
                FetchOutcome::loaded(html)
            }
            Err(err) => {
                if err.is_timeout() {
                    tracing::debug!(url = %request.url, timeout_ms = request.timeout.as_millis() as u64, "page fetch timed out");
                } else {
                    tracing::debug!(url = %request.url, "page fetch failed: {}", err);
                }
                FetchOutcome::failed(err.to_string())
            }
        }
    }
}

pub(crate) fn selector_matches(html: &str, selector: &str) -> Result<bool, Error> {
    let selector =
        Selector::parse(selector).map_err(|_| Error::InvalidSelector(selector.to_string()))?;
    let document = Html::parse_document(html);
    let found = document.select(&selector).next().is_some();
    Ok(found)
}
