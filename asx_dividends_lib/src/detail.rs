//! Detail page enrichment: last traded price and four-week average volume.
//!
//! Each security gets a bounded number of fetch attempts. The first may be
//! served from the page cache, later ones go to the network, with a fixed
//! backoff in between so client-side rendering has time to settle. Running
//! out of attempts is not an error: whatever was recovered is returned and
//! reconciliation may fill the gaps from history.

use std::time::Duration;

use marketindex_client::{CacheMode, FetchRequest, PageFetcher};
use scraper::{Html, Selector};
use tokio::time::sleep;

use crate::error::PipelineError;
use crate::normalize::parse_number;

pub const PRICE_SELECTOR: &str = "span[data-quoteapi='price']";
pub const VOLUME_SELECTOR: &str = "span[data-quoteapi*='monthAverageVolume']";
const SCROLL_SCRIPT: &str = "window.scrollBy(0, 300);";

/// The two numbers a detail page contributes to an announcement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetailQuote {
    pub price: Option<f64>,
    pub volume_4w: Option<f64>,
}

impl DetailQuote {
    pub fn is_complete(&self) -> bool {
        self.price.is_some() && self.volume_4w.is_some()
    }

    /// Field-wise merge where `newer` wins only where it has a value.
    fn merge(self, newer: DetailQuote) -> DetailQuote {
        DetailQuote {
            price: newer.price.or(self.price),
            volume_4w: newer.volume_4w.or(self.volume_4w),
        }
    }
}

/// Reads price and volume out of a detail page.
pub fn extract_quote(html: &str) -> DetailQuote {
    let document = Html::parse_document(html);
    DetailQuote {
        price: select_number(&document, PRICE_SELECTOR),
        volume_4w: select_number(&document, VOLUME_SELECTOR),
    }
}

fn select_number(document: &Html, selector: &str) -> Option<f64> {
    let selector = Selector::parse(selector).ok()?;
    let element = document.select(&selector).next()?;
    let text: String = element.text().collect();
    parse_number(&text)
}

/// Attempt budget for one security.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait between consecutive attempts (not after the last one).
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichState {
    /// About to make attempt `n` (1-based).
    Attempting(u32),
    /// Attempts exhausted with at least one field missing.
    Partial,
    /// Both fields recovered.
    Complete,
}

/// Result of enriching one security.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub quote: DetailQuote,
    pub attempts: u32,
    pub state: EnrichState,
    /// Fetch error from the most recent failed attempt, if any.
    pub last_error: Option<String>,
}

impl Enrichment {
    /// Describes a partial result as a per-security error for reporting.
    pub fn shortfall(&self, code: &str) -> Option<PipelineError> {
        if self.state == EnrichState::Complete {
            return None;
        }
        let mut missing = Vec::new();
        if self.quote.price.is_none() {
            missing.push("price");
        }
        if self.quote.volume_4w.is_none() {
            missing.push("4W volume");
        }
        let mut message = format!(
            "missing {} after {} attempt(s)",
            missing.join(" and "),
            self.attempts
        );
        if let Some(err) = &self.last_error {
            message.push_str(&format!(" (last error: {})", err));
        }
        Some(PipelineError::DetailFetch {
            code: code.to_string(),
            message,
        })
    }
}

/// Fetches detail pages for security codes.
pub struct DetailEnricher<F> {
    fetcher: F,
    url_template: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl<F: PageFetcher> DetailEnricher<F> {
    /// `url_template` contains `{code}`, replaced by the lowercased code.
    pub fn new(fetcher: F, url_template: impl Into<String>, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            url_template: url_template.into(),
            timeout,
            policy,
        }
    }

    pub fn detail_url(&self, code: &str) -> String {
        self.url_template.replace("{code}", &code.to_lowercase())
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub async fn enrich(&self, code: &str) -> Enrichment {
        let url = self.detail_url(code);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut quote = DetailQuote::default();
        let mut last_error = None;
        let mut attempts = 0;
        let mut state = EnrichState::Attempting(1);

        while let EnrichState::Attempting(attempt) = state {
            attempts = attempt;
            let cache_mode = if attempt == 1 {
                CacheMode::Enabled
            } else {
                CacheMode::Bypass
            };
            let request = FetchRequest::new(url.as_str())
                .wait_for(VOLUME_SELECTOR)
                .timeout(self.timeout)
                .render_script(SCROLL_SCRIPT)
                .cache_mode(cache_mode);

            let outcome = self.fetcher.fetch(&request).await;
            match outcome.page() {
                Some(html) => quote = quote.merge(extract_quote(html)),
                None => {
                    tracing::debug!(
                        code,
                        attempt,
                        "detail fetch failed: {}",
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                    last_error = outcome.error.clone();
                }
            }

            state = if quote.is_complete() {
                EnrichState::Complete
            } else if attempt >= max_attempts {
                EnrichState::Partial
            } else {
                sleep(self.policy.backoff).await;
                EnrichState::Attempting(attempt + 1)
            };
        }

        Enrichment {
            quote,
            attempts,
            state,
            last_error,
        }
    }
}
