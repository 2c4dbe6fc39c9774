//! In-memory page cache keyed by URL.
//!
//! A cached page only answers a request whose wait condition it satisfies.
//! Selectors already confirmed against a page are remembered so the document
//! is parsed at most once per selector.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::{client::selector_matches, Error};

struct CachedPage {
    html: String,
    /// Wait selectors known to match `html`.
    confirmed: Vec<String>,
    expires_at: Instant,
}

impl CachedPage {
    fn satisfies(&mut self, wait_for: Option<&str>) -> Result<bool, Error> {
        let Some(selector) = wait_for else {
            return Ok(true);
        };
        if self.confirmed.iter().any(|s| s == selector) {
            return Ok(true);
        }
        let found = selector_matches(&self.html, selector)?;
        if found {
            self.confirmed.push(selector.to_string());
        }
        Ok(found)
    }
}

/// Thread-safe page cache. Expired pages are evicted on lookup.
pub struct PageCache {
    pages: DashMap<String, CachedPage>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pages: DashMap::new(),
            ttl,
        }
    }

    /// The cached page for `url` if it is fresh and matches `wait_for`.
    ///
    /// A page that no longer satisfies the wait condition is dropped so the
    /// next successful fetch replaces it.
    pub fn lookup(&self, url: &str, wait_for: Option<&str>) -> Result<Option<String>, Error> {
        let usable = match self.pages.get_mut(url) {
            None => return Ok(None),
            Some(mut page) => {
                if Instant::now() > page.expires_at {
                    false
                } else if page.satisfies(wait_for)? {
                    return Ok(Some(page.html.clone()));
                } else {
                    false
                }
            }
        };
        if !usable {
            self.pages.remove(url);
        }
        Ok(None)
    }

    /// Stores a freshly fetched page. `verified` is the wait selector the
    /// fetch already checked, if any.
    pub fn store(&self, url: String, html: String, verified: Option<&str>) {
        self.pages.insert(
            url,
            CachedPage {
                html,
                confirmed: verified.map(str::to_string).into_iter().collect(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
