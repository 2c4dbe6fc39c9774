//! Test doubles shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use marketindex_client::{FetchOutcome, FetchRequest, PageFetcher};

/// Serves queued outcomes per URL and records every request.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: Mutex<HashMap<String, VecDeque<FetchOutcome>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub fn with_page(self, url: &str, outcome: FetchOutcome) -> Self {
        self.pages
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        self.requests.lock().unwrap().push(request.clone());
        self.pages
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| FetchOutcome::failed(format!("no page scripted for {}", request.url)))
    }
}

/// A minimal detail page with optional price and volume spans.
pub fn quote_page(price: Option<&str>, volume: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(price) = price {
        body.push_str(&format!("<span data-quoteapi=\"price\">{}</span>", price));
    }
    if let Some(volume) = volume {
        body.push_str(&format!(
            "<span data-quoteapi=\"stats.monthAverageVolume\">{}</span>",
            volume
        ));
    }
    format!("<html><body>{}</body></html>", body)
}

/// A listing page with one body row per slice of cell texts.
pub fn listing_page(rows: &[&[&str]]) -> String {
    let body: String = rows
        .iter()
        .map(|cells| {
            let tds: String = cells.iter().map(|c| format!("<td>{}</td>", c)).collect();
            format!("<tr>{}</tr>", tds)
        })
        .collect();
    format!(
        "<html><body><table><tbody>{}</tbody></table></body></html>",
        body
    )
}
