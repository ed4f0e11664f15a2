//! # HTML Table-Row Feeds
//!
//! Some feeds only publish an HTML page with a price table. This adapter does not
//! parse HTML; it runs a narrow regex tokenizer over `<tr>`/`<td>` markup:
//!
//! 1. Find every `<tr>...</tr>` block.
//! 2. Strip tags from each `<td>`/`<th>` cell and collapse whitespace.
//! 3. Keep rows that have at least one `<td>` and whose first cell equals or
//!    contains one of the target labels. Header rows made only of `<th>` are skipped.
//! 4. Take the first two numeric-looking tokens from the remaining cells as buy
//!    and sell; a missing token leaves that side empty.
//!
//! Any change in the upstream page layout breaks this adapter. The regression
//! tests below pin the markup shapes it is known to handle.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use super::feed::{FeedError, PriceItem, PriceSource};
use super::format::PriceValue;
use crate::retrieve::{header_map, retry_with_backoff, ApiClient, RetryPolicy};

static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").expect("valid row pattern"));
static CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(t[dh])\b[^>]*>(.*?)</t[dh]\s*>").expect("valid cell pattern")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d(?:[\d.,]*\d)?").expect("valid number pattern"));
static DOT_GROUPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(?:\.\d{3})+$").expect("valid grouping pattern"));

fn default_verify() -> bool {
    true
}

/// Configuration of a table-row feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_verify")]
    pub verify: bool,
    /// Row labels to report, matched exactly or as a substring of the first cell.
    pub labels: Vec<String>,
}

pub struct TableFeed {
    config: TableFeedConfig,
    headers: HeaderMap,
    client: Arc<ApiClient>,
    retry: RetryPolicy,
}

impl TableFeed {
    pub fn new(config: TableFeedConfig, client: Arc<ApiClient>, retry: RetryPolicy) -> Self {
        let headers = header_map(&config.headers);
        Self {
            config,
            headers,
            client,
            retry,
        }
    }
}

#[async_trait]
impl PriceSource for TableFeed {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch_items(&self) -> Result<Vec<PriceItem>, FeedError> {
        let result = retry_with_backoff(&self.retry, || {
            self.client.get(
                &self.config.url,
                None,
                Some(&self.headers),
                None,
                Some(self.config.verify),
            )
        })
        .await;

        if !result.ok {
            return Err(FeedError::Fetch {
                feed: self.config.name.clone(),
                reason: result.error_text().to_string(),
            });
        }

        Ok(scrape_rows(&result.body_text, &self.config.labels))
    }
}

/// Extracts price rows for `labels` from HTML table markup.
pub fn scrape_rows(html: &str, labels: &[String]) -> Vec<PriceItem> {
    let targets: Vec<String> = labels.iter().map(|label| label.to_lowercase()).collect();
    let mut items = Vec::new();

    for row in ROW.captures_iter(html) {
        let mut has_data_cell = false;
        let cells: Vec<String> = CELL
            .captures_iter(&row[1])
            .map(|cell| {
                has_data_cell |= cell[1].eq_ignore_ascii_case("td");
                cell_text(&cell[2])
            })
            .collect();
        if !has_data_cell {
            continue;
        }
        let Some((first, rest)) = cells.split_first() else {
            continue;
        };

        let first_lower = first.to_lowercase();
        if !targets
            .iter()
            .any(|target| first_lower == *target || first_lower.contains(target.as_str()))
        {
            continue;
        }

        let mut tokens = rest
            .iter()
            .flat_map(|cell| NUMBER.find_iter(cell).map(|m| normalize_token(m.as_str())));
        let buy = tokens.next().map(PriceValue::Text);
        let sell = tokens.next().map(PriceValue::Text);

        items.push(PriceItem {
            label: first.clone(),
            buy,
            sell,
            timestamp: None,
        });
    }

    items
}

fn cell_text(raw: &str) -> String {
    let stripped = TAG.replace_all(raw, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&#44;", ",");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

// `74.500.000` is dot-grouped; `74,500.5` is left for the price formatter.
fn normalize_token(token: &str) -> String {
    if DOT_GROUPED.is_match(token) {
        token.replace('.', "")
    } else {
        token.to_string()
    }
}
