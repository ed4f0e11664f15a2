//! # Price Feed Adapters
//!
//! A feed adapter knows one upstream endpoint: its URL, the headers it insists on,
//! which items are relevant (allow-list rules) and which keys carry the label,
//! prices and timestamp. It turns a response into [`PriceItem`]s and renders them
//! as chat text.
//!
//! ## Core Features:
//! - **Uniform fetching**: every adapter goes through the shared `ApiClient` and the
//!   linear-backoff retry wrapper.
//! - **Alias tables**: each canonical field lists the source keys to try in order;
//!   the first non-null one wins.
//! - **Failure isolation**: `PriceSource::render` converts a fetch failure into a
//!   message, so a report never aborts because one feed is down.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::format::{format_price, PriceValue, NOT_AVAILABLE};
use crate::retrieve::{header_map, parse, retry_with_backoff, ApiClient, Item, ParsedForm, RetryPolicy};

/// Rendered when a well-formed response has no item passing the allow-list.
pub const NO_MATCH: &str = "Không tìm thấy dữ liệu phù hợp.";

/// Failures of a single feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed could not be fetched after all retry attempts.
    #[error("Không thể lấy dữ liệu {feed}: {reason}")]
    Fetch { feed: String, reason: String },

    /// The adapter task stopped before producing a result.
    #[error("Không thể lấy dữ liệu {feed}: adapter stopped ({reason})")]
    Aborted { feed: String, reason: String },
}

/// One normalized entry of a price feed.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceItem {
    /// Instrument code or label, e.g. `SJC`.
    pub label: String,
    pub buy: Option<PriceValue>,
    pub sell: Option<PriceValue>,
    /// Feed-supplied timestamp, kept as text.
    pub timestamp: Option<String>,
}

impl PriceItem {
    /// Renders the item as one chat block.
    ///
    /// ```text
    /// - SJC (ngày 2024-01-01):
    ///   - Giá mua: 74,000,000
    ///   - Giá bán: 76,000,000
    /// ```
    pub fn render(&self) -> String {
        format!(
            "- {} (ngày {}):\n  - Giá mua: {}\n  - Giá bán: {}",
            self.label,
            self.timestamp.as_deref().unwrap_or(NOT_AVAILABLE),
            format_price(self.buy.as_ref()),
            format_price(self.sell.as_ref()),
        )
    }
}

/// Joins rendered blocks, or returns [`NO_MATCH`] for an empty list.
pub fn render_items(items: &[PriceItem]) -> String {
    if items.is_empty() {
        return NO_MATCH.to_string();
    }
    items
        .iter()
        .map(PriceItem::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// An upstream price feed.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Display name used in report headers.
    fn name(&self) -> &str;

    /// Fetches the feed and returns its matching items.
    async fn fetch_items(&self) -> Result<Vec<PriceItem>, FeedError>;

    /// Fetches and renders the feed; failures become the error message.
    async fn render(&self) -> String {
        match self.fetch_items().await {
            Ok(items) => {
                log::debug!("{} returned {} matching item(s)", self.name(), items.len());
                render_items(&items)
            }
            Err(e) => {
                log::error!("{e}");
                e.to_string()
            }
        }
    }
}

/// Canonical field -> source keys, tried in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldAliases {
    pub label: Vec<String>,
    pub buy: Vec<String>,
    pub sell: Vec<String>,
    pub timestamp: Vec<String>,
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            label: strings(&["code", "label", "name", "TypeName", "type"]),
            buy: strings(&["buyingPrice", "buy", "buyPrice", "BuyValue", "Buy"]),
            sell: strings(&["sellingPrice", "sell", "sellPrice", "SellValue", "Sell"]),
            timestamp: strings(&["dateTime", "date", "updatedAt", "updateDate", "latestDate"]),
        }
    }
}

pub(crate) fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// First non-null value among `keys`.
pub fn lookup<'a>(keys: &[String], item: &'a Item) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| item.get(key).filter(|value| !value.is_null()))
}

/// A value as comparable text: strings trimmed, anything else JSON-encoded.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Allow-list rule: the first present key among `keys` must hold one of `allowed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub keys: Vec<String>,
    pub allowed: Vec<String>,
}

impl FieldRule {
    pub fn new(keys: &[&str], allowed: &[&str]) -> Self {
        Self {
            keys: strings(keys),
            allowed: strings(allowed),
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        lookup(&self.keys, item)
            .map(value_text)
            .is_some_and(|text| self.allowed.iter().any(|allowed| *allowed == text))
    }
}

/// Conjunction of [`FieldRule`]s; an empty filter accepts every item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemFilter {
    pub rules: Vec<FieldRule>,
}

impl ItemFilter {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.rules.iter().all(|rule| rule.matches(item))
    }
}

fn default_verify() -> bool {
    true
}

/// Configuration of a JSON feed, loadable from the bot's config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonFeedConfig {
    pub name: String,
    pub url: String,
    /// Fixed request headers (cookies, `referer`, `x-requested-with`, ...).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_verify")]
    pub verify: bool,
    #[serde(default)]
    pub filter: ItemFilter,
    #[serde(default)]
    pub aliases: FieldAliases,
}

/// Adapter for feeds answering with a JSON `data` envelope.
pub struct JsonFeed {
    config: JsonFeedConfig,
    headers: HeaderMap,
    client: Arc<ApiClient>,
    retry: RetryPolicy,
}

impl JsonFeed {
    pub fn new(config: JsonFeedConfig, client: Arc<ApiClient>, retry: RetryPolicy) -> Self {
        let headers = header_map(&config.headers);
        Self {
            config,
            headers,
            client,
            retry,
        }
    }

    pub fn config(&self) -> &JsonFeedConfig {
        &self.config
    }

    /// Filters and normalizes the items of an already fetched response.
    ///
    /// `envelope` is the top-level JSON mapping; its timestamp is used for items
    /// that carry none.
    pub fn extract(&self, form: &ParsedForm, envelope: Option<&Value>) -> Vec<PriceItem> {
        let aliases = &self.config.aliases;
        let envelope_ts = envelope
            .and_then(Value::as_object)
            .and_then(|map| lookup(&aliases.timestamp, map))
            .map(value_text);

        form.items()
            .iter()
            .filter(|item| self.config.filter.matches(item))
            .map(|item| PriceItem {
                label: lookup(&aliases.label, item)
                    .map(value_text)
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                buy: lookup(&aliases.buy, item).and_then(PriceValue::from_json),
                sell: lookup(&aliases.sell, item).and_then(PriceValue::from_json),
                timestamp: lookup(&aliases.timestamp, item)
                    .map(value_text)
                    .or_else(|| envelope_ts.clone()),
            })
            .collect()
    }
}

#[async_trait]
impl PriceSource for JsonFeed {
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

        let form = parse(&result.body_text, result.body_json.as_ref());

        // An error status whose JSON body still has a `data` envelope is inspected.
        if !result.ok {
            if !matches!(form, ParsedForm::StructuredItems(_)) {
                return Err(FeedError::Fetch {
                    feed: self.config.name.clone(),
                    reason: result.error_text().to_string(),
                });
            }
            log::warn!(
                "{}: using data from failed response ({})",
                self.config.name,
                result.error_text()
            );
        }

        Ok(self.extract(&form, result.body_json.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;
    use std::time::Duration;

    fn feed(url: String) -> JsonFeed {
        let config = JsonFeedConfig {
            name: "Mi Hồng".into(),
            url,
            headers: BTreeMap::from([("x-requested-with".into(), "XMLHttpRequest".into())]),
            verify: true,
            filter: ItemFilter::new(vec![FieldRule::new(&["code"], &["SJC", "999"])]),
            aliases: FieldAliases::default(),
        };
        let client = Arc::new(ApiClient::new(true, None).unwrap());
        JsonFeed::new(config, client, RetryPolicy::new(2, Duration::from_millis(1)))
    }

    fn item(value: Value) -> Item {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn block_matches_chat_template() {
        let item = PriceItem {
            label: "SJC".into(),
            buy: Some(PriceValue::Number(74_000_000.0)),
            sell: Some(PriceValue::Number(76_000_000.0)),
            timestamp: Some("2024-01-01".into()),
        };
        assert_eq!(
            item.render(),
            "- SJC (ngày 2024-01-01):\n  - Giá mua: 74,000,000\n  - Giá bán: 76,000,000"
        );
    }

    #[test]
    fn empty_list_renders_no_match() {
        assert_eq!(render_items(&[]), NO_MATCH);
    }

    #[test]
    fn rules_are_conjunctive() {
        let filter = ItemFilter::new(vec![
            FieldRule::new(&["BranchName"], &["Hồ Chí Minh"]),
            FieldRule::new(&["TypeName"], &["Vàng SJC 1L, 10L, 1KG"]),
        ]);
        assert!(filter.matches(&item(json!({
            "BranchName": "Hồ Chí Minh", "TypeName": "Vàng SJC 1L, 10L, 1KG"
        }))));
        assert!(!filter.matches(&item(json!({
            "BranchName": "Hà Nội", "TypeName": "Vàng SJC 1L, 10L, 1KG"
        }))));
        assert!(!filter.matches(&item(json!({"BranchName": "Hồ Chí Minh"}))));
        assert!(ItemFilter::default().matches(&item(json!({}))));
    }

    #[test]
    fn numeric_codes_match_as_text() {
        let rule = FieldRule::new(&["code"], &["999"]);
        assert!(rule.matches(&item(json!({"code": 999}))));
    }

    #[test]
    fn aliases_take_first_present_key() {
        let keys = strings(&["buyingPrice", "buy"]);
        let it = item(json!({"buyingPrice": null, "buy": "5"}));
        assert_eq!(lookup(&keys, &it), Some(&json!("5")));
    }

    #[test]
    fn envelope_timestamp_fills_gaps() {
        let feed = feed("http://localhost/unused".into());
        let body = json!({
            "latestDate": "08:30 15/01/2024",
            "data": [
                {"code": "SJC", "buy": "74,000,000"},
                {"code": "999", "buy": 1, "dateTime": "2024-01-02"}
            ]
        });
        let items = feed.extract(&parse(&body.to_string(), Some(&body)), Some(&body));
        assert_eq!(items[0].timestamp.as_deref(), Some("08:30 15/01/2024"));
        assert_eq!(items[1].timestamp.as_deref(), Some("2024-01-02"));
        assert_eq!(items[0].sell, None);
    }

    #[tokio::test]
    async fn fetch_filters_and_renders() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/gold")
            .match_header("x-requested-with", "XMLHttpRequest")
            .with_status(200)
            .with_body(
                json!({"data": [
                    {"code": "SJC", "buyingPrice": 74000000, "sellingPrice": 76000000, "dateTime": "2024-01-01"},
                    {"code": "610", "buyingPrice": 40000000, "sellingPrice": 42000000, "dateTime": "2024-01-01"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let text = feed(format!("{}/gold", server.url())).render().await;

        mock.assert_async().await;
        assert_eq!(
            text,
            "- SJC (ngày 2024-01-01):\n  - Giá mua: 74,000,000\n  - Giá bán: 76,000,000"
        );
    }

    #[tokio::test]
    async fn unknown_codes_render_no_match() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/gold")
            .with_status(200)
            .with_body(r#"{"data": [{"code": "XYZ", "buyingPrice": 1}]}"#)
            .create_async()
            .await;

        let text = feed(format!("{}/gold", server.url())).render().await;
        assert_eq!(text, NO_MATCH);
    }

    #[tokio::test]
    async fn error_status_with_data_is_still_used() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/gold")
            .with_status(500)
            .with_body(r#"{"data": [{"code": "999", "buy": 1000, "sell": 2000}]}"#)
            .expect(2)
            .create_async()
            .await;

        let items = feed(format!("{}/gold", server.url())).fetch_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "999");
    }

    #[tokio::test]
    async fn error_status_without_data_is_a_fetch_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/gold")
            .with_status(502)
            .with_body("<html>bad gateway</html>")
            .expect(2)
            .create_async()
            .await;

        let err = feed(format!("{}/gold", server.url())).fetch_items().await.unwrap_err();
        mock.assert_async().await;
        let text = err.to_string();
        assert!(text.starts_with("Không thể lấy dữ liệu Mi Hồng"));
        assert!(text.contains("2 attempts"));
        assert!(text.contains("502"));
    }
}
