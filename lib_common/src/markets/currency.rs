//! # Currency Rate Lookup
//!
//! Looks up one fiat currency in an exchange-rate feed shaped as
//! `{"data": [{"currencyCode": "USD", ...}, ...]}`. The lookup never fails: an
//! unknown code, an unreachable feed and an unexpected body all produce a
//! [`RateLookup::NotFound`] message naming the requested code.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::feed::{lookup, strings, value_text};
use super::format::NOT_AVAILABLE;
use crate::retrieve::{header_map, retry_with_backoff, ApiClient, RetryPolicy};

/// One matched currency, all fields as display strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub name: String,
    /// Upper-cased currency code.
    pub code: String,
    pub buy: String,
    pub sell: String,
}

impl CurrencyRate {
    /// The rate as a `{name, code, buy, sell}` mapping.
    pub fn to_mapping(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "code": self.code,
            "buy": self.buy,
            "sell": self.sell,
        })
    }
}

impl fmt::Display for CurrencyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tỷ giá {} ({}):\n  - Giá mua: {}\n  - Giá bán: {}",
            self.code, self.name, self.buy, self.sell
        )
    }
}

/// Outcome of a currency lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLookup {
    Found(CurrencyRate),
    /// Human-readable message naming the requested code.
    NotFound(String),
}

impl RateLookup {
    /// Chat text for either outcome.
    pub fn render(&self) -> String {
        match self {
            RateLookup::Found(rate) => rate.to_string(),
            RateLookup::NotFound(message) => message.clone(),
        }
    }
}

/// Source keys for the fields of a currency entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyAliases {
    pub code: Vec<String>,
    pub name: Vec<String>,
    pub buy: Vec<String>,
    pub sell: Vec<String>,
}

impl Default for CurrencyAliases {
    fn default() -> Self {
        Self {
            code: strings(&["currencyCode", "code", "CurrencyCode"]),
            name: strings(&["currencyName", "name", "CurrencyName"]),
            buy: strings(&["transfer", "buy", "cash", "Buy", "Transfer"]),
            sell: strings(&["sell", "Sell"]),
        }
    }
}

fn default_verify() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyFeedConfig {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_verify")]
    pub verify: bool,
    #[serde(default)]
    pub aliases: CurrencyAliases,
}

pub struct CurrencyFeed {
    config: CurrencyFeedConfig,
    headers: HeaderMap,
    client: Arc<ApiClient>,
    retry: RetryPolicy,
}

impl CurrencyFeed {
    pub fn new(config: CurrencyFeedConfig, client: Arc<ApiClient>, retry: RetryPolicy) -> Self {
        let headers = header_map(&config.headers);
        Self {
            config,
            headers,
            client,
            retry,
        }
    }

    /// Fetches the feed and returns the first entry whose code matches `code`,
    /// ignoring case.
    pub async fn lookup(&self, code: &str) -> RateLookup {
        let wanted = code.trim().to_lowercase();
        let display = code.trim().to_uppercase();
        let not_found = || RateLookup::NotFound(format!("Không tìm thấy tỷ giá cho mã {display}."));

        if wanted.is_empty() {
            return not_found();
        }

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
            log::error!("Currency feed unreachable: {}", result.error_text());
            return not_found();
        }

        let Some(entries) = result
            .body_json
            .as_ref()
            .and_then(|json| json.get("data").or_else(|| json.get("Data")))
            .and_then(Value::as_array)
        else {
            log::warn!("Currency feed answered without a data list");
            return not_found();
        };

        let aliases = &self.config.aliases;
        let text_of = |keys: &[String], entry| {
            lookup(keys, entry)
                .map(value_text)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };

        entries
            .iter()
            .filter_map(Value::as_object)
            .find(|entry| {
                lookup(&aliases.code, entry)
                    .map(value_text)
                    .is_some_and(|found| found.to_lowercase() == wanted)
            })
            .map(|entry| {
                RateLookup::Found(CurrencyRate {
                    name: text_of(&aliases.name, entry),
                    code: display.clone(),
                    buy: text_of(&aliases.buy, entry),
                    sell: text_of(&aliases.sell, entry),
                })
            })
            .unwrap_or_else(not_found)
    }
}
