//! Feed definitions as configuration data, plus the built-in feed list.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::currency::{CurrencyAliases, CurrencyFeedConfig};
use super::feed::{strings, FieldAliases, FieldRule, ItemFilter, JsonFeed, JsonFeedConfig, PriceSource};
use super::table::{TableFeed, TableFeedConfig};
use crate::retrieve::{ApiClient, RetryPolicy};

/// One gold feed entry of the bot configuration file.
///
/// ```json
/// {"kind": "json", "name": "Mi Hồng", "url": "...", "filter": [{"keys": ["code"], "allowed": ["SJC"]}]}
/// {"kind": "table", "name": "...", "url": "...", "labels": ["Vàng miếng SJC"]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedSpec {
    Json(JsonFeedConfig),
    Table(TableFeedConfig),
}

impl FeedSpec {
    pub fn name(&self) -> &str {
        match self {
            FeedSpec::Json(config) => &config.name,
            FeedSpec::Table(config) => &config.name,
        }
    }

    /// Builds the adapter for this entry on top of a shared client.
    pub fn build(self, client: Arc<ApiClient>, retry: RetryPolicy) -> Arc<dyn PriceSource> {
        match self {
            FeedSpec::Json(config) => Arc::new(JsonFeed::new(config, client, retry)),
            FeedSpec::Table(config) => Arc::new(TableFeed::new(config, client, retry)),
        }
    }
}

pub fn default_gold_feeds() -> Vec<FeedSpec> {
    vec![
        FeedSpec::Json(JsonFeedConfig {
            name: "Mi Hồng".into(),
            url: "https://api.mihong.vn/v1/gold/prices/current".into(),
            headers: BTreeMap::from([
                ("x-requested-with".into(), "XMLHttpRequest".into()),
                ("referer".into(), "https://www.mihong.vn/".into()),
            ]),
            verify: true,
            filter: ItemFilter::new(vec![FieldRule::new(&["code"], &["SJC", "999"])]),
            aliases: FieldAliases::default(),
        }),
        // The SJC service has a certificate chain that does not verify.
        FeedSpec::Json(JsonFeedConfig {
            name: "SJC".into(),
            url: "https://sjc.com.vn/GoldPrice/Services/PriceService.ashx".into(),
            headers: BTreeMap::from([("x-requested-with".into(), "XMLHttpRequest".into())]),
            verify: false,
            filter: ItemFilter::new(vec![
                FieldRule::new(&["BranchName"], &["Hồ Chí Minh"]),
                FieldRule::new(&["TypeName"], &["Vàng SJC 1L, 10L, 1KG"]),
            ]),
            aliases: FieldAliases {
                label: strings(&["TypeName"]),
                buy: strings(&["BuyValue", "Buy"]),
                sell: strings(&["SellValue", "Sell"]),
                timestamp: strings(&["latestDate", "GroupDate"]),
            },
        }),
    ]
}

pub fn default_currency_feed() -> CurrencyFeedConfig {
    CurrencyFeedConfig {
        url: "https://www.vietcombank.com.vn/api/exchangerates?date=now".into(),
        headers: BTreeMap::new(),
        verify: true,
        aliases: CurrencyAliases::default(),
    }
}
