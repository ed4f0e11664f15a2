//! # Gold Report Aggregator
//!
//! Combines the rendered sections of several [`PriceSource`]s into one chat report
//! and fronts the currency lookup.
//!
//! Sources run one after another, in registration order. Each one runs in its own
//! task so a panicking adapter only costs its own section; its failure message is
//! rendered in place and the remaining sources still contribute.
//!
//! ## Latency
//!
//! There is no overall deadline. One source costs at most
//! `max_attempts * timeout + RetryPolicy::total_backoff()`, which is 60s with the
//! defaults (5 attempts, 10s timeout, 1+2+3+4s backoff). A report waits for the sum
//! of all its sources.

use std::sync::Arc;

use super::currency::{CurrencyFeed, RateLookup};
use super::feed::{FeedError, PriceSource};

/// Closing line of every combined report.
pub const DEFAULT_TAGLINE: &str = "Dữ liệu chỉ mang tính tham khảo.";

pub struct Aggregator {
    sources: Vec<Arc<dyn PriceSource>>,
    currency: CurrencyFeed,
    tagline: String,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, currency: CurrencyFeed) -> Self {
        Self {
            sources,
            currency,
            tagline: DEFAULT_TAGLINE.to_string(),
        }
    }

    pub fn with_tagline(mut self, tagline: impl Into<String>) -> Self {
        self.tagline = tagline.into();
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    /// Builds the combined report:
    ///
    /// ```text
    /// Giá vàng <name>:
    /// <blocks>
    ///
    /// Giá vàng <name>:
    /// <blocks>
    ///
    /// <tagline>
    /// ```
    pub async fn get_combined_report(&self) -> String {
        let mut sections = Vec::with_capacity(self.sources.len() + 1);

        for source in &self.sources {
            let name = source.name().to_string();
            log::info!("Fetching gold prices from {name}");

            let task = {
                let source = Arc::clone(source);
                tokio::spawn(async move { source.render().await })
            };
            let body = match task.await {
                Ok(body) => body,
                Err(e) => {
                    let error = FeedError::Aborted {
                        feed: name.clone(),
                        reason: e.to_string(),
                    };
                    log::error!("{error}");
                    error.to_string()
                }
            };

            sections.push(format!("Giá vàng {name}:\n{body}"));
        }

        sections.push(self.tagline.clone());
        sections.join("\n\n")
    }

    /// Looks up one currency by code, ignoring case.
    pub async fn get_currency_rate(&self, code: &str) -> RateLookup {
        log::info!("Looking up exchange rate for {}", code.trim());
        self.currency.lookup(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::currency::{CurrencyAliases, CurrencyFeedConfig};
    use crate::markets::feed::PriceItem;
    use crate::markets::format::PriceValue;
    use crate::retrieve::{ApiClient, RetryPolicy};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::time::Duration;

    enum Behavior {
        Items(Vec<PriceItem>),
        Fail,
        Panic,
    }

    struct StubSource {
        name: &'static str,
        behavior: Behavior,
    }

    #[async_trait]
    impl PriceSource for StubSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_items(&self) -> Result<Vec<PriceItem>, FeedError> {
            match &self.behavior {
                Behavior::Items(items) => Ok(items.clone()),
                Behavior::Fail => Err(FeedError::Fetch {
                    feed: self.name.to_string(),
                    reason: "failed after 5 attempts; last error: connection refused".into(),
                }),
                Behavior::Panic => panic!("adapter bug"),
            }
        }
    }

    fn stub(name: &'static str, behavior: Behavior) -> Arc<dyn PriceSource> {
        Arc::new(StubSource { name, behavior })
    }

    fn sjc() -> PriceItem {
        PriceItem {
            label: "SJC".into(),
            buy: Some(PriceValue::Number(74_000_000.0)),
            sell: Some(PriceValue::Number(76_000_000.0)),
            timestamp: Some("2024-01-01".into()),
        }
    }

    fn offline_currency() -> CurrencyFeed {
        CurrencyFeed::new(
            CurrencyFeedConfig {
                url: "http://127.0.0.1:9/rates".into(),
                headers: BTreeMap::new(),
                verify: true,
                aliases: CurrencyAliases::default(),
            },
            Arc::new(ApiClient::new(true, None).unwrap()),
            RetryPolicy::new(1, Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn report_follows_template() {
        let aggregator = Aggregator::new(
            vec![stub("Mi Hồng", Behavior::Items(vec![sjc()])), stub("SJC", Behavior::Items(vec![]))],
            offline_currency(),
        );

        assert_eq!(
            aggregator.get_combined_report().await,
            "Giá vàng Mi Hồng:\n- SJC (ngày 2024-01-01):\n  - Giá mua: 74,000,000\n  - Giá bán: 76,000,000\n\n\
             Giá vàng SJC:\nKhông tìm thấy dữ liệu phù hợp.\n\n\
             Dữ liệu chỉ mang tính tham khảo."
        );
    }

    #[tokio::test]
    async fn failing_source_is_rendered_in_place() {
        let aggregator = Aggregator::new(
            vec![stub("Mi Hồng", Behavior::Fail), stub("SJC", Behavior::Items(vec![sjc()]))],
            offline_currency(),
        )
        .with_tagline("--");

        let report = aggregator.get_combined_report().await;
        assert!(report.starts_with("Giá vàng Mi Hồng:\nKhông thể lấy dữ liệu Mi Hồng"));
        assert!(report.contains("Giá vàng SJC:\n- SJC (ngày 2024-01-01)"));
        assert!(report.ends_with("\n\n--"));
    }

    #[tokio::test]
    async fn panicking_source_does_not_abort_the_report() {
        let aggregator = Aggregator::new(
            vec![stub("Broken", Behavior::Panic), stub("SJC", Behavior::Items(vec![sjc()]))],
            offline_currency(),
        );

        let report = aggregator.get_combined_report().await;
        assert!(report.contains("Giá vàng Broken:\nKhông thể lấy dữ liệu Broken: adapter stopped"));
        assert!(report.contains("  - Giá bán: 76,000,000"));
        assert!(report.ends_with(DEFAULT_TAGLINE));
        assert_eq!(aggregator.source_names(), ["Broken", "SJC"]);
    }

    #[tokio::test]
    async fn unreachable_currency_feed_reports_code() {
        let lookup = Aggregator::new(vec![], offline_currency())
            .get_currency_rate("eur")
            .await;
        assert_eq!(lookup.render(), "Không tìm thấy tỷ giá cho mã EUR.");
    }
}
