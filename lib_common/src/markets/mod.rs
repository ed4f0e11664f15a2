//! # Price Markets Module
//!
//! Gold and currency price feeds built on the `retrieve` layer.
//!
//! ## Contained Modules:
//!
//! - **`format`**: price normalization and thousands grouping.
//! - **`feed`**: the `PriceSource` trait, item rendering and the JSON feed adapter
//!   with allow-list rules and field aliases.
//! - **`table`**: the adapter for feeds that only publish an HTML price table.
//! - **`currency`**: case-insensitive exchange-rate lookup.
//! - **`aggregator`**: the combined gold report and the currency front.
//! - **`catalog`**: serializable feed definitions and the built-in feed list.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod aggregator;
pub mod catalog;
pub mod currency;
pub mod feed;
pub mod format;
pub mod table;

pub use aggregator::{Aggregator, DEFAULT_TAGLINE};
pub use catalog::{default_currency_feed, default_gold_feeds, FeedSpec};
pub use currency::{CurrencyAliases, CurrencyFeed, CurrencyFeedConfig, CurrencyRate, RateLookup};
pub use feed::{
    render_items, FeedError, FieldAliases, FieldRule, ItemFilter, JsonFeed, JsonFeedConfig, PriceItem,
    PriceSource, NO_MATCH,
};
pub use format::{format_price, group_thousands, PriceValue, NOT_AVAILABLE};
pub use table::{scrape_rows, TableFeed, TableFeedConfig};
