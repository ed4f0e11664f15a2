//! # Gold Report Live Data Test
//!
//! Fetches every built-in gold feed and the exchange rate feed over the real
//! network and prints what the bot would reply.

use clap::Parser;
use lib_common::markets::{default_currency_feed, default_gold_feeds, Aggregator, CurrencyFeed, RateLookup};
use lib_common::retrieve::{ApiClient, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(about = "Prints the live gold report and one exchange rate")]
struct Args {
    /// Currency code to look up.
    #[clap(long, default_value = "USD")]
    code: String,

    /// Attempts per feed request.
    #[clap(long, default_value_t = 2)]
    attempts: u32,
}

/// Executes the live report fetch.
///
/// // Statement: Exits with status 1 when the currency lookup finds nothing.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // // Statement: One shared client, short backoff so a dead feed fails fast
    let client = Arc::new(ApiClient::new(true, None)?);
    let retry = RetryPolicy::new(args.attempts, Duration::from_millis(500));

    let sources = default_gold_feeds()
        .into_iter()
        .map(|spec| spec.build(Arc::clone(&client), retry))
        .collect();
    let currency = CurrencyFeed::new(default_currency_feed(), Arc::clone(&client), retry);
    let aggregator = Aggregator::new(sources, currency);

    println!("[*] Requesting live gold prices from: {}", aggregator.source_names().join(", "));
    println!("-----------------------------------------------");
    println!("{}", aggregator.get_combined_report().await);
    println!("-----------------------------------------------");

    println!("[*] Looking up exchange rate for {}...", args.code);
    match aggregator.get_currency_rate(&args.code).await {
        RateLookup::Found(rate) => {
            // // Statement: Print the rate mapping as the bot exposes it
            println!("{}", serde_json::to_string_pretty(&rate.to_mapping())?);
        }
        RateLookup::NotFound(message) => {
            eprintln!("\n[ERROR] {message}");
            std::process::exit(1);
        }
    }

    Ok(())
}
