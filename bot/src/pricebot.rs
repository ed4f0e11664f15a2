//! # Price Bot
//!
//! Answers chat messages with the combined gold price report, an exchange rate,
//! or a reply from the configured AI backend.
//!
//! ## Startup:
//! 1. Environment files (`BOT_TOKEN.env`, `.env`), then defaults < `pricebot.conf`
//!    < environment < CLI flags.
//! 2. Logging to stderr and a timestamped file in the log directory.
//! 3. One shared HTTP client for every feed and the AI backend.
//!
//! Messages are read from stdin, one per line, until end of input or Ctrl-C.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{stdin, stdout, BufReader};
use tokio::signal;
use tokio::sync::Mutex;

use lib_common::assistant::Assistant;
use lib_common::markets::{Aggregator, CurrencyFeed};
use lib_common::retrieve::ApiClient;

mod bot_logic;
use bot_logic::{config, console, handler, logger};

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env_files();
    let settings = config::load_config().resolve(|name| std::env::var(name).ok())?;
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;

    let client = Arc::new(ApiClient::new(true, None)?.with_timeout(settings.request_timeout));

    let sources = settings
        .gold_feeds
        .into_iter()
        .map(|spec| spec.build(Arc::clone(&client), settings.retry))
        .collect();
    let currency = CurrencyFeed::new(settings.currency_feed, Arc::clone(&client), settings.retry);
    let mut aggregator = Aggregator::new(sources, currency);
    if let Some(tagline) = settings.tagline {
        aggregator = aggregator.with_tagline(tagline);
    }
    log::info!("Gold feeds: {}", aggregator.source_names().join(", "));

    let assistant = Assistant::new(settings.assistant, Arc::clone(&client))?;
    log::info!("AI backend: {} ({})", assistant.provider(), assistant.model());

    let handler = Arc::new(handler::MessageHandler::new(
        Arc::new(aggregator),
        Arc::new(assistant),
        settings.chunk_size,
    ));

    log::info!("Bot is up and running!");

    tokio::select! {
        served = console::serve(BufReader::new(stdin()), Arc::new(Mutex::new(stdout())), handler) => {
            served?;
            log::info!("End of input, shutting down.");
        }
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
    }

    log::info!("Shutdown complete.");
    Ok(())
}
