//! Chat message routing: price commands go to the aggregator, everything else to
//! the AI backend. A reply is always produced; backend failures become text.

use std::sync::Arc;

use lib_common::assistant::Ask;
use lib_common::markets::Aggregator;

/// Where a chat message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    GoldReport,
    CurrencyRate(String),
    /// A rate command without a code.
    RateUsage,
    Ask(String),
    Empty,
}

pub const RATE_USAGE: &str = "Cú pháp: /rate <mã tiền tệ>, ví dụ: /rate USD";

const GOLD_COMMANDS: [&str; 2] = ["/gold", "/giavang"];
const RATE_COMMANDS: [&str; 2] = ["/rate", "/tygia"];
const RATE_PHRASE: &str = "tỷ giá";

pub fn route(text: &str) -> Route {
    let text = text.trim();
    if text.is_empty() {
        return Route::Empty;
    }

    let mut words = text.split_whitespace();
    let first = words.next().unwrap_or_default().to_lowercase();
    // `/gold@PriceBot` is how group chats address a command.
    let command = first.split('@').next().unwrap_or_default();

    if GOLD_COMMANDS.contains(&command) {
        return Route::GoldReport;
    }
    if RATE_COMMANDS.contains(&command) {
        return match words.next() {
            Some(code) => Route::CurrencyRate(code.to_string()),
            None => Route::RateUsage,
        };
    }

    let lower = text.to_lowercase();
    if let Some(rest) = lower.strip_prefix(RATE_PHRASE) {
        if let Some(code) = rest.split_whitespace().next().filter(|code| is_currency_code(code)) {
            return Route::CurrencyRate(code.to_string());
        }
    }
    if lower.contains("giá vàng") {
        return Route::GoldReport;
    }

    Route::Ask(text.to_string())
}

fn is_currency_code(word: &str) -> bool {
    word.len() == 3 && word.chars().all(|c| c.is_ascii_alphabetic())
}

/// Splits `text` into pieces of at most `max_chars` characters.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

pub struct MessageHandler {
    aggregator: Arc<Aggregator>,
    assistant: Arc<dyn Ask>,
    chunk_size: usize,
}

impl MessageHandler {
    pub fn new(aggregator: Arc<Aggregator>, assistant: Arc<dyn Ask>, chunk_size: usize) -> Self {
        Self {
            aggregator,
            assistant,
            chunk_size,
        }
    }

    /// Produces the reply text for one incoming message.
    pub async fn reply(&self, text: &str) -> String {
        match route(text) {
            Route::Empty => String::new(),
            Route::GoldReport => self.aggregator.get_combined_report().await,
            Route::CurrencyRate(code) => self.aggregator.get_currency_rate(&code).await.render(),
            Route::RateUsage => RATE_USAGE.to_string(),
            Route::Ask(prompt) => match self.assistant.ask(&prompt).await {
                Ok(answer) => answer,
                Err(e) => {
                    log::error!("AI backend failed: {e}");
                    format!("Xin lỗi, trợ lý AI đang gặp sự cố: {e}")
                }
            },
        }
    }

    /// Handles one message from `sender` and returns the chunks to deliver.
    pub async fn handle(&self, sender: &str, text: &str) -> Vec<String> {
        log::info!("User({sender}) sent: {text}");
        let reply = self.reply(text).await;
        log::info!("Bot reply to User({sender}): {reply}");
        split_message(&reply, self.chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lib_common::assistant::{AssistantError, Provider};
    use lib_common::markets::{
        CurrencyAliases, CurrencyFeed, CurrencyFeedConfig, FeedError, PriceItem, PriceSource, PriceValue,
    };
    use lib_common::retrieve::{ApiClient, RetryPolicy};
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl Ask for Echo {
        async fn ask(&self, prompt: &str) -> Result<String, AssistantError> {
            Ok(format!("echo: {prompt}"))
        }
    }

    struct Down;

    #[async_trait]
    impl Ask for Down {
        async fn ask(&self, _prompt: &str) -> Result<String, AssistantError> {
            Err(AssistantError::Request {
                provider: Provider::Gemini,
                reason: "HTTP status 503 Service Unavailable".into(),
            })
        }
    }

    struct Fixed;

    #[async_trait]
    impl PriceSource for Fixed {
        fn name(&self) -> &str {
            "Mi Hồng"
        }

        async fn fetch_items(&self) -> Result<Vec<PriceItem>, FeedError> {
            Ok(vec![PriceItem {
                label: "SJC".into(),
                buy: Some(PriceValue::Number(74_000_000.0)),
                sell: Some(PriceValue::Number(76_000_000.0)),
                timestamp: Some("2024-01-01".into()),
            }])
        }
    }

    fn handler(assistant: Arc<dyn Ask>, chunk_size: usize) -> MessageHandler {
        let currency = CurrencyFeed::new(
            CurrencyFeedConfig {
                url: "http://127.0.0.1:9/rates".into(),
                headers: BTreeMap::new(),
                verify: true,
                aliases: CurrencyAliases::default(),
            },
            Arc::new(ApiClient::new(true, None).unwrap()),
            RetryPolicy::new(1, Duration::from_millis(1)),
        );
        let sources: Vec<Arc<dyn PriceSource>> = vec![Arc::new(Fixed)];
        let aggregator = Aggregator::new(sources, currency);
        MessageHandler::new(Arc::new(aggregator), assistant, chunk_size)
    }

    #[test]
    fn routes_commands_and_phrases() {
        assert_eq!(route("/gold"), Route::GoldReport);
        assert_eq!(route("/gold@PriceBot"), Route::GoldReport);
        assert_eq!(route("Giá vàng hôm nay thế nào?"), Route::GoldReport);
        assert_eq!(route("/rate usd"), Route::CurrencyRate("usd".into()));
        assert_eq!(route("Tỷ giá EUR"), Route::CurrencyRate("eur".into()));
        assert_eq!(route("/rate"), Route::RateUsage);
        assert_eq!(route("tỷ giá hôm nay tăng không"), Route::Ask("tỷ giá hôm nay tăng không".into()));
        assert_eq!(route("  xin chào "), Route::Ask("xin chào".into()));
        assert_eq!(route("   "), Route::Empty);
    }

    #[test]
    fn splits_on_character_boundaries() {
        let text = "giá vàng ".repeat(500);
        let chunks = split_message(&text, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 4096);
        assert_eq!(chunks.concat(), text);

        assert_eq!(split_message("ừ", 4096), ["ừ"]);
        assert!(split_message("", 4096).is_empty());
    }

    #[tokio::test]
    async fn gold_command_returns_report() {
        let chunks = handler(Arc::new(Echo), 4096).handle("42", "/gold").await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("Giá vàng Mi Hồng:\n- SJC (ngày 2024-01-01):"));
    }

    #[tokio::test]
    async fn free_text_goes_to_the_assistant() {
        let chunks = handler(Arc::new(Echo), 4096).handle("42", "hello").await;
        assert_eq!(chunks, ["echo: hello"]);
    }

    #[tokio::test]
    async fn assistant_failure_becomes_reply_text() {
        let reply = handler(Arc::new(Down), 4096).reply("hello").await;
        assert!(reply.starts_with("Xin lỗi"));
        assert!(reply.contains("503"));
    }

    #[tokio::test]
    async fn long_replies_are_chunked() {
        let chunks = handler(Arc::new(Echo), 4).handle("42", "abcdef").await;
        assert_eq!(chunks, ["echo", ": ab", "cdef"]);
    }

    #[tokio::test]
    async fn unreachable_rate_feed_still_replies() {
        let reply = handler(Arc::new(Echo), 4096).reply("/rate usd").await;
        assert_eq!(reply, "Không tìm thấy tỷ giá cho mã USD.");
    }
}
