//! Line-oriented chat transport: every input line is one message from the local
//! user, every reply chunk is written as its own line.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use super::handler::MessageHandler;

pub const CONSOLE_SENDER: &str = "console";

/// Serves messages from `input` until it ends, then waits for pending replies.
///
/// Each message runs in its own task, so a slow feed does not hold up the next
/// line. Replies are written whole, one message at a time.
pub async fn serve<R, W>(input: R, output: Arc<Mutex<W>>, handler: Arc<MessageHandler>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = input.lines();
    let mut tasks = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let handler = Arc::clone(&handler);
        let output = Arc::clone(&output);
        tasks.spawn(async move {
            let chunks = handler.handle(CONSOLE_SENDER, &line).await;
            let mut out = output.lock().await;
            for chunk in chunks {
                out.write_all(chunk.as_bytes()).await?;
                out.write_all(b"\n").await?;
            }
            out.flush().await?;
            Ok::<_, std::io::Error>(())
        });
    }

    log::info!("Input closed, waiting for {} pending message(s)", tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Failed to write reply: {e}"),
            Err(e) => log::error!("Message task stopped: {e}"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lib_common::assistant::{Ask, AssistantError};
    use lib_common::markets::{Aggregator, CurrencyFeed, CurrencyFeedConfig};
    use lib_common::retrieve::{ApiClient, RetryPolicy};
    use std::time::Duration;

    struct Upper;

    #[async_trait]
    impl Ask for Upper {
        async fn ask(&self, prompt: &str) -> Result<String, AssistantError> {
            Ok(prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn every_line_gets_a_reply() {
        let currency = CurrencyFeed::new(
            CurrencyFeedConfig {
                url: "http://127.0.0.1:9/".into(),
                headers: Default::default(),
                verify: true,
                aliases: Default::default(),
            },
            Arc::new(ApiClient::new(true, None).unwrap()),
            RetryPolicy::new(1, Duration::from_millis(1)),
        );
        let handler = Arc::new(MessageHandler::new(
            Arc::new(Aggregator::new(vec![], currency)),
            Arc::new(Upper),
            4096,
        ));
        let output = Arc::new(Mutex::new(Vec::<u8>::new()));

        serve(&b"xin chao\n\n/rate\n"[..], Arc::clone(&output), handler)
            .await
            .unwrap();

        let written = String::from_utf8(output.lock().await.clone()).unwrap();
        let mut lines: Vec<&str> = written.lines().collect();
        lines.sort();
        assert_eq!(lines, ["Cú pháp: /rate <mã tiền tệ>, ví dụ: /rate USD", "XIN CHAO"]);
    }
}
