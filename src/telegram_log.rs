//! Mirror the bot's own log lines into a Telegram chat.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::relay::caption::TEXT_LIMIT;

const FLUSH_EVERY: Duration = Duration::from_secs(5);
const MAX_BUFFERED: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LogLine {
    /// WARN/ERROR, forwarded as soon as it arrives.
    Urgent(String),
    /// INFO, collected and flushed periodically.
    Routine(String),
}

impl LogLine {
    fn from_event(level: Level, message: String) -> Option<Self> {
        match level {
            Level::ERROR => Some(Self::Urgent(format!("❌ {message}"))),
            Level::WARN => Some(Self::Urgent(format!("⚠️ {message}"))),
            Level::INFO => Some(Self::Routine(message)),
            _ => None,
        }
    }
}

/// Routine lines waiting for the next flush.
#[derive(Default)]
struct Batch {
    lines: Vec<String>,
}

impl Batch {
    fn push(&mut self, line: String) -> bool {
        self.lines.push(line);
        self.lines.len() >= MAX_BUFFERED
    }

    /// Drain into messages that each fit one Telegram message.
    fn drain_chunks(&mut self) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        for line in self.lines.drain(..) {
            let line = clip(&line);
            let needed = current.chars().count() + line.chars().count() + 1;
            if !current.is_empty() && needed > TEXT_LIMIT {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&line);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

fn clip(text: &str) -> String {
    if text.chars().count() <= TEXT_LIMIT {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(TEXT_LIMIT - 1).collect();
    clipped.push('…');
    clipped
}

/// `tracing` layer that ships INFO and above to `chat_id`.
pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogLine>,
}

impl TelegramLogLayer {
    /// Must be called inside a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward(bot, chat_id, rx));
        Self { tx }
    }
}

async fn forward(bot: Bot, chat_id: ChatId, mut rx: mpsc::UnboundedReceiver<LogLine>) {
    let mut batch = Batch::default();
    let mut ticker = tokio::time::interval(FLUSH_EVERY);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(LogLine::Urgent(text)) => send(&bot, chat_id, &clip(&text)).await,
                Some(LogLine::Routine(text)) => {
                    if batch.push(text) {
                        flush(&bot, chat_id, &mut batch).await;
                    }
                }
                None => {
                    flush(&bot, chat_id, &mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => flush(&bot, chat_id, &mut batch).await,
        }
    }
}

async fn flush(bot: &Bot, chat_id: ChatId, batch: &mut Batch) {
    for chunk in batch.drain_chunks() {
        send(bot, chat_id, &chunk).await;
    }
}

async fn send(bot: &Bot, chat_id: ChatId, text: &str) {
    // Going through tracing here would feed the layer its own failures.
    if let Err(e) = bot.send_message(chat_id, text).await {
        eprintln!("Failed to forward log line to Telegram: {e}");
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let rendered = format!("{value:?}");
            self.message = if self.message.is_empty() { rendered } else { format!("{rendered}, {}", self.message) };
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message.push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // HTTP client chatter about our own sendMessage calls.
        if !metadata.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(line) = LogLine::from_event(*metadata.level(), visitor.message)
            && self.tx.send(line).is_err()
        {
            eprintln!("Telegram log forwarder stopped, dropping log line");
        }
    }
}
