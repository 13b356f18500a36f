//! Telegram delivery and subscriber command handling.

use crate::broadcast::AlertSink;
use crate::db::Database;
use async_trait::async_trait;
use serde::Deserialize;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
    #[error("Reply failed: {0}")]
    Reply(String),
}

/// Subscriber commands.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Subscribe this chat to whale alerts")]
    Start,
    #[command(description = "Subscribe this chat to whale alerts")]
    Subscribe,
    #[command(description = "Show what is being tracked")]
    Status,
    #[command(description = "Show help")]
    Help,
}

/// Parse message text into a command. Anything unrecognized is `None`.
pub fn parse_command(text: &str, bot_username: &str) -> Option<Command> {
    Command::parse(text.trim(), bot_username).ok()
}

/// The parts of a Telegram update this service reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundUpdate {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<InboundMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub chat: InboundChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundChat {
    pub id: i64,
}

/// What an inbound update turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Subscribed { new: bool },
    Status,
    Help,
    /// Not a message, no text, or not a known command.
    Ignored,
}

/// Telegram bot wrapper used as the alert delivery channel.
pub struct TelegramBot {
    bot: Bot,
}

impl TelegramBot {
    /// Create a new bot with the given token.
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Get the underlying bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Send an HTML message to a chat.
    pub async fn send_html(&self, chat_id: &str, message: &str) -> Result<(), TelegramError> {
        let chat_id = chat_id
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| TelegramError::Reply(format!("invalid chat id {:?}", chat_id)))?;
        self.bot
            .send_message(chat_id, message)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AlertSink for TelegramBot {
    async fn send(&self, chat_id: &str, html: &str) -> Result<(), String> {
        self.send_html(chat_id, html).await.map_err(|e| e.to_string())
    }
}

/// Handles subscriber commands arriving through the Telegram webhook.
pub struct CommandHandler {
    db: Database,
    bot_username: String,
}

impl CommandHandler {
    pub fn new(db: Database, bot_username: impl Into<String>) -> Self {
        Self {
            db,
            bot_username: bot_username.into(),
        }
    }

    /// Handle one update and reply through `sink`.
    ///
    /// Reply delivery failures are logged, not returned.
    pub async fn handle_update(
        &self,
        update: &InboundUpdate,
        sink: &dyn AlertSink,
    ) -> Result<CommandOutcome, TelegramError> {
        let Some(message) = &update.message else {
            debug!(update_id = update.update_id, "Ignoring non-message update");
            return Ok(CommandOutcome::Ignored);
        };
        let Some(text) = message.text.as_deref() else {
            return Ok(CommandOutcome::Ignored);
        };
        let Some(command) = parse_command(text, &self.bot_username) else {
            debug!(chat_id = message.chat.id, "Ignoring unrecognized text");
            return Ok(CommandOutcome::Ignored);
        };

        let chat_id = message.chat.id.to_string();
        let (outcome, reply) = match command {
            Command::Start | Command::Subscribe => {
                let new = self.db.add_subscriber(&chat_id).await?;
                if new {
                    info!(chat_id = %chat_id, "New subscriber");
                }
                let reply = if new {
                    "🐋 Subscribed! You will receive whale alerts in this chat.\n\n\
                     Use /status to see what is being tracked."
                        .to_string()
                } else {
                    "You are already subscribed.".to_string()
                };
                (CommandOutcome::Subscribed { new }, reply)
            }
            Command::Status => (CommandOutcome::Status, self.status_text(&chat_id).await?),
            Command::Help => (CommandOutcome::Help, Command::descriptions().to_string()),
        };

        // The command already took effect; a failed reply must not fail the update.
        if let Err(e) = sink.send(&chat_id, &reply).await {
            error!(chat_id = %chat_id, error = %e, "Failed to send command reply");
        }
        Ok(outcome)
    }

    async fn status_text(&self, chat_id: &str) -> Result<String, TelegramError> {
        let subscribed = self.db.get_subscriber(chat_id).await?.is_some();
        let subscribers = self.db.count_subscribers().await?;
        let tokens = self.db.count_holders().await?;
        let webhooks = self.db.webhook_counts().await?;

        Ok(format!(
            "<b>Whale Alert Status</b>\n\n\
             This chat: {}\n\
             Subscribers: {}\n\
             Tracked tokens: {}\n\
             Webhooks: {} active / {} total",
            if subscribed { "subscribed" } else { "not subscribed" },
            subscribers,
            tokens,
            webhooks.active,
            webhooks.total
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::RecordingSink;

    fn update(chat: i64, text: &str) -> InboundUpdate {
        serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 7,
                "chat": { "id": chat, "type": "private" },
                "text": text
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start", "whalebot"), Some(Command::Start));
        assert_eq!(parse_command("/subscribe", "whalebot"), Some(Command::Subscribe));
        assert_eq!(parse_command("/status@whalebot", "whalebot"), Some(Command::Status));
        assert_eq!(parse_command("hello there", "whalebot"), None);
        assert_eq!(parse_command("/unknown", "whalebot"), None);
    }

    #[tokio::test]
    async fn test_subscribe_twice_keeps_count() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let handler = CommandHandler::new(db.clone(), "whalebot");
        let sink = RecordingSink::new();

        let first = handler.handle_update(&update(99, "/start"), &sink).await.unwrap();
        assert_eq!(first, CommandOutcome::Subscribed { new: true });

        let second = handler.handle_update(&update(99, "/subscribe"), &sink).await.unwrap();
        assert_eq!(second, CommandOutcome::Subscribed { new: false });

        assert_eq!(db.count_subscribers().await.unwrap(), 1);
        assert_eq!(sink.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_reply_keeps_subscription() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let handler = CommandHandler::new(db.clone(), "whalebot");
        let sink = RecordingSink::failing_for(&["42"]);

        let outcome = handler.handle_update(&update(42, "/start"), &sink).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Subscribed { new: true });
        assert_eq!(db.count_subscribers().await.unwrap(), 1);
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_status_reply() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let handler = CommandHandler::new(db, "whalebot");
        let sink = RecordingSink::new();

        let outcome = handler.handle_update(&update(5, "/status"), &sink).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Status);

        let (chat, text) = &sink.messages()[0];
        assert_eq!(chat, "5");
        assert!(text.contains("not subscribed"));
        assert!(text.contains("Webhooks: 0 active / 0 total"));
    }

    #[tokio::test]
    async fn test_unrecognized_text_is_ignored() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let handler = CommandHandler::new(db, "whalebot");
        let sink = RecordingSink::new();

        let outcome = handler.handle_update(&update(5, "gm"), &sink).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Ignored);

        let empty = InboundUpdate::default();
        assert_eq!(
            handler.handle_update(&empty, &sink).await.unwrap(),
            CommandOutcome::Ignored
        );
        assert!(sink.messages().is_empty());
    }
}
