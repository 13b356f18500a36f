//! Fan-out of one alert to every subscriber.

use crate::db::{Database, DbError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};
use whale_core::RateLimiter;

/// Delivery primitive for a chat channel.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Send an HTML message to one chat.
    async fn send(&self, chat_id: &str, html: &str) -> Result<(), String>;
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    pub sent: u32,
    pub failed: u32,
}

/// Sends an alert to all subscribers, one at a time.
pub struct Broadcaster {
    db: Database,
    sink: Arc<dyn AlertSink>,
    limiter: Arc<dyn RateLimiter>,
}

impl Broadcaster {
    pub fn new(db: Database, sink: Arc<dyn AlertSink>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { db, sink, limiter }
    }

    /// Deliver `html` to every subscriber.
    ///
    /// A failed delivery is logged and counted; it never stops the loop.
    pub async fn broadcast(&self, html: &str) -> Result<BroadcastReport, DbError> {
        let subscribers = self.db.list_subscribers().await?;
        let mut report = BroadcastReport::default();

        if subscribers.is_empty() {
            debug!("No subscribers, alert dropped");
            return Ok(report);
        }

        for subscriber in &subscribers {
            self.limiter.acquire().await;
            match self.sink.send(&subscriber.chat_id, html).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    error!(chat_id = %subscriber.chat_id, error = %e, "Failed to send alert");
                    report.failed += 1;
                }
            }
        }

        info!(sent = report.sent, failed = report.failed, "Alert broadcast");
        Ok(report)
    }
}

/// In-memory sink that records messages, for tests and dry runs.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, String)>>,
    failing_chats: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deliveries to these chats fail.
    pub fn failing_for(chats: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing_chats: chats.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Every `(chat_id, message)` delivered so far.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, chat_id: &str, html: &str) -> Result<(), String> {
        if self.failing_chats.iter().any(|c| c == chat_id) {
            return Err(format!("chat {} unreachable", chat_id));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((chat_id.to_string(), html.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whale_core::Unlimited;

    #[tokio::test]
    async fn test_broadcast_to_all_subscribers() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.add_subscriber("1").await.unwrap();
        db.add_subscriber("2").await.unwrap();

        let sink = Arc::new(RecordingSink::new());
        let broadcaster = Broadcaster::new(db, sink.clone(), Arc::new(Unlimited));

        let report = broadcaster.broadcast("hello").await.unwrap();
        assert_eq!(report, BroadcastReport { sent: 2, failed: 0 });

        let chats: Vec<String> = sink.messages().into_iter().map(|(c, _)| c).collect();
        assert_eq!(chats, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_loop() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        for chat in ["1", "2", "3"] {
            db.add_subscriber(chat).await.unwrap();
        }

        let sink = Arc::new(RecordingSink::failing_for(&["2"]));
        let broadcaster = Broadcaster::new(db, sink.clone(), Arc::new(Unlimited));

        let report = broadcaster.broadcast("hello").await.unwrap();
        assert_eq!(report, BroadcastReport { sent: 2, failed: 1 });
        assert_eq!(sink.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let broadcaster = Broadcaster::new(db, Arc::new(RecordingSink::new()), Arc::new(Unlimited));
        assert_eq!(broadcaster.broadcast("x").await.unwrap(), BroadcastReport::default());
    }
}
