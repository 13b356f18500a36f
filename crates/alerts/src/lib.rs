//! Whale alert delivery.
//!
//! This crate provides:
//! - SQLite storage for holders, subscribers and the webhook mirror
//! - Alert formatting
//! - Telegram delivery and subscriber commands
//! - The balance-change ingestion pipeline

pub mod broadcast;
pub mod db;
pub mod format;
pub mod pipeline;
pub mod telegram;

pub use broadcast::{AlertSink, BroadcastReport, Broadcaster, RecordingSink};
pub use db::{Database, DbError, MirrorCounts};
pub use format::format_alert;
pub use pipeline::{IngestPipeline, IngestReport, PipelineConfig, MATERIALITY_THRESHOLD_USD};
pub use telegram::{CommandHandler, CommandOutcome, InboundUpdate, TelegramBot, TelegramError};
