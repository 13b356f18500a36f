//! Process-wide handles, built once at startup and shared with every
//! handler.

use crate::config::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use whale_alerts::{
    AlertSink, Broadcaster, CommandHandler, Database, DbError, IngestPipeline, PipelineConfig,
    TelegramBot,
};
use whale_core::{FixedInterval, RateLimiter};
use whale_webhooks::{
    Enumerator, EnumeratorConfig, HolderSource, Reconciler, SimClient, SimClientConfig,
    UpstreamError, WebhookRegistry,
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Upstream client error: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Shared application context.
pub struct AppContext {
    pub config: AppConfig,
    pub db: Database,
    pub pipeline: IngestPipeline,
    pub commands: CommandHandler,
    /// Delivery channel for command replies.
    pub chat: Arc<dyn AlertSink>,
    pub registry: Arc<dyn WebhookRegistry>,
    pub holders: Arc<dyn HolderSource>,
    /// Paces setup loops against the upstream API.
    pub upstream_limiter: Arc<dyn RateLimiter>,
    pub enumerator: Enumerator,
    pub reconciler: Reconciler,
}

pub type SharedContext = Arc<AppContext>;

/// External collaborators of the context.
pub struct Collaborators {
    pub chat: Arc<dyn AlertSink>,
    pub registry: Arc<dyn WebhookRegistry>,
    pub holders: Arc<dyn HolderSource>,
    pub upstream_limiter: Arc<dyn RateLimiter>,
    pub chat_limiter: Arc<dyn RateLimiter>,
}

impl AppContext {
    /// Connect to the store and build the real upstream and Telegram clients.
    pub async fn connect(config: AppConfig) -> Result<SharedContext, StartupError> {
        let db = Database::connect(&config.database_url).await?;
        info!(url = %config.database_url, "Database ready");

        let sim = Arc::new(SimClient::new(
            SimClientConfig::new(&config.sim_api_url, &config.sim_api_key)
                .with_timeout(Duration::from_secs(config.http_timeout_secs)),
        )?);
        let collaborators = Collaborators {
            chat: Arc::new(TelegramBot::new(&config.telegram_bot_token)),
            registry: sim.clone(),
            holders: sim,
            upstream_limiter: Arc::new(FixedInterval::from_millis(config.upstream_delay_ms)),
            chat_limiter: Arc::new(FixedInterval::from_millis(config.telegram_delay_ms)),
        };

        Ok(Arc::new(Self::from_parts(config, db, collaborators)))
    }

    /// Assemble a context from already-built parts.
    pub fn from_parts(config: AppConfig, db: Database, parts: Collaborators) -> Self {
        let broadcaster = Broadcaster::new(db.clone(), parts.chat.clone(), parts.chat_limiter);
        let pipeline = IngestPipeline::new(broadcaster, PipelineConfig::default());
        let commands = CommandHandler::new(db.clone(), config.telegram_bot_username.clone());

        let enumerator = Enumerator::new(
            EnumeratorConfig {
                page_size: config.webhook_page_size,
                max_pages: config.webhook_max_pages,
            },
            parts.upstream_limiter.clone(),
        );
        let reconciler = Reconciler::new(
            db.clone(),
            parts.registry.clone(),
            enumerator.clone(),
            parts.upstream_limiter.clone(),
        );

        Self {
            config,
            db,
            pipeline,
            commands,
            chat: parts.chat,
            registry: parts.registry,
            holders: parts.holders,
            upstream_limiter: parts.upstream_limiter,
            enumerator,
            reconciler,
        }
    }
}
