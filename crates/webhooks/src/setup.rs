//! Operator setup flows: collect top holders, then register one webhook per
//! tracked (token, chain) pair.

use crate::client::{HolderSource, WebhookRegistry};
use crate::error::SetupError;
use crate::tokens::TokenListing;
use tracing::{debug, error, info, warn};
use whale_alerts::Database;
use whale_core::{resolve_chain_name, Chain, HolderRecord, NewWebhook, RateLimiter, Webhook};

/// Path the upstream service posts balance changes to.
pub const BALANCES_PATH: &str = "/balances";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchHoldersReport {
    /// Holder addresses stored across all tokens.
    pub total_holders: usize,
    pub tokens_processed: usize,
    /// Rows whose chain name is not in the registry.
    pub unsupported_chain: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateWebhooksReport {
    pub webhooks_created: usize,
    pub webhook_ids: Vec<String>,
    /// Pairs that already have a mirror row.
    pub already_registered: usize,
    pub failed: usize,
}

/// Callback URL for balance-change webhooks.
pub fn balances_callback_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), BALANCES_PATH)
}

/// Query the top holders of every token and store them.
pub async fn fetch_holders(
    tokens: &[TokenListing],
    source: &dyn HolderSource,
    db: &Database,
    limiter: &dyn RateLimiter,
    holders_per_token: usize,
) -> Result<FetchHoldersReport, SetupError> {
    let mut report = FetchHoldersReport::default();

    for token in tokens {
        let Some(chain_id) = resolve_chain_name(&token.chain) else {
            warn!(symbol = %token.symbol, chain = %token.chain, "Skipping token on unsupported chain");
            report.unsupported_chain += 1;
            continue;
        };

        limiter.acquire().await;
        let holders = match source
            .top_holders(chain_id, &token.address, holders_per_token)
            .await
        {
            Ok(holders) => holders,
            Err(e) => {
                error!(symbol = %token.symbol, chain_id = %chain_id, error = %e, "Failed to fetch holders");
                report.failed += 1;
                continue;
            }
        };

        if holders.is_empty() {
            warn!(symbol = %token.symbol, chain_id = %chain_id, "No holders returned");
        }

        let record = HolderRecord::new(&token.address, chain_id, token.symbol.as_str(), holders);
        db.upsert_holder(&record).await?;
        report.total_holders += record.holder_addresses.len();
        report.tokens_processed += 1;
        debug!(symbol = %token.symbol, chain_id = %chain_id, holders = record.holder_addresses.len(), "Stored holders");
    }

    info!(
        tokens_processed = report.tokens_processed,
        total_holders = report.total_holders,
        unsupported_chain = report.unsupported_chain,
        failed = report.failed,
        "Holder fetch finished"
    );
    Ok(report)
}

/// Register a webhook for every stored holder set that has none yet.
pub async fn create_webhooks(
    db: &Database,
    registry: &dyn WebhookRegistry,
    limiter: &dyn RateLimiter,
    callback_url: &str,
) -> Result<CreateWebhooksReport, SetupError> {
    let mut report = CreateWebhooksReport::default();

    for record in db.list_holders().await? {
        if let Some(existing) = db.webhook_for(&record.token_address, record.chain_id).await? {
            debug!(id = %existing.id, token = %record.token_address, "Webhook already registered");
            report.already_registered += 1;
            continue;
        }
        if record.holder_addresses.is_empty() {
            debug!(token = %record.token_address, "No holders to watch, skipping");
            continue;
        }

        let chain_name = Chain::from_id(record.chain_id)
            .map(Chain::name)
            .unwrap_or("unknown");
        let request = NewWebhook {
            name: format!("{} whales on {}", record.symbol, chain_name),
            url: callback_url.to_string(),
            token_address: record.token_address.clone(),
            chain_id: record.chain_id,
            addresses: record.holder_addresses.clone(),
        };

        limiter.acquire().await;
        let id = match registry.create_webhook(&request).await {
            Ok(id) => id,
            Err(e) => {
                error!(token = %record.token_address, chain_id = %record.chain_id, error = %e, "Failed to create webhook");
                report.failed += 1;
                continue;
            }
        };

        let mirror = Webhook {
            id: id.clone(),
            token_address: record.token_address.clone(),
            chain_id: record.chain_id,
            active: true,
        };
        if let Err(e) = db.insert_webhook(&mirror).await {
            error!(id = %id, error = %e, "Webhook created but mirror insert failed");
            report.failed += 1;
            continue;
        }

        report.webhooks_created += 1;
        report.webhook_ids.push(id);
    }

    info!(
        created = report.webhooks_created,
        already_registered = report.already_registered,
        failed = report.failed,
        "Webhook creation finished"
    );
    Ok(report)
}
