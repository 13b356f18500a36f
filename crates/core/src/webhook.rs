//! Upstream webhook subscriptions and subscribers.

use crate::ChainId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A balance-change webhook registered with the upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    /// Id assigned by the upstream registry.
    pub id: String,
    pub token_address: String,
    pub chain_id: ChainId,
    pub active: bool,
}

/// Request to register a new webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewWebhook {
    pub name: String,
    /// URL the upstream service will POST balance changes to.
    pub url: String,
    pub token_address: String,
    pub chain_id: ChainId,
    /// Wallets to watch.
    pub addresses: Vec<String>,
}

/// A chat registered for alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: String,
    pub subscribed_at: DateTime<Utc>,
}
