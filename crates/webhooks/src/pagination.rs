//! Defensive enumeration of the remote webhook registry.
//!
//! The registry's offset pagination is not trusted: a server that ignores
//! `offset` keeps returning page one forever. The walk stops on the first
//! page that contributes no new id, on a short or empty page, on an
//! iteration ceiling, or on a transport failure, and says which.

use crate::client::WebhookRegistry;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use whale_core::{RateLimiter, Webhook};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Why the walk stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum Termination {
    /// An empty page was returned.
    Exhausted,
    /// A page contributed no new ids; offset is probably ignored.
    OffsetIgnored,
    /// A page shorter than the page size was returned.
    LastPage,
    /// The iteration ceiling was hit; the listing may be incomplete.
    CeilingReached,
    /// A page request failed; the listing holds what came before it.
    TransportFailed(String),
}

impl Termination {
    /// Whether the listing can be trusted as complete.
    pub fn is_complete(&self) -> bool {
        matches!(self, Termination::Exhausted | Termination::LastPage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Exhausted => "exhausted",
            Termination::OffsetIgnored => "offsetIgnored",
            Termination::LastPage => "lastPage",
            Termination::CeilingReached => "ceilingReached",
            Termination::TransportFailed(_) => "transportFailed",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::TransportFailed(msg) => write!(f, "transportFailed: {}", msg),
            other => f.write_str(other.as_str()),
        }
    }
}

/// What to do with a listing whose termination is not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialListingPolicy {
    /// Return it along with its termination flag.
    #[default]
    BestEffort,
    /// Turn it into [`EnumerationError::Incomplete`].
    RequireComplete,
}

#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("Webhook listing incomplete ({termination}) after {collected} webhooks")]
    Incomplete {
        termination: Termination,
        collected: usize,
    },
}

/// Result of one walk: webhooks deduplicated by id, in order of first
/// appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub webhooks: Vec<Webhook>,
    pub termination: Termination,
    /// Page requests issued, including a failed one.
    pub pages: usize,
}

impl Listing {
    pub fn active_count(&self) -> usize {
        self.webhooks.iter().filter(|w| w.active).count()
    }
}

/// Enumerator configuration.
#[derive(Debug, Clone)]
pub struct EnumeratorConfig {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for EnumeratorConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Walks the registry one page at a time.
#[derive(Clone)]
pub struct Enumerator {
    config: EnumeratorConfig,
    limiter: Arc<dyn RateLimiter>,
}

impl Enumerator {
    pub fn new(config: EnumeratorConfig, limiter: Arc<dyn RateLimiter>) -> Self {
        let config = EnumeratorConfig {
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
        };
        Self { config, limiter }
    }

    pub fn config(&self) -> &EnumeratorConfig {
        &self.config
    }

    /// Walk the registry and apply `policy` to the result.
    pub async fn enumerate(
        &self,
        registry: &dyn WebhookRegistry,
        policy: PartialListingPolicy,
    ) -> Result<Listing, EnumerationError> {
        let listing = self.walk(registry).await;
        match policy {
            PartialListingPolicy::RequireComplete if !listing.termination.is_complete() => {
                Err(EnumerationError::Incomplete {
                    collected: listing.webhooks.len(),
                    termination: listing.termination,
                })
            }
            _ => Ok(listing),
        }
    }

    /// Walk the registry. Never fails: a transport failure ends the walk
    /// with [`Termination::TransportFailed`] and what was collected so far.
    pub async fn walk(&self, registry: &dyn WebhookRegistry) -> Listing {
        let page_size = self.config.page_size;
        let mut seen: HashSet<String> = HashSet::new();
        let mut webhooks = Vec::new();
        let mut pages = 0;

        let termination = loop {
            self.limiter.acquire().await;
            let offset = pages * page_size;
            pages += 1;

            let page = match registry.list_webhooks(page_size, offset).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(offset, error = %e, "Webhook listing failed, returning partial result");
                    break Termination::TransportFailed(e.to_string());
                }
            };

            if page.is_empty() {
                break Termination::Exhausted;
            }

            let returned = page.len();
            let mut new_ids = 0;
            for webhook in page {
                if seen.insert(webhook.id.clone()) {
                    webhooks.push(webhook);
                    new_ids += 1;
                }
            }
            debug!(offset, returned, new_ids, "Fetched webhook page");

            if new_ids == 0 {
                warn!(
                    offset,
                    "Page contained no new webhooks; registry may not support offset-based pagination"
                );
                break Termination::OffsetIgnored;
            }
            if returned < page_size {
                break Termination::LastPage;
            }
            if pages >= self.config.max_pages {
                warn!(
                    pages,
                    collected = webhooks.len(),
                    "Reached page ceiling; webhook listing possibly incomplete"
                );
                break Termination::CeilingReached;
            }
        };

        info!(
            total = webhooks.len(),
            pages,
            termination = %termination,
            "Webhook enumeration finished"
        );
        Listing {
            webhooks,
            termination,
            pages,
        }
    }
}
