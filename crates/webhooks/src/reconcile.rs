//! Pause/resume across the remote registry, keeping the local mirror in
//! step.

use crate::client::WebhookRegistry;
use crate::pagination::{Enumerator, Termination};
use std::sync::Arc;
use tracing::{debug, error, info};
use whale_alerts::{Database, DbError};
use whale_core::RateLimiter;

/// Which webhooks a lifecycle operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every webhook the remote registry lists (best-effort enumeration).
    AllRemote,
    /// Only webhooks in the local mirror. No enumeration.
    LocalOnly,
}

/// Outcome of one lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub changed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
    /// Remote updates that succeeded but could not be written to the
    /// mirror. Those webhooks are out of sync locally.
    pub mirror_failed: usize,
    /// How the remote listing ended. `None` for [`Scope::LocalOnly`].
    pub listing: Option<Termination>,
}

/// Drives the remote `active` flag and mirrors successful changes locally.
pub struct Reconciler {
    db: Database,
    registry: Arc<dyn WebhookRegistry>,
    enumerator: Enumerator,
    limiter: Arc<dyn RateLimiter>,
}

impl Reconciler {
    pub fn new(
        db: Database,
        registry: Arc<dyn WebhookRegistry>,
        enumerator: Enumerator,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            db,
            registry,
            enumerator,
            limiter,
        }
    }

    /// Set every webhook in `scope` to `target`.
    ///
    /// Per-webhook failures are counted and the loop continues; nothing is
    /// rolled back or retried. Only a failure to read the mirror aborts.
    pub async fn set_all_active(
        &self,
        target: bool,
        scope: Scope,
    ) -> Result<ReconcileReport, DbError> {
        let mut report = ReconcileReport::default();

        match scope {
            Scope::AllRemote => {
                let listing = self.enumerator.walk(self.registry.as_ref()).await;
                report.total = listing.webhooks.len();

                for webhook in &listing.webhooks {
                    if webhook.active == target {
                        debug!(id = %webhook.id, active = target, "Webhook already at target");
                        report.skipped += 1;
                        continue;
                    }
                    self.apply(&webhook.id, target, &mut report).await;
                }
                report.listing = Some(listing.termination);
            }
            Scope::LocalOnly => {
                let mirror = self.db.list_webhooks().await?;
                report.total = mirror.len();

                // The mirror may be stale, so its flag is not trusted.
                for webhook in &mirror {
                    self.apply(&webhook.id, target, &mut report).await;
                }
            }
        }

        info!(
            target,
            ?scope,
            changed = report.changed,
            skipped = report.skipped,
            failed = report.failed,
            mirror_failed = report.mirror_failed,
            total = report.total,
            "Webhook lifecycle update finished"
        );
        Ok(report)
    }

    async fn apply(&self, id: &str, target: bool, report: &mut ReconcileReport) {
        self.limiter.acquire().await;

        if let Err(e) = self.registry.set_active(id, target).await {
            error!(id = %id, active = target, error = %e, "Failed to update webhook");
            report.failed += 1;
            return;
        }
        report.changed += 1;

        // Remote-only webhooks have no mirror row; that is not an error.
        match self.db.set_webhook_active(id, target).await {
            Ok(true) => {}
            Ok(false) => debug!(id = %id, "Webhook has no local mirror row"),
            Err(e) => {
                error!(id = %id, error = %e, "Failed to update webhook mirror");
                report.mirror_failed += 1;
            }
        }
    }
}
