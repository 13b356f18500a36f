//! Balance-change ingestion: dedup, materiality filter, alert fan-out.

use crate::broadcast::Broadcaster;
use crate::format::format_alert;
use std::collections::HashSet;
use tracing::{debug, error, info};
use whale_core::{BalanceChangeEvent, ChainId};

/// USD value below which a change is not alerted.
pub const MATERIALITY_THRESHOLD_USD: f64 = 100.0;

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Changes strictly below this USD value are dropped.
    pub min_value_usd: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_value_usd: MATERIALITY_THRESHOLD_USD,
        }
    }
}

/// Outcome of one ingested batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// Distinct transaction hashes in the batch.
    pub processed: usize,
    /// Events that passed the filter and were broadcast.
    pub alerted: usize,
    /// Events dropped by the materiality filter.
    pub below_threshold: usize,
}

/// Turns inbound balance-change batches into subscriber alerts.
pub struct IngestPipeline {
    broadcaster: Broadcaster,
    config: PipelineConfig,
}

impl IngestPipeline {
    pub fn new(broadcaster: Broadcaster, config: PipelineConfig) -> Self {
        Self {
            broadcaster,
            config,
        }
    }

    /// Whether a change is large enough to alert on.
    pub fn is_material(&self, event: &BalanceChangeEvent) -> bool {
        event.value_delta_usd >= self.config.min_value_usd
    }

    /// Ingest one batch.
    ///
    /// Duplicate transaction hashes within the batch are dropped before the
    /// filter (first occurrence wins). Dedup state lives only for this call.
    /// Delivery failures are logged by the broadcaster and never stop the
    /// batch.
    pub async fn ingest(&self, batch: &[BalanceChangeEvent], chain_id: ChainId) -> IngestReport {
        let mut seen: HashSet<&str> = HashSet::with_capacity(batch.len());
        let mut report = IngestReport::default();

        for event in batch {
            if !seen.insert(event.transaction_hash.as_str()) {
                debug!(tx = %event.transaction_hash, "Skipping duplicate transaction in batch");
                continue;
            }
            report.processed += 1;

            if !self.is_material(event) {
                debug!(
                    tx = %event.transaction_hash,
                    value_usd = event.value_delta_usd,
                    "Skipping alert: below materiality threshold"
                );
                report.below_threshold += 1;
                continue;
            }

            let message = format_alert(event, chain_id);
            match self.broadcaster.broadcast(&message).await {
                Ok(_) => report.alerted += 1,
                Err(e) => {
                    error!(tx = %event.transaction_hash, error = %e, "Failed to load subscribers");
                }
            }
        }

        info!(
            chain_id = %chain_id,
            received = batch.len(),
            processed = report.processed,
            alerted = report.alerted,
            "Balance batch ingested"
        );
        report
    }
}
