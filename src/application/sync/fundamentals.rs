//! Fundamentals refresh across the active instrument set.

use crate::domain::ports::MarketDataProvider;
use crate::domain::repositories::FundamentalsRepository;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spacing between per-symbol vendor requests
const POLITE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default)]
pub struct FundamentalsSyncReport {
    pub updated: usize,
    pub missing: usize,
    pub failed: usize,
    pub error_counts_by_kind: BTreeMap<String, usize>,
}

/// Fetches and upserts fundamentals for each symbol in turn.
///
/// Per-symbol failures are classified and counted, never fatal; the vendor
/// is paced with a fixed inter-request delay on top of the client's own
/// rate limiting.
pub struct FundamentalsSync {
    provider: Arc<dyn MarketDataProvider>,
    repository: Arc<dyn FundamentalsRepository>,
}

impl FundamentalsSync {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        repository: Arc<dyn FundamentalsRepository>,
    ) -> Self {
        Self {
            provider,
            repository,
        }
    }

    pub async fn run(
        &self,
        symbols: &[String],
        cancel: &CancellationToken,
    ) -> FundamentalsSyncReport {
        let mut report = FundamentalsSyncReport::default();
        for (i, symbol) in symbols.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("fundamentals sync cancelled after {} symbols", i);
                break;
            }

            match self.provider.fetch_fundamentals(symbol).await {
                Ok(Some(fundamentals)) => match self.repository.upsert(&fundamentals).await {
                    Ok(()) => {
                        report.updated += 1;
                        info!("[{}/{}] {}: fundamentals updated", i + 1, symbols.len(), symbol);
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!("{}: failed to store fundamentals: {}", symbol, e);
                    }
                },
                Ok(None) => {
                    report.missing += 1;
                    warn!("{}: vendor has no fundamentals", symbol);
                }
                Err(e) => {
                    report.failed += 1;
                    *report
                        .error_counts_by_kind
                        .entry(e.kind().as_str().to_string())
                        .or_insert(0) += 1;
                    warn!("[{}] {}: {}", e.kind(), symbol, e);
                }
            }

            if i + 1 < symbols.len() {
                tokio::time::sleep(POLITE_DELAY).await;
            }
        }

        info!(
            "fundamentals sync complete: {} updated, {} missing, {} failed",
            report.updated, report.missing, report.failed
        );
        report
    }
}
