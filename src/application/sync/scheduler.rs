//! Per-(symbol, timeframe) sync orchestration with a bounded worker pool.

use crate::application::clock::market_reference;
use crate::application::resample::Resampler;
use crate::domain::errors::{ErrorKind, PipelineError};
use crate::domain::market::timeframe::{FetchPeriod, Timeframe};
use crate::domain::ports::MarketDataProvider;
use crate::domain::repositories::CandleRepository;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Incremental windows never exceed this many days
const MAX_INCREMENTAL_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Fetch the timeframe-specific maximum period
    Full,
    /// Fetch only candles newer than the stored latest, honouring staleness
    Incremental,
    /// Incremental semantics with the staleness skip bypassed
    Force,
}

impl FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            "force" => Ok(SyncMode::Force),
            _ => Err(anyhow!(
                "Invalid sync mode: '{}'. Must be 'full', 'incremental' or 'force'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub symbol: String,
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Error,
}

/// How a successful task got its rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Full,
    Incremental,
    UpToDate,
    /// Resampled from a finer stored timeframe (75m)
    Derived,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub status: TaskStatus,
    pub outcome: SyncOutcome,
    pub rows_inserted: u64,
    pub duration: Duration,
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncBatchReport {
    pub reports: Vec<TaskReport>,
    pub successful: usize,
    pub failed: usize,
    pub total_rows: u64,
    pub error_counts_by_kind: BTreeMap<String, usize>,
    pub duration: Duration,
}

/// Runs sync tasks against the vendor with at most `worker_cap` in flight.
///
/// Task completion order is not guaranteed; progress is reported with
/// monotone counts as tasks finish. Cancelling the batch stops dispatching
/// new tasks, in-flight fetches run to completion.
#[derive(Clone)]
pub struct SyncScheduler {
    provider: Arc<dyn MarketDataProvider>,
    candles: Arc<dyn CandleRepository>,
    worker_cap: usize,
}

impl SyncScheduler {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        candles: Arc<dyn CandleRepository>,
        worker_cap: usize,
    ) -> Self {
        Self {
            provider,
            candles,
            worker_cap: worker_cap.max(1),
        }
    }

    /// True when stored data is old enough to warrant a refetch.
    /// `now` is first corrected to the last tradable instant.
    pub fn is_stale(timeframe: Timeframe, latest: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let reference = market_reference(now);
        reference.signed_duration_since(latest) > timeframe.staleness_threshold()
    }

    pub async fn run_batch(
        &self,
        tasks: Vec<SyncTask>,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> SyncBatchReport {
        let started = Instant::now();
        let total = tasks.len();
        info!(
            "sync batch: {} tasks, mode {:?}, {} workers",
            total, mode, self.worker_cap
        );

        let semaphore = Arc::new(Semaphore::new(self.worker_cap));
        let mut join_set: JoinSet<TaskReport> = JoinSet::new();
        let mut report = SyncBatchReport::default();
        let mut completed = 0usize;

        let mut queue = tasks.into_iter();
        for task in queue.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                // Batch cancelled: this task never started
                record(&mut report, cancelled_report(&task));
                break;
            };

            let scheduler = self.clone();
            join_set.spawn(async move {
                let _permit = permit;
                scheduler.run_task(&task, mode).await
            });
        }
        // Remaining undispatched tasks after cancellation
        for task in queue {
            record(&mut report, cancelled_report(&task));
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(task_report) => {
                    completed += 1;
                    info!(
                        "[{}/{}] {} {} - {} {} rows",
                        completed,
                        total,
                        task_report.symbol,
                        task_report.timeframe,
                        match task_report.status {
                            TaskStatus::Success => "ok",
                            TaskStatus::Error => "failed",
                        },
                        task_report.rows_inserted
                    );
                    record(&mut report, task_report);
                }
                Err(e) => error!("sync task panicked: {}", e),
            }
        }

        report.duration = started.elapsed();
        if report.error_counts_by_kind.contains_key("RateLimited") {
            warn!("vendor rate limits hit; rerun with --workers 1 after backing off");
        }
        info!(
            "sync batch complete: {} ok, {} failed, {} rows in {:.1}s",
            report.successful,
            report.failed,
            report.total_rows,
            report.duration.as_secs_f64()
        );
        report
    }

    /// Runs one task, converting every failure into a classified report
    pub async fn run_task(&self, task: &SyncTask, mode: SyncMode) -> TaskReport {
        let started = Instant::now();
        match self.sync_symbol(&task.symbol, task.timeframe, mode).await {
            Ok((rows, outcome)) => TaskReport {
                symbol: task.symbol.clone(),
                timeframe: task.timeframe,
                status: TaskStatus::Success,
                outcome,
                rows_inserted: rows,
                duration: started.elapsed(),
                error_kind: None,
            },
            Err(e) => {
                error!("[{}] {} {}: {}", e.kind(), task.symbol, task.timeframe, e);
                TaskReport {
                    symbol: task.symbol.clone(),
                    timeframe: task.timeframe,
                    status: TaskStatus::Error,
                    outcome: SyncOutcome::Failed,
                    rows_inserted: 0,
                    duration: started.elapsed(),
                    error_kind: Some(e.kind()),
                }
            }
        }
    }

    async fn sync_symbol(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        mode: SyncMode,
    ) -> Result<(u64, SyncOutcome), PipelineError> {
        if timeframe == Timeframe::SeventyFiveMin {
            return self.sync_derived(symbol, mode).await;
        }
        match mode {
            SyncMode::Full => self.sync_full(symbol, timeframe).await,
            SyncMode::Incremental => self.sync_incremental(symbol, timeframe, false).await,
            SyncMode::Force => self.sync_incremental(symbol, timeframe, true).await,
        }
    }

    async fn sync_full(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<(u64, SyncOutcome), PipelineError> {
        let period = timeframe.max_fetch_period();
        let candles = self.provider.fetch_candles(symbol, timeframe, period).await?;
        let rows = self
            .candles
            .insert_batch(symbol, timeframe, &candles)
            .await
            .map_err(PipelineError::Store)?;
        Ok((rows, SyncOutcome::Full))
    }

    async fn sync_incremental(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        force: bool,
    ) -> Result<(u64, SyncOutcome), PipelineError> {
        let latest = self
            .candles
            .latest_time(symbol, timeframe)
            .await
            .map_err(PipelineError::Store)?;

        let Some(latest) = latest else {
            info!("{} {}: no stored data, running full sync", symbol, timeframe);
            return self.sync_full(symbol, timeframe).await;
        };

        let now = Utc::now();
        if !force && !Self::is_stale(timeframe, latest, now) {
            info!("{} {}: up to date, skipping", symbol, timeframe);
            return Ok((0, SyncOutcome::UpToDate));
        }

        let reference = market_reference(now);
        let days_since = reference
            .signed_duration_since(latest)
            .num_days()
            .max(0) as u32;
        let period = FetchPeriod::Days((days_since + 1).min(MAX_INCREMENTAL_DAYS));

        let fetched = self.provider.fetch_candles(symbol, timeframe, period).await?;
        let fresh: Vec<_> = fetched.into_iter().filter(|c| c.time > latest).collect();
        if fresh.is_empty() {
            info!("{} {}: no new candles", symbol, timeframe);
            return Ok((0, SyncOutcome::Incremental));
        }

        let rows = self
            .candles
            .insert_batch(symbol, timeframe, &fresh)
            .await
            .map_err(PipelineError::Store)?;
        Ok((rows, SyncOutcome::Incremental))
    }

    /// 75m candles are derived from stored 15m data instead of fetched
    async fn sync_derived(
        &self,
        symbol: &str,
        mode: SyncMode,
    ) -> Result<(u64, SyncOutcome), PipelineError> {
        let target = Timeframe::SeventyFiveMin;
        let latest = self
            .candles
            .latest_time(symbol, target)
            .await
            .map_err(PipelineError::Store)?;

        let now = Utc::now();
        let from = match (mode, latest) {
            (SyncMode::Incremental, Some(latest)) if !Self::is_stale(target, latest, now) => {
                info!("{} {}: up to date, skipping", symbol, target);
                return Ok((0, SyncOutcome::UpToDate));
            }
            // Reload a couple of buckets before the stored tip so a
            // previously-dropped incomplete bucket can fill in
            (_, Some(latest)) if mode != SyncMode::Full => {
                latest - ChronoDuration::minutes(2 * target.to_minutes() as i64)
            }
            _ => DateTime::<Utc>::UNIX_EPOCH,
        };

        let source = self
            .candles
            .range(symbol, Timeframe::FifteenMin, from, now)
            .await
            .map_err(PipelineError::Store)?;
        if source.is_empty() {
            return Err(PipelineError::InsufficientData { have: 0, need: 5 });
        }

        let derived = Resampler::resample(&source, target)
            .map_err(|e| PipelineError::InvariantViolation(e.to_string()))?;
        let fresh: Vec<_> = match latest {
            Some(latest) if mode != SyncMode::Full => {
                derived.into_iter().filter(|c| c.time > latest).collect()
            }
            _ => derived,
        };

        let rows = self
            .candles
            .insert_batch(symbol, target, &fresh)
            .await
            .map_err(PipelineError::Store)?;
        Ok((rows, SyncOutcome::Derived))
    }
}

fn cancelled_report(task: &SyncTask) -> TaskReport {
    TaskReport {
        symbol: task.symbol.clone(),
        timeframe: task.timeframe,
        status: TaskStatus::Error,
        outcome: SyncOutcome::Failed,
        rows_inserted: 0,
        duration: Duration::ZERO,
        error_kind: Some(ErrorKind::Cancelled),
    }
}

fn record(report: &mut SyncBatchReport, task: TaskReport) {
    match task.status {
        TaskStatus::Success => {
            report.successful += 1;
            report.total_rows += task.rows_inserted;
        }
        TaskStatus::Error => {
            report.failed += 1;
            if let Some(kind) = task.error_kind {
                *report
                    .error_counts_by_kind
                    .entry(kind.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
    }
    report.reports.push(task);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::ist_offset;
    use chrono::TimeZone;

    fn ist(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        ist_offset()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!(SyncMode::from_str("full").unwrap(), SyncMode::Full);
        assert_eq!(SyncMode::from_str("FORCE").unwrap(), SyncMode::Force);
        assert!(SyncMode::from_str("partial").is_err());
    }

    #[test]
    fn test_monday_premarket_not_stale() {
        // Latest candle Friday 15:30 IST; Monday 07:00 IST references the
        // Friday close, so daily data is not stale.
        let latest = ist(2025, 11, 7, 15, 30);
        let monday = ist(2025, 11, 10, 7, 0);
        assert!(!SyncScheduler::is_stale(Timeframe::OneDay, latest, monday));
    }

    #[test]
    fn test_tuesday_is_stale() {
        let latest = ist(2025, 11, 7, 15, 30);
        let tuesday = ist(2025, 11, 11, 10, 0);
        assert!(SyncScheduler::is_stale(Timeframe::OneDay, latest, tuesday));
    }

    #[test]
    fn test_friday_evening_not_stale() {
        // Same-day evening after close: age below the 1-day threshold
        let latest = ist(2025, 11, 7, 15, 30);
        let evening = ist(2025, 11, 7, 20, 0);
        assert!(!SyncScheduler::is_stale(Timeframe::OneDay, latest, evening));
    }

    #[test]
    fn test_intraday_thresholds_differ() {
        let latest = ist(2025, 11, 6, 14, 0);
        let now = ist(2025, 11, 6, 16, 30);
        // 2.5h old: stale for 1m (1h) and 5m (2h), fresh for 15m (4h)
        assert!(SyncScheduler::is_stale(Timeframe::OneMin, latest, now));
        assert!(SyncScheduler::is_stale(Timeframe::FiveMin, latest, now));
        assert!(!SyncScheduler::is_stale(Timeframe::FifteenMin, latest, now));
    }
}
