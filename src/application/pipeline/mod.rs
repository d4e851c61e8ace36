//! Streams symbols through load -> score -> plan -> enrich -> broadcast.

pub mod single_flight;

pub use single_flight::{DuplicatePolicy, SingleFlight, SingleFlightError};

use crate::application::levels::planner::LevelPlanner;
use crate::application::sentiment::SentimentEnricher;
use crate::application::strategy::ScoredStrategy;
use crate::application::strategy::scored::DEFAULT_MIN_CONFIDENCE;
use crate::domain::errors::{ErrorKind, PipelineError};
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::SignalSink;
use crate::domain::repositories::{CandleRepository, FundamentalsRepository};
use crate::domain::signal::{BatchSummary, Signal};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub timeframe: Timeframe,
    pub min_confidence: f64,
    pub lookback: usize,
    pub min_candles: usize,
    pub worker_cap: usize,
    pub sentiment_enabled: bool,
    pub broadcast_enabled: bool,
    pub duplicate_policy: DuplicatePolicy,
    pub min_rr: f64,
}

impl PipelineConfig {
    /// Batch defaults for a timeframe; the streaming scheduler awaits
    /// duplicate builds rather than rejecting them.
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            lookback: timeframe.default_lookback(),
            min_candles: timeframe.min_candles(),
            worker_cap: 5,
            sentiment_enabled: false,
            broadcast_enabled: false,
            duplicate_policy: DuplicatePolicy::Wait,
            min_rr: crate::application::levels::planner::DEFAULT_MIN_RR,
        }
    }
}

/// Terminal state of one symbol's build
#[derive(Debug, Clone)]
pub enum SymbolOutcome {
    Signal(Box<Signal>),
    NoSignal,
    InsufficientData { have: usize, need: usize },
    Failed { kind: ErrorKind, message: String },
}

/// Orchestrates per-symbol signal builds over a bounded worker pool.
///
/// Broadcasts happen in completion order, not input order, so early
/// signals reach subscribers before stragglers finish. A per-symbol
/// single-flight gate guarantees at most one concurrent build per symbol.
#[derive(Clone)]
pub struct SignalPipeline {
    candles: Arc<dyn CandleRepository>,
    fundamentals: Arc<dyn FundamentalsRepository>,
    enricher: Option<Arc<SentimentEnricher>>,
    sink: Option<Arc<dyn SignalSink>>,
    gate: Arc<SingleFlight<SymbolOutcome>>,
    config: PipelineConfig,
}

impl SignalPipeline {
    pub fn new(
        candles: Arc<dyn CandleRepository>,
        fundamentals: Arc<dyn FundamentalsRepository>,
        enricher: Option<Arc<SentimentEnricher>>,
        sink: Option<Arc<dyn SignalSink>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            candles,
            fundamentals,
            enricher,
            sink,
            gate: Arc::new(SingleFlight::new()),
            config,
        }
    }

    /// Runs the whole batch and emits the final summary through the sink
    pub async fn run_batch(
        &self,
        symbols: &[String],
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let total = symbols.len();
        info!(
            "signal batch: {} symbols on {} (min confidence {:.0}%, sentiment {}, broadcast {})",
            total,
            self.config.timeframe,
            self.config.min_confidence,
            self.config.sentiment_enabled,
            self.config.broadcast_enabled
        );

        let mut summary = BatchSummary {
            symbols_analyzed: total,
            ..BatchSummary::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.worker_cap.max(1)));
        let mut join_set: JoinSet<(String, SymbolOutcome)> = JoinSet::new();

        let mut queue = symbols.iter();
        for symbol in queue.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                count_error(&mut summary, ErrorKind::Cancelled);
                break;
            };

            let pipeline = self.clone();
            let symbol = symbol.clone();
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let _permit = permit;
                let outcome = pipeline.process_symbol(&symbol, &cancel).await;
                (symbol, outcome)
            });
        }
        for _ in queue {
            count_error(&mut summary, ErrorKind::Cancelled);
        }

        let mut completed = 0usize;
        while let Some(joined) = join_set.join_next().await {
            let (symbol, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!("symbol build panicked: {}", e);
                    continue;
                }
            };
            completed += 1;

            match outcome {
                SymbolOutcome::Signal(signal) => {
                    summary.signals_generated += 1;
                    info!(
                        "[{}/{}] {}: signal (confidence {:.1}%)",
                        completed, total, symbol, signal.confidence
                    );
                    self.broadcast(&signal, &mut summary).await;
                }
                SymbolOutcome::NoSignal => {
                    debug!("[{}/{}] {}: no signal", completed, total, symbol);
                }
                SymbolOutcome::InsufficientData { have, need } => {
                    warn!(
                        "[{}/{}] {}: insufficient data ({} candles, need {})",
                        completed, total, symbol, have, need
                    );
                    count_error(&mut summary, ErrorKind::InsufficientData);
                }
                SymbolOutcome::Failed { kind, message } => {
                    error!("[{}/{}] {}: [{}] {}", completed, total, symbol, kind, message);
                    count_error(&mut summary, kind);
                }
            }
        }

        if self.config.broadcast_enabled {
            if let Some(sink) = &self.sink {
                if let Err(e) = sink.deliver_summary(&summary).await {
                    warn!("summary delivery failed: {}", e);
                }
            }
        }

        info!(
            "signal batch complete: {} analyzed, {} signals, {} sent",
            summary.symbols_analyzed, summary.signals_generated, summary.signals_sent
        );
        summary
    }

    /// One ad-hoc build, gated; the interactive path configures `Reject`
    /// and surfaces `Busy` to the caller.
    pub async fn analyze_symbol(&self, symbol: &str) -> Result<SymbolOutcome, PipelineError> {
        let cancel = CancellationToken::new();
        match self
            .gate
            .run(symbol, self.config.duplicate_policy, || {
                self.build_symbol(symbol, &cancel)
            })
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(SingleFlightError::Busy) => Err(PipelineError::Busy {
                symbol: symbol.to_string(),
            }),
            Err(SingleFlightError::LeaderGone) => Err(PipelineError::Cancelled),
        }
    }

    async fn process_symbol(&self, symbol: &str, cancel: &CancellationToken) -> SymbolOutcome {
        match self
            .gate
            .run(symbol, self.config.duplicate_policy, || {
                self.build_symbol(symbol, cancel)
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(SingleFlightError::Busy) => SymbolOutcome::Failed {
                kind: ErrorKind::Other,
                message: "another build already in flight".to_string(),
            },
            Err(SingleFlightError::LeaderGone) => SymbolOutcome::Failed {
                kind: ErrorKind::Cancelled,
                message: "in-flight build was cancelled".to_string(),
            },
        }
    }

    /// The per-symbol state machine: loading -> scoring -> planning ->
    /// enriching -> done, any stage may fail terminally.
    async fn build_symbol(&self, symbol: &str, cancel: &CancellationToken) -> SymbolOutcome {
        if cancel.is_cancelled() {
            return SymbolOutcome::Failed {
                kind: ErrorKind::Cancelled,
                message: "batch cancelled before build".to_string(),
            };
        }

        debug!("{}: queued -> loading", symbol);
        let candles = match self
            .candles
            .tail(symbol, self.config.timeframe, self.config.lookback)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                return SymbolOutcome::Failed {
                    kind: ErrorKind::Store,
                    message: e.to_string(),
                };
            }
        };
        if candles.len() < self.config.min_candles {
            debug!("{}: loading -> insufficient_data", symbol);
            return SymbolOutcome::InsufficientData {
                have: candles.len(),
                need: self.config.min_candles,
            };
        }

        // Missing fundamentals degrade to a zero adjustment, never an error
        let fundamentals = match self.fundamentals.get(symbol).await {
            Ok(f) => f,
            Err(e) => {
                warn!("{}: fundamentals lookup failed: {}", symbol, e);
                None
            }
        };

        debug!("{}: loading -> scoring", symbol);
        let strategy = ScoredStrategy::new(
            self.config.min_confidence,
            LevelPlanner::new(self.config.min_rr),
        );
        let evaluated = strategy.evaluate(symbol, &candles, fundamentals.as_ref());

        let signal = match evaluated {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                debug!("{}: scoring -> no_signal", symbol);
                return SymbolOutcome::NoSignal;
            }
            Err(PipelineError::InsufficientData { have, need }) => {
                return SymbolOutcome::InsufficientData { have, need };
            }
            Err(e) => {
                return SymbolOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                };
            }
        };

        debug!("{}: scoring -> planning -> done", symbol);
        let signal = match (&self.enricher, self.config.sentiment_enabled) {
            (Some(enricher), true) => {
                debug!("{}: planning -> enriching", symbol);
                enricher.enhance(signal, self.config.timeframe).await
            }
            _ => signal,
        };

        SymbolOutcome::Signal(Box::new(signal))
    }

    /// Broadcasts run in the collector loop, serialised in completion order
    async fn broadcast(&self, signal: &Signal, summary: &mut BatchSummary) {
        if !self.config.broadcast_enabled {
            return;
        }
        let Some(sink) = &self.sink else {
            return;
        };
        match sink.deliver(signal).await {
            Ok(report) if report.delivered > 0 => {
                summary.signals_sent += 1;
                if report.failed > 0 {
                    count_error_n(summary, ErrorKind::DeliveryFailed, report.failed);
                }
            }
            Ok(report) => {
                warn!("{}: delivered to no subscribers", signal.symbol);
                count_error_n(summary, ErrorKind::DeliveryFailed, report.failed.max(1));
            }
            Err(e) => {
                error!("{}: broadcast failed: {}", signal.symbol, e);
                count_error(summary, ErrorKind::DeliveryFailed);
            }
        }
    }
}

fn count_error(summary: &mut BatchSummary, kind: ErrorKind) {
    count_error_n(summary, kind, 1);
}

fn count_error_n(summary: &mut BatchSummary, kind: ErrorKind, n: usize) {
    *summary
        .error_counts_by_kind
        .entry(kind.as_str().to_string())
        .or_insert(0) += n;
}
