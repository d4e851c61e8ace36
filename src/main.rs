use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zsignal::application::pipeline::{PipelineConfig, SignalPipeline};
use zsignal::application::sync::fundamentals::FundamentalsSync;
use zsignal::application::sync::scheduler::{SyncMode, SyncScheduler, SyncTask};
use zsignal::config::{BroadcastMode, Config};
use zsignal::domain::market::timeframe::Timeframe;
use zsignal::domain::ports::SignalSink;
use zsignal::domain::repositories::InstrumentRepository;
use zsignal::infrastructure::llm;
use zsignal::infrastructure::news::GoogleNewsFeed;
use zsignal::infrastructure::persistence::{
    Database, SqliteCandleRepository, SqliteFundamentalsRepository, SqliteInstrumentRepository,
    SqliteSubscriberDirectory,
};
use zsignal::infrastructure::telegram::{SinkMode, TelegramSink};
use zsignal::infrastructure::vendor::YahooFinanceClient;
use zsignal::application::sentiment::SentimentEnricher;

#[derive(Parser)]
#[command(name = "zsignal", about = "NSE equities signal pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronise candles (and optionally fundamentals) from the vendor
    Sync {
        /// full, incremental or force
        #[arg(long)]
        mode: Option<String>,
        /// Comma-separated timeframes, e.g. "1d,15m,75m"
        #[arg(long)]
        timeframes: Option<String>,
        #[arg(long)]
        workers: Option<usize>,
        /// Specific symbols; defaults to all active instruments
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,
        /// Also refresh fundamentals after the candle sync
        #[arg(long)]
        fundamentals: bool,
    },
    /// Generate (and optionally enrich and broadcast) BUY signals
    Signals {
        #[arg(long)]
        timeframe: Option<String>,
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Enable news sentiment + AI technical enrichment
        #[arg(long)]
        sentiment: bool,
        /// Deliver signals via Telegram
        #[arg(long)]
        broadcast: bool,
        /// Specific symbols; defaults to the index-100 universe
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,
    },
    /// Rebuild derived candles (75m from stored 15m)
    Resample {
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,
    },
    /// Register instruments from a seed file
    /// (one `symbol,name,sector,industry,idx50,idx100` row per line)
    Seed {
        #[arg(long)]
        file: std::path::PathBuf,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let database = Database::new(&config.database_url).await?;
    let candles = Arc::new(SqliteCandleRepository::new(database.pool.clone()));
    let fundamentals = Arc::new(SqliteFundamentalsRepository::new(database.pool.clone()));
    let instruments = Arc::new(SqliteInstrumentRepository::new(database.pool.clone()));

    // Ctrl-C stops dispatching new work; in-flight requests drain
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling batch");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Sync {
            mode,
            timeframes,
            workers,
            symbols,
            fundamentals: sync_fundamentals,
        } => {
            let mode = match mode {
                Some(m) => SyncMode::from_str(&m)?,
                None => config.sync_mode,
            };
            let timeframes = match timeframes {
                Some(list) => list
                    .split(',')
                    .map(|s| Timeframe::from_str(s.trim()))
                    .collect::<Result<Vec<_>>>()?,
                None => config.sync_timeframes.clone(),
            };
            let symbols = resolve_symbols(symbols, instruments.as_ref(), false).await?;

            let provider = Arc::new(YahooFinanceClient::new());
            let scheduler = SyncScheduler::new(
                provider.clone(),
                candles.clone(),
                workers.unwrap_or(config.worker_cap),
            );

            let tasks: Vec<SyncTask> = symbols
                .iter()
                .flat_map(|symbol| {
                    timeframes.iter().map(|tf| SyncTask {
                        symbol: symbol.clone(),
                        timeframe: *tf,
                    })
                })
                .collect();

            let report = scheduler.run_batch(tasks, mode, &cancel).await;
            info!(
                "candle sync: {} ok, {} failed, {} rows",
                report.successful, report.failed, report.total_rows
            );

            if sync_fundamentals && !cancel.is_cancelled() {
                let sync = FundamentalsSync::new(provider, fundamentals.clone());
                sync.run(&symbols, &cancel).await;
            }
        }

        Command::Signals {
            timeframe,
            min_confidence,
            sentiment,
            broadcast,
            symbols,
        } => {
            let timeframe = match timeframe {
                Some(tf) => Timeframe::from_str(&tf)?,
                None => config.timeframe,
            };
            let symbols = resolve_symbols(symbols, instruments.as_ref(), true).await?;

            let mut pipeline_config = PipelineConfig::for_timeframe(timeframe);
            pipeline_config.min_confidence = min_confidence.unwrap_or(config.min_confidence);
            pipeline_config.lookback = config.lookback_for(timeframe);
            pipeline_config.worker_cap = config.worker_cap;
            pipeline_config.min_rr = config.min_rr;
            pipeline_config.sentiment_enabled = sentiment || config.sentiment_enabled;
            pipeline_config.broadcast_enabled = broadcast;

            let enricher = if pipeline_config.sentiment_enabled {
                let llm_client = llm::client_from_env(config.llm_provider)?;
                Some(Arc::new(SentimentEnricher::new(
                    Arc::new(GoogleNewsFeed::new()),
                    llm_client,
                    true,
                )))
            } else {
                None
            };

            let sink: Option<Arc<dyn SignalSink>> = if broadcast {
                let token = config
                    .telegram_bot_token
                    .clone()
                    .context("TELEGRAM_BOT_TOKEN required for broadcast")?;
                let mode = match config.broadcast_mode {
                    BroadcastMode::Single => SinkMode::Single {
                        chat_id: config
                            .telegram_chat_id
                            .context("TELEGRAM_CHAT_ID required for single-chat mode")?,
                    },
                    BroadcastMode::AllActive => SinkMode::Broadcast {
                        directory: Arc::new(SqliteSubscriberDirectory::new(database.pool.clone())),
                    },
                };
                Some(Arc::new(TelegramSink::new(token, mode)))
            } else {
                None
            };

            let pipeline =
                SignalPipeline::new(candles, fundamentals, enricher, sink, pipeline_config);
            let summary = pipeline.run_batch(&symbols, &cancel).await;
            info!(
                "signals: {} analyzed, {} generated, {} sent",
                summary.symbols_analyzed, summary.signals_generated, summary.signals_sent
            );
        }

        Command::Seed { file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mut registered = 0usize;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let fields: Vec<&str> = line.split(',').map(str::trim).collect();
                if fields.len() < 2 {
                    warn!("skipping malformed seed row: {}", line);
                    continue;
                }
                let mut instrument = zsignal::domain::market::Instrument::new(fields[0], fields[1]);
                instrument.sector = fields.get(2).filter(|s| !s.is_empty()).map(|s| s.to_string());
                instrument.industry = fields.get(3).filter(|s| !s.is_empty()).map(|s| s.to_string());
                instrument.is_index_50 = fields.get(4).is_some_and(|v| *v == "1" || *v == "true");
                instrument.is_index_100 =
                    fields.get(5).is_none_or(|v| *v == "1" || *v == "true");
                instruments.upsert(&instrument).await?;
                registered += 1;
            }
            info!("seeded {} instruments from {}", registered, file.display());
        }

        Command::Resample { symbols } => {
            let symbols = resolve_symbols(symbols, instruments.as_ref(), false).await?;
            let provider = Arc::new(YahooFinanceClient::new());
            let scheduler = SyncScheduler::new(provider, candles, config.worker_cap);
            let tasks: Vec<SyncTask> = symbols
                .into_iter()
                .map(|symbol| SyncTask {
                    symbol,
                    timeframe: Timeframe::SeventyFiveMin,
                })
                .collect();
            let report = scheduler.run_batch(tasks, SyncMode::Full, &cancel).await;
            info!(
                "resample: {} ok, {} failed, {} rows",
                report.successful, report.failed, report.total_rows
            );
        }
    }

    Ok(())
}

async fn resolve_symbols(
    explicit: Vec<String>,
    instruments: &dyn InstrumentRepository,
    index_100_only: bool,
) -> Result<Vec<String>> {
    if !explicit.is_empty() {
        return Ok(explicit);
    }
    let symbols = if index_100_only {
        instruments.index_100_symbols().await?
    } else {
        instruments
            .all_active()
            .await?
            .into_iter()
            .map(|i| i.symbol)
            .collect()
    };
    if symbols.is_empty() {
        anyhow::bail!("no instruments registered; pass --symbols or seed the registry");
    }
    Ok(symbols)
}
