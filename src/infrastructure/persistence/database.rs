use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Owns the SQLite pool and schema lifecycle
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let in_memory = db_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        if !in_memory {
            // WAL for concurrent readers; in-memory databases stay in
            // their fixed journal mode
            options = options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        }

        // An in-memory database exists per connection; the pool must not
        // fan out across several of them
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Candles: append-only, keyed by (symbol, timeframe, time)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                time TEXT NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume INTEGER NOT NULL,
                PRIMARY KEY (symbol, timeframe, time)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candles table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_candles_key_time
            ON candles (symbol, timeframe, time);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candle index")?;

        // 2. Fundamentals: one row per symbol, replaced wholesale on upsert
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fundamentals (
                symbol TEXT PRIMARY KEY,
                current_price REAL,
                market_cap REAL,
                trailing_pe REAL,
                price_to_book REAL,
                return_on_equity REAL,
                debt_to_equity REAL,
                dividend_yield REAL,
                profit_margins REAL,
                revenue_growth REAL,
                earnings_growth REAL,
                beta REAL,
                sector TEXT,
                industry TEXT,
                raw_data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create fundamentals table")?;

        // 3. Instruments: soft-delete registry
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instruments (
                symbol TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                sector TEXT,
                industry TEXT,
                is_index_50 INTEGER NOT NULL DEFAULT 0,
                is_index_100 INTEGER NOT NULL DEFAULT 1,
                is_active INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create instruments table")?;

        // 4. Subscribers for signal broadcast
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                chat_id INTEGER PRIMARY KEY,
                is_active INTEGER NOT NULL DEFAULT 1,
                registered_at TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create subscribers table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
