//! Derives coarser intraday timeframes by bucketed OHLCV aggregation.

use crate::application::clock::{ist_offset, session_open};
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use anyhow::{Result, bail};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use tracing::info;

/// Aggregates finer candles into `target` buckets.
///
/// Buckets are left-aligned on the 09:15 IST session open, so a 75m target
/// yields five buckets per NSE session. Per bucket: open = first,
/// high = max, low = min, close = last, volume = sum. A trailing bucket
/// missing source candles is dropped rather than emitted half-built.
pub struct Resampler;

impl Resampler {
    pub fn resample(source: &[Candle], target: Timeframe) -> Result<Vec<Candle>> {
        let Some(first) = source.first() else {
            return Ok(Vec::new());
        };
        let source_tf = first.timeframe;
        let source_minutes = source_tf.to_minutes();
        let target_minutes = target.to_minutes();

        if !source_tf.is_intraday() || !target.is_intraday() {
            bail!("resampling only derives intraday timeframes");
        }
        if target_minutes <= source_minutes || target_minutes % source_minutes != 0 {
            bail!(
                "target {} is not a coarser multiple of source {}",
                target,
                source_tf
            );
        }
        let expected_per_bucket = target_minutes / source_minutes;

        // (session date, bucket index) -> aggregate, ordered by key
        let mut buckets: BTreeMap<(NaiveDate, i64), Aggregate> = BTreeMap::new();
        for candle in source {
            let ist = candle.time.with_timezone(&ist_offset());
            let since_open = ist
                .time()
                .signed_duration_since(session_open())
                .num_minutes();
            if since_open < 0 {
                continue;
            }
            let key = (ist.date_naive(), since_open / target_minutes as i64);
            buckets
                .entry(key)
                .and_modify(|agg| agg.merge(candle))
                .or_insert_with(|| Aggregate::start(candle));
        }

        let mut out: Vec<Candle> = buckets
            .into_iter()
            .map(|((date, idx), agg)| {
                let bucket_start = date
                    .and_time(session_open())
                    .checked_add_signed(Duration::minutes(idx * target_minutes as i64))
                    .expect("bucket start in range");
                let time = ist_offset()
                    .from_local_datetime(&bucket_start)
                    .single()
                    .expect("fixed offset is unambiguous")
                    .with_timezone(&Utc);
                agg.into_candle(first.symbol.clone(), target, time)
            })
            .collect();

        // Only the trailing bucket can be legitimately incomplete
        if let Some(last) = out.last() {
            if bucket_count(source, last.time, target_minutes) < expected_per_bucket {
                out.pop();
            }
        }

        info!(
            "resampled {} {} candles into {} {} candles",
            source.len(),
            source_tf,
            out.len(),
            target
        );
        Ok(out)
    }
}

fn bucket_count(source: &[Candle], bucket_start: DateTime<Utc>, target_minutes: usize) -> usize {
    let bucket_end = bucket_start + Duration::minutes(target_minutes as i64);
    source
        .iter()
        .filter(|c| c.time >= bucket_start && c.time < bucket_end)
        .count()
}

struct Aggregate {
    open: rust_decimal::Decimal,
    high: rust_decimal::Decimal,
    low: rust_decimal::Decimal,
    close: rust_decimal::Decimal,
    volume: i64,
}

impl Aggregate {
    fn start(candle: &Candle) -> Self {
        Self {
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
        }
    }

    fn merge(&mut self, candle: &Candle) {
        if candle.high > self.high {
            self.high = candle.high;
        }
        if candle.low < self.low {
            self.low = candle.low;
        }
        self.close = candle.close;
        self.volume += candle.volume;
    }

    fn into_candle(self, symbol: String, timeframe: Timeframe, time: DateTime<Utc>) -> Candle {
        Candle {
            symbol,
            timeframe,
            time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}
