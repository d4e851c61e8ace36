//! Multi-indicator BUY scorer with fundamental adjustment.
//!
//! Category weights: trend 40%, momentum 35%, volatility 25%. A signal is
//! emitted when the adjusted confidence clears the threshold and at least
//! two categories score 60 or better.

use crate::application::indicators::momentum::{StochasticOutput, rsi, stochastic};
use crate::application::indicators::trend::{MacdOutput, ema, macd};
use crate::application::indicators::volatility::{BollingerOutput, atr, bollinger};
use crate::application::indicators::CandleWindow;
use crate::application::levels::planner::LevelPlanner;
use crate::application::levels::sr_detector::SrDetector;
use crate::domain::errors::PipelineError;
use crate::domain::market::candle::Candle;
use crate::domain::market::fundamentals::Fundamentals;
use crate::domain::signal::{
    Analysis, CategoryReport, ConditionCheck, Signal, SignalType,
};
use chrono::Utc;
use tracing::{debug, info};

pub const TREND_WEIGHT: f64 = 0.40;
pub const MOMENTUM_WEIGHT: f64 = 0.35;
pub const VOLATILITY_WEIGHT: f64 = 0.25;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 65.0;

/// Minimum candles before any category can be evaluated
pub const MIN_CANDLES: usize = 50;
/// Candles carried on the signal for downstream AI prompts
const TAIL_CANDLES: usize = 30;
/// S/R detection window
const SR_LOOKBACK: usize = 50;

/// Everything the category checks need, computed once per window
pub struct IndicatorSet {
    pub ema_8: Vec<Option<f64>>,
    pub ema_20: Vec<Option<f64>>,
    pub ema_50: Vec<Option<f64>>,
    pub macd: MacdOutput,
    pub rsi: Vec<Option<f64>>,
    pub stochastic: StochasticOutput,
    pub atr: Vec<Option<f64>>,
    pub bollinger: BollingerOutput,
}

impl IndicatorSet {
    pub fn compute(window: &CandleWindow) -> Self {
        Self {
            ema_8: ema(&window.close, 8),
            ema_20: ema(&window.close, 20),
            ema_50: ema(&window.close, 50),
            macd: macd(&window.close, 12, 26, 9),
            rsi: rsi(&window.close, 14),
            stochastic: stochastic(window, 14, 3, 3),
            atr: atr(window, 14),
            bollinger: bollinger(&window.close, 20, 2.0),
        }
    }
}

/// Fundamental scoring outcome: raw points in [-40, 40] halved into the
/// confidence adjustment
#[derive(Debug, Clone, Default)]
pub struct FundamentalScore {
    pub raw: i32,
    pub adjustment: f64,
    pub breakdown: Vec<(&'static str, i32)>,
}

pub struct ScoredStrategy {
    min_confidence: f64,
    planner: LevelPlanner,
}

impl Default for ScoredStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE, LevelPlanner::default())
    }
}

impl ScoredStrategy {
    pub fn new(min_confidence: f64, planner: LevelPlanner) -> Self {
        Self {
            min_confidence,
            planner,
        }
    }

    /// Runs the full evaluation for one symbol: indicators, category
    /// scores, fundamental adjustment, emission gate, level planning.
    ///
    /// Returns `Ok(None)` when no BUY is warranted.
    pub fn evaluate(
        &self,
        symbol: &str,
        candles: &[Candle],
        fundamentals: Option<&Fundamentals>,
    ) -> Result<Option<Signal>, PipelineError> {
        if candles.len() < MIN_CANDLES {
            return Err(PipelineError::InsufficientData {
                have: candles.len(),
                need: MIN_CANDLES,
            });
        }

        let window = CandleWindow::from_candles(candles);
        let set = IndicatorSet::compute(&window);
        let analysis = self.analyze(&window, &set)?;

        let fund = Self::score_fundamentals(fundamentals);
        let technical = analysis.technical_confidence;
        let final_confidence = (technical + fund.adjustment).clamp(0.0, 100.0);

        info!(
            "{}: technical={:.1}%, fundamental={:+.1}, final={:.1}%",
            symbol, technical, fund.adjustment, final_confidence
        );

        if final_confidence < self.min_confidence {
            debug!(
                "{}: confidence {:.1}% below {:.1}% threshold",
                symbol, final_confidence, self.min_confidence
            );
            return Ok(None);
        }

        // Low-threshold requests relax the structural gate to one strong
        // category; everything else needs two.
        let min_strong = if self.min_confidence < 60.0 { 1 } else { 2 };
        if analysis.strong_categories < min_strong {
            debug!(
                "{}: only {} strong categories (need >= {})",
                symbol, analysis.strong_categories, min_strong
            );
            return Ok(None);
        }

        let entry = round2(*window.close.last().expect("non-empty window"));
        let ema8 = last_value(&set.ema_8).expect("ema8 defined past minimum history");
        let atr14 = last_value(&set.atr).expect("atr defined past minimum history");

        let book = SrDetector::new(window, SR_LOOKBACK).level_book();
        let levels = self.planner.plan(&book, symbol, entry, ema8, atr14)?;

        let risk = round2(entry - levels.stop_loss);
        let target1 = levels.targets[0].price;
        let reward = round2(target1 - entry);
        if risk <= 0.0 || reward <= 0.0 {
            return Err(PipelineError::InvariantViolation(format!(
                "{}: non-positive risk {:.2} or reward {:.2}",
                symbol, risk, reward
            )));
        }

        let tail_start = candles.len().saturating_sub(TAIL_CANDLES);
        let signal = Signal {
            symbol: symbol.to_string(),
            generated_at: Utc::now(),
            signal_type: SignalType::Buy,
            confidence: round2(final_confidence),
            original_confidence: None,
            sentiment_adjusted: None,
            technical_confidence: round2(technical),
            fundamental_score: fund.raw,
            fundamental_adjustment: fund.adjustment,
            entry_price: entry,
            stop_loss: levels.stop_loss,
            target1,
            target2: levels.targets.get(1).map(|t| t.price),
            target3: levels.targets.get(2).map(|t| t.price),
            risk,
            reward,
            rr_ratio: round2(reward / risk),
            analysis,
            sentiment: None,
            technical_analysis: None,
            tail_candles: candles[tail_start..].to_vec(),
            fundamentals: fundamentals.cloned(),
        };

        info!(
            "{}: BUY signal (confidence {:.1}%, entry {:.2}, stop {:.2}, target1 {:.2})",
            symbol, signal.confidence, signal.entry_price, signal.stop_loss, signal.target1
        );
        Ok(Some(signal))
    }

    /// All three category reports plus the weighted composite
    pub fn analyze(
        &self,
        window: &CandleWindow,
        set: &IndicatorSet,
    ) -> Result<Analysis, PipelineError> {
        let trend = self.analyze_trend(window, set)?;
        let momentum = self.analyze_momentum(set)?;
        let volatility = self.analyze_volatility(window, set)?;

        let technical_confidence = trend.score * TREND_WEIGHT
            + momentum.score * MOMENTUM_WEIGHT
            + volatility.score * VOLATILITY_WEIGHT;
        let strong_categories = [&trend, &momentum, &volatility]
            .iter()
            .filter(|c| c.is_strong())
            .count() as u8;

        Ok(Analysis {
            trend,
            momentum,
            volatility,
            technical_confidence,
            strong_categories,
        })
    }

    fn analyze_trend(
        &self,
        window: &CandleWindow,
        set: &IndicatorSet,
    ) -> Result<CategoryReport, PipelineError> {
        let need = |v: Option<f64>| v.ok_or(PipelineError::InsufficientData {
            have: window.len(),
            need: MIN_CANDLES,
        });

        let close = *window.close.last().expect("non-empty window");
        let ema8 = need(last_value(&set.ema_8))?;
        let ema20 = need(last_value(&set.ema_20))?;
        let ema50 = need(last_value(&set.ema_50))?;
        let macd_line = need(last_value(&set.macd.macd))?;
        let macd_signal = need(last_value(&set.macd.signal))?;
        let (hist_prev, hist_last) = need_pair(&set.macd.histogram, window.len())?;

        Ok(CategoryReport::from_conditions(vec![
            check("ema_aligned", ema8 > ema20 && ema20 > ema50),
            check("price_above_ema8", close > ema8),
            check("macd_bullish", macd_line > macd_signal),
            check("macd_positive", macd_line > 0.0),
            check("macd_hist_increasing", hist_last > hist_prev),
        ]))
    }

    fn analyze_momentum(&self, set: &IndicatorSet) -> Result<CategoryReport, PipelineError> {
        let have = set.rsi.len();
        let need = |v: Option<f64>| v.ok_or(PipelineError::InsufficientData {
            have,
            need: MIN_CANDLES,
        });

        let rsi = need(last_value(&set.rsi))?;
        let stoch_k = need(last_value(&set.stochastic.k))?;
        let stoch_d = need(last_value(&set.stochastic.d))?;

        Ok(CategoryReport::from_conditions(vec![
            check("rsi_healthy", (40.0..=75.0).contains(&rsi)),
            check("stoch_not_overbought", stoch_k < 80.0),
            check("stoch_bullish", stoch_k > stoch_d),
        ]))
    }

    fn analyze_volatility(
        &self,
        window: &CandleWindow,
        set: &IndicatorSet,
    ) -> Result<CategoryReport, PipelineError> {
        let n = window.len();
        let need = |v: Option<f64>| v.ok_or(PipelineError::InsufficientData {
            have: n,
            need: MIN_CANDLES,
        });

        let close = *window.close.last().expect("non-empty window");
        let upper = need(last_value(&set.bollinger.upper))?;
        let lower = need(last_value(&set.bollinger.lower))?;
        let (width_prev, width_last) = need_pair(&set.bollinger.width, n)?;
        let (atr_prev, atr_last) = need_pair(&set.atr, n)?;

        let band = upper - lower;
        let near_lower = (close - lower) < band * 0.3;

        Ok(CategoryReport::from_conditions(vec![
            check("near_lower_band", near_lower),
            check("atr_increasing", atr_last > atr_prev),
            check("band_width_expanding", width_last > width_prev),
        ]))
    }

    /// Bounded fundamental scoring: P/E and ROE and D/E contribute up to
    /// ten points each, P/B and market cap up to five; the raw sum is
    /// halved into the adjustment. Missing data scores zero.
    pub fn score_fundamentals(fundamentals: Option<&Fundamentals>) -> FundamentalScore {
        let Some(f) = fundamentals else {
            return FundamentalScore::default();
        };

        let mut raw = 0;
        let mut breakdown = Vec::new();
        let mut add = |name: &'static str, points: i32| {
            raw += points;
            breakdown.push((name, points));
        };

        match f.trailing_pe {
            Some(pe) if pe > 0.0 => {
                if (10.0..=25.0).contains(&pe) {
                    add("pe", 10);
                } else if (5.0..10.0).contains(&pe) || (25.0..=35.0).contains(&pe) {
                    add("pe", 5);
                } else if pe > 50.0 {
                    add("pe", -10);
                } else if pe < 5.0 {
                    add("pe", -5);
                } else {
                    add("pe", 0);
                }
            }
            _ => add("pe", 0),
        }

        match f.return_on_equity {
            Some(roe) if roe >= 0.20 => add("roe", 10),
            Some(roe) if roe >= 0.15 => add("roe", 5),
            Some(roe) if roe >= 0.10 => add("roe", 0),
            Some(_) => add("roe", -10),
            None => add("roe", 0),
        }

        match f.debt_to_equity {
            Some(de) if de < 0.5 => add("debt", 10),
            Some(de) if de < 1.0 => add("debt", 5),
            Some(de) if de < 2.0 => add("debt", 0),
            Some(_) => add("debt", -10),
            None => add("debt", 0),
        }

        match f.price_to_book {
            Some(pb) if pb > 0.0 => {
                if (1.0..=3.0).contains(&pb) {
                    add("pb", 5);
                } else if pb > 10.0 {
                    add("pb", -5);
                } else {
                    add("pb", 0);
                }
            }
            _ => add("pb", 0),
        }

        match f.market_cap_crores() {
            Some(cr) if cr > 100_000.0 => add("market_cap", 5),
            Some(cr) if cr > 10_000.0 => add("market_cap", 2),
            Some(cr) if cr < 1_000.0 => add("market_cap", -5),
            Some(_) => add("market_cap", 0),
            None => add("market_cap", 0),
        }

        FundamentalScore {
            raw,
            adjustment: f64::from(raw) / 2.0,
            breakdown,
        }
    }
}

fn check(name: &'static str, met: bool) -> ConditionCheck {
    ConditionCheck { name, met }
}

fn last_value(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

fn need_pair(series: &[Option<f64>], have: usize) -> Result<(f64, f64), PipelineError> {
    let err = || PipelineError::InsufficientData {
        have,
        need: MIN_CANDLES,
    };
    if series.len() < 2 {
        return Err(err());
    }
    let last = series[series.len() - 1].ok_or_else(err)?;
    let prev = series[series.len() - 2].ok_or_else(err)?;
    Ok((prev, last))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let open = if i == 0 { c } else { closes[i - 1] };
                let high = open.max(c) * 1.005;
                let low = open.min(c) * 0.995;
                Candle {
                    symbol: "ACME.NS".to_string(),
                    timeframe: Timeframe::OneDay,
                    time: start + Duration::days(i as i64),
                    open: Decimal::from_f64(open).unwrap(),
                    high: Decimal::from_f64(high).unwrap(),
                    low: Decimal::from_f64(low).unwrap(),
                    close: Decimal::from_f64(c).unwrap(),
                    volume: 100_000,
                }
            })
            .collect()
    }

    /// A gentle, persistent uptrend: bullish trend category, sane momentum
    fn uptrend_closes(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let wiggle = match i % 4 {
                    0 => 0.0,
                    1 => 0.4,
                    2 => 0.1,
                    _ => 0.5,
                };
                100.0 + i as f64 * 0.6 + wiggle
            })
            .collect()
    }

    fn rich_fundamentals() -> Fundamentals {
        let mut f = Fundamentals::empty("ACME.NS");
        f.trailing_pe = Some(18.0);
        f.return_on_equity = Some(0.22);
        f.debt_to_equity = Some(0.4);
        f.price_to_book = Some(2.5);
        f.market_cap = Some(80_000.0 * 1e7);
        f
    }

    #[test]
    fn test_insufficient_data_rejected() {
        let strategy = ScoredStrategy::default();
        let candles = candles_from_closes(&uptrend_closes(30));
        let err = strategy.evaluate("ACME.NS", &candles, None).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { have: 30, need: 50 }));
    }

    #[test]
    fn test_fundamental_scoring_matches_reference_case() {
        // P/E 18 (+10), ROE 0.22 (+10), D/E 0.4 (+10), P/B 2.5 (+5),
        // 80,000 Cr market cap (+2) -> raw 37, adjustment 18.5
        let f = rich_fundamentals();
        let score = ScoredStrategy::score_fundamentals(Some(&f));
        assert_eq!(score.raw, 37);
        assert!((score.adjustment - 18.5).abs() < 1e-9);
    }

    #[test]
    fn test_fundamental_scoring_absent_is_zero() {
        let score = ScoredStrategy::score_fundamentals(None);
        assert_eq!(score.raw, 0);
        assert_eq!(score.adjustment, 0.0);
    }

    #[test]
    fn test_fundamental_scoring_penalises_weakness() {
        let mut f = Fundamentals::empty("WEAK.NS");
        f.trailing_pe = Some(80.0); // -10
        f.return_on_equity = Some(0.02); // -10
        f.debt_to_equity = Some(3.0); // -10
        f.price_to_book = Some(15.0); // -5
        f.market_cap = Some(500.0 * 1e7); // -5
        let score = ScoredStrategy::score_fundamentals(Some(&f));
        assert_eq!(score.raw, -40);
        assert!((score.adjustment + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_reference_confidence_arithmetic() {
        // Category scores 4/5, 2/3 and 1/3 with the reference fundamentals:
        // 0.40*80 + 0.35*66.67 + 0.25*33.33 = 63.67, +18.5 -> 82.17
        let technical = 80.0 * TREND_WEIGHT
            + (200.0 / 3.0) * MOMENTUM_WEIGHT
            + (100.0 / 3.0) * VOLATILITY_WEIGHT;
        assert!((technical - 63.6667).abs() < 0.01);

        let adjustment = ScoredStrategy::score_fundamentals(Some(&rich_fundamentals())).adjustment;
        let final_confidence = (technical + adjustment).clamp(0.0, 100.0);
        assert!((final_confidence - 82.17).abs() < 0.01);
    }

    #[test]
    fn test_composite_confidence_weighting() {
        // Technical confidence must stay inside [0, 100] and equal the
        // weighted sum of the category scores.
        let strategy = ScoredStrategy::default();
        let candles = candles_from_closes(&uptrend_closes(120));
        let window = CandleWindow::from_candles(&candles);
        let set = IndicatorSet::compute(&window);
        let analysis = strategy.analyze(&window, &set).unwrap();

        let expected = analysis.trend.score * TREND_WEIGHT
            + analysis.momentum.score * MOMENTUM_WEIGHT
            + analysis.volatility.score * VOLATILITY_WEIGHT;
        assert!((analysis.technical_confidence - expected).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&analysis.technical_confidence));
    }

    #[test]
    fn test_emitted_signal_invariants() {
        let strategy = ScoredStrategy::new(40.0, LevelPlanner::default());
        let candles = candles_from_closes(&uptrend_closes(120));
        let signal = strategy
            .evaluate("ACME.NS", &candles, Some(&rich_fundamentals()))
            .unwrap();

        if let Some(s) = signal {
            assert!(s.stop_loss < s.entry_price);
            assert!(s.target1 > s.entry_price);
            assert!(s.risk > 0.0);
            assert!(s.reward > 0.0);
            assert!((0.0..=100.0).contains(&s.confidence));
            if let (Some(t2), Some(t3)) = (s.target2, s.target3) {
                assert!(s.target1 < t2);
                assert!(t2 < t3);
            }
            assert_eq!(s.tail_candles.len(), 30);
        }
    }

    #[test]
    fn test_no_signal_below_threshold() {
        // A flat, noiseless series scores poorly on every category
        let strategy = ScoredStrategy::default();
        let closes: Vec<f64> = (0..100)
            .map(|i| 100.0 + if i % 2 == 0 { 0.2 } else { -0.2 })
            .collect();
        let candles = candles_from_closes(&closes);
        let result = strategy.evaluate("FLAT.NS", &candles, None).unwrap();
        assert!(result.is_none());
    }
}
