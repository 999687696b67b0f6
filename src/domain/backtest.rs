//! Backtest runner.
//!
//! One asset at a time, bar by bar: advance the open position, then score
//! the bar if no position is open. A signal that clears the confluence gates and whose risk plan
//! validates opens a position at the bar close; the position is first
//! advanced on the next bar. Whatever is still open after the last bar is
//! closed there with TIME_OUT.

use chrono::Duration;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::asset_profile::{AssetProfile, ProfileResolver, observed_volatility};
use crate::domain::confluence::{self, Signal};
use crate::domain::error::TiertraderError;
use crate::domain::indicator::snapshot::{IndicatorConfig, IndicatorFrame};
use crate::domain::metrics::Summary;
use crate::domain::ohlcv::{OhlcvBar, validate_bars};
use crate::domain::position::{Position, TradeRecord, Transition};
use crate::domain::risk::resolve_risk;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub indicators: IndicatorConfig,
    /// Expected bar spacing; inferred from the data when `None`.
    pub interval: Option<Duration>,
    pub parallel: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorConfig::default(),
            interval: None,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub bars_evaluated: usize,
    pub bars_skipped: usize,
    /// Signals emitted while flat.
    pub signals: usize,
    /// Signals whose direction was flipped by risk validation.
    pub corrected: usize,
    /// Signals discarded by risk validation.
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub asset: String,
    pub profile: AssetProfile,
    pub trades: Vec<TradeRecord>,
    pub signals: Vec<Signal>,
    pub stats: RunStats,
}

impl BacktestResult {
    pub fn summary(&self) -> Summary {
        Summary::compute(&self.trades)
    }
}

/// Runs one asset through the full pipeline.
///
/// Fails with `NoData` for an empty series and `InvalidBars` when the
/// sequence has bad prices, duplicates, reordering or gaps.
pub fn run_backtest(
    asset: &str,
    bars: &[OhlcvBar],
    profile: &AssetProfile,
    config: &BacktestConfig,
) -> Result<BacktestResult, TiertraderError> {
    if bars.is_empty() {
        return Err(TiertraderError::NoData {
            asset: asset.to_string(),
        });
    }
    validate_bars(asset, bars, config.interval)?;

    let params = &profile.params;
    let indicators = config.indicators.with_band_stddev(params.band_stddev);
    let frame = IndicatorFrame::compute(bars, &indicators);

    let mut stats = RunStats::default();
    let mut trades = Vec::new();
    let mut signals = Vec::new();
    let mut open: Option<Position> = None;
    let mut next_id = 1u64;

    for (i, bar) in bars.iter().enumerate() {
        // Stage 1: advance the open position through this bar.
        if let Some(position) = open.take() {
            match position.advance(bar, i) {
                Transition::Holding(position) => open = Some(position),
                Transition::Closed(record) => {
                    debug!(
                        asset,
                        id = record.id,
                        exit = %record.exit_reason,
                        pnl_pct = record.pnl_pct,
                        "position closed"
                    );
                    trades.push(record);
                }
            }
        }

        // Stage 2: score the bar while flat.
        let snap = match frame.snapshot(i) {
            Ok(snap) => snap,
            Err(_) => {
                stats.bars_skipped += 1;
                continue;
            }
        };
        stats.bars_evaluated += 1;
        if open.is_some() {
            continue;
        }

        let Some(signal) = confluence::evaluate(&snap, params) else {
            continue;
        };
        stats.signals += 1;

        // Stage 3: resolve risk and open.
        let opened = resolve_risk(&signal, &snap, params)
            .and_then(|plan| Position::open(next_id, asset, &signal, &plan, params));
        match opened {
            Ok(position) => {
                if position.side != signal.side {
                    stats.corrected += 1;
                }
                debug!(
                    asset,
                    id = position.id,
                    side = %position.side,
                    entry = position.entry_price,
                    stop = position.stop,
                    target = position.target,
                    confidence = signal.confidence,
                    "position opened"
                );
                next_id += 1;
                open = Some(position);
            }
            Err(e) => {
                stats.rejected += 1;
                debug!(asset, bar = i, error = %e, "signal discarded");
            }
        }
        signals.push(signal);
    }

    if let Some(position) = open.take() {
        let last = bars.len() - 1;
        trades.push(position.force_close(&bars[last], last));
    }

    info!(
        asset,
        tier = %profile.tier,
        bars = bars.len(),
        evaluated = stats.bars_evaluated,
        signals = stats.signals,
        corrected = stats.corrected,
        rejected = stats.rejected,
        trades = trades.len(),
        "backtest complete"
    );

    Ok(BacktestResult {
        asset: asset.to_string(),
        profile: profile.clone(),
        trades,
        signals,
        stats,
    })
}

/// Bars for one asset of a batch.
#[derive(Debug, Clone)]
pub struct AssetJob {
    pub asset: String,
    pub bars: Vec<OhlcvBar>,
}

/// Outcome for one asset of a batch; failures stay per asset.
#[derive(Debug)]
pub struct AssetOutcome {
    pub asset: String,
    pub result: Result<BacktestResult, TiertraderError>,
}

fn run_job(job: &AssetJob, resolver: &ProfileResolver, config: &BacktestConfig) -> AssetOutcome {
    // Only the warm-up window classifies; later bars never move the tier.
    let warmup = config.indicators.required_history().min(job.bars.len());
    let observed = observed_volatility(&job.bars[..warmup], config.indicators.atr_period);
    let profile = resolver.resolve(&job.asset, observed);
    AssetOutcome {
        asset: job.asset.clone(),
        result: run_backtest(&job.asset, &job.bars, &profile, config),
    }
}

/// Runs every job, in parallel unless `config.parallel` is off.
///
/// Outcomes come back in job order.
pub fn run_batch(
    jobs: &[AssetJob],
    resolver: &ProfileResolver,
    config: &BacktestConfig,
) -> Vec<AssetOutcome> {
    if config.parallel {
        jobs.par_iter()
            .map(|job| run_job(job, resolver, config))
            .collect()
    } else {
        jobs.iter()
            .map(|job| run_job(job, resolver, config))
            .collect()
    }
}
