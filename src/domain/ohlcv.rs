//! OHLCV bar representation and ingestion checks.

use chrono::{Duration, NaiveDateTime};

use crate::domain::error::TiertraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Smallest positive step between consecutive timestamps.
pub fn infer_interval(bars: &[OhlcvBar]) -> Option<Duration> {
    bars.windows(2)
        .map(|w| w[1].timestamp - w[0].timestamp)
        .filter(|d| *d > Duration::zero())
        .min()
}

/// Rejects a bar sequence that cannot be simulated faithfully.
///
/// Checks, in order, for every bar: finite positive prices, `low <= high`,
/// non-negative volume, strictly increasing timestamps, and a constant step
/// equal to `interval` (inferred from the data when `None`). The first
/// failure is reported with its index; nothing is repaired.
pub fn validate_bars(
    asset: &str,
    bars: &[OhlcvBar],
    interval: Option<Duration>,
) -> Result<(), TiertraderError> {
    let invalid = |index: usize, reason: String| TiertraderError::InvalidBars {
        asset: asset.to_string(),
        index,
        reason,
    };

    for (i, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(invalid(i, "non-positive or non-finite price".into()));
        }
        if bar.low > bar.high {
            return Err(invalid(i, format!("low {} above high {}", bar.low, bar.high)));
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(invalid(i, "negative or non-finite volume".into()));
        }
    }

    let step = match interval.or_else(|| infer_interval(bars)) {
        Some(step) => step,
        None => {
            // Fewer than two distinct timestamps: only duplicates can be wrong.
            return match bars.windows(2).position(|w| w[1].timestamp <= w[0].timestamp) {
                Some(i) => Err(invalid(i + 1, "duplicate timestamp".into())),
                None => Ok(()),
            };
        }
    };

    for (i, w) in bars.windows(2).enumerate() {
        let delta = w[1].timestamp - w[0].timestamp;
        if delta == Duration::zero() {
            return Err(invalid(i + 1, format!("duplicate timestamp {}", w[1].timestamp)));
        }
        if delta < Duration::zero() {
            return Err(invalid(
                i + 1,
                format!("out-of-order timestamp {}", w[1].timestamp),
            ));
        }
        if delta != step {
            return Err(invalid(
                i + 1,
                format!(
                    "gap of {}s between {} and {} (expected {}s)",
                    delta.num_seconds(),
                    w[0].timestamp,
                    w[1].timestamp,
                    step.num_seconds()
                ),
            ));
        }
    }

    Ok(())
}
