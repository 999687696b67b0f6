//! Rolling support/resistance and breakout streaks.
//!
//! The channel at bar i spans the n bars before it:
//! resistance = max(high[i-n..i]), support = min(low[i-n..i]).
//! Excluding the current bar lets its close be compared against the level.
//! Warmup: first n bars are invalid.
//!
//! The streak counts consecutive bars whose close is beyond their own channel,
//! so a fresh breakout has a streak of 1.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_channel(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = period > 0 && i >= period;
            let (resistance, support) = if valid {
                let window = &bars[i - period..i];
                let resistance = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
                let support = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
                (resistance, support)
            } else {
                (0.0, 0.0)
            };
            IndicatorPoint {
                timestamp: bar.timestamp,
                valid,
                value: IndicatorValue::Channel {
                    resistance,
                    support,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Channel(period),
        values,
    }
}

/// Breakout streaks derived from a channel series over the same bars.
pub fn calculate_breakout_streak(bars: &[OhlcvBar], channel: &IndicatorSeries) -> IndicatorSeries {
    let period = match channel.indicator_type {
        IndicatorType::Channel(p) => p,
        _ => 0,
    };

    let mut values = Vec::with_capacity(bars.len());
    let mut up = 0usize;
    let mut down = 0usize;

    for (i, bar) in bars.iter().enumerate() {
        let level = channel.value_at(i);
        let valid = level.is_some();
        match level {
            Some(IndicatorValue::Channel {
                resistance,
                support,
            }) => {
                up = if bar.close > *resistance { up + 1 } else { 0 };
                down = if bar.close < *support { down + 1 } else { 0 };
            }
            _ => {
                up = 0;
                down = 0;
            }
        }
        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid,
            value: IndicatorValue::Streak { up, down },
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::BreakoutStreak(period),
        values,
    }
}
