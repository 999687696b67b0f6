//! Shared helper functions for indicator calculations.

use std::collections::HashMap;

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, bollinger, channel, ema, rsi,
    volume,
};
use crate::domain::ohlcv::OhlcvBar;

/// Average True Range with Wilder smoothing, seeded by the mean of the first
/// `period` true ranges. The first bar's true range is its high - low.
pub fn calc_atr(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    if bars.len() < period || period == 0 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Atr(period),
            values: vec![],
        };
    }

    let mut results: Vec<IndicatorPoint> = Vec::with_capacity(bars.len());
    let mut atr = 0.0;
    let mut seed_sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        let tr = if i == 0 {
            bar.high - bar.low
        } else {
            bar.true_range(bars[i - 1].close)
        };

        let valid = i + 1 >= period;
        if i + 1 < period {
            seed_sum += tr;
        } else if i + 1 == period {
            atr = (seed_sum + tr) / period as f64;
        } else {
            atr = (atr * (period - 1) as f64 + tr) / period as f64;
        }

        results.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid,
            value: IndicatorValue::Simple(if valid { atr } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values: results,
    }
}

/// Simple mean of the last `period` valid ATR values.
pub fn calc_atr_mean(atr: &IndicatorSeries, period: usize) -> IndicatorSeries {
    let atr_period = match atr.indicator_type {
        IndicatorType::Atr(p) => p,
        _ => 0,
    };

    let mut values = Vec::with_capacity(atr.values.len());
    let mut run = 0usize;
    let mut window_sum = 0.0;

    for (i, point) in atr.values.iter().enumerate() {
        let current = atr.simple_at(i);
        match current {
            Some(v) => {
                run += 1;
                window_sum += v;
                if period > 0 && run > period {
                    window_sum -= atr.simple_at(i - period).unwrap_or(0.0);
                }
            }
            None => {
                run = 0;
                window_sum = 0.0;
            }
        }

        let valid = period > 0 && run >= period;
        values.push(IndicatorPoint {
            timestamp: point.timestamp,
            valid,
            value: IndicatorValue::Simple(if valid {
                window_sum / period as f64
            } else {
                0.0
            }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::AtrMean { atr_period, period },
        values,
    }
}

/// Computes every requested indicator over `bars`, keyed by type.
///
/// Series that derive from another series (ATR mean, breakout streak) reuse
/// the already computed parent when it was requested, and compute it on the
/// side otherwise.
pub fn compute_indicators(
    bars: &[OhlcvBar],
    types: &[IndicatorType],
) -> HashMap<IndicatorType, IndicatorSeries> {
    let mut map: HashMap<IndicatorType, IndicatorSeries> = HashMap::new();

    for indicator_type in types {
        if map.contains_key(indicator_type) {
            continue;
        }
        let series = match indicator_type {
            IndicatorType::Ema(p) => ema::calculate_ema(bars, *p),
            IndicatorType::Rsi(p) => rsi::calculate_rsi(bars, *p),
            IndicatorType::Atr(p) => calc_atr(bars, *p),
            IndicatorType::AtrMean { atr_period, period } => {
                match map.get(&IndicatorType::Atr(*atr_period)) {
                    Some(atr) => calc_atr_mean(atr, *period),
                    None => calc_atr_mean(&calc_atr(bars, *atr_period), *period),
                }
            }
            IndicatorType::VolumeRatio(p) => volume::calculate_volume_ratio(bars, *p),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => bollinger::calculate_bollinger(bars, *period, *stddev_mult_x100),
            IndicatorType::Channel(p) => channel::calculate_channel(bars, *p),
            IndicatorType::BreakoutStreak(p) => match map.get(&IndicatorType::Channel(*p)) {
                Some(levels) => channel::calculate_breakout_streak(bars, levels),
                None => channel::calculate_breakout_streak(bars, &channel::calculate_channel(bars, *p)),
            },
        };
        map.insert(indicator_type.clone(), series);
    }

    map
}
