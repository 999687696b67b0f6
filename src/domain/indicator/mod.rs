//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//!
//! Every series is causal: the point at index `i` depends only on bars `0..=i`.
//! [`snapshot`] combines the series into one per-bar view for the evaluators.

pub mod bollinger;
pub mod channel;
pub mod ema;
pub mod rsi;
pub mod snapshot;
pub mod volume;

use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
    /// Highest high / lowest low of the prior window, current bar excluded.
    Channel {
        resistance: f64,
        support: f64,
    },
    /// Consecutive closes beyond the channel, counting the current bar.
    Streak {
        up: usize,
        down: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    AtrMean {
        atr_period: usize,
        period: usize,
    },
    VolumeRatio(usize),
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Channel(usize),
    BreakoutStreak(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// The simple value at `index`, if present and past warmup.
    pub fn simple_at(&self, index: usize) -> Option<f64> {
        match self.values.get(index) {
            Some(IndicatorPoint {
                valid: true,
                value: IndicatorValue::Simple(v),
                ..
            }) => Some(*v),
            _ => None,
        }
    }

    /// The full value at `index`, if present and past warmup.
    pub fn value_at(&self, index: usize) -> Option<&IndicatorValue> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| &p.value)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::AtrMean { atr_period, period } => {
                write!(f, "ATR_MEAN({},{})", atr_period, period)
            }
            IndicatorType::VolumeRatio(period) => write!(f, "VOLUME_RATIO({})", period),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
            IndicatorType::Channel(period) => write!(f, "CHANNEL({})", period),
            IndicatorType::BreakoutStreak(period) => write!(f, "BREAKOUT_STREAK({})", period),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn point(valid: bool, value: IndicatorValue) -> IndicatorPoint {
        IndicatorPoint {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            valid,
            value,
        }
    }

    #[test]
    fn indicator_type_display() {
        assert_eq!(IndicatorType::Ema(9).to_string(), "EMA(9)");
        assert_eq!(
            IndicatorType::AtrMean {
                atr_period: 14,
                period: 20
            }
            .to_string(),
            "ATR_MEAN(14,20)"
        );
        assert_eq!(IndicatorType::Channel(20).to_string(), "CHANNEL(20)");
    }

    #[test]
    fn indicator_type_display_bollinger() {
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 250,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2.5)");
    }

    #[test]
    fn indicator_type_hash_eq() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(IndicatorType::Ema(9), "fast");
        map.insert(IndicatorType::Ema(21), "slow");
        map.insert(IndicatorType::VolumeRatio(20), "vol");

        assert_eq!(map.get(&IndicatorType::Ema(9)), Some(&"fast"));
        assert_eq!(map.get(&IndicatorType::Ema(21)), Some(&"slow"));
        assert_eq!(map.get(&IndicatorType::Rsi(9)), None);
    }

    #[test]
    fn simple_at_respects_validity() {
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Rsi(14),
            values: vec![
                point(false, IndicatorValue::Simple(0.0)),
                point(true, IndicatorValue::Simple(42.0)),
                point(
                    true,
                    IndicatorValue::Channel {
                        resistance: 1.0,
                        support: 0.5,
                    },
                ),
            ],
        };
        assert_eq!(series.simple_at(0), None);
        assert_eq!(series.simple_at(1), Some(42.0));
        assert_eq!(series.simple_at(2), None);
        assert_eq!(series.simple_at(3), None);
        assert!(series.value_at(2).is_some());
    }
}
