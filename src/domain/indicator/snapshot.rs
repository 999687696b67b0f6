//! Per-bar indicator snapshots.
//!
//! [`IndicatorFrame`] computes every series once over a bar sequence and hands
//! out [`IndicatorSnapshot`]s by index. Because each series is causal, the
//! snapshot at index `i` equals the one obtained from `bars[..=i]` alone.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::domain::error::TiertraderError;
use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::compute_indicators;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::config_port::ConfigPort;

/// Lookback periods for every series a snapshot needs.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    pub bollinger_period: usize,
    pub bollinger_stddev_x100: u32,
    pub atr_period: usize,
    pub atr_mean_period: usize,
    pub volume_period: usize,
    pub channel_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_fast: 9,
            ema_slow: 21,
            ema_trend: 50,
            bollinger_period: 20,
            bollinger_stddev_x100: 200,
            atr_period: 14,
            atr_mean_period: 20,
            volume_period: 20,
            channel_period: 20,
        }
    }
}

impl IndicatorConfig {
    /// Same periods with a different band width.
    pub fn with_band_stddev(&self, stddev: f64) -> Self {
        Self {
            bollinger_stddev_x100: (stddev * 100.0).round().max(0.0) as u32,
            ..self.clone()
        }
    }

    /// Reads `[indicators]` periods, keeping defaults for absent keys.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TiertraderError> {
        let base = Self::default();
        let period = |key: &str, default: usize| -> Result<usize, TiertraderError> {
            let value = config.get_int("indicators", key, default as i64);
            match usize::try_from(value) {
                Ok(p) if p > 0 => Ok(p),
                _ => Err(TiertraderError::ConfigInvalid {
                    section: "indicators".to_string(),
                    key: key.to_string(),
                    reason: format!("{} must be a positive integer", key),
                }),
            }
        };

        Ok(Self {
            rsi_period: period("rsi_period", base.rsi_period)?,
            ema_fast: period("ema_fast", base.ema_fast)?,
            ema_slow: period("ema_slow", base.ema_slow)?,
            ema_trend: period("ema_trend", base.ema_trend)?,
            bollinger_period: period("bollinger_period", base.bollinger_period)?,
            bollinger_stddev_x100: base.bollinger_stddev_x100,
            atr_period: period("atr_period", base.atr_period)?,
            atr_mean_period: period("atr_mean_period", base.atr_mean_period)?,
            volume_period: period("volume_period", base.volume_period)?,
            channel_period: period("channel_period", base.channel_period)?,
        })
    }

    /// Bars needed before the first complete snapshot.
    ///
    /// RSI needs one extra bar for its first change and one more so the
    /// previous RSI exists; the channel excludes the current bar.
    pub fn required_history(&self) -> usize {
        [
            self.rsi_period + 2,
            self.ema_fast,
            self.ema_slow,
            self.ema_trend,
            self.bollinger_period,
            self.atr_period + self.atr_mean_period.saturating_sub(1),
            self.volume_period,
            self.channel_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    fn bollinger_type(&self) -> IndicatorType {
        IndicatorType::Bollinger {
            period: self.bollinger_period,
            stddev_mult_x100: self.bollinger_stddev_x100,
        }
    }

    fn atr_mean_type(&self) -> IndicatorType {
        IndicatorType::AtrMean {
            atr_period: self.atr_period,
            period: self.atr_mean_period,
        }
    }

    /// Every series a snapshot reads.
    pub fn indicator_types(&self) -> Vec<IndicatorType> {
        vec![
            IndicatorType::Rsi(self.rsi_period),
            IndicatorType::Ema(self.ema_fast),
            IndicatorType::Ema(self.ema_slow),
            IndicatorType::Ema(self.ema_trend),
            self.bollinger_type(),
            IndicatorType::Atr(self.atr_period),
            self.atr_mean_type(),
            IndicatorType::VolumeRatio(self.volume_period),
            IndicatorType::Channel(self.channel_period),
            IndicatorType::BreakoutStreak(self.channel_period),
        ]
    }
}

/// Indicator values of one bar, computed from that bar and its predecessors.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub rsi: f64,
    pub prev_rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub ema_trend: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub atr: f64,
    pub atr_mean: f64,
    pub volume_ratio: f64,
    pub resistance: f64,
    pub support: f64,
    pub breakout_up: usize,
    pub breakout_down: usize,
}

impl IndicatorSnapshot {
    /// ATR as a fraction of the close.
    pub fn atr_pct(&self) -> f64 {
        if self.close > 0.0 {
            self.atr / self.close
        } else {
            0.0
        }
    }

    /// (fast - slow) / close; positive in an up-trend.
    pub fn ema_separation(&self) -> f64 {
        if self.close > 0.0 {
            (self.ema_fast - self.ema_slow) / self.close
        } else {
            0.0
        }
    }
}

/// All series of one bar sequence, computed once.
pub struct IndicatorFrame<'a> {
    bars: &'a [OhlcvBar],
    config: IndicatorConfig,
    series: HashMap<IndicatorType, IndicatorSeries>,
}

impl<'a> IndicatorFrame<'a> {
    pub fn compute(bars: &'a [OhlcvBar], config: &IndicatorConfig) -> Self {
        let series = compute_indicators(bars, &config.indicator_types());
        Self {
            bars,
            config: config.clone(),
            series,
        }
    }

    fn simple(&self, indicator_type: &IndicatorType, index: usize) -> Option<f64> {
        self.series.get(indicator_type)?.simple_at(index)
    }

    fn value(&self, indicator_type: &IndicatorType, index: usize) -> Option<&IndicatorValue> {
        self.series.get(indicator_type)?.value_at(index)
    }

    /// Snapshot at `index`, or `InsufficientHistory` while any series is
    /// still warming up.
    pub fn snapshot(&self, index: usize) -> Result<IndicatorSnapshot, TiertraderError> {
        let needed = self.config.required_history();
        let available = (index + 1).min(self.bars.len());
        let insufficient = TiertraderError::InsufficientHistory { needed, available };

        if index >= self.bars.len() || available < needed || index == 0 {
            return Err(insufficient);
        }

        let c = &self.config;
        let bar = &self.bars[index];

        let fields = (|| {
            let rsi_type = IndicatorType::Rsi(c.rsi_period);
            let rsi = self.simple(&rsi_type, index)?;
            let prev_rsi = self.simple(&rsi_type, index - 1)?;
            let ema_fast = self.simple(&IndicatorType::Ema(c.ema_fast), index)?;
            let ema_slow = self.simple(&IndicatorType::Ema(c.ema_slow), index)?;
            let ema_trend = self.simple(&IndicatorType::Ema(c.ema_trend), index)?;
            let (bb_upper, bb_middle, bb_lower) = match self.value(&c.bollinger_type(), index)? {
                IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                } => (*upper, *middle, *lower),
                _ => return None,
            };
            let atr = self.simple(&IndicatorType::Atr(c.atr_period), index)?;
            let atr_mean = self.simple(&c.atr_mean_type(), index)?;
            let volume_ratio = self.simple(&IndicatorType::VolumeRatio(c.volume_period), index)?;
            let (resistance, support) =
                match self.value(&IndicatorType::Channel(c.channel_period), index)? {
                    IndicatorValue::Channel {
                        resistance,
                        support,
                    } => (*resistance, *support),
                    _ => return None,
                };
            let (breakout_up, breakout_down) =
                match self.value(&IndicatorType::BreakoutStreak(c.channel_period), index)? {
                    IndicatorValue::Streak { up, down } => (*up, *down),
                    _ => return None,
                };

            Some(IndicatorSnapshot {
                index,
                timestamp: bar.timestamp,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                rsi,
                prev_rsi,
                ema_fast,
                ema_slow,
                ema_trend,
                bb_upper,
                bb_middle,
                bb_lower,
                atr,
                atr_mean,
                volume_ratio,
                resistance,
                support,
                breakout_up,
                breakout_down,
            })
        })();

        fields.ok_or(insufficient)
    }
}

/// Stateless entry point for computing snapshots from raw history.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn frame<'a>(&self, bars: &'a [OhlcvBar]) -> IndicatorFrame<'a> {
        IndicatorFrame::compute(bars, &self.config)
    }

    /// Snapshot of the last bar of `history`.
    pub fn snapshot(&self, history: &[OhlcvBar]) -> Result<IndicatorSnapshot, TiertraderError> {
        if history.is_empty() {
            return Err(TiertraderError::InsufficientHistory {
                needed: self.config.required_history(),
                available: 0,
            });
        }
        self.frame(history).snapshot(history.len() - 1)
    }
}
