//! Relative volume.
//!
//! ratio[i] = volume[i] / mean(volume[i-n+1..=i]). A zero mean yields 0.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_volume_ratio(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut window_sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        window_sum += bar.volume;
        if period > 0 && i >= period {
            window_sum -= bars[i - period].volume;
        }

        let valid = period > 0 && i + 1 >= period;
        let ratio = if valid {
            let mean = window_sum / period as f64;
            if mean > 0.0 { bar.volume / mean } else { 0.0 }
        } else {
            0.0
        };

        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid,
            value: IndicatorValue::Simple(ratio),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::VolumeRatio(period),
        values,
    }
}
