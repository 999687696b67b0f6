#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tiertrader::domain::error::TiertraderError;
pub use tiertrader::domain::ohlcv::OhlcvBar;
use tiertrader::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, asset: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(asset.to_string(), bars);
        self
    }

    pub fn with_error(mut self, asset: &str, reason: &str) -> Self {
        self.errors.insert(asset.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, asset: &str) -> Result<Vec<OhlcvBar>, TiertraderError> {
        if let Some(reason) = self.errors.get(asset) {
            return Err(TiertraderError::DataRead {
                asset: asset.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(asset).cloned().unwrap_or_default())
    }

    fn list_assets(&self) -> Result<Vec<String>, TiertraderError> {
        let mut assets: Vec<String> = self.data.keys().cloned().collect();
        assets.sort();
        Ok(assets)
    }
}

pub fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn make_bar(index: usize, open: f64, close: f64) -> OhlcvBar {
    OhlcvBar {
        timestamp: start_time() + Duration::hours(index as i64),
        open,
        high: open.max(close) + 0.1,
        low: open.min(close) - 0.1,
        close,
        volume: 1000.0,
    }
}

/// Bars built from a close series; each bar opens at the previous close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    let mut prev = closes.first().copied().unwrap_or(100.0);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let bar = make_bar(i, prev, close);
            prev = close;
            bar
        })
        .collect()
}

/// Range-bound hourly tape around 100 with a sharp spike every 20 bars from
/// bar 60, alternating down to 94 and up to 106.
///
/// Each spike closes beyond the Bollinger band with RSI at an extreme, so a
/// medium-tier asset trades them as alternating long and short reversions.
pub fn sideways_spikes(count: usize) -> Vec<OhlcvBar> {
    let mut spikes = 0;
    let closes: Vec<f64> = (0..count)
        .map(|i| {
            if i >= 60 && (i - 60) % 20 == 0 {
                spikes += 1;
                if spikes % 2 == 1 { 94.0 } else { 106.0 }
            } else if i % 2 == 0 {
                100.15
            } else {
                99.85
            }
        })
        .collect();
    range_start(bars_from_closes(&closes))
}

/// `chop` bars of the same range-bound tape, then a steady climb of 5% over
/// `rise_bars` bars and a single bar giving back 1% of the high.
pub fn rise_then_retrace(chop: usize, rise_bars: usize) -> Vec<OhlcvBar> {
    let mut closes: Vec<f64> = (0..chop)
        .map(|i| if i % 2 == 0 { 100.15 } else { 99.85 })
        .collect();
    closes.extend((1..=rise_bars).map(|k| 100.0 + 5.0 * k as f64 / rise_bars as f64));
    closes.push(105.0 * 0.99);
    range_start(bars_from_closes(&closes))
}

fn range_start(mut bars: Vec<OhlcvBar>) -> Vec<OhlcvBar> {
    if let Some(first) = bars.first_mut() {
        first.open = 100.0;
        first.high = first.high.max(100.1);
        first.low = first.low.min(99.9);
    }
    bars
}

/// Steady drift of `step` per bar with constant volume.
pub fn linear_trend(count: usize, start: f64, step: f64) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
    bars_from_closes(&closes)
}
