//! Strategy evaluators.
//!
//! Each evaluator reads one [`IndicatorSnapshot`] and the asset's tier
//! parameters and may cast a single directional [`Vote`]. Evaluators never
//! see other votes and cannot open positions; combining them is the job of
//! the confluence scorer.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::domain::asset_profile::TierParams;
use crate::domain::indicator::snapshot::IndicatorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Momentum,
    MeanReversion,
    TrendFollowing,
    VolumeBreakout,
    BandReversal,
    Pullback,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Momentum,
        StrategyKind::MeanReversion,
        StrategyKind::TrendFollowing,
        StrategyKind::VolumeBreakout,
        StrategyKind::BandReversal,
        StrategyKind::Pullback,
    ];

    /// Highest partial score this evaluator can cast.
    pub fn max_score(self) -> f64 {
        match self {
            StrategyKind::Momentum => 3.0,
            StrategyKind::MeanReversion => 3.0,
            StrategyKind::TrendFollowing => 2.0,
            StrategyKind::VolumeBreakout => 2.5,
            StrategyKind::BandReversal => 2.5,
            StrategyKind::Pullback => 1.5,
        }
    }

    /// Evaluators whose targets are bounded by the opposing band.
    pub fn is_reversion(self) -> bool {
        matches!(self, StrategyKind::MeanReversion | StrategyKind::BandReversal)
    }

    pub fn evaluate(self, snap: &IndicatorSnapshot, params: &TierParams) -> Option<Vote> {
        match self {
            StrategyKind::Momentum => momentum(snap, params),
            StrategyKind::MeanReversion => mean_reversion(snap, params),
            StrategyKind::TrendFollowing => trend_following(snap, params),
            StrategyKind::VolumeBreakout => volume_breakout(snap, params),
            StrategyKind::BandReversal => band_reversal(snap, params),
            StrategyKind::Pullback => pullback(snap, params),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Momentum => "momentum",
            StrategyKind::MeanReversion => "mean_reversion",
            StrategyKind::TrendFollowing => "trend_following",
            StrategyKind::VolumeBreakout => "volume_breakout",
            StrategyKind::BandReversal => "band_reversal",
            StrategyKind::Pullback => "pullback",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "momentum" => Ok(StrategyKind::Momentum),
            "mean_reversion" => Ok(StrategyKind::MeanReversion),
            "trend_following" | "trend" => Ok(StrategyKind::TrendFollowing),
            "volume_breakout" | "breakout" => Ok(StrategyKind::VolumeBreakout),
            "band_reversal" => Ok(StrategyKind::BandReversal),
            "pullback" => Ok(StrategyKind::Pullback),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// One evaluator's directional opinion on one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    pub strategy: StrategyKind,
    pub side: Side,
    pub score: f64,
    pub reasons: Vec<&'static str>,
}

impl Vote {
    fn new(strategy: StrategyKind, side: Side, score: f64, reasons: Vec<&'static str>) -> Self {
        Self {
            strategy,
            side,
            score,
            reasons,
        }
    }
}

/// Evaluates every strategy enabled for the tier.
pub fn collect_votes(snap: &IndicatorSnapshot, params: &TierParams) -> Vec<Vote> {
    params
        .strategies
        .iter()
        .filter_map(|kind| kind.evaluate(snap, params))
        .collect()
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// RSI leaves an extreme zone in the direction of the trend EMA, on volume.
fn momentum(snap: &IndicatorSnapshot, p: &TierParams) -> Option<Vote> {
    if snap.volume_ratio < p.volume_multiplier {
        return None;
    }
    let strong_volume = snap.volume_ratio >= p.volume_multiplier * 1.5;
    let bonus = if strong_volume { 1.0 } else { 0.0 };

    let (side, tag) = if snap.prev_rsi <= p.rsi_oversold
        && snap.rsi > p.rsi_oversold
        && snap.close > snap.ema_trend
    {
        (Side::Long, "RSI_OVERSOLD_CROSS")
    } else if snap.prev_rsi >= p.rsi_overbought
        && snap.rsi < p.rsi_overbought
        && snap.close < snap.ema_trend
    {
        (Side::Short, "RSI_OVERBOUGHT_CROSS")
    } else {
        return None;
    };

    let mut reasons = vec![tag];
    if strong_volume {
        reasons.push("VOLUME_CONFIRMED");
    }
    Some(Vote::new(StrategyKind::Momentum, side, 2.0 + bonus, reasons))
}

/// Close outside a band votes for a return, weighted by RSI extremity.
fn mean_reversion(snap: &IndicatorSnapshot, p: &TierParams) -> Option<Vote> {
    if snap.close < snap.bb_lower {
        let extremity = clamp01((50.0 - snap.rsi) / (50.0 - p.rsi_oversold));
        let mut reasons = vec!["BELOW_LOWER_BAND"];
        if snap.rsi <= p.rsi_oversold {
            reasons.push("RSI_OVERSOLD");
        }
        Some(Vote::new(
            StrategyKind::MeanReversion,
            Side::Long,
            1.0 + 2.0 * extremity,
            reasons,
        ))
    } else if snap.close > snap.bb_upper {
        let extremity = clamp01((snap.rsi - 50.0) / (p.rsi_overbought - 50.0));
        let mut reasons = vec!["ABOVE_UPPER_BAND"];
        if snap.rsi >= p.rsi_overbought {
            reasons.push("RSI_OVERBOUGHT");
        }
        Some(Vote::new(
            StrategyKind::MeanReversion,
            Side::Short,
            1.0 + 2.0 * extremity,
            reasons,
        ))
    } else {
        None
    }
}

/// Fast/slow EMA spread beyond the tier minimum, on the trend side.
fn trend_following(snap: &IndicatorSnapshot, p: &TierParams) -> Option<Vote> {
    let separation = snap.ema_separation();
    if separation.abs() < p.trend_min_separation {
        return None;
    }
    let bonus = if separation.abs() >= 2.0 * p.trend_min_separation {
        0.5
    } else {
        0.0
    };

    if separation > 0.0 && snap.close > snap.ema_trend {
        Some(Vote::new(
            StrategyKind::TrendFollowing,
            Side::Long,
            1.5 + bonus,
            vec!["EMA_BULL_STACK"],
        ))
    } else if separation < 0.0 && snap.close < snap.ema_trend {
        Some(Vote::new(
            StrategyKind::TrendFollowing,
            Side::Short,
            1.5 + bonus,
            vec!["EMA_BEAR_STACK"],
        ))
    } else {
        None
    }
}

/// Close beyond the rolling channel on a volume spike, held for enough bars.
fn volume_breakout(snap: &IndicatorSnapshot, p: &TierParams) -> Option<Vote> {
    if snap.volume_ratio < p.volume_spike {
        return None;
    }
    let confirm = p.breakout_confirmation.max(1);

    if snap.close > snap.resistance && snap.breakout_up >= confirm {
        Some(Vote::new(
            StrategyKind::VolumeBreakout,
            Side::Long,
            2.5,
            vec!["RESISTANCE_BREAKOUT", "VOLUME_CONFIRMED"],
        ))
    } else if snap.close < snap.support && snap.breakout_down >= confirm {
        Some(Vote::new(
            StrategyKind::VolumeBreakout,
            Side::Short,
            2.5,
            vec!["SUPPORT_BREAKDOWN", "VOLUME_CONFIRMED"],
        ))
    } else {
        None
    }
}

/// Band touch with RSI confirmation votes toward the middle band; a close
/// back inside the band adds weight.
fn band_reversal(snap: &IndicatorSnapshot, p: &TierParams) -> Option<Vote> {
    if snap.low <= snap.bb_lower && snap.rsi <= p.rsi_oversold {
        let rejected = snap.close > snap.bb_lower;
        Some(Vote::new(
            StrategyKind::BandReversal,
            Side::Long,
            if rejected { 2.5 } else { 2.0 },
            vec!["LOWER_BAND_REJECTION"],
        ))
    } else if snap.high >= snap.bb_upper && snap.rsi >= p.rsi_overbought {
        let rejected = snap.close < snap.bb_upper;
        Some(Vote::new(
            StrategyKind::BandReversal,
            Side::Short,
            if rejected { 2.5 } else { 2.0 },
            vec!["UPPER_BAND_REJECTION"],
        ))
    } else {
        None
    }
}

/// Retracement to the fast or slow EMA inside an established stack.
fn pullback(snap: &IndicatorSnapshot, p: &TierParams) -> Option<Vote> {
    let near = |ema: f64| (snap.close - ema).abs() / snap.close <= p.pullback_tolerance;
    let touching = near(snap.ema_fast) || near(snap.ema_slow);
    if !touching {
        return None;
    }

    let bull_stack = snap.ema_fast > snap.ema_slow && snap.ema_slow > snap.ema_trend;
    let bear_stack = snap.ema_fast < snap.ema_slow && snap.ema_slow < snap.ema_trend;

    if bull_stack && snap.close > snap.ema_slow {
        Some(Vote::new(
            StrategyKind::Pullback,
            Side::Long,
            1.5,
            vec!["PULLBACK_TO_EMA"],
        ))
    } else if bear_stack && snap.close < snap.ema_slow {
        Some(Vote::new(
            StrategyKind::Pullback,
            Side::Short,
            1.5,
            vec!["RALLY_TO_EMA"],
        ))
    } else {
        None
    }
}
