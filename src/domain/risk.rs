//! Risk parameter resolution and directional validation.
//!
//! Stops and targets are ATR multiples from the entry (the signal bar close).
//! Reversion signals cap the target at the opposing band edge, which is also
//! where most directional inconsistencies come from: when the entry already
//! sits beyond that edge the capped target lands on the wrong side of the
//! entry. Such plans are flipped when the bar structurally supports the
//! opposite reading and discarded otherwise.

use std::fmt;

use tracing::warn;

use crate::domain::asset_profile::{RegimeMultipliers, TierParams};
use crate::domain::confluence::Signal;
use crate::domain::error::TiertraderError;
use crate::domain::indicator::snapshot::IndicatorSnapshot;
use crate::domain::strategy::Side;

/// Volatility ratio above which the market counts as volatile.
const VOLATILE_ATR_RATIO: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Ranging,
    Trending,
    Volatile,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Ranging => write!(f, "ranging"),
            Regime::Trending => write!(f, "trending"),
            Regime::Volatile => write!(f, "volatile"),
        }
    }
}

pub fn detect_regime(snap: &IndicatorSnapshot, params: &TierParams) -> Regime {
    if snap.atr_mean > 0.0 && snap.atr > VOLATILE_ATR_RATIO * snap.atr_mean {
        return Regime::Volatile;
    }
    let bull = snap.ema_fast > snap.ema_slow && snap.ema_slow > snap.ema_trend;
    let bear = snap.ema_fast < snap.ema_slow && snap.ema_slow < snap.ema_trend;
    if (bull || bear) && snap.ema_separation().abs() >= params.trend_min_separation {
        Regime::Trending
    } else {
        Regime::Ranging
    }
}

fn multipliers(params: &TierParams, regime: Regime) -> RegimeMultipliers {
    match params.regime {
        Some(table) => match regime {
            Regime::Ranging => table.ranging,
            Regime::Trending => table.trending,
            Regime::Volatile => table.volatile,
        },
        None => RegimeMultipliers {
            stop: params.stop_atr_mult,
            target: params.target_atr_mult,
        },
    }
}

/// Prices and trailing rules for a position about to open.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPlan {
    pub side: Side,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub partial_fraction: f64,
    pub trailing_activation: f64,
    pub trailing_step: f64,
    pub regime: Regime,
    pub corrected: bool,
}

impl RiskPlan {
    /// Long: target > entry > stop. Short: target < entry < stop.
    pub fn is_consistent(&self) -> bool {
        let finite = self.entry.is_finite() && self.stop.is_finite() && self.target.is_finite();
        finite
            && match self.side {
                Side::Long => self.target > self.entry && self.entry > self.stop,
                Side::Short => self.target < self.entry && self.entry < self.stop,
            }
    }

    fn inconsistency(&self) -> TiertraderError {
        TiertraderError::DirectionalInconsistency {
            side: self.side,
            entry: self.entry,
            stop: self.stop,
            target: self.target,
        }
    }
}

fn build_plan(
    side: Side,
    reversion: bool,
    snap: &IndicatorSnapshot,
    params: &TierParams,
    regime: Regime,
) -> RiskPlan {
    let mult = multipliers(params, regime);
    let entry = snap.close;
    let stop_distance = snap.atr * mult.stop;
    let target_distance = snap.atr * mult.target;

    let (stop, mut target) = match side {
        Side::Long => (entry - stop_distance, entry + target_distance),
        Side::Short => (entry + stop_distance, entry - target_distance),
    };
    if reversion {
        target = match side {
            Side::Long => target.min(snap.bb_upper),
            Side::Short => target.max(snap.bb_lower),
        };
    }

    RiskPlan {
        side,
        entry,
        stop,
        target,
        partial_fraction: params.partial_fraction,
        trailing_activation: params.trailing_activation,
        trailing_step: params.trailing_step,
        regime,
        corrected: false,
    }
}

/// Structural evidence that the bar reads opposite to `side`.
fn supports_opposite(side: Side, snap: &IndicatorSnapshot) -> bool {
    match side {
        Side::Long => snap.close > snap.bb_upper || snap.breakout_down > 0,
        Side::Short => snap.close < snap.bb_lower || snap.breakout_up > 0,
    }
}

/// Resolves and validates the plan for `signal`.
///
/// Returns `DirectionalInconsistency` when the plan is inconsistent and
/// cannot be corrected, including when ATR is unusable.
pub fn resolve_risk(
    signal: &Signal,
    snap: &IndicatorSnapshot,
    params: &TierParams,
) -> Result<RiskPlan, TiertraderError> {
    let regime = detect_regime(snap, params);
    let reversion = signal.is_reversion();
    let plan = build_plan(signal.side, reversion, snap, params, regime);

    if !snap.atr.is_finite() || snap.atr <= 0.0 {
        return Err(plan.inconsistency());
    }
    if plan.is_consistent() {
        return Ok(plan);
    }

    if !supports_opposite(signal.side, snap) {
        return Err(plan.inconsistency());
    }

    let flipped = RiskPlan {
        corrected: true,
        ..build_plan(signal.side.opposite(), reversion, snap, params, regime)
    };
    if !flipped.is_consistent() {
        return Err(plan.inconsistency());
    }

    warn!(
        bar = snap.index,
        from = %signal.side,
        to = %flipped.side,
        entry = plan.entry,
        target = plan.target,
        "flipped directionally inconsistent signal"
    );
    Ok(flipped)
}
