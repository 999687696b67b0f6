//! Position lifecycle state machine.
//!
//! A position moves OPENING -> OPEN_FULL -> OPEN_PARTIAL -> CLOSED and is
//! advanced one bar at a time by value. Per bar, in priority order:
//!
//! 1. adverse extreme through the stop: close the remainder at the stop
//! 2. favourable extreme at the target, no partial yet: close the partial
//!    fraction at the target and end the bar
//! 3. favourable excursion past the activation level: arm or ratchet the
//!    trailing stop from the best extreme seen
//! 4. trailing armed, not moved this bar, adverse extreme through it: close
//!    the remainder at the trailing price
//! 5. held longer than the tier allows: close the remainder at the close
//!
//! At most one exit leg is produced per bar.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::asset_profile::TierParams;
use crate::domain::confluence::Signal;
use crate::domain::error::TiertraderError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::risk::RiskPlan;
use crate::domain::strategy::{Side, StrategyKind};

const FULL_SIZE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    TimeOut,
}

impl ExitReason {
    pub const ALL: [ExitReason; 4] = [
        ExitReason::StopLoss,
        ExitReason::TakeProfit,
        ExitReason::TrailingStop,
        ExitReason::TimeOut,
    ];
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::TrailingStop => write!(f, "TRAILING_STOP"),
            ExitReason::TimeOut => write!(f, "TIME_OUT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Opening,
    OpenFull,
    OpenPartial,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailingState {
    Unarmed,
    Armed { price: f64 },
}

/// One (partial) close of a position.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitLeg {
    pub fraction: f64,
    pub price: f64,
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub reason: ExitReason,
}

/// Exit rules copied from the tier when the position opens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitRules {
    pub partial_fraction: f64,
    pub trailing_activation: f64,
    pub trailing_step: f64,
    pub max_holding_bars: usize,
    pub breakeven_after_partial: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: u64,
    pub asset: String,
    pub side: Side,
    pub entry_price: f64,
    pub entry_index: usize,
    pub entry_time: NaiveDateTime,
    pub initial_stop: f64,
    pub stop: f64,
    pub target: f64,
    pub remaining: f64,
    pub trailing: TrailingState,
    pub best_price: f64,
    pub state: LifecycleState,
    pub legs: Vec<ExitLeg>,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub strategies: Vec<StrategyKind>,
    pub rules: ExitRules,
}

/// Outcome of advancing a position by one bar.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Holding(Position),
    Closed(TradeRecord),
}

/// A finished position with all its exit legs folded into one result.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: u64,
    pub asset: String,
    pub side: Side,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub initial_stop: f64,
    pub target: f64,
    /// Size-weighted return of all legs, in percent.
    pub pnl_pct: f64,
    pub exit_reason: ExitReason,
    pub confidence: f64,
    pub tags: Vec<String>,
    pub strategies: Vec<StrategyKind>,
    pub legs: Vec<ExitLeg>,
}

impl TradeRecord {
    pub fn bars_held(&self) -> usize {
        self.exit_index - self.entry_index
    }

    pub fn had_partial(&self) -> bool {
        self.legs.len() > 1
    }

    pub fn fraction_closed(&self) -> f64 {
        self.legs.iter().map(|l| l.fraction).sum()
    }

    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }
}

impl Position {
    /// Opens a position at the signal bar close.
    ///
    /// The plan is re-validated while OPENING; an inconsistent plan never
    /// becomes a position.
    pub fn open(
        id: u64,
        asset: &str,
        signal: &Signal,
        plan: &RiskPlan,
        params: &TierParams,
    ) -> Result<Position, TiertraderError> {
        let position = Position {
            id,
            asset: asset.to_string(),
            side: plan.side,
            entry_price: plan.entry,
            entry_index: signal.bar_index,
            entry_time: signal.timestamp,
            initial_stop: plan.stop,
            stop: plan.stop,
            target: plan.target,
            remaining: 1.0,
            trailing: TrailingState::Unarmed,
            best_price: plan.entry,
            state: LifecycleState::Opening,
            legs: Vec::new(),
            confidence: signal.confidence,
            tags: signal.reasons.iter().cloned().collect(),
            strategies: signal.strategies.clone(),
            rules: ExitRules {
                partial_fraction: plan.partial_fraction,
                trailing_activation: plan.trailing_activation,
                trailing_step: plan.trailing_step,
                max_holding_bars: params.max_holding_bars,
                breakeven_after_partial: params.breakeven_after_partial,
            },
        };

        if !plan.is_consistent() {
            return Err(TiertraderError::DirectionalInconsistency {
                side: plan.side,
                entry: plan.entry,
                stop: plan.stop,
                target: plan.target,
            });
        }

        Ok(Position {
            state: LifecycleState::OpenFull,
            ..position
        })
    }

    /// Target beyond entry beyond the initial stop, and the stop never
    /// loosened.
    pub fn is_direction_consistent(&self) -> bool {
        match self.side {
            Side::Long => {
                self.target > self.entry_price
                    && self.entry_price > self.initial_stop
                    && self.stop >= self.initial_stop
            }
            Side::Short => {
                self.target < self.entry_price
                    && self.entry_price < self.initial_stop
                    && self.stop <= self.initial_stop
            }
        }
    }

    fn favourable(&self, bar: &OhlcvBar) -> f64 {
        match self.side {
            Side::Long => bar.high,
            Side::Short => bar.low,
        }
    }

    fn adverse(&self, bar: &OhlcvBar) -> f64 {
        match self.side {
            Side::Long => bar.low,
            Side::Short => bar.high,
        }
    }

    /// True when `price` is at or beyond `level` in the favourable direction.
    fn reaches(&self, price: f64, level: f64) -> bool {
        match self.side {
            Side::Long => price >= level,
            Side::Short => price <= level,
        }
    }

    /// True when `price` is at or beyond `level` in the adverse direction.
    fn breaches(&self, price: f64, level: f64) -> bool {
        match self.side {
            Side::Long => price <= level,
            Side::Short => price >= level,
        }
    }

    fn excursion(&self) -> f64 {
        self.side.sign() * (self.best_price - self.entry_price) / self.entry_price
    }

    fn trailing_candidate(&self) -> f64 {
        match self.side {
            Side::Long => self.best_price * (1.0 - self.rules.trailing_step),
            Side::Short => self.best_price * (1.0 + self.rules.trailing_step),
        }
    }

    fn push_leg(&mut self, fraction: f64, price: f64, index: usize, bar: &OhlcvBar, reason: ExitReason) {
        self.legs.push(ExitLeg {
            fraction,
            price,
            bar_index: index,
            timestamp: bar.timestamp,
            reason,
        });
        self.remaining -= fraction;
    }

    fn close_remainder(
        mut self,
        price: f64,
        index: usize,
        bar: &OhlcvBar,
        reason: ExitReason,
    ) -> TradeRecord {
        let fraction = self.remaining;
        self.push_leg(fraction, price, index, bar, reason);
        self.remaining = 0.0;
        self.state = LifecycleState::Closed;
        TradeRecord::from_closed(self)
    }

    /// Advances the position through `bar`, which must come after the entry bar.
    pub fn advance(mut self, bar: &OhlcvBar, index: usize) -> Transition {
        // 1. stop
        if self.breaches(self.adverse(bar), self.stop) {
            let stop = self.stop;
            return Transition::Closed(self.close_remainder(stop, index, bar, ExitReason::StopLoss));
        }

        let favourable = self.favourable(bar);
        if self.reaches(favourable, self.best_price) {
            self.best_price = favourable;
        }

        // 2. target
        if self.state == LifecycleState::OpenFull && self.reaches(favourable, self.target) {
            let target = self.target;
            if self.rules.partial_fraction >= 1.0 - FULL_SIZE_EPSILON {
                return Transition::Closed(self.close_remainder(
                    target,
                    index,
                    bar,
                    ExitReason::TakeProfit,
                ));
            }
            let fraction = self.rules.partial_fraction;
            self.push_leg(fraction, target, index, bar, ExitReason::TakeProfit);
            self.state = LifecycleState::OpenPartial;
            if self.rules.breakeven_after_partial && self.breaches(self.stop, self.entry_price) {
                self.stop = self.entry_price;
            }
            return Transition::Holding(self);
        }

        // 3. trailing arm / ratchet
        let mut advanced = false;
        if self.excursion() >= self.rules.trailing_activation {
            let candidate = self.trailing_candidate();
            let improves = match self.trailing {
                TrailingState::Unarmed => true,
                TrailingState::Armed { price } => self.reaches(candidate, price) && candidate != price,
            };
            if improves {
                self.trailing = TrailingState::Armed { price: candidate };
                advanced = true;
            }
        }

        // 4. trailing breach, only once a partial has been banked
        if let TrailingState::Armed { price } = self.trailing {
            if !advanced && self.remaining < 1.0 && self.breaches(self.adverse(bar), price) {
                return Transition::Closed(self.close_remainder(
                    price,
                    index,
                    bar,
                    ExitReason::TrailingStop,
                ));
            }
        }

        // 5. time-out
        if index.saturating_sub(self.entry_index) > self.rules.max_holding_bars {
            let close = bar.close;
            return Transition::Closed(self.close_remainder(close, index, bar, ExitReason::TimeOut));
        }

        Transition::Holding(self)
    }

    /// Closes whatever remains at the bar close, e.g. when the data ends.
    pub fn force_close(self, bar: &OhlcvBar, index: usize) -> TradeRecord {
        let close = bar.close;
        self.close_remainder(close, index, bar, ExitReason::TimeOut)
    }
}

impl TradeRecord {
    fn from_closed(position: Position) -> Self {
        let pnl_pct = position
            .legs
            .iter()
            .map(|leg| {
                position.side.sign() * (leg.price - position.entry_price) / position.entry_price
                    * leg.fraction
                    * 100.0
            })
            .sum();

        // Legs are never empty for a closed position.
        let (exit_index, exit_time, exit_price, exit_reason) = match position.legs.last() {
            Some(last) => (last.bar_index, last.timestamp, last.price, last.reason),
            None => (
                position.entry_index,
                position.entry_time,
                position.entry_price,
                ExitReason::TimeOut,
            ),
        };

        TradeRecord {
            id: position.id,
            asset: position.asset,
            side: position.side,
            entry_index: position.entry_index,
            exit_index,
            entry_time: position.entry_time,
            exit_time,
            entry_price: position.entry_price,
            exit_price,
            initial_stop: position.initial_stop,
            target: position.target,
            pnl_pct,
            exit_reason,
            confidence: position.confidence,
            tags: position.tags,
            strategies: position.strategies,
            legs: position.legs,
        }
    }
}
