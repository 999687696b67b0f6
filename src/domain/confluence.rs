//! Confluence scoring: many votes in, at most one signal out.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::asset_profile::TierParams;
use crate::domain::indicator::snapshot::IndicatorSnapshot;
use crate::domain::strategy::{Side, StrategyKind, Vote, collect_votes};

/// A scored entry decision for one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub side: Side,
    pub score: f64,
    pub confidence: f64,
    pub reasons: BTreeSet<String>,
    pub strategies: Vec<StrategyKind>,
    pub confirming: usize,
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
}

impl Signal {
    /// True when a band-based evaluator backs the signal.
    pub fn is_reversion(&self) -> bool {
        self.strategies.iter().any(|s| s.is_reversion())
    }
}

/// Why a bar produced no signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoVotes,
    Tie,
    Score,
    Confidence,
    Confirming,
}

/// Combines the votes cast on `snap`.
///
/// The side with the strictly larger summed score wins; a tie yields nothing.
/// Confidence is the winning sum over the tier's attainable maximum, clamped
/// to 1. The signal must clear the tier's score, confidence and confirming
/// evaluator minimums.
pub fn score_votes(
    votes: &[Vote],
    snap: &IndicatorSnapshot,
    params: &TierParams,
) -> Result<Signal, Rejection> {
    if votes.is_empty() {
        return Err(Rejection::NoVotes);
    }

    let total = |side: Side| -> f64 {
        votes
            .iter()
            .filter(|v| v.side == side)
            .map(|v| v.score)
            .sum()
    };
    let long = total(Side::Long);
    let short = total(Side::Short);

    let side = if long > short {
        Side::Long
    } else if short > long {
        Side::Short
    } else {
        return Err(Rejection::Tie);
    };
    let score = long.max(short);

    let confidence = if params.max_attainable_score > 0.0 {
        (score / params.max_attainable_score).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let winners: Vec<&Vote> = votes.iter().filter(|v| v.side == side).collect();
    let mut strategies: Vec<StrategyKind> = winners.iter().map(|v| v.strategy).collect();
    strategies.sort();
    strategies.dedup();
    let confirming = strategies.len();

    if score < params.min_score {
        return Err(Rejection::Score);
    }
    if confidence < params.min_confidence {
        return Err(Rejection::Confidence);
    }
    if confirming < params.min_confirming {
        return Err(Rejection::Confirming);
    }

    let reasons = winners
        .iter()
        .flat_map(|v| v.reasons.iter().map(|r| r.to_string()))
        .collect();

    Ok(Signal {
        side,
        score,
        confidence,
        reasons,
        strategies,
        confirming,
        bar_index: snap.index,
        timestamp: snap.timestamp,
    })
}

/// Evaluates the tier's strategies on one snapshot and scores the result.
pub fn evaluate(snap: &IndicatorSnapshot, params: &TierParams) -> Option<Signal> {
    let votes = collect_votes(snap, params);
    match score_votes(&votes, snap, params) {
        Ok(signal) => Some(signal),
        Err(Rejection::NoVotes) => None,
        Err(rejection) => {
            debug!(
                bar = snap.index,
                votes = votes.len(),
                ?rejection,
                "signal rejected"
            );
            None
        }
    }
}
