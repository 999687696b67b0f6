//! Performance summary over closed trades.

use std::collections::BTreeMap;

use crate::domain::position::{ExitReason, TradeRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Mean P&L of winners, in percent.
    pub avg_win_pct: f64,
    /// Mean absolute P&L of losers, in percent.
    pub avg_loss_pct: f64,
    pub largest_win_pct: f64,
    pub largest_loss_pct: f64,
    pub avg_bars_held: f64,
    pub partial_exits: usize,
    pub exit_reasons: BTreeMap<ExitReason, usize>,
    /// Compounded equity after each trade, starting at 1.0.
    pub equity_curve: Vec<f64>,
    pub total_return_pct: f64,
    /// Largest peak-to-trough fall of the equity curve, as a fraction of peak.
    pub max_drawdown: f64,
    /// Longest run of trades spent below a previous equity peak.
    pub max_drawdown_trades: usize,
}

impl Summary {
    /// Trades are compounded in the order given.
    pub fn compute(trades: &[TradeRecord]) -> Self {
        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_bars = 0usize;
        let mut partial_exits = 0usize;
        let mut exit_reasons = BTreeMap::new();

        let mut equity = 1.0_f64;
        let mut equity_curve = Vec::with_capacity(trades.len() + 1);
        equity_curve.push(equity);

        for trade in trades {
            let pnl = trade.pnl_pct;
            if pnl > 0.0 {
                wins += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                losses += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                breakeven += 1;
            }

            total_bars += trade.bars_held();
            if trade.had_partial() {
                partial_exits += 1;
            }
            *exit_reasons.entry(trade.exit_reason).or_insert(0) += 1;

            equity *= 1.0 + pnl / 100.0;
            equity_curve.push(equity);
        }

        let total_trades = trades.len();
        let ratio = |num: f64, den: usize| if den > 0 { num / den as f64 } else { 0.0 };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_trades) = compute_drawdown(&equity_curve);

        Summary {
            total_trades,
            wins,
            losses,
            breakeven,
            win_rate: ratio(wins as f64, total_trades),
            profit_factor,
            avg_win_pct: ratio(total_wins, wins),
            avg_loss_pct: ratio(total_losses, losses),
            largest_win_pct: largest_win,
            largest_loss_pct: largest_loss,
            avg_bars_held: ratio(total_bars as f64, total_trades),
            partial_exits,
            exit_reasons,
            total_return_pct: (equity - 1.0) * 100.0,
            equity_curve,
            max_drawdown,
            max_drawdown_trades,
        }
    }

    /// Summary over trades from many assets, compounded in exit order.
    pub fn aggregate<'a, I>(trades: I) -> Self
    where
        I: IntoIterator<Item = &'a TradeRecord>,
    {
        let mut all: Vec<TradeRecord> = trades.into_iter().cloned().collect();
        all.sort_by(|a, b| {
            a.exit_time
                .cmp(&b.exit_time)
                .then_with(|| a.asset.cmp(&b.asset))
                .then_with(|| a.id.cmp(&b.id))
        });
        Self::compute(&all)
    }

    pub fn exit_count(&self, reason: ExitReason) -> usize {
        self.exit_reasons.get(&reason).copied().unwrap_or(0)
    }
}

fn compute_drawdown(equity_curve: &[f64]) -> (f64, usize) {
    let Some(&first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - equity) / peak;
            max_dd = max_dd.max(dd);
            if dd > 0.0 {
                current_dd_duration += 1;
                max_dd_duration = max_dd_duration.max(current_dd_duration);
            }
        }
    }

    (max_dd, max_dd_duration)
}
