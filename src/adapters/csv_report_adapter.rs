//! CSV report adapter: `trades.csv` and `summary.csv` in the output directory.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::TiertraderError;
use crate::domain::metrics::Summary;
use crate::domain::position::{ExitReason, TradeRecord};
use crate::domain::strategy::Side;
use crate::ports::report_port::ReportPort;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CsvReportAdapter;

#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    asset: &'a str,
    id: u64,
    side: Side,
    entry_time: String,
    exit_time: String,
    entry_price: f64,
    exit_price: f64,
    initial_stop: f64,
    target: f64,
    pnl_pct: f64,
    exit_reason: ExitReason,
    partial: bool,
    bars_held: usize,
    confidence: f64,
    strategies: String,
    tags: String,
}

impl<'a> From<&'a TradeRecord> for TradeRow<'a> {
    fn from(trade: &'a TradeRecord) -> Self {
        TradeRow {
            asset: &trade.asset,
            id: trade.id,
            side: trade.side,
            entry_time: trade.entry_time.format(TIMESTAMP_FORMAT).to_string(),
            exit_time: trade.exit_time.format(TIMESTAMP_FORMAT).to_string(),
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            initial_stop: trade.initial_stop,
            target: trade.target,
            pnl_pct: trade.pnl_pct,
            exit_reason: trade.exit_reason,
            partial: trade.had_partial(),
            bars_held: trade.bars_held(),
            confidence: trade.confidence,
            strategies: trade
                .strategies
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join("|"),
            tags: trade.tags.join("|"),
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    scope: &'a str,
    tier: String,
    total_trades: usize,
    wins: usize,
    losses: usize,
    win_rate: f64,
    profit_factor: f64,
    avg_win_pct: f64,
    avg_loss_pct: f64,
    largest_win_pct: f64,
    largest_loss_pct: f64,
    avg_bars_held: f64,
    total_return_pct: f64,
    max_drawdown: f64,
    max_drawdown_trades: usize,
    stop_loss: usize,
    take_profit: usize,
    trailing_stop: usize,
    time_out: usize,
}

impl<'a> SummaryRow<'a> {
    fn new(scope: &'a str, tier: String, s: &Summary) -> Self {
        SummaryRow {
            scope,
            tier,
            total_trades: s.total_trades,
            wins: s.wins,
            losses: s.losses,
            win_rate: s.win_rate,
            profit_factor: s.profit_factor,
            avg_win_pct: s.avg_win_pct,
            avg_loss_pct: s.avg_loss_pct,
            largest_win_pct: s.largest_win_pct,
            largest_loss_pct: s.largest_loss_pct,
            avg_bars_held: s.avg_bars_held,
            total_return_pct: s.total_return_pct,
            max_drawdown: s.max_drawdown,
            max_drawdown_trades: s.max_drawdown_trades,
            stop_loss: s.exit_count(ExitReason::StopLoss),
            take_profit: s.exit_count(ExitReason::TakeProfit),
            trailing_stop: s.exit_count(ExitReason::TrailingStop),
            time_out: s.exit_count(ExitReason::TimeOut),
        }
    }
}

fn report_error(path: &Path, e: impl std::fmt::Display) -> TiertraderError {
    TiertraderError::Report {
        reason: format!("{}: {}", path.display(), e),
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        results: &[BacktestResult],
        aggregate: &Summary,
        output_dir: &str,
    ) -> Result<(), TiertraderError> {
        let dir = Path::new(output_dir);
        fs::create_dir_all(dir).map_err(|e| report_error(dir, e))?;

        let trades_path = dir.join("trades.csv");
        let mut trades = csv::Writer::from_path(&trades_path)
            .map_err(|e| report_error(&trades_path, e))?;
        for result in results {
            for trade in &result.trades {
                trades
                    .serialize(TradeRow::from(trade))
                    .map_err(|e| report_error(&trades_path, e))?;
            }
        }
        trades.flush().map_err(|e| report_error(&trades_path, e))?;

        let summary_path = dir.join("summary.csv");
        let mut summary = csv::Writer::from_path(&summary_path)
            .map_err(|e| report_error(&summary_path, e))?;
        for result in results {
            summary
                .serialize(SummaryRow::new(
                    &result.asset,
                    result.profile.tier.to_string(),
                    &result.summary(),
                ))
                .map_err(|e| report_error(&summary_path, e))?;
        }
        summary
            .serialize(SummaryRow::new("ALL", String::new(), aggregate))
            .map_err(|e| report_error(&summary_path, e))?;
        summary.flush().map_err(|e| report_error(&summary_path, e))?;

        info!(
            trades = %trades_path.display(),
            summary = %summary_path.display(),
            "reports written"
        );
        Ok(())
    }
}
