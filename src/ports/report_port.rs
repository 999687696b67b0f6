//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::TiertraderError;
use crate::domain::metrics::Summary;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(
        &self,
        results: &[BacktestResult],
        aggregate: &Summary,
        output_dir: &str,
    ) -> Result<(), TiertraderError>;
}
