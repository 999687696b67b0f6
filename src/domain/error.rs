//! Domain error types.

use crate::domain::strategy::Side;

/// Top-level error type for tiertrader.
#[derive(Debug, thiserror::Error)]
pub enum TiertraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("failed to read data for {asset}: {reason}")]
    DataRead { asset: String, reason: String },

    #[error("no data for {asset}")]
    NoData { asset: String },

    #[error("invalid bars for {asset} at index {index}: {reason}")]
    InvalidBars {
        asset: String,
        index: usize,
        reason: String,
    },

    #[error("insufficient history: have {available} bars, need {needed}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error(
        "directional inconsistency for {side} signal: entry {entry:.6}, stop {stop:.6}, target {target:.6}"
    )]
    DirectionalInconsistency {
        side: Side,
        entry: f64,
        stop: f64,
        target: f64,
    },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TiertraderError> for std::process::ExitCode {
    fn from(err: &TiertraderError) -> Self {
        let code: u8 = match err {
            TiertraderError::Io(_) => 1,
            TiertraderError::ConfigParse { .. }
            | TiertraderError::ConfigMissing { .. }
            | TiertraderError::ConfigInvalid { .. } => 2,
            TiertraderError::DataRead { .. } | TiertraderError::Report { .. } => 3,
            TiertraderError::DirectionalInconsistency { .. } => 4,
            TiertraderError::NoData { .. }
            | TiertraderError::InvalidBars { .. }
            | TiertraderError::InsufficientHistory { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::ExitCode;

    #[test]
    fn config_errors_share_exit_code() {
        let missing = TiertraderError::ConfigMissing {
            section: "backtest".into(),
            key: "data_dir".into(),
        };
        let invalid = TiertraderError::ConfigInvalid {
            section: "tier.low".into(),
            key: "partial_fraction".into(),
            reason: "must be in (0, 1]".into(),
        };
        assert_eq!(ExitCode::from(&missing), ExitCode::from(2));
        assert_eq!(ExitCode::from(&invalid), ExitCode::from(2));
    }

    #[test]
    fn data_errors_map_to_five() {
        let err = TiertraderError::InvalidBars {
            asset: "BTC".into(),
            index: 3,
            reason: "duplicate timestamp".into(),
        };
        assert_eq!(ExitCode::from(&err), ExitCode::from(5));
    }

    #[test]
    fn display_includes_context() {
        let err = TiertraderError::InsufficientHistory {
            needed: 50,
            available: 12,
        };
        assert_eq!(
            err.to_string(),
            "insufficient history: have 12 bars, need 50"
        );
    }

    #[test]
    fn directional_display_names_side() {
        let err = TiertraderError::DirectionalInconsistency {
            side: Side::Long,
            entry: 100.0,
            stop: 98.0,
            target: 99.0,
        };
        assert!(err.to_string().starts_with("directional inconsistency for LONG"));
    }
}
