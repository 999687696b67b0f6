//! Asset universe for multi-asset backtesting.
//!
//! Parses asset lists from configuration and loads each asset's bars through
//! the data port. A failed load is kept as that asset's outcome and never
//! stops the others.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::domain::backtest::{AssetJob, AssetOutcome};
use crate::domain::error::TiertraderError;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(String),
}

impl UniverseError {
    pub fn into_config_error(self, section: &str, key: &str) -> TiertraderError {
        TiertraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Splits a comma-separated asset list, uppercasing each symbol.
pub fn parse_assets(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let asset = trimmed.to_uppercase();
        if !seen.insert(asset.clone()) {
            return Err(UniverseError::DuplicateAsset(asset));
        }
        assets.push(asset);
    }

    Ok(assets)
}

pub struct LoadedUniverse {
    pub jobs: Vec<AssetJob>,
    pub failed: Vec<AssetOutcome>,
}

/// Fetches bars for every asset.
pub fn load_universe(data_port: &dyn DataPort, assets: &[String]) -> LoadedUniverse {
    let mut jobs = Vec::new();
    let mut failed = Vec::new();

    for asset in assets {
        let loaded = data_port.fetch_bars(asset).and_then(|bars| {
            if bars.is_empty() {
                Err(TiertraderError::NoData {
                    asset: asset.clone(),
                })
            } else {
                Ok(bars)
            }
        });

        match loaded {
            Ok(bars) => {
                info!(asset = %asset, bars = bars.len(), "loaded bars");
                jobs.push(AssetJob {
                    asset: asset.clone(),
                    bars,
                });
            }
            Err(e) => {
                warn!(asset = %asset, error = %e, "skipping asset");
                failed.push(AssetOutcome {
                    asset: asset.clone(),
                    result: Err(e),
                });
            }
        }
    }

    LoadedUniverse { jobs, failed }
}
