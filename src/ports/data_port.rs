//! Data access port trait.

use crate::domain::error::TiertraderError;
use crate::domain::ohlcv::OhlcvBar;

pub trait DataPort {
    /// All bars for `asset`, oldest first.
    fn fetch_bars(&self, asset: &str) -> Result<Vec<OhlcvBar>, TiertraderError>;

    fn list_assets(&self) -> Result<Vec<String>, TiertraderError>;
}
