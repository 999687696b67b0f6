//! Asset classification into volatility tiers.
//!
//! An [`AssetProfile`] is resolved once per asset run and passed explicitly to
//! every component that needs tier parameters. The default table follows the
//! usual crypto grouping: majors are calm, large caps medium, utility tokens
//! high and meme coins extreme. Anything unknown is classified from its
//! observed ATR as a fraction of price, or falls back to medium.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::domain::error::TiertraderError;
use crate::domain::indicator_helpers::calc_atr;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::strategy::StrategyKind;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityTier {
    Low,
    Medium,
    High,
    Extreme,
}

impl VolatilityTier {
    pub const ALL: [VolatilityTier; 4] = [
        VolatilityTier::Low,
        VolatilityTier::Medium,
        VolatilityTier::High,
        VolatilityTier::Extreme,
    ];

    /// Tier for a mean ATR / close ratio.
    pub fn from_volatility(atr_pct: f64) -> Self {
        if atr_pct < 0.02 {
            VolatilityTier::Low
        } else if atr_pct < 0.04 {
            VolatilityTier::Medium
        } else if atr_pct < 0.07 {
            VolatilityTier::High
        } else {
            VolatilityTier::Extreme
        }
    }

    /// INI section holding overrides for this tier.
    pub fn section(self) -> String {
        format!("tier.{}", self)
    }
}

impl fmt::Display for VolatilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VolatilityTier::Low => "low",
            VolatilityTier::Medium => "medium",
            VolatilityTier::High => "high",
            VolatilityTier::Extreme => "extreme",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for VolatilityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(VolatilityTier::Low),
            "medium" => Ok(VolatilityTier::Medium),
            "high" => Ok(VolatilityTier::High),
            "extreme" => Ok(VolatilityTier::Extreme),
            other => Err(format!("unknown volatility tier '{}'", other)),
        }
    }
}

/// Stop and target ATR multiples for one market regime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeMultipliers {
    pub stop: f64,
    pub target: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeTable {
    pub ranging: RegimeMultipliers,
    pub trending: RegimeMultipliers,
    pub volatile: RegimeMultipliers,
}

/// Every threshold the evaluators, risk resolver and position manager read.
///
/// Percent-like fields are fractions: `0.012` means 1.2%.
#[derive(Debug, Clone, PartialEq)]
pub struct TierParams {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub volume_multiplier: f64,
    pub volume_spike: f64,
    pub breakout_confirmation: usize,
    pub band_stddev: f64,
    pub trend_min_separation: f64,
    pub pullback_tolerance: f64,
    pub stop_atr_mult: f64,
    pub target_atr_mult: f64,
    pub partial_fraction: f64,
    pub trailing_activation: f64,
    pub trailing_step: f64,
    pub max_holding_bars: usize,
    pub breakeven_after_partial: bool,
    pub min_score: f64,
    pub min_confidence: f64,
    pub min_confirming: usize,
    pub max_attainable_score: f64,
    pub regime: Option<RegimeTable>,
    pub strategies: Vec<StrategyKind>,
}

fn max_attainable(strategies: &[StrategyKind]) -> f64 {
    strategies.iter().map(|s| s.max_score()).sum()
}

impl TierParams {
    pub fn defaults_for(tier: VolatilityTier) -> Self {
        use StrategyKind::*;

        let params = match tier {
            VolatilityTier::Low => TierParams {
                rsi_oversold: 35.0,
                rsi_overbought: 65.0,
                volume_multiplier: 1.2,
                volume_spike: 1.8,
                breakout_confirmation: 3,
                band_stddev: 2.0,
                trend_min_separation: 0.002,
                pullback_tolerance: 0.004,
                stop_atr_mult: 1.5,
                target_atr_mult: 2.5,
                partial_fraction: 0.4,
                trailing_activation: 0.008,
                trailing_step: 0.003,
                max_holding_bars: 96,
                breakeven_after_partial: true,
                min_score: 3.0,
                min_confidence: 0.25,
                min_confirming: 2,
                max_attainable_score: 0.0,
                regime: None,
                strategies: vec![TrendFollowing, Pullback, MeanReversion, BandReversal],
            },
            VolatilityTier::Medium => TierParams {
                rsi_oversold: 30.0,
                rsi_overbought: 70.0,
                volume_multiplier: 1.5,
                volume_spike: 2.0,
                breakout_confirmation: 3,
                band_stddev: 2.0,
                trend_min_separation: 0.003,
                pullback_tolerance: 0.005,
                stop_atr_mult: 2.0,
                target_atr_mult: 3.0,
                partial_fraction: 0.4,
                trailing_activation: 0.012,
                trailing_step: 0.004,
                max_holding_bars: 80,
                breakeven_after_partial: true,
                min_score: 3.0,
                min_confidence: 0.25,
                min_confirming: 2,
                max_attainable_score: 0.0,
                regime: None,
                strategies: vec![
                    Momentum,
                    MeanReversion,
                    TrendFollowing,
                    BandReversal,
                    Pullback,
                ],
            },
            VolatilityTier::High => TierParams {
                rsi_oversold: 25.0,
                rsi_overbought: 75.0,
                volume_multiplier: 2.0,
                volume_spike: 2.5,
                breakout_confirmation: 2,
                band_stddev: 2.2,
                trend_min_separation: 0.004,
                pullback_tolerance: 0.007,
                stop_atr_mult: 2.5,
                target_atr_mult: 3.5,
                partial_fraction: 0.4,
                trailing_activation: 0.015,
                trailing_step: 0.005,
                max_holding_bars: 64,
                breakeven_after_partial: true,
                min_score: 3.5,
                min_confidence: 0.3,
                min_confirming: 2,
                max_attainable_score: 0.0,
                regime: None,
                strategies: vec![MeanReversion, VolumeBreakout, TrendFollowing, BandReversal],
            },
            VolatilityTier::Extreme => TierParams {
                rsi_oversold: 20.0,
                rsi_overbought: 80.0,
                volume_multiplier: 3.0,
                volume_spike: 4.0,
                breakout_confirmation: 1,
                band_stddev: 2.5,
                trend_min_separation: 0.006,
                pullback_tolerance: 0.01,
                stop_atr_mult: 3.0,
                target_atr_mult: 4.5,
                partial_fraction: 0.4,
                trailing_activation: 0.025,
                trailing_step: 0.008,
                max_holding_bars: 48,
                breakeven_after_partial: true,
                min_score: 4.0,
                min_confidence: 0.35,
                min_confirming: 2,
                max_attainable_score: 0.0,
                regime: Some(RegimeTable {
                    ranging: RegimeMultipliers {
                        stop: 2.5,
                        target: 3.5,
                    },
                    trending: RegimeMultipliers {
                        stop: 3.0,
                        target: 5.0,
                    },
                    volatile: RegimeMultipliers {
                        stop: 3.5,
                        target: 5.0,
                    },
                }),
                strategies: vec![Momentum, VolumeBreakout, TrendFollowing],
            },
        };

        TierParams {
            max_attainable_score: max_attainable(&params.strategies),
            ..params
        }
    }

    /// Applies `[tier.<name>]` overrides on top of `self`.
    pub fn with_overrides(
        self,
        config: &dyn ConfigPort,
        section: &str,
    ) -> Result<Self, TiertraderError> {
        let invalid = |key: &str, reason: String| TiertraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason,
        };
        let count = |key: &str, default: usize| -> Result<usize, TiertraderError> {
            let value = config.get_int(section, key, default as i64);
            usize::try_from(value).map_err(|_| invalid(key, "must be non-negative".into()))
        };

        let strategies = match config.get_string(section, "strategies") {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<StrategyKind>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid("strategies", e))?,
            None => self.strategies.clone(),
        };

        let regime = match self.regime {
            Some(table) => Some(read_regime(config, section, table)),
            None if config.get_string(section, "regime_trending_stop").is_some() => {
                let flat = RegimeMultipliers {
                    stop: self.stop_atr_mult,
                    target: self.target_atr_mult,
                };
                Some(read_regime(
                    config,
                    section,
                    RegimeTable {
                        ranging: flat,
                        trending: flat,
                        volatile: flat,
                    },
                ))
            }
            None => None,
        };

        let derived_max = strategies != self.strategies;
        let max_default = if derived_max {
            max_attainable(&strategies)
        } else {
            self.max_attainable_score
        };

        Ok(TierParams {
            rsi_oversold: config.get_double(section, "rsi_oversold", self.rsi_oversold),
            rsi_overbought: config.get_double(section, "rsi_overbought", self.rsi_overbought),
            volume_multiplier: config.get_double(
                section,
                "volume_multiplier",
                self.volume_multiplier,
            ),
            volume_spike: config.get_double(section, "volume_spike", self.volume_spike),
            breakout_confirmation: count("breakout_confirmation", self.breakout_confirmation)?,
            band_stddev: config.get_double(section, "band_stddev", self.band_stddev),
            trend_min_separation: config.get_double(
                section,
                "trend_min_separation",
                self.trend_min_separation,
            ),
            pullback_tolerance: config.get_double(
                section,
                "pullback_tolerance",
                self.pullback_tolerance,
            ),
            stop_atr_mult: config.get_double(section, "stop_atr_mult", self.stop_atr_mult),
            target_atr_mult: config.get_double(section, "target_atr_mult", self.target_atr_mult),
            partial_fraction: config.get_double(section, "partial_fraction", self.partial_fraction),
            trailing_activation: config.get_double(
                section,
                "trailing_activation",
                self.trailing_activation,
            ),
            trailing_step: config.get_double(section, "trailing_step", self.trailing_step),
            max_holding_bars: count("max_holding_bars", self.max_holding_bars)?,
            breakeven_after_partial: config.get_bool(
                section,
                "breakeven_after_partial",
                self.breakeven_after_partial,
            ),
            min_score: config.get_double(section, "min_score", self.min_score),
            min_confidence: config.get_double(section, "min_confidence", self.min_confidence),
            min_confirming: count("min_confirming", self.min_confirming)?,
            max_attainable_score: config.get_double(section, "max_attainable_score", max_default),
            regime,
            strategies,
        })
    }
}

fn read_regime(config: &dyn ConfigPort, section: &str, base: RegimeTable) -> RegimeTable {
    let read = |name: &str, base: RegimeMultipliers| RegimeMultipliers {
        stop: config.get_double(section, &format!("regime_{}_stop", name), base.stop),
        target: config.get_double(section, &format!("regime_{}_target", name), base.target),
    };
    RegimeTable {
        ranging: read("ranging", base.ranging),
        trending: read("trending", base.trending),
        volatile: read("volatile", base.volatile),
    }
}

/// Immutable per-run classification of one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetProfile {
    pub asset: String,
    pub tier: VolatilityTier,
    pub params: TierParams,
}

/// Strips common quote-currency suffixes: `SOLUSDT` and `SOL-USD` become `SOL`.
pub fn base_symbol(asset: &str) -> String {
    let upper = asset.trim().to_uppercase();
    for suffix in ["-USDT", "-USD", "/USDT", "/USD", "BUSD", "USDT", "USDC", "USD"] {
        if let Some(base) = upper.strip_suffix(suffix) {
            if !base.is_empty() {
                return base.to_string();
            }
        }
    }
    upper
}

/// Static classification for well-known assets.
pub fn known_tier(base: &str) -> Option<VolatilityTier> {
    match base {
        "BTC" | "ETH" => Some(VolatilityTier::Low),
        "BNB" | "SOL" | "XRP" | "ADA" => Some(VolatilityTier::Medium),
        "LINK" | "DOT" | "AVAX" | "MATIC" | "ATOM" => Some(VolatilityTier::High),
        "DOGE" | "SHIB" | "PEPE" => Some(VolatilityTier::Extreme),
        _ => None,
    }
}

/// Mean ATR / close over `bars`, if there are enough of them.
pub fn observed_volatility(bars: &[OhlcvBar], atr_period: usize) -> Option<f64> {
    let atr = calc_atr(bars, atr_period);
    let ratios: Vec<f64> = bars
        .iter()
        .enumerate()
        .filter_map(|(i, bar)| atr.simple_at(i).map(|v| v / bar.close))
        .collect();
    if ratios.is_empty() {
        None
    } else {
        Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
    }
}

/// Resolves asset identifiers to profiles using the default table plus any
/// configured overrides.
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    assignments: HashMap<String, VolatilityTier>,
    tiers: HashMap<VolatilityTier, TierParams>,
}

impl Default for ProfileResolver {
    fn default() -> Self {
        Self {
            assignments: HashMap::new(),
            tiers: VolatilityTier::ALL
                .iter()
                .map(|t| (*t, TierParams::defaults_for(*t)))
                .collect(),
        }
    }
}

impl ProfileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `[assets]` (tier = comma-separated symbols) and
    /// `[tier.<name>]` parameter overrides.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TiertraderError> {
        let mut resolver = Self::default();

        for tier in VolatilityTier::ALL {
            if let Some(list) = config.get_string("assets", &tier.to_string()) {
                for symbol in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    resolver.assign(symbol, tier);
                }
            }

            let section = tier.section();
            let base = resolver
                .tiers
                .remove(&tier)
                .unwrap_or_else(|| TierParams::defaults_for(tier));
            resolver
                .tiers
                .insert(tier, base.with_overrides(config, &section)?);
        }

        Ok(resolver)
    }

    pub fn assign(&mut self, asset: &str, tier: VolatilityTier) {
        self.assignments.insert(base_symbol(asset), tier);
    }

    pub fn params(&self, tier: VolatilityTier) -> TierParams {
        self.tiers
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| TierParams::defaults_for(tier))
    }

    pub fn classify(&self, asset: &str, observed: Option<f64>) -> VolatilityTier {
        let base = base_symbol(asset);
        if let Some(tier) = self.assignments.get(&base) {
            return *tier;
        }
        if let Some(tier) = known_tier(&base) {
            return tier;
        }
        match observed {
            Some(v) if v.is_finite() => VolatilityTier::from_volatility(v),
            _ => VolatilityTier::Medium,
        }
    }

    pub fn resolve(&self, asset: &str, observed: Option<f64>) -> AssetProfile {
        let tier = self.classify(asset, observed);
        debug!(asset, %tier, observed = ?observed, "resolved asset profile");
        AssetProfile {
            asset: asset.to_string(),
            tier,
            params: self.params(tier),
        }
    }
}
