//! Configuration validation.
//!
//! Validates config values before any asset is loaded.

use crate::domain::asset_profile::{ProfileResolver, RegimeMultipliers, TierParams, VolatilityTier};
use crate::domain::error::TiertraderError;
use crate::domain::indicator::snapshot::IndicatorConfig;
use crate::domain::universe::parse_assets;
use crate::ports::config_port::ConfigPort;

fn invalid(section: &str, key: &str, reason: &str) -> TiertraderError {
    TiertraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Checks the `[backtest]` keys that are present.
///
/// `data_dir` and `assets` may come from the command line instead, so their
/// absence is not an error here.
pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TiertraderError> {
    validate_data_dir(config)?;
    validate_assets(config)?;
    validate_interval(config)?;
    Ok(())
}

fn validate_data_dir(config: &dyn ConfigPort) -> Result<(), TiertraderError> {
    match config.get_string("backtest", "data_dir") {
        Some(s) if s.trim().is_empty() => {
            Err(invalid("backtest", "data_dir", "data_dir must not be empty"))
        }
        _ => Ok(()),
    }
}

fn validate_assets(config: &dyn ConfigPort) -> Result<(), TiertraderError> {
    match config.get_string("backtest", "assets") {
        Some(list) => parse_assets(&list)
            .map(|_| ())
            .map_err(|e| e.into_config_error("backtest", "assets")),
        None => Ok(()),
    }
}

fn validate_interval(config: &dyn ConfigPort) -> Result<(), TiertraderError> {
    let value = config.get_int("backtest", "interval_minutes", 0);
    if value < 0 {
        return Err(invalid(
            "backtest",
            "interval_minutes",
            "interval_minutes must be non-negative",
        ));
    }
    Ok(())
}

pub fn validate_indicator_config(indicators: &IndicatorConfig) -> Result<(), TiertraderError> {
    if indicators.ema_fast >= indicators.ema_slow {
        return Err(invalid(
            "indicators",
            "ema_fast",
            "ema_fast must be shorter than ema_slow",
        ));
    }
    if indicators.ema_slow > indicators.ema_trend {
        return Err(invalid(
            "indicators",
            "ema_slow",
            "ema_slow must not be longer than ema_trend",
        ));
    }
    Ok(())
}

/// Checks every tier's parameters after overrides were applied.
pub fn validate_tier_overrides(resolver: &ProfileResolver) -> Result<(), TiertraderError> {
    for tier in VolatilityTier::ALL {
        validate_tier_params(tier, &resolver.params(tier))?;
    }
    Ok(())
}

pub fn validate_tier_params(
    tier: VolatilityTier,
    params: &TierParams,
) -> Result<(), TiertraderError> {
    let section = tier.section();
    let check = |ok: bool, key: &str, reason: &str| {
        if ok {
            Ok(())
        } else {
            Err(invalid(&section, key, reason))
        }
    };

    check(
        params.rsi_oversold > 0.0 && params.rsi_oversold < 50.0,
        "rsi_oversold",
        "rsi_oversold must be between 0 and 50",
    )?;
    check(
        params.rsi_overbought > 50.0 && params.rsi_overbought < 100.0,
        "rsi_overbought",
        "rsi_overbought must be between 50 and 100",
    )?;
    check(
        params.volume_multiplier > 0.0,
        "volume_multiplier",
        "volume_multiplier must be positive",
    )?;
    check(
        params.volume_spike > 0.0,
        "volume_spike",
        "volume_spike must be positive",
    )?;
    check(
        params.band_stddev > 0.0,
        "band_stddev",
        "band_stddev must be positive",
    )?;
    check(
        params.trend_min_separation >= 0.0,
        "trend_min_separation",
        "trend_min_separation must be non-negative",
    )?;
    check(
        params.pullback_tolerance >= 0.0,
        "pullback_tolerance",
        "pullback_tolerance must be non-negative",
    )?;
    check(
        params.stop_atr_mult > 0.0,
        "stop_atr_mult",
        "stop_atr_mult must be positive",
    )?;
    check(
        params.target_atr_mult > 0.0,
        "target_atr_mult",
        "target_atr_mult must be positive",
    )?;
    check(
        params.partial_fraction > 0.0 && params.partial_fraction <= 1.0,
        "partial_fraction",
        "partial_fraction must be in (0, 1]",
    )?;
    check(
        params.trailing_activation >= 0.0,
        "trailing_activation",
        "trailing_activation must be non-negative",
    )?;
    check(
        params.trailing_step > 0.0 && params.trailing_step < 1.0,
        "trailing_step",
        "trailing_step must be in (0, 1)",
    )?;
    check(
        params.max_holding_bars >= 1,
        "max_holding_bars",
        "max_holding_bars must be at least 1",
    )?;
    check(
        (0.0..=1.0).contains(&params.min_confidence),
        "min_confidence",
        "min_confidence must be in [0, 1]",
    )?;
    check(
        params.min_confirming >= 1,
        "min_confirming",
        "min_confirming must be at least 1",
    )?;
    check(
        !params.strategies.is_empty(),
        "strategies",
        "at least one strategy is required",
    )?;
    check(
        params.max_attainable_score > 0.0,
        "max_attainable_score",
        "max_attainable_score must be positive",
    )?;

    if let Some(table) = params.regime {
        let positive = |m: RegimeMultipliers| m.stop > 0.0 && m.target > 0.0;
        for (name, m) in [
            ("ranging", table.ranging),
            ("trending", table.trending),
            ("volatile", table.volatile),
        ] {
            check(
                positive(m),
                &format!("regime_{}_stop", name),
                "regime multipliers must be positive",
            )?;
        }
    }

    Ok(())
}
