//! End-to-end backtests through the domain pipeline.
//!
//! Tests cover:
//! - Range-bound tape traded as alternating band reversions
//! - A steady climb ridden to a trailing stop, a sharp one faded
//! - Gate thresholds and exit configuration changing the outcome
//! - Warmup, bad data and per-asset isolation in batches
//! - Determinism and causality of the bar loop

mod common;

use approx::assert_relative_eq;
use common::*;
use proptest::prelude::*;
use tiertrader::domain::asset_profile::{
    AssetProfile, ProfileResolver, TierParams, VolatilityTier,
};
use tiertrader::domain::backtest::{AssetJob, BacktestConfig, run_backtest, run_batch};
use tiertrader::domain::error::TiertraderError;
use tiertrader::domain::indicator::snapshot::IndicatorFrame;
use tiertrader::domain::metrics::Summary;
use tiertrader::domain::position::ExitReason;
use tiertrader::domain::strategy::{Side, StrategyKind};
use tiertrader::domain::universe::load_universe;

fn profile(asset: &str, tier: VolatilityTier) -> AssetProfile {
    AssetProfile {
        asset: asset.to_string(),
        tier,
        params: TierParams::defaults_for(tier),
    }
}

fn sequential() -> BacktestConfig {
    BacktestConfig {
        parallel: false,
        ..BacktestConfig::default()
    }
}

mod sideways_market {
    use super::*;

    #[test]
    fn spikes_trade_as_alternating_reversions() {
        let bars = sideways_spikes(240);
        let result = run_backtest(
            "SOL",
            &bars,
            &profile("SOL", VolatilityTier::Medium),
            &BacktestConfig::default(),
        )
        .unwrap();

        assert_eq!(result.stats.bars_skipped, 49);
        assert_eq!(result.stats.bars_evaluated, 191);
        assert_eq!(result.stats.signals, 9);
        assert_eq!(result.stats.rejected, 0);
        assert_eq!(result.stats.corrected, 0);
        assert_eq!(result.trades.len(), 9);

        for (n, trade) in result.trades.iter().enumerate() {
            let expected = if n % 2 == 0 { Side::Long } else { Side::Short };
            assert_eq!(trade.side, expected, "trade {}", n);
            assert_eq!(trade.entry_index, 60 + 20 * n);
            assert!(trade.strategies.contains(&StrategyKind::MeanReversion));
            assert!(trade.strategies.contains(&StrategyKind::BandReversal));
            assert_eq!(trade.exit_reason, ExitReason::TrailingStop);
            assert_eq!(trade.legs.len(), 2);
            assert_eq!(trade.legs[0].reason, ExitReason::TakeProfit);
            assert_relative_eq!(trade.legs[0].fraction, 0.4, epsilon = 1e-12);
            assert_relative_eq!(trade.fraction_closed(), 1.0, epsilon = 1e-12);
            assert!(trade.is_win());
        }
    }

    #[test]
    fn reversion_targets_stop_at_the_opposite_band() {
        let bars = sideways_spikes(240);
        let params = TierParams::defaults_for(VolatilityTier::Medium);
        let config = BacktestConfig::default();
        let result = run_backtest(
            "SOL",
            &bars,
            &profile("SOL", VolatilityTier::Medium),
            &config,
        )
        .unwrap();

        let indicators = config.indicators.with_band_stddev(params.band_stddev);
        let frame = IndicatorFrame::compute(&bars, &indicators);
        for trade in &result.trades {
            let snap = frame.snapshot(trade.entry_index).unwrap();
            match trade.side {
                Side::Long => {
                    assert!(trade.target > trade.entry_price);
                    assert!(trade.target <= snap.bb_upper + 1e-9);
                    assert!(trade.initial_stop < trade.entry_price);
                }
                Side::Short => {
                    assert!(trade.target < trade.entry_price);
                    assert!(trade.target >= snap.bb_lower - 1e-9);
                    assert!(trade.initial_stop > trade.entry_price);
                }
            }
        }
    }

    #[test]
    fn unreachable_confidence_gate_emits_nothing() {
        let bars = sideways_spikes(240);
        let mut p = profile("SOL", VolatilityTier::Medium);
        p.params.min_confidence = 0.99;
        let result = run_backtest("SOL", &bars, &p, &BacktestConfig::default()).unwrap();
        assert_eq!(result.stats.signals, 0);
        assert!(result.signals.is_empty());
        assert!(result.trades.is_empty());
        assert_eq!(result.stats.bars_evaluated, 191);
    }

    #[test]
    fn full_size_target_closes_with_take_profit() {
        let bars = sideways_spikes(240);
        let mut p = profile("SOL", VolatilityTier::Medium);
        p.params.partial_fraction = 1.0;
        let result = run_backtest("SOL", &bars, &p, &BacktestConfig::default()).unwrap();
        assert_eq!(result.trades.len(), 9);
        for trade in &result.trades {
            assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
            assert_eq!(trade.legs.len(), 1);
            assert_relative_eq!(trade.exit_price, trade.target);
        }
    }

    #[test]
    fn extreme_tier_ignores_the_same_tape() {
        let bars = sideways_spikes(240);
        let result = run_backtest(
            "DOGE",
            &bars,
            &profile("DOGE", VolatilityTier::Extreme),
            &BacktestConfig::default(),
        )
        .unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn summary_matches_trades() {
        let bars = sideways_spikes(240);
        let result = run_backtest(
            "SOL",
            &bars,
            &profile("SOL", VolatilityTier::Medium),
            &BacktestConfig::default(),
        )
        .unwrap();
        let s = result.summary();
        assert_eq!(s.total_trades, 9);
        assert_eq!(s.wins, 9);
        assert_eq!(s.losses, 0);
        assert_relative_eq!(s.win_rate, 1.0);
        assert_eq!(s.exit_count(ExitReason::TrailingStop), 9);
        assert_eq!(s.partial_exits, 9);
        assert_relative_eq!(s.max_drawdown, 0.0);
        assert!(s.total_return_pct > 0.0);
    }
}

mod trending_market {
    use super::*;

    #[test]
    fn rise_then_retrace_rides_the_trailing_stop() {
        let bars = rise_then_retrace(80, 40);
        let result = run_backtest(
            "SOL",
            &bars,
            &profile("SOL", VolatilityTier::Medium),
            &BacktestConfig::default(),
        )
        .unwrap();

        assert!(result.trades.iter().all(|t| t.side == Side::Long));
        let trade = &result.trades[0];
        assert_eq!(trade.entry_index, 89);
        assert!(trade.strategies.contains(&StrategyKind::TrendFollowing));
        assert!(trade.strategies.contains(&StrategyKind::Pullback));
        assert_eq!(trade.exit_reason, ExitReason::TrailingStop);
        assert_eq!(trade.exit_index, 120);
        assert_eq!(trade.legs.len(), 2);
        assert_eq!(trade.legs[0].reason, ExitReason::TakeProfit);
        // Trail sits one step under the highest high of the climb.
        assert_relative_eq!(trade.exit_price, 105.1 * 0.996, epsilon = 1e-9);
        assert!(trade.is_win());
    }

    #[test]
    fn no_signals_while_a_position_is_open() {
        let bars = rise_then_retrace(80, 40);
        let result = run_backtest(
            "SOL",
            &bars,
            &profile("SOL", VolatilityTier::Medium),
            &BacktestConfig::default(),
        )
        .unwrap();

        assert_eq!(result.stats.signals, result.signals.len());
        assert_eq!(result.signals.len(), result.trades.len());
        for (signal, trade) in result.signals.iter().zip(&result.trades) {
            assert_eq!(signal.bar_index, trade.entry_index);
        }
        for pair in result.trades.windows(2) {
            assert!(pair[1].entry_index >= pair[0].exit_index);
        }
    }

    #[test]
    fn short_climb_is_faded_not_followed() {
        let bars = rise_then_retrace(80, 10);
        let result = run_backtest(
            "SOL",
            &bars,
            &profile("SOL", VolatilityTier::Medium),
            &BacktestConfig::default(),
        )
        .unwrap();
        assert!(!result.trades.is_empty());
        for trade in &result.trades {
            assert_eq!(trade.side, Side::Short);
            assert!(trade.strategies.contains(&StrategyKind::MeanReversion));
            assert!(trade.strategies.contains(&StrategyKind::BandReversal));
            assert_ne!(trade.exit_reason, ExitReason::TrailingStop);
        }
    }
}

mod data_handling {
    use super::*;

    #[test]
    fn short_history_never_signals() {
        let bars = sideways_spikes(30);
        let result = run_backtest(
            "SOL",
            &bars,
            &profile("SOL", VolatilityTier::Medium),
            &BacktestConfig::default(),
        )
        .unwrap();
        assert_eq!(result.stats.bars_evaluated, 0);
        assert_eq!(result.stats.bars_skipped, 30);
        assert!(result.signals.is_empty());
        assert!(result.trades.is_empty());
    }

    #[test]
    fn steady_drift_stays_flat() {
        for step in [0.2, -0.2] {
            let bars = linear_trend(120, 100.0, step);
            let result = run_backtest(
                "SOL",
                &bars,
                &profile("SOL", VolatilityTier::Medium),
                &BacktestConfig::default(),
            )
            .unwrap();
            assert!(result.trades.is_empty(), "step {}", step);
        }
    }

    #[test]
    fn gap_is_reported_with_index() {
        let mut bars = sideways_spikes(100);
        bars.remove(70);
        let err = run_backtest(
            "SOL",
            &bars,
            &profile("SOL", VolatilityTier::Medium),
            &BacktestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TiertraderError::InvalidBars { index: 70, .. }));
    }

    #[test]
    fn out_of_order_bars_are_rejected() {
        let mut bars = sideways_spikes(100);
        bars.swap(10, 11);
        let err = run_backtest(
            "SOL",
            &bars,
            &profile("SOL", VolatilityTier::Medium),
            &BacktestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TiertraderError::InvalidBars { index: 10, .. }));
    }

    #[test]
    fn load_universe_splits_failures() {
        let port = MockDataPort::new()
            .with_bars("SOL", sideways_spikes(120))
            .with_bars("XRP", vec![])
            .with_error("BTC", "connection reset");
        let assets: Vec<String> = ["SOL", "XRP", "BTC"].iter().map(|s| s.to_string()).collect();

        let universe = load_universe(&port, &assets);

        assert_eq!(universe.jobs.len(), 1);
        assert_eq!(universe.jobs[0].asset, "SOL");
        assert_eq!(universe.failed.len(), 2);
        assert!(matches!(
            universe.failed[0].result,
            Err(TiertraderError::NoData { .. })
        ));
        assert!(matches!(
            universe.failed[1].result,
            Err(TiertraderError::DataRead { .. })
        ));
    }
}

mod batch {
    use super::*;

    #[test]
    fn one_bad_asset_does_not_stop_the_rest() {
        let mut broken = sideways_spikes(240);
        broken[100].high = -1.0;
        let jobs = vec![
            AssetJob {
                asset: "SOL".into(),
                bars: sideways_spikes(240),
            },
            AssetJob {
                asset: "ADA".into(),
                bars: broken,
            },
            AssetJob {
                asset: "XRP".into(),
                bars: sideways_spikes(240),
            },
        ];

        let outcomes = run_batch(&jobs, &ProfileResolver::new(), &BacktestConfig::default());

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].asset, "SOL");
        assert_eq!(outcomes[1].asset, "ADA");
        assert_eq!(outcomes[2].asset, "XRP");
        assert_eq!(outcomes[0].result.as_ref().unwrap().trades.len(), 9);
        assert!(matches!(
            outcomes[1].result,
            Err(TiertraderError::InvalidBars { index: 100, .. })
        ));
        assert_eq!(outcomes[2].result.as_ref().unwrap().trades.len(), 9);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let jobs = vec![
            AssetJob {
                asset: "SOL".into(),
                bars: sideways_spikes(240),
            },
            AssetJob {
                asset: "BNB".into(),
                bars: sideways_spikes(200),
            },
        ];
        let resolver = ProfileResolver::new();

        let first = run_batch(&jobs, &resolver, &BacktestConfig::default());
        let second = run_batch(&jobs, &resolver, &BacktestConfig::default());
        let serial = run_batch(&jobs, &resolver, &sequential());

        for ((a, b), c) in first.iter().zip(&second).zip(&serial) {
            let a = a.result.as_ref().unwrap();
            assert_eq!(a, b.result.as_ref().unwrap());
            assert_eq!(a, c.result.as_ref().unwrap());
        }
    }

    #[test]
    fn aggregate_covers_every_asset() {
        let jobs = vec![
            AssetJob {
                asset: "SOL".into(),
                bars: sideways_spikes(240),
            },
            AssetJob {
                asset: "ADA".into(),
                bars: sideways_spikes(240),
            },
        ];
        let outcomes = run_batch(&jobs, &ProfileResolver::new(), &sequential());
        let trades: Vec<_> = outcomes
            .iter()
            .flat_map(|o| o.result.as_ref().unwrap().trades.iter())
            .collect();
        let aggregate = Summary::aggregate(trades.iter().copied());
        assert_eq!(aggregate.total_trades, 18);
        assert_eq!(aggregate.equity_curve.len(), 19);
    }
}

fn random_bars() -> impl Strategy<Value = Vec<OhlcvBar>> {
    prop::collection::vec((-0.03f64..0.03, 0.0f64..0.01, 200.0f64..5000.0), 60..180).prop_map(
        |steps| {
            let mut close = 100.0;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (ret, wick, volume))| {
                    let open = close;
                    close = open * (1.0 + ret);
                    let mut bar = make_bar(i, open, close);
                    bar.high = open.max(close) * (1.0 + wick);
                    bar.low = open.min(close) * (1.0 - wick);
                    bar.volume = volume;
                    bar
                })
                .collect()
        },
    )
}

fn tier_strategy() -> impl Strategy<Value = VolatilityTier> {
    prop::sample::select(VolatilityTier::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn trades_respect_direction_and_fully_close(bars in random_bars(), tier in tier_strategy()) {
        let result = run_backtest("X", &bars, &profile("X", tier), &BacktestConfig::default()).unwrap();
        let mut last_exit = 0;
        for trade in &result.trades {
            match trade.side {
                Side::Long => prop_assert!(trade.target > trade.entry_price && trade.entry_price > trade.initial_stop),
                Side::Short => prop_assert!(trade.target < trade.entry_price && trade.entry_price < trade.initial_stop),
            }
            prop_assert!((trade.fraction_closed() - 1.0).abs() < 1e-9);
            prop_assert!(trade.exit_index >= trade.entry_index);
            prop_assert!(trade.entry_index >= last_exit);
            last_exit = trade.exit_index;
        }
        prop_assert!(result.stats.corrected + result.stats.rejected <= result.stats.signals);
        prop_assert_eq!(result.signals.len(), result.stats.signals);
    }

    #[test]
    fn summary_stays_in_bounds(bars in random_bars(), tier in tier_strategy()) {
        let result = run_backtest("X", &bars, &profile("X", tier), &BacktestConfig::default()).unwrap();
        let s = result.summary();
        prop_assert_eq!(s.wins + s.losses + s.breakeven, s.total_trades);
        prop_assert!((0.0..=1.0).contains(&s.win_rate));
        prop_assert!((0.0..=1.0).contains(&s.max_drawdown));
        prop_assert!(s.profit_factor >= 0.0);
        prop_assert_eq!(s.equity_curve.len(), s.total_trades + 1);
        let exits: usize = s.exit_reasons.values().sum();
        prop_assert_eq!(exits, s.total_trades);
    }

    #[test]
    fn later_bars_never_change_earlier_decisions(
        bars in random_bars(),
        tier in tier_strategy(),
        cut in 0.3f64..0.9,
    ) {
        let k = ((bars.len() as f64) * cut) as usize;
        let p = profile("X", tier);
        let full = run_backtest("X", &bars, &p, &BacktestConfig::default()).unwrap();
        let prefix = run_backtest("X", &bars[..k], &p, &BacktestConfig::default()).unwrap();

        let early: Vec<_> = full.signals.iter().filter(|s| s.bar_index < k).collect();
        let prefix_signals: Vec<_> = prefix.signals.iter().collect();
        prop_assert_eq!(early, prefix_signals);

        let closed_before = |t: &&tiertrader::domain::position::TradeRecord| t.exit_index + 1 < k;
        let full_closed: Vec<_> = full.trades.iter().filter(closed_before).collect();
        let prefix_closed: Vec<_> = prefix.trades.iter().filter(closed_before).collect();
        prop_assert_eq!(full_closed, prefix_closed);
    }
}
