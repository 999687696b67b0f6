//! CLI definition and dispatch.

use chrono::Duration;
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::asset_profile::{ProfileResolver, TierParams};
use crate::domain::backtest::{AssetOutcome, BacktestConfig, BacktestResult, run_batch};
use crate::domain::config_validation::{
    validate_backtest_config, validate_indicator_config, validate_tier_overrides,
};
use crate::domain::error::TiertraderError;
use crate::domain::indicator::snapshot::IndicatorConfig;
use crate::domain::metrics::Summary;
use crate::domain::position::ExitReason;
use crate::domain::universe::{load_universe, parse_assets};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "tiertrader",
    about = "Signal-confluence backtester for crypto assets"
)]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over one or more assets
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated assets, overriding [backtest] assets
        #[arg(short, long)]
        asset: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Report directory, overriding [backtest] output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Run assets one after another
        #[arg(long)]
        sequential: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the tier and parameters an asset resolves to
    Profile {
        #[arg(short, long)]
        asset: String,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Observed ATR / close used for unknown assets
        #[arg(long)]
        volatility: Option<f64>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            asset,
            data_dir,
            output,
            sequential,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, asset.as_deref())
            } else {
                run_backtest(
                    &config,
                    asset.as_deref(),
                    data_dir.as_deref(),
                    output.as_deref(),
                    sequential,
                )
            }
        }
        Command::Profile {
            asset,
            config,
            volatility,
        } => run_profile(&asset, config.as_deref(), volatility),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(e: &TiertraderError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, TiertraderError> {
    let indicators = IndicatorConfig::from_config(adapter)?;
    validate_indicator_config(&indicators)?;

    let minutes = adapter.get_int("backtest", "interval_minutes", 0);
    let interval = if minutes > 0 {
        Some(Duration::minutes(minutes))
    } else {
        None
    };

    Ok(BacktestConfig {
        indicators,
        interval,
        parallel: adapter.get_bool("backtest", "parallel", true),
    })
}

pub fn build_resolver(adapter: &dyn ConfigPort) -> Result<ProfileResolver, TiertraderError> {
    let resolver = ProfileResolver::from_config(adapter)?;
    validate_tier_overrides(&resolver)?;
    Ok(resolver)
}

/// Assets from the command line, else from `[backtest] assets`; `None`
/// when neither names any.
pub fn resolve_assets(
    asset_override: Option<&str>,
    adapter: &dyn ConfigPort,
) -> Result<Option<Vec<String>>, TiertraderError> {
    let (list, key) = match asset_override {
        Some(list) => (Some(list.to_string()), "--asset"),
        None => (adapter.get_string("backtest", "assets"), "assets"),
    };
    match list {
        Some(list) if !list.trim().is_empty() => parse_assets(&list)
            .map(Some)
            .map_err(|e| e.into_config_error("backtest", key)),
        _ => Ok(None),
    }
}

pub fn resolve_data_dir(
    dir_override: Option<&Path>,
    adapter: &dyn ConfigPort,
) -> Result<PathBuf, TiertraderError> {
    match dir_override {
        Some(dir) => Ok(dir.to_path_buf()),
        None => adapter
            .get_string("backtest", "data_dir")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| TiertraderError::ConfigMissing {
                section: "backtest".into(),
                key: "data_dir".into(),
            }),
    }
}

fn run_backtest(
    config_path: &Path,
    asset_override: Option<&str>,
    data_dir_override: Option<&Path>,
    output_override: Option<&Path>,
    sequential: bool,
) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Validate config
    if let Err(e) = validate_backtest_config(&adapter) {
        return fail(&e);
    }

    // Stage 3: Build run configuration and tier table
    let mut bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    if sequential {
        bt_config.parallel = false;
    }
    let resolver = match build_resolver(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    // Stage 4: Resolve data source and assets
    let data_dir = match resolve_data_dir(data_dir_override, &adapter) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let data_port = CsvAdapter::new(data_dir);

    let assets = match resolve_assets(asset_override, &adapter) {
        Ok(Some(assets)) => assets,
        Ok(None) => match data_port.list_assets() {
            Ok(assets) => assets,
            Err(e) => return fail(&e),
        },
        Err(e) => return fail(&e),
    };
    if assets.is_empty() {
        eprintln!("error: no assets configured or found");
        return ExitCode::from(2);
    }

    let output_dir = output_override
        .map(|p| p.display().to_string())
        .or_else(|| adapter.get_string("backtest", "output_dir"));

    run_backtest_pipeline(
        &data_port,
        &CsvReportAdapter,
        &resolver,
        &bt_config,
        &assets,
        output_dir.as_deref(),
    )
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    report_port: &dyn ReportPort,
    resolver: &ProfileResolver,
    bt_config: &BacktestConfig,
    assets: &[String],
    output_dir: Option<&str>,
) -> ExitCode {
    // Stage 5: Load bars
    eprintln!("Loading {} assets...", assets.len());
    let universe = load_universe(data_port, assets);

    // Stage 6: Run backtests
    eprintln!(
        "Running backtest: {} assets ({})",
        universe.jobs.len(),
        if bt_config.parallel {
            "parallel"
        } else {
            "sequential"
        }
    );
    let mut outcomes = run_batch(&universe.jobs, resolver, bt_config);
    outcomes.extend(universe.failed);
    outcomes.sort_by_key(|o| assets.iter().position(|a| *a == o.asset));

    // Stage 7: Per-asset summaries
    let mut results: Vec<BacktestResult> = Vec::new();
    let mut first_error: Option<TiertraderError> = None;
    eprintln!("\n=== Per-Asset Summary ===");
    for AssetOutcome { asset, result } in outcomes {
        match result {
            Ok(result) => {
                print_asset_line(&result);
                results.push(result);
            }
            Err(e) => {
                eprintln!("  {}: FAILED ({})", asset, e);
                first_error.get_or_insert(e);
            }
        }
    }

    if results.is_empty() {
        return match first_error {
            Some(e) => fail(&e),
            None => ExitCode::from(5),
        };
    }

    // Stage 8: Aggregate
    let aggregate = Summary::aggregate(results.iter().flat_map(|r| r.trades.iter()));
    print_summary("Aggregate Results", &aggregate);

    // Stage 9: Reports
    if let Some(dir) = output_dir {
        if let Err(e) = report_port.write(&results, &aggregate, dir) {
            return fail(&e);
        }
        eprintln!("\nReports written to: {}", dir);
    }

    ExitCode::SUCCESS
}

fn print_asset_line(result: &BacktestResult) {
    let s = result.summary();
    let sign = if s.total_return_pct >= 0.0 { "+" } else { "" };
    eprintln!(
        "  {} [{}]:  {} trades, {:.1}% win rate, PF {:.2}, {}{:.2}%  (signals {}, corrected {}, rejected {})",
        result.asset,
        result.profile.tier,
        s.total_trades,
        s.win_rate * 100.0,
        s.profit_factor,
        sign,
        s.total_return_pct,
        result.stats.signals,
        result.stats.corrected,
        result.stats.rejected,
    );
}

fn print_summary(title: &str, s: &Summary) {
    eprintln!("\n=== {} ===", title);
    eprintln!("Total Trades:     {}", s.total_trades);
    eprintln!("Win Rate:         {:.1}%", s.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", s.profit_factor);
    eprintln!("Avg Win:          {:.2}%", s.avg_win_pct);
    eprintln!("Avg Loss:         {:.2}%", s.avg_loss_pct);
    eprintln!("Total Return:     {:.2}%", s.total_return_pct);
    eprintln!("Max Drawdown:     -{:.1}%", s.max_drawdown * 100.0);
    eprintln!("Drawdown Trades:  {}", s.max_drawdown_trades);
    eprintln!("Avg Bars Held:    {:.1}", s.avg_bars_held);
    eprintln!("Exit Reasons:");
    for reason in ExitReason::ALL {
        eprintln!("  {:<14}{}", reason.to_string(), s.exit_count(reason));
    }
}

fn print_params(params: &TierParams) {
    eprintln!(
        "  rsi:         oversold {} / overbought {}",
        params.rsi_oversold, params.rsi_overbought
    );
    eprintln!(
        "  volume:      multiplier {} / spike {}",
        params.volume_multiplier, params.volume_spike
    );
    eprintln!(
        "  risk:        stop {}xATR / target {}xATR",
        params.stop_atr_mult, params.target_atr_mult
    );
    eprintln!(
        "  exits:       partial {:.0}%, trail after {:.2}% by {:.2}%, max {} bars",
        params.partial_fraction * 100.0,
        params.trailing_activation * 100.0,
        params.trailing_step * 100.0,
        params.max_holding_bars
    );
    eprintln!(
        "  gates:       score >= {}, confidence >= {}, confirming >= {}",
        params.min_score, params.min_confidence, params.min_confirming
    );
    let strategies: Vec<String> = params.strategies.iter().map(|s| s.to_string()).collect();
    eprintln!("  strategies:  {}", strategies.join(", "));
    if let Some(table) = params.regime {
        eprintln!(
            "  regimes:     ranging {}/{}, trending {}/{}, volatile {}/{}",
            table.ranging.stop,
            table.ranging.target,
            table.trending.stop,
            table.trending.target,
            table.volatile.stop,
            table.volatile.target
        );
    }
}

pub fn run_dry_run(config_path: &Path, asset_override: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&adapter) {
        return fail(&e);
    }
    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let resolver = match build_resolver(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    eprintln!("Config validated successfully");

    let ind = &bt_config.indicators;
    eprintln!("\nIndicators:");
    eprintln!(
        "  rsi {}, ema {}/{}/{}, bollinger {}, atr {} (mean {}), volume {}, channel {}",
        ind.rsi_period,
        ind.ema_fast,
        ind.ema_slow,
        ind.ema_trend,
        ind.bollinger_period,
        ind.atr_period,
        ind.atr_mean_period,
        ind.volume_period,
        ind.channel_period
    );
    eprintln!("  warmup: {} bars", ind.required_history());

    eprintln!("\nUniverse:");
    match resolve_assets(asset_override, &adapter) {
        Ok(Some(assets)) => {
            for asset in &assets {
                eprintln!("  {}: {}", asset, resolver.classify(asset, None));
            }
        }
        Ok(None) => eprintln!("  all assets in data_dir"),
        Err(e) => return fail(&e),
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_profile(asset: &str, config_path: Option<&Path>, volatility: Option<f64>) -> ExitCode {
    let resolver = match config_path {
        Some(path) => {
            let adapter = match load_config(path) {
                Ok(a) => a,
                Err(code) => return code,
            };
            match build_resolver(&adapter) {
                Ok(r) => r,
                Err(e) => return fail(&e),
            }
        }
        None => ProfileResolver::new(),
    };

    let profile = resolver.resolve(asset, volatility);
    println!("{} {}", profile.asset, profile.tier);
    eprintln!("Tier parameters ({}):", profile.tier.section());
    print_params(&profile.params);
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&adapter) {
        return fail(&e);
    }
    if let Err(e) = build_backtest_config(&adapter) {
        return fail(&e);
    }
    let resolver = match build_resolver(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    if let Err(e) = resolve_assets(None, &adapter) {
        return fail(&e);
    }

    for tier in crate::domain::asset_profile::VolatilityTier::ALL {
        eprintln!("\n[{}]", tier.section());
        print_params(&resolver.params(tier));
    }

    eprintln!("\nConfiguration is valid");
    ExitCode::SUCCESS
}
