use crate::config::{BotConfig, DataMode};
use crate::error::BacktestError;
use crate::features::prepare_dataset;
use crate::market_data::{load_csv, ExchangeClient, DEFAULT_SAMPLE_DATA_FILE};
use crate::models::Candle;
use crate::performance::PerformanceCalculator;
use crate::report::{append_history, write_equity_curve, write_report, Report, RunDescriptor};
use crate::simulator::PositionSimulator;
use crate::strategy::{create_signal_source, validate_rule, SignalSource, MIN_TRAINING_ROWS};
use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

async fn load_market_data(config: &BotConfig) -> Result<(Vec<Candle>, String)> {
    match config.data_mode {
        DataMode::Exchange => {
            let client = ExchangeClient::new(&config.exchange_name)?;
            let candles = client
                .fetch_ohlcv(&config.symbol, &config.timeframe, config.limit)
                .await?;
            Ok((candles, format!("{} live OHLCV", client.exchange_name())))
        }
        DataMode::Sample => {
            let path = config
                .data_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SAMPLE_DATA_FILE));
            let candles = load_csv(&path)?;
            Ok((candles, format!("sample csv ({})", path.display())))
        }
    }
}

fn save_model(source: &dyn SignalSource, path: &Path) -> Result<()> {
    let Some(state) = source.snapshot_state() else {
        warn!(
            "Signal source {} has no trainable state; skipping model save",
            source.name()
        );
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(&state).context("failed to serialise model")?;
    fs::write(path, body).with_context(|| format!("failed to write model to {}", path.display()))?;
    info!("Saved {} model to {}", source.name(), path.display());
    Ok(())
}

/// Restores saved model state. Returns false when there is no file to load.
fn load_model(source: &mut dyn SignalSource, path: &Path) -> Result<bool> {
    if !path.exists() {
        warn!(
            "No saved model at {}; training {} from scratch",
            path.display(),
            source.name()
        );
        return Ok(false);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read model from {}", path.display()))?;
    let state: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid model file {}", path.display()))?;
    let name = source.name().to_string();
    source
        .restore_state(&state)
        .with_context(|| format!("failed to restore {} model from {}", name, path.display()))?;
    info!("Loaded {} model from {}", name, path.display());
    Ok(true)
}

/// Loads data, fits the signal source, simulates, and persists the report.
pub async fn run(config: &BotConfig) -> Result<Report> {
    config.validate()?;

    let (candles, data_source) = load_market_data(config).await?;
    info!("Using {} with {} bars", data_source, candles.len());

    let dataset = prepare_dataset(&candles, config.predict_horizon);
    if dataset.len() < MIN_TRAINING_ROWS {
        return Err(BacktestError::InsufficientData {
            required: MIN_TRAINING_ROWS,
            available: dataset.len(),
        })
        .context("not enough rows left after indicator warm-up");
    }
    info!(
        "Prepared {} feature rows (horizon {})",
        dataset.len(),
        config.predict_horizon
    );

    let mut source = create_signal_source(&config.signal_source, &config.signal_params)?;
    let restored = config.load_model && load_model(&mut *source, &config.model_path)?;
    let accuracy = if restored {
        validate_rule(&*source, &dataset.features, &dataset.labels)?
    } else {
        source.train(&dataset.features, &dataset.labels)?
    };
    info!("Validation accuracy ({}): {:.4}", source.name(), accuracy);
    let signals = source.predict(&dataset.features);

    info!("Position sizing: {}", config.position_sizing.label());
    let closes = dataset.closes();
    let simulation = PositionSimulator::new(config.fee_rate, config.initial_balance)
        .with_sizing(config.position_sizing)
        .run(&closes, &signals)?;

    if config.save_model {
        save_model(source.as_ref(), &config.model_path)?;
    }

    let metrics = PerformanceCalculator::calculate_performance(
        &simulation,
        config.initial_balance,
        &closes,
        config.periods_per_year(),
    );

    write_equity_curve(&dataset.candles, &simulation.equity_curve, &config.report_dir)?;
    let descriptor = RunDescriptor {
        mode: config.mode.clone(),
        symbol: config.symbol.clone(),
        timeframe: config.timeframe.clone(),
        data_source,
        signal_source: source.name().to_string(),
        predict_horizon: config.predict_horizon,
        fee_rate: config.fee_rate,
        initial_balance: config.initial_balance,
        report_dir: config.report_dir.clone(),
    };
    let report = Report::build(&descriptor, &metrics, accuracy, Utc::now());
    let report_path = write_report(&report, &config.report_dir)?;
    append_history(&report, &config.report_dir)?;

    info!("Backtest complete");
    info!("- Report: {}", report_path.display());
    info!("- Final equity: {}", report.final_equity);
    info!("- Return: {}%", report.total_return_pct);
    info!("- Max drawdown: {}%", report.max_drawdown_pct);
    info!("- Sharpe: {}", report.annualized_sharpe);

    Ok(report)
}
