use crate::models::{Candle, EquityPoint};
use crate::performance::PerformanceMetrics;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const REPORT_FILE: &str = "sample-report.json";
pub const HISTORY_FILE: &str = "backtest-history.jsonl";
pub const EQUITY_CURVE_FILE: &str = "latest-equity-curve.csv";

/// Immutable summary of one backtest run, as persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub run_id: String,
    pub created_at_utc: String,
    pub mode: String,
    pub symbol: String,
    pub timeframe: String,
    pub data_source: String,
    #[serde(default)]
    pub signal_source: String,
    pub predict_horizon: usize,
    pub fee_rate: f64,
    pub initial_balance: f64,
    pub final_equity: f64,
    pub equity_curve_len: usize,
    pub total_return_pct: f64,
    pub buy_hold_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub annualized_sharpe: f64,
    pub calmar_ratio: f64,
    pub closed_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate_pct: f64,
    pub exposure_pct: f64,
    #[serde(default)]
    pub avg_trade_pnl: f64,
    #[serde(default)]
    pub best_trade: f64,
    #[serde(default)]
    pub worst_trade: f64,
    pub model_validation_accuracy: f64,
    pub report_path: String,
}

/// Run descriptors copied verbatim into the report.
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    pub mode: String,
    pub symbol: String,
    pub timeframe: String,
    pub data_source: String,
    pub signal_source: String,
    pub predict_horizon: usize,
    pub fee_rate: f64,
    pub initial_balance: f64,
    pub report_dir: PathBuf,
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

pub fn run_id_for(created_at: DateTime<Utc>) -> String {
    created_at.format("%Y%m%dT%H%M%SZ").to_string()
}

impl Report {
    pub fn build(
        descriptor: &RunDescriptor,
        metrics: &PerformanceMetrics,
        model_accuracy: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: run_id_for(created_at),
            created_at_utc: created_at.to_rfc3339(),
            mode: descriptor.mode.clone(),
            symbol: descriptor.symbol.clone(),
            timeframe: descriptor.timeframe.clone(),
            data_source: descriptor.data_source.clone(),
            signal_source: descriptor.signal_source.clone(),
            predict_horizon: descriptor.predict_horizon,
            fee_rate: descriptor.fee_rate,
            initial_balance: descriptor.initial_balance,
            final_equity: round_to(metrics.final_equity, 2),
            equity_curve_len: metrics.equity_curve_len,
            total_return_pct: round_to(metrics.total_return * 100.0, 2),
            buy_hold_return_pct: round_to(metrics.buy_hold_return * 100.0, 2),
            max_drawdown_pct: round_to(metrics.max_drawdown * 100.0, 2),
            annualized_sharpe: round_to(metrics.annualized_sharpe, 3),
            calmar_ratio: round_to(metrics.calmar_ratio, 3),
            closed_trades: metrics.closed_trades,
            wins: metrics.wins,
            losses: metrics.losses,
            win_rate_pct: round_to(metrics.win_rate * 100.0, 2),
            exposure_pct: round_to(metrics.exposure * 100.0, 2),
            avg_trade_pnl: round_to(metrics.avg_trade_pnl, 2),
            best_trade: round_to(metrics.best_trade, 2),
            worst_trade: round_to(metrics.worst_trade, 2),
            model_validation_accuracy: round_to(model_accuracy, 4),
            report_path: descriptor
                .report_dir
                .join(REPORT_FILE)
                .to_string_lossy()
                .into_owned(),
        }
    }
}

pub fn write_report(report: &Report, report_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(report_dir)
        .with_context(|| format!("failed to create report directory {}", report_dir.display()))?;
    let path = report_dir.join(REPORT_FILE);
    let body = serde_json::to_string_pretty(report).context("failed to serialise report")?;
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub fn append_history(report: &Report, report_dir: &Path) -> Result<()> {
    fs::create_dir_all(report_dir)
        .with_context(|| format!("failed to create report directory {}", report_dir.display()))?;
    let path = report_dir.join(HISTORY_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let line = serde_json::to_string(report).context("failed to serialise report")?;
    writeln!(file, "{}", line).with_context(|| format!("failed to append to {}", path.display()))?;
    Ok(())
}

/// Most recent `limit` runs, newest first. Malformed lines are skipped.
pub fn load_history(report_dir: &Path, limit: usize) -> Result<Vec<Report>> {
    let path = report_dir.join(HISTORY_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    let start = lines.len().saturating_sub(limit);
    let mut reports = Vec::with_capacity(lines.len() - start);
    for (offset, line) in lines[start..].iter().enumerate() {
        match serde_json::from_str::<Report>(line) {
            Ok(report) => reports.push(report),
            Err(err) => warn!(
                "Skipping malformed history line {} in {}: {}",
                start + offset + 1,
                path.display(),
                err
            ),
        }
    }
    reports.reverse();
    Ok(reports)
}

pub fn write_equity_curve(candles: &[Candle], equity_curve: &[f64], report_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(report_dir)
        .with_context(|| format!("failed to create report directory {}", report_dir.display()))?;
    let path = report_dir.join(EQUITY_CURVE_FILE);
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for (candle, equity) in candles.iter().zip(equity_curve) {
        writer.serialize(EquityPoint {
            timestamp: candle.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            equity: *equity,
        })?;
    }
    writer.flush()?;
    Ok(path)
}

/// Last `limit` points of the most recent equity curve.
pub fn load_equity_curve(report_dir: &Path, limit: usize) -> Result<Vec<EquityPoint>> {
    let path = report_dir.join(EQUITY_CURVE_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut points = Vec::new();
    for (offset, row) in reader.deserialize::<EquityPoint>().enumerate() {
        match row {
            Ok(point) if point.equity.is_finite() => points.push(point),
            Ok(_) => {}
            Err(err) => warn!(
                "Skipping malformed equity row {} in {}: {}",
                offset + 2,
                path.display(),
                err
            ),
        }
    }
    let start = points.len().saturating_sub(limit);
    Ok(points.split_off(start))
}
