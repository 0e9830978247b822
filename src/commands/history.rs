use crate::report::{load_history, Report};
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(report_dir: &Path, limit: usize) -> Result<Vec<Report>> {
    let reports = load_history(report_dir, limit)?;
    if reports.is_empty() {
        info!("No backtest history found in {}", report_dir.display());
        return Ok(reports);
    }

    println!(
        "{:<18} {:<10} {:<4} {:<12} {:>12} {:>9} {:>9} {:>8} {:>7}",
        "run_id", "symbol", "tf", "source", "final_eq", "return%", "maxdd%", "sharpe", "trades"
    );
    for report in &reports {
        println!(
            "{:<18} {:<10} {:<4} {:<12} {:>12.2} {:>9.2} {:>9.2} {:>8.3} {:>7}",
            report.run_id,
            report.symbol,
            report.timeframe,
            report.signal_source,
            report.final_equity,
            report.total_return_pct,
            report.max_drawdown_pct,
            report.annualized_sharpe,
            report.closed_trades
        );
    }

    Ok(reports)
}
