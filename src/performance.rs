use crate::models::SimulationResult;
use statrs::statistics::Statistics;

/// Unrounded metrics for one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    pub final_equity: f64,
    pub total_return: f64,
    pub buy_hold_return: f64,
    pub max_drawdown: f64,
    pub annualized_sharpe: f64,
    pub calmar_ratio: f64,
    pub closed_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub exposure: f64,
    pub avg_trade_pnl: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub equity_curve_len: usize,
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate_performance(
        simulation: &SimulationResult,
        initial_balance: f64,
        closes: &[f64],
        periods_per_year: u32,
    ) -> PerformanceMetrics {
        let equity_curve = &simulation.equity_curve;
        let total_return = Self::calculate_total_return(simulation.final_equity, initial_balance);
        let max_drawdown = Self::calculate_max_drawdown(equity_curve);
        let calmar_ratio = Self::calculate_calmar_ratio(total_return, max_drawdown);

        let win_rate = if simulation.closed_trades > 0 {
            simulation.wins as f64 / simulation.closed_trades as f64
        } else {
            0.0
        };
        let exposure = if closes.is_empty() {
            0.0
        } else {
            simulation.bars_in_position as f64 / closes.len() as f64
        };

        let pnls = &simulation.closed_trade_pnls;
        let avg_trade_pnl = if pnls.is_empty() {
            0.0
        } else {
            pnls.iter().sum::<f64>() / pnls.len() as f64
        };
        let best_trade = pnls.iter().copied().reduce(f64::max).unwrap_or(0.0);
        let worst_trade = pnls.iter().copied().reduce(f64::min).unwrap_or(0.0);

        PerformanceMetrics {
            final_equity: simulation.final_equity,
            total_return,
            buy_hold_return: Self::calculate_buy_hold_return(closes),
            max_drawdown,
            annualized_sharpe: Self::calculate_sharpe_ratio(equity_curve, periods_per_year),
            calmar_ratio,
            closed_trades: simulation.closed_trades,
            wins: simulation.wins,
            losses: simulation.losses,
            win_rate,
            exposure,
            avg_trade_pnl,
            best_trade,
            worst_trade,
            equity_curve_len: equity_curve.len(),
        }
    }

    pub fn calculate_total_return(final_equity: f64, initial_balance: f64) -> f64 {
        if initial_balance == 0.0 {
            return 0.0;
        }
        final_equity / initial_balance - 1.0
    }

    pub fn calculate_buy_hold_return(closes: &[f64]) -> f64 {
        match (closes.first(), closes.last()) {
            (Some(first), Some(last)) if closes.len() > 1 => last / first - 1.0,
            _ => 0.0,
        }
    }

    /// Deepest relative dip below the running peak, as a value <= 0.
    pub fn calculate_max_drawdown(equity_curve: &[f64]) -> f64 {
        let Some(&first) = equity_curve.first() else {
            return 0.0;
        };

        let mut peak = first;
        let mut max_drawdown = 0.0_f64;
        for &equity in equity_curve {
            if equity > peak {
                peak = equity;
            }
            if peak <= 0.0 {
                continue;
            }
            let drawdown = (equity - peak) / peak;
            if drawdown < max_drawdown {
                max_drawdown = drawdown;
            }
        }

        max_drawdown
    }

    /// Per-step simple returns. A zero starting value divides by 1 instead.
    pub fn step_returns(equity_curve: &[f64]) -> Vec<f64> {
        equity_curve
            .windows(2)
            .map(|window| {
                let prev_value = window[0];
                let divisor = if prev_value == 0.0 { 1.0 } else { prev_value };
                (window[1] - prev_value) / divisor
            })
            .collect()
    }

    pub fn calculate_sharpe_ratio(equity_curve: &[f64], periods_per_year: u32) -> f64 {
        let returns = Self::step_returns(equity_curve);
        if returns.len() < 2 {
            return 0.0;
        }

        let std_dev = returns.iter().population_std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }
        let mean_return = returns.iter().mean();

        (periods_per_year as f64).sqrt() * (mean_return / std_dev)
    }

    pub fn calculate_calmar_ratio(total_return: f64, max_drawdown: f64) -> f64 {
        if max_drawdown < 0.0 {
            total_return / max_drawdown.abs()
        } else {
            0.0
        }
    }
}
