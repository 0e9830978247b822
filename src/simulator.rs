use crate::error::{BacktestError, BacktestResult};
use crate::models::{Signal, SimulationResult};
use crate::position_sizing::{PositionSizing, PositionSizingOutcome};
use log::debug;

/// Mutable ledger for a single run. Created fresh by every `run` call.
#[derive(Debug, Clone, Default)]
struct SimulationState {
    cash: f64,
    position_quantity: f64,
    entry_value: f64,
    bars_in_position: usize,
    closed_trade_pnls: Vec<f64>,
}

impl SimulationState {
    fn new(initial_balance: f64) -> Self {
        Self {
            cash: initial_balance,
            ..Self::default()
        }
    }

    fn in_position(&self) -> bool {
        self.position_quantity > 0.0
    }

    fn close_position(&mut self, price: f64, fee_rate: f64) -> f64 {
        let proceeds = self.position_quantity * price * (1.0 - fee_rate);
        let pnl = proceeds - self.entry_value;
        self.closed_trade_pnls.push(pnl);
        self.cash += proceeds;
        self.position_quantity = 0.0;
        self.entry_value = 0.0;
        pnl
    }

    fn equity(&self, price: f64) -> f64 {
        self.cash + self.position_quantity * price
    }
}

/// Long/flat position simulator over aligned close prices and signals.
///
/// Bars must be chronological and signals aligned to the same index; neither
/// is checked here. Signals shorter than the price series are padded as flat.
#[derive(Debug, Clone)]
pub struct PositionSimulator {
    pub fee_rate: f64,
    pub initial_balance: f64,
    pub sizing: PositionSizing,
}

impl PositionSimulator {
    pub fn new(fee_rate: f64, initial_balance: f64) -> Self {
        Self {
            fee_rate,
            initial_balance,
            sizing: PositionSizing::FullBalance,
        }
    }

    pub fn with_sizing(mut self, sizing: PositionSizing) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn run(&self, closes: &[f64], signals: &[Signal]) -> BacktestResult<SimulationResult> {
        let mut state = SimulationState::new(self.initial_balance);
        let mut equity_curve = Vec::with_capacity(closes.len());

        for (index, &price) in closes.iter().enumerate() {
            let signal = signals.get(index).copied().unwrap_or(Signal::Flat);

            if signal == Signal::Long && !state.in_position() && state.cash > 0.0 {
                if price == 0.0 {
                    return Err(BacktestError::ZeroPrice { index });
                }
                if let PositionSizingOutcome::Sized(allocation) =
                    self.sizing.allocate(state.cash, price, self.fee_rate)
                {
                    state.cash -= allocation.committed;
                    state.position_quantity = allocation.quantity;
                    state.entry_value = allocation.committed;
                }
            } else if signal == Signal::Flat && state.in_position() {
                let pnl = state.close_position(price, self.fee_rate);
                debug!("Closed position at bar {} price {} pnl {}", index, price, pnl);
            }

            if state.in_position() {
                state.bars_in_position += 1;
            }

            equity_curve.push(state.equity(price));
        }

        if state.in_position() {
            if let (Some(&final_price), Some(last)) = (closes.last(), equity_curve.last_mut()) {
                let pnl = state.close_position(final_price, self.fee_rate);
                debug!("Force-closed open position at series end, pnl {}", pnl);
                *last = state.cash;
            }
        }

        let wins = state.closed_trade_pnls.iter().filter(|&&pnl| pnl > 0.0).count();
        let losses = state.closed_trade_pnls.len() - wins;

        Ok(SimulationResult {
            equity_curve,
            final_equity: state.cash,
            closed_trades: state.closed_trade_pnls.len(),
            wins,
            losses,
            bars_in_position: state.bars_in_position,
            closed_trade_pnls: state.closed_trade_pnls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::signals_from_raw;

    fn signals(raw: &[i64]) -> Vec<Signal> {
        signals_from_raw(raw).unwrap()
    }

    #[test]
    fn all_flat_signals_leave_balance_untouched() {
        let closes = vec![100.0, 95.0, 130.0, 80.0];
        let result = PositionSimulator::new(0.001, 1000.0)
            .run(&closes, &signals(&[0, 0, 0, 0]))
            .unwrap();

        assert_eq!(result.closed_trades, 0);
        assert_eq!(result.final_equity, 1000.0);
        assert!(result.equity_curve.iter().all(|&value| value == 1000.0));
        assert_eq!(result.bars_in_position, 0);
    }

    #[test]
    fn always_long_force_closes_at_last_bar() {
        let closes = vec![100.0, 110.0, 121.0];
        let result = PositionSimulator::new(0.0, 1000.0)
            .run(&closes, &signals(&[1, 1, 1]))
            .unwrap();

        assert_eq!(result.equity_curve.len(), 3);
        assert!((result.equity_curve[0] - 1000.0).abs() < 1e-9);
        assert!((result.equity_curve[1] - 1100.0).abs() < 1e-9);
        assert!((result.equity_curve[2] - 1210.0).abs() < 1e-9);
        assert!((result.final_equity - 1210.0).abs() < 1e-9);
        assert_eq!(result.closed_trades, 1);
        assert!((result.closed_trade_pnls[0] - 210.0).abs() < 1e-9);
        assert_eq!(result.wins, 1);
        assert_eq!(result.bars_in_position, 3);
    }

    #[test]
    fn fees_are_charged_on_entry_and_exit() {
        let closes = vec![100.0, 110.0, 121.0];
        let result = PositionSimulator::new(0.01, 1000.0)
            .run(&closes, &signals(&[1, 1, 1]))
            .unwrap();

        let quantity: f64 = 1000.0 * (1.0 - 0.01) / 100.0;
        assert!((quantity - 9.9).abs() < 1e-12);
        let expected = quantity * 121.0 * (1.0 - 0.01);
        assert!((result.final_equity - expected).abs() < 1e-6);
        assert!((result.closed_trade_pnls[0] - (expected - 1000.0)).abs() < 1e-6);
        assert!((result.equity_curve[1] - quantity * 110.0).abs() < 1e-6);
        assert_eq!(result.equity_curve.len(), 3);
    }

    #[test]
    fn signal_flip_closes_and_reopens() {
        let closes = vec![100.0, 120.0, 90.0, 100.0, 80.0];
        let result = PositionSimulator::new(0.0, 1000.0)
            .run(&closes, &signals(&[1, 0, 1, 0, 0]))
            .unwrap();

        assert_eq!(result.closed_trades, 2);
        assert!((result.closed_trade_pnls[0] - 200.0).abs() < 1e-9);
        // Re-entry at 90 with 1200 cash, exit at 100.
        assert!((result.closed_trade_pnls[1] - (1200.0 / 90.0 * 100.0 - 1200.0)).abs() < 1e-9);
        assert_eq!(result.bars_in_position, 2);
        assert_eq!(result.equity_curve[1], 1200.0);
        assert!((result.final_equity - result.equity_curve[4]).abs() < 1e-9);
        assert_eq!(result.wins + result.losses, result.closed_trades);
    }

    #[test]
    fn short_signal_series_is_padded_flat() {
        let closes = vec![100.0, 150.0, 200.0, 50.0];
        let result = PositionSimulator::new(0.0, 1000.0)
            .run(&closes, &signals(&[1, 1]))
            .unwrap();

        // Flat from bar 2 onward, so the exit happens at 200 and the drop to 50 is avoided.
        assert_eq!(result.closed_trades, 1);
        assert!((result.final_equity - 2000.0).abs() < 1e-9);
        assert_eq!(result.equity_curve.len(), 4);
        assert!((result.equity_curve[3] - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn zero_pnl_trade_counts_as_loss() {
        let closes = vec![100.0, 100.0, 100.0];
        let result = PositionSimulator::new(0.0, 1000.0)
            .run(&closes, &signals(&[1, 0, 0]))
            .unwrap();

        assert_eq!(result.closed_trades, 1);
        assert_eq!(result.closed_trade_pnls[0], 0.0);
        assert_eq!(result.wins, 0);
        assert_eq!(result.losses, 1);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let closes = vec![10.0, 11.5, 9.75, 12.25, 12.0, 8.5, 13.0];
        let raw = signals(&[1, 0, 1, 1, 0, 1, 1]);
        let simulator = PositionSimulator::new(0.0025, 5000.0);
        let first = simulator.run(&closes, &raw).unwrap();
        let second = simulator.run(&closes, &raw).unwrap();

        assert_eq!(first, second);
        let first_bits: Vec<u64> = first.equity_curve.iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.equity_curve.iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn zero_price_entry_is_an_error() {
        let closes = vec![100.0, 0.0];
        let err = PositionSimulator::new(0.0, 1000.0)
            .run(&closes, &signals(&[0, 1]))
            .unwrap_err();
        assert_eq!(err, BacktestError::ZeroPrice { index: 1 });
    }

    #[test]
    fn empty_series_produces_empty_curve() {
        let result = PositionSimulator::new(0.0, 1000.0).run(&[], &[]).unwrap();
        assert!(result.equity_curve.is_empty());
        assert_eq!(result.final_equity, 1000.0);
        assert_eq!(result.closed_trades, 0);
    }

    #[test]
    fn fractional_sizing_keeps_reserve_cash() {
        let closes = vec![100.0, 200.0];
        let result = PositionSimulator::new(0.0, 1000.0)
            .with_sizing(PositionSizing::FixedFraction(0.5))
            .run(&closes, &signals(&[1, 1]))
            .unwrap();

        assert!((result.equity_curve[0] - 1000.0).abs() < 1e-9);
        assert!((result.final_equity - 1500.0).abs() < 1e-9);
        assert!((result.closed_trade_pnls[0] - 500.0).abs() < 1e-9);
    }
}
