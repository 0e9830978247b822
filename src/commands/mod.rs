pub mod backtest;
pub mod history;
