use thiserror::Error;

/// Errors raised by the backtest core and its data collaborators.
#[derive(Debug, Error, PartialEq)]
pub enum BacktestError {
    #[error("insufficient data: need {required} rows, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("invalid signal {value} at index {index}; expected 0 or 1")]
    InvalidSignal { index: usize, value: i64 },

    #[error("zero close price at bar {index}; cannot size an entry")]
    ZeroPrice { index: usize },

    #[error("no market data rows: {0}")]
    EmptyData(String),

    #[error("unsupported exchange '{0}'")]
    UnsupportedExchange(String),
}

pub type BacktestResult<T> = std::result::Result<T, BacktestError>;
