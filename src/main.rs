use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use signal_backtester::{
    commands::{backtest, history},
    config::{BotConfig, DataMode},
};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "signal-backtester")]
#[command(about = "Backtest a long/flat trading signal against historical price bars")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest and write the report, history line, and equity curve
    Backtest(BacktestArgs),
    /// Show the most recent backtest runs
    History {
        /// Directory holding backtest-history.jsonl
        #[arg(long = "report-dir", value_name = "PATH")]
        report_dir: Option<PathBuf>,
        /// Number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(clap::Args)]
struct BacktestArgs {
    /// JSON config file (defaults to config/bot.config.json when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Run mode; only `backtest` is implemented
    #[arg(long)]
    mode: Option<String>,
    #[arg(long)]
    symbol: Option<String>,
    #[arg(long)]
    timeframe: Option<String>,
    /// Bars ahead used to label the training target
    #[arg(long = "predict-horizon")]
    predict_horizon: Option<usize>,
    /// Proportional fee charged on entry and exit notional
    #[arg(long = "fee-rate")]
    fee_rate: Option<f64>,
    #[arg(long = "initial-balance")]
    initial_balance: Option<f64>,
    #[arg(long = "report-dir", value_name = "PATH")]
    report_dir: Option<PathBuf>,
    /// Signal source: random_forest, logistic, trend, or buy_and_hold
    #[arg(long = "signal-source")]
    signal_source: Option<String>,
    #[arg(long = "data-mode", value_enum)]
    data_mode: Option<DataMode>,
    /// CSV file used in sample mode
    #[arg(long = "data-path", value_name = "PATH")]
    data_path: Option<PathBuf>,
    #[arg(long = "exchange-name")]
    exchange_name: Option<String>,
    /// Number of bars requested from the exchange
    #[arg(long)]
    limit: Option<usize>,
    /// Persist the fitted signal model
    #[arg(long = "save-model")]
    save_model: bool,
    /// Restore the signal model from --model-path instead of training it
    #[arg(long = "load-model")]
    load_model: bool,
    #[arg(long = "model-path", value_name = "PATH")]
    model_path: Option<PathBuf>,
}

impl BacktestArgs {
    fn apply(self, config: &mut BotConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(symbol) = self.symbol {
            config.symbol = symbol;
        }
        if let Some(timeframe) = self.timeframe {
            config.timeframe = timeframe;
        }
        if let Some(predict_horizon) = self.predict_horizon {
            config.predict_horizon = predict_horizon;
        }
        if let Some(fee_rate) = self.fee_rate {
            config.fee_rate = fee_rate;
        }
        if let Some(initial_balance) = self.initial_balance {
            config.initial_balance = initial_balance;
        }
        if let Some(report_dir) = self.report_dir {
            config.report_dir = report_dir;
        }
        if let Some(signal_source) = self.signal_source {
            config.signal_source = signal_source;
        }
        if let Some(data_mode) = self.data_mode {
            config.data_mode = data_mode;
        }
        if self.data_path.is_some() {
            config.data_path = self.data_path;
        }
        if let Some(exchange_name) = self.exchange_name {
            config.exchange_name = exchange_name;
        }
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if self.save_model {
            config.save_model = true;
        }
        if self.load_model {
            config.load_model = true;
        }
        if let Some(model_path) = self.model_path {
            config.model_path = model_path;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let env_vars: HashMap<String, String> = env::vars().collect();

    match cli.command {
        Commands::Backtest(args) => {
            let mut config = BotConfig::load(args.config.as_deref())?;
            config.apply_env_overrides(&env_vars);
            args.apply(&mut config);

            if config.mode != "backtest" {
                warn!("Only backtest mode is implemented (requested: {})", config.mode);
                return Ok(());
            }
            backtest::run(&config).await?;
        }
        Commands::History { report_dir, limit } => {
            let report_dir = match report_dir {
                Some(dir) => dir,
                None => {
                    let mut config = BotConfig::load(None)?;
                    config.apply_env_overrides(&env_vars);
                    config.report_dir
                }
            };
            let reports = history::run(&report_dir, limit)?;
            info!("Listed {} run(s)", reports.len());
        }
    }

    Ok(())
}
