pub mod commands;
pub mod config;
pub mod error;
pub mod features;
pub mod indicators;
pub mod market_data;
pub mod models;
pub mod param_utils;
pub mod performance;
pub mod position_sizing;
pub mod report;
pub(crate) mod retry;
pub mod simulator;
pub mod strategy;
