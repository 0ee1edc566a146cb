//! Daily market technical report: RSI and volume analysis, candlestick charts
//! and a condensed summary delivered to a Telegram chat.

pub mod analysis;
pub mod chart;
pub mod config;
pub mod errors;
pub mod indicators;
pub mod market_data;
pub mod notifier;
pub mod report;
pub mod series;
