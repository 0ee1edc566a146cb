use std::fmt;

use ta::Next;
use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};

use crate::errors::IndicatorError;
use crate::series::PriceSeries;

pub const RSI_PERIOD: usize = 14;
pub const VOL_PERIOD: usize = 20;
/// Absolute deviation from the volume baseline, in percent, that counts as anomalous.
pub const VOLUME_THRESHOLD_PCT: f64 = 30.0;
pub const OVERBOUGHT: f64 = 70.0;
pub const OVERSOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    Normal,
    High,
    Low,
    Unavailable,
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VolumeState::Normal => "NORMAL",
            VolumeState::High => "HIGH",
            VolumeState::Low => "LOW",
            VolumeState::Unavailable => "UNAVAILABLE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeAnalysis {
    pub volume_today: u64,
    /// `None` when the baseline is zero or undefined.
    pub pct_change: Option<f64>,
    pub state: VolumeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiZone {
    Overbought,
    Oversold,
    Neutral,
}

pub fn classify_rsi(rsi: f64) -> RsiZone {
    if rsi > OVERBOUGHT {
        RsiZone::Overbought
    } else if rsi < OVERSOLD {
        RsiZone::Oversold
    } else {
        RsiZone::Neutral
    }
}

/// Relative Strength Index of the most recent bar.
///
/// Gains and losses are smoothed with a recursive exponential average
/// (`alpha = 1 / period`) seeded from the first delta, without the warm-up
/// averaging of the textbook Wilder RSI. The 70/30 thresholds are tuned to
/// this variant.
pub fn compute_rsi(series: &PriceSeries, period: usize) -> Result<f64, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod(period));
    }
    let needed = period + 1;
    if series.len() < needed {
        return Err(IndicatorError::InsufficientData {
            needed,
            got: series.len(),
        });
    }

    // ta's EMA uses k = 2 / (n + 1); n = 2 * period - 1 gives k = 1 / period.
    let ema_len = 2 * period - 1;
    let mut gain_ema =
        ExponentialMovingAverage::new(ema_len).map_err(|_| IndicatorError::InvalidPeriod(period))?;
    let mut loss_ema =
        ExponentialMovingAverage::new(ema_len).map_err(|_| IndicatorError::InvalidPeriod(period))?;

    let closes: Vec<f64> = series.closes().collect();
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for pair in closes.windows(2) {
        let delta = pair[1] - pair[0];
        avg_gain = gain_ema.next(delta.max(0.0));
        avg_loss = loss_ema.next((-delta).max(0.0));
    }

    rsi_from_averages(avg_gain, avg_loss)
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Result<f64, IndicatorError> {
    if !avg_gain.is_finite() || !avg_loss.is_finite() {
        return Err(IndicatorError::NonFinite);
    }
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return Err(IndicatorError::Undefined);
        }
        return Ok(100.0);
    }
    let rs = avg_gain / avg_loss;
    Ok(100.0 - 100.0 / (1.0 + rs))
}

/// Compares the last bar's volume with the mean of the `period` bars before it.
pub fn analyze_volume(series: &PriceSeries, period: usize) -> Result<VolumeAnalysis, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod(period));
    }
    let needed = period + 1;
    let (today, history) = match series.bars().split_last() {
        Some(split) if series.len() >= needed => split,
        _ => {
            return Err(IndicatorError::InsufficientData {
                needed,
                got: series.len(),
            });
        }
    };

    let mut sma =
        SimpleMovingAverage::new(period).map_err(|_| IndicatorError::InvalidPeriod(period))?;
    let baseline = history
        .iter()
        .fold(f64::NAN, |_, bar| sma.next(bar.volume as f64));

    Ok(classify_volume(today.volume, baseline))
}

pub fn classify_volume(volume_today: u64, baseline: f64) -> VolumeAnalysis {
    if !baseline.is_finite() || baseline == 0.0 {
        return VolumeAnalysis {
            volume_today,
            pct_change: None,
            state: VolumeState::Unavailable,
        };
    }

    let pct_change = (volume_today as f64 - baseline) * 100.0 / baseline;
    let state = if pct_change.abs() > VOLUME_THRESHOLD_PCT {
        if pct_change > 0.0 {
            VolumeState::High
        } else {
            VolumeState::Low
        }
    } else {
        VolumeState::Normal
    };

    VolumeAnalysis {
        volume_today,
        pct_change: Some(pct_change),
        state,
    }
}
