//! This module contains the core report pipeline logic.

use anyhow::Result;

use crate::chart::{CandlestickRenderer, ChartRenderer};
use crate::config::{AppConfig, Instrument};
use crate::errors::{ChartError, IndicatorError, ReportError};
use crate::indicators::{RSI_PERIOD, VOL_PERIOD, analyze_volume, compute_rsi};
use crate::market_data::{DAILY_INTERVAL, LOOKBACK_PERIOD, PriceSeriesProvider, YahooProvider};
use crate::notifier::{Notifier, TelegramNotifier};
use crate::report::{
    Report, ReportLine, STATUS_FINISHED, STATUS_IN_PROGRESS, STATUS_STARTING, Summary,
    chart_caption, chart_error_message, chart_title,
};
use crate::series::PriceSeries;

/// Bars a series needs before a summary line is computed from it.
pub const MIN_SUMMARY_BARS: usize =
    (if RSI_PERIOD > VOL_PERIOD { RSI_PERIOD } else { VOL_PERIOD }) + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartOutcome {
    Sent,
    /// The provider had no data for the instrument.
    Skipped,
    Failed,
}

/// What one run produced, in watchlist order.
#[derive(Debug)]
pub struct RunSummary {
    pub charts: Vec<ChartOutcome>,
    pub report: Report,
}

impl RunSummary {
    pub fn charts_sent(&self) -> usize {
        self.charts.iter().filter(|c| **c == ChartOutcome::Sent).count()
    }

    pub fn failed_lines(&self) -> usize {
        self.report.lines().iter().filter(|l| l.is_failed()).count()
    }
}

pub struct ReportPipeline<'a> {
    provider: &'a dyn PriceSeriesProvider,
    renderer: &'a dyn ChartRenderer,
    notifier: &'a dyn Notifier,
}

impl<'a> ReportPipeline<'a> {
    pub fn new(
        provider: &'a dyn PriceSeriesProvider,
        renderer: &'a dyn ChartRenderer,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            provider,
            renderer,
            notifier,
        }
    }

    /// Runs both phases over the watchlist:
    /// 1. Fetches each instrument once and publishes its chart.
    /// 2. Builds one summary line per instrument from the same series.
    /// 3. Sends the assembled report.
    ///
    /// A failing instrument never stops the others; it shows up as an error
    /// notification (charts) or an error line (summary).
    pub async fn run(&self, watchlist: &[Instrument]) -> RunSummary {
        self.notifier.send_text(STATUS_STARTING).await;

        let mut fetched = Vec::with_capacity(watchlist.len());
        let mut charts = Vec::with_capacity(watchlist.len());
        for instrument in watchlist {
            let series = self.fetch(instrument).await;
            charts.push(self.publish_chart(instrument, &series).await);
            fetched.push(series);
        }

        self.notifier.send_text(STATUS_IN_PROGRESS).await;

        let results: Vec<Result<ReportLine, ReportError>> = watchlist
            .iter()
            .zip(fetched)
            .map(|(instrument, series)| series.and_then(|s| summarize(instrument, &s)))
            .collect();

        let lines = watchlist
            .iter()
            .zip(results)
            .map(|(instrument, result)| {
                result.unwrap_or_else(|e| {
                    tracing::error!(symbol = %instrument.symbol, error = %e, "summary failed");
                    ReportLine::failed(instrument, &e)
                })
            })
            .collect();

        let report = Report::new(lines);
        self.notifier.send_text(&report.render()).await;
        self.notifier.send_text(STATUS_FINISHED).await;

        RunSummary { charts, report }
    }

    async fn fetch(&self, instrument: &Instrument) -> Result<PriceSeries, ReportError> {
        let series = self
            .provider
            .fetch(&instrument.symbol, LOOKBACK_PERIOD, DAILY_INTERVAL)
            .await?;
        tracing::debug!(symbol = %instrument.symbol, bars = series.len(), "series ready");
        Ok(series)
    }

    async fn publish_chart(
        &self,
        instrument: &Instrument,
        fetched: &Result<PriceSeries, ReportError>,
    ) -> ChartOutcome {
        let symbol = instrument.symbol.as_str();
        let series = match fetched {
            Ok(series) if series.is_empty() => {
                tracing::info!(symbol, "empty series, chart skipped");
                return ChartOutcome::Skipped;
            }
            Ok(series) => series,
            Err(e) => {
                tracing::error!(symbol, error = %e, "no chart");
                self.notifier
                    .send_text(&chart_error_message(instrument, e))
                    .await;
                return ChartOutcome::Failed;
            }
        };

        match self.renderer.render(series, &chart_title(instrument)) {
            Ok(image) => {
                self.notifier
                    .send_image(image, &chart_caption(instrument))
                    .await;
                tracing::info!(symbol, "chart sent");
                ChartOutcome::Sent
            }
            Err(ChartError::EmptySeries) => ChartOutcome::Skipped,
            Err(e) => {
                let e = ReportError::Render(e);
                tracing::error!(symbol, error = %e, "chart failed");
                self.notifier
                    .send_text(&chart_error_message(instrument, &e))
                    .await;
                ChartOutcome::Failed
            }
        }
    }
}

/// One summary line, or the fixed insufficient-data line for short series.
///
/// A flat series keeps its computed line with the RSI shown as `n/a`,
/// since close and volume are still valid; it is not turned into the
/// insufficient-data line.
pub fn summarize(instrument: &Instrument, series: &PriceSeries) -> Result<ReportLine, ReportError> {
    let last = match series.last() {
        Some(bar) if series.len() >= MIN_SUMMARY_BARS => bar,
        _ => return Ok(ReportLine::insufficient(instrument)),
    };

    let rsi = match compute_rsi(series, RSI_PERIOD) {
        Ok(value) => Some(value),
        Err(IndicatorError::Undefined) => None,
        Err(e) => return Err(e.into()),
    };
    let volume = analyze_volume(series, VOL_PERIOD)?;

    Ok(ReportLine::computed(
        instrument,
        Summary {
            close: last.close,
            rsi,
            volume,
        },
    ))
}

/// Runs the full report against the live provider and Telegram.
pub async fn run_report(config: AppConfig) -> Result<RunSummary> {
    let provider = YahooProvider::new()?;
    let notifier = TelegramNotifier::new(config.telegram)?;
    let renderer = CandlestickRenderer;

    let pipeline = ReportPipeline::new(&provider, &renderer, &notifier);
    Ok(pipeline.run(&config.watchlist).await)
}
