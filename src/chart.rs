//! Candlestick chart with MA20/MA50 overlays and a volume panel, rendered to PNG in memory.

use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};

use image::{ImageFormat, RgbImage};
use plotters::prelude::*;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

use crate::errors::ChartError;
use crate::series::{Bar, PriceSeries};

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 700;

const MA_FAST: usize = 20;
const MA_SLOW: usize = 50;

// theme
const UP: RGBColor = RGBColor(38, 166, 91);
const DOWN: RGBColor = RGBColor(214, 69, 65);
const MA_FAST_COLOR: RGBColor = RGBColor(31, 119, 180);
const MA_SLOW_COLOR: RGBColor = RGBColor(255, 127, 14);
const GRID: RGBColor = RGBColor(225, 225, 225);
const FONT: &str = "sans-serif";

/// Encoded PNG bytes, owned so they can be moved into a transport and dropped after it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartImage {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl ChartImage {
    pub fn new(png: Vec<u8>, width: u32, height: u32) -> Self {
        Self { png, width, height }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

pub trait ChartRenderer: Send + Sync {
    fn render(&self, series: &PriceSeries, title: &str) -> Result<ChartImage, ChartError>;
}

/// The production renderer, drawing with plotters' bitmap backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct CandlestickRenderer;

impl ChartRenderer for CandlestickRenderer {
    fn render(&self, series: &PriceSeries, title: &str) -> Result<ChartImage, ChartError> {
        render_chart(series, title)
    }
}

pub fn render_chart(series: &PriceSeries, title: &str) -> Result<ChartImage, ChartError> {
    if series.is_empty() {
        return Err(ChartError::EmptySeries);
    }

    let mut pixels = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    // Font lookup happens inside the backend and can panic on hosts without fontconfig.
    panic::catch_unwind(AssertUnwindSafe(|| draw(series.bars(), title, &mut pixels)))
        .map_err(|_| ChartError::Draw("renderer panicked".to_string()))??;

    encode_png(pixels, CHART_WIDTH, CHART_HEIGHT)
}

fn draw(bars: &[Bar], title: &str, pixels: &mut [u8]) -> Result<(), ChartError> {
    let root = BitMapBackend::with_buffer(pixels, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let root = root.titled(title, (FONT, 24)).map_err(draw_err)?;
    let split_at = root.dim_in_pixel().1 * 72 / 100;
    let (price_area, volume_area) = root.split_vertically(split_at);

    let x_range = -1f64..bars.len() as f64;
    let (low, high) = price_bounds(bars);
    let pad = ((high - low) * 0.05).max(high.abs() * 0.001).max(1e-6);

    let mut price_chart = ChartBuilder::on(&price_area)
        .margin(10)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range.clone(), (low - pad)..(high + pad))
        .map_err(draw_err)?;

    price_chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_x_axis()
        .bold_line_style(GRID)
        .light_line_style(WHITE)
        .y_label_style((FONT, 13))
        .y_label_formatter(&|y| format!("{:.2}", y))
        .draw()
        .map_err(draw_err)?;

    let candle_width = candle_width(bars.len());
    price_chart
        .draw_series(bars.iter().enumerate().map(|(i, bar)| {
            CandleStick::new(
                i as f64,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                UP.filled(),
                DOWN.filled(),
                candle_width,
            )
        }))
        .map_err(draw_err)?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mut has_overlay = false;
    for (window, color, label) in [
        (MA_FAST, MA_FAST_COLOR, "MA20"),
        (MA_SLOW, MA_SLOW_COLOR, "MA50"),
    ] {
        let points = moving_average(&closes, window);
        if points.is_empty() {
            continue;
        }
        has_overlay = true;
        price_chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))
            .map_err(draw_err)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }
    if has_overlay {
        price_chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .label_font((FONT, 13))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(draw_err)?;
    }

    let max_volume = bars.iter().map(|b| b.volume).max().unwrap_or(0).max(1) as f64;
    let mut volume_chart = ChartBuilder::on(&volume_area)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, 0f64..max_volume * 1.1)
        .map_err(draw_err)?;

    volume_chart
        .configure_mesh()
        .disable_x_mesh()
        .bold_line_style(GRID)
        .light_line_style(WHITE)
        .x_labels(8)
        .x_label_style((FONT, 12))
        .x_label_formatter(&|x| date_label(bars, *x))
        .y_labels(3)
        .y_label_style((FONT, 12))
        .y_label_formatter(&|v| compact_volume(*v))
        .draw()
        .map_err(draw_err)?;

    volume_chart
        .draw_series(bars.iter().enumerate().map(|(i, bar)| {
            let color = if bar.close >= bar.open { UP } else { DOWN };
            let x = i as f64;
            Rectangle::new(
                [(x - 0.35, 0.0), (x + 0.35, bar.volume as f64)],
                color.mix(0.6).filled(),
            )
        }))
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

fn draw_err<E: std::fmt::Display>(e: E) -> ChartError {
    ChartError::Draw(e.to_string())
}

fn encode_png(pixels: Vec<u8>, width: u32, height: u32) -> Result<ChartImage, ChartError> {
    let image = RgbImage::from_raw(width, height, pixels).ok_or(ChartError::Buffer)?;
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok(ChartImage::new(png.into_inner(), width, height))
}

fn price_bounds(bars: &[Bar]) -> (f64, f64) {
    bars.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), b| {
        (lo.min(b.low), hi.max(b.high))
    })
}

fn candle_width(count: usize) -> u32 {
    let slot = CHART_WIDTH as f64 * 0.85 / (count as f64 + 1.0);
    (slot * 0.7).clamp(1.0, 15.0) as u32
}

/// Simple moving average points, starting at the first bar with a full window.
fn moving_average(closes: &[f64], window: usize) -> Vec<(f64, f64)> {
    let Ok(mut sma) = SimpleMovingAverage::new(window) else {
        return Vec::new();
    };
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| (i as f64, sma.next(close)))
        .skip(window.saturating_sub(1))
        .collect()
}

fn date_label(bars: &[Bar], x: f64) -> String {
    let idx = x.round();
    if (x - idx).abs() > 1e-6 || idx < 0.0 {
        return String::new();
    }
    bars.get(idx as usize)
        .map(|b| b.date.format("%b %d").to_string())
        .unwrap_or_default()
}

fn compact_volume(v: f64) -> String {
    if v >= 1e9 {
        format!("{:.1}B", v / 1e9)
    } else if v >= 1e6 {
        format!("{:.1}M", v / 1e6)
    } else if v >= 1e3 {
        format!("{:.0}K", v / 1e3)
    } else {
        format!("{:.0}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::fixtures::series_from_closes;

    #[test]
    fn empty_series_is_not_plotted() {
        let series = PriceSeries::empty("SPY");
        assert!(matches!(
            render_chart(&series, "S&P 500 (SPY)"),
            Err(ChartError::EmptySeries)
        ));
    }

    fn assert_full_size_png(image: &ChartImage) {
        assert_eq!(&image.as_bytes()[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!((image.width(), image.height()), (CHART_WIDTH, CHART_HEIGHT));
    }

    #[test]
    fn three_months_of_bars_render_with_both_overlays() {
        let closes: Vec<f64> = (0..63).map(|i| 100.0 + (i as f64 * 0.4).sin() * 5.0).collect();
        let series = series_from_closes("SPY", &closes);

        let image = CandlestickRenderer.render(&series, "S&P 500 (SPY)").unwrap();
        assert_full_size_png(&image);
    }

    #[test]
    fn single_flat_bar_without_volume_still_renders() {
        let bar = Bar {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 5.0,
            high: 5.0,
            low: 5.0,
            close: 5.0,
            volume: 0,
        };
        let series = PriceSeries::from_rows("SI=F", vec![bar]);

        let image = render_chart(&series, "Silver Futures (SI=F)").unwrap();
        assert_full_size_png(&image);
    }

    #[test]
    fn moving_average_starts_at_full_window() {
        let closes: Vec<f64> = (1..=5).map(f64::from).collect();
        let points = moving_average(&closes, 3);
        assert_eq!(points, vec![(2.0, 2.0), (3.0, 3.0), (4.0, 4.0)]);
    }

    #[test]
    fn moving_average_longer_than_series_is_empty() {
        assert!(moving_average(&[1.0, 2.0], MA_SLOW).is_empty());
    }

    #[test]
    fn price_bounds_span_wicks() {
        let series = series_from_closes("SPY", &[10.0, 12.0, 11.0]);
        assert_eq!(price_bounds(series.bars()), (9.0, 13.0));
    }

    #[test]
    fn date_labels_only_on_whole_bars() {
        let series = series_from_closes("SPY", &[1.0, 2.0]);
        assert_eq!(date_label(series.bars(), 1.0), "Jan 02");
        assert_eq!(date_label(series.bars(), 0.5), "");
        assert_eq!(date_label(series.bars(), -1.0), "");
        assert_eq!(date_label(series.bars(), 7.0), "");
    }

    #[test]
    fn compact_volume_units() {
        assert_eq!(compact_volume(2_500_000.0), "2.5M");
        assert_eq!(compact_volume(45_000.0), "45K");
        assert_eq!(compact_volume(3.2e9), "3.2B");
        assert_eq!(compact_volume(12.0), "12");
    }

    #[test]
    fn png_encoding_is_in_memory() {
        let image = encode_png(vec![255u8; 4 * 3 * 3], 4, 3).unwrap();
        assert_eq!(&image.as_bytes()[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!((image.width(), image.height()), (4, 3));
    }

    #[test]
    fn mismatched_pixel_buffer_is_rejected() {
        assert!(matches!(
            encode_png(vec![0u8; 5], 4, 3),
            Err(ChartError::Buffer)
        ));
    }
}
