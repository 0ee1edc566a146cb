//! Text of everything the report sends: summary lines, header and footer,
//! status messages, chart captions. Output uses Telegram's HTML markup.

use std::fmt;

use crate::config::Instrument;
use crate::errors::ReportError;
use crate::indicators::{RsiZone, VOL_PERIOD, VolumeAnalysis, VolumeState, classify_rsi};

/// Characters of an error message kept in a failed summary line.
pub const ERROR_SNIPPET_CHARS: usize = 20;

pub const STATUS_STARTING: &str = "🔎 <b>Market report</b>: starting technical analysis...";
pub const STATUS_IN_PROGRESS: &str = "⏳ Charts done, building the summary...";
pub const STATUS_FINISHED: &str = "✅ Report finished.";

const HEADER: &str = "📋 <b>Market Technical Summary</b>";

/// Figures behind a computed summary line.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub close: f64,
    /// `None` when the RSI is undefined for the window.
    pub rsi: Option<f64>,
    pub volume: VolumeAnalysis,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineBody {
    Computed(Summary),
    InsufficientData,
    Failed(String),
}

/// One instrument's entry in the summary message.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
    pub symbol: String,
    pub display_name: String,
    pub body: LineBody,
}

impl ReportLine {
    pub fn computed(instrument: &Instrument, summary: Summary) -> Self {
        Self::with_body(instrument, LineBody::Computed(summary))
    }

    pub fn insufficient(instrument: &Instrument) -> Self {
        Self::with_body(instrument, LineBody::InsufficientData)
    }

    pub fn failed(instrument: &Instrument, error: &ReportError) -> Self {
        let snippet = truncate_chars(&error.cause(), ERROR_SNIPPET_CHARS);
        Self::with_body(instrument, LineBody::Failed(snippet))
    }

    fn with_body(instrument: &Instrument, body: LineBody) -> Self {
        Self {
            symbol: instrument.symbol.clone(),
            display_name: instrument.display_name.clone(),
            body,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.body, LineBody::Failed(_))
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = format!(
            "<b>{}</b> ({})",
            escape_html(&self.display_name),
            escape_html(&self.symbol)
        );
        match &self.body {
            LineBody::InsufficientData => write!(f, "{label}: ⚠️ insufficient data"),
            LineBody::Failed(message) => write!(f, "{label}: ❌ error: {}", escape_html(message)),
            LineBody::Computed(summary) => {
                writeln!(f, "{label}")?;
                writeln!(f, "💵 Close: {:.2}", summary.close)?;
                writeln!(f, "📈 {}", rsi_fragment(summary.rsi))?;
                write!(f, "📊 {}", volume_fragment(&summary.volume))
            }
        }
    }
}

fn rsi_fragment(rsi: Option<f64>) -> String {
    match rsi {
        None => "RSI: n/a".to_string(),
        Some(value) => {
            let marker = match classify_rsi(value) {
                RsiZone::Overbought => "🔴 overbought",
                RsiZone::Oversold => "🟢 oversold",
                RsiZone::Neutral => "⚪ neutral",
            };
            format!("RSI: {value:.1} {marker}")
        }
    }
}

fn volume_fragment(volume: &VolumeAnalysis) -> String {
    match (volume.state, volume.pct_change) {
        (VolumeState::Unavailable, _) | (_, None) => "Volume: n/a".to_string(),
        (state, Some(pct)) => format!("Volume: {pct:+.1}% vs avg ({state})"),
    }
}

/// The single summary message: header, one line per instrument, footer.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    lines: Vec<ReportLine>,
}

impl Report {
    pub fn new(lines: Vec<ReportLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[ReportLine] {
        &self.lines
    }

    pub fn render(&self) -> String {
        let body: Vec<String> = self.lines.iter().map(ReportLine::to_string).collect();
        format!("{HEADER}\n\n{}\n\n{}", body.join("\n\n"), footer())
    }
}

fn footer() -> String {
    format!("<i>Volume compared with the average of the previous {VOL_PERIOD} sessions (today excluded).</i>")
}

pub fn chart_title(instrument: &Instrument) -> String {
    format!("{} ({})", instrument.display_name, instrument.symbol)
}

pub fn chart_caption(instrument: &Instrument) -> String {
    format!("📊 {} - Candles + MA20/50", escape_html(&instrument.display_name))
}

pub fn chart_error_message(instrument: &Instrument, error: &ReportError) -> String {
    format!(
        "⚠️ Chart error {}: {}",
        escape_html(&instrument.symbol),
        escape_html(&error.to_string())
    )
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{IndicatorError, ProviderError};

    fn spy() -> Instrument {
        Instrument::new("SPY", "S&P 500")
    }

    fn volume(pct: Option<f64>, state: VolumeState) -> VolumeAnalysis {
        VolumeAnalysis {
            volume_today: 1_000,
            pct_change: pct,
            state,
        }
    }

    #[test]
    fn computed_line_layout() {
        let line = ReportLine::computed(
            &spy(),
            Summary {
                close: 512.3,
                rsi: Some(72.06),
                volume: volume(Some(45.3), VolumeState::High),
            },
        );
        assert_eq!(
            line.to_string(),
            "<b>S&amp;P 500</b> (SPY)\n💵 Close: 512.30\n📈 RSI: 72.1 🔴 overbought\n📊 Volume: +45.3% vs avg (HIGH)"
        );
    }

    #[test]
    fn oversold_and_unavailable_volume() {
        let line = ReportLine::computed(
            &Instrument::new("EWZ", "Brazil ETF"),
            Summary {
                close: 27.0,
                rsi: Some(21.0),
                volume: volume(None, VolumeState::Unavailable),
            },
        );
        let text = line.to_string();
        assert!(text.contains("📈 RSI: 21.0 🟢 oversold"));
        assert!(text.ends_with("📊 Volume: n/a"));
    }

    #[test]
    fn undefined_rsi_is_not_a_number_in_the_line() {
        let line = ReportLine::computed(
            &spy(),
            Summary {
                close: 10.0,
                rsi: None,
                volume: volume(Some(-40.0), VolumeState::Low),
            },
        );
        let text = line.to_string();
        assert!(text.contains("📈 RSI: n/a"));
        assert!(text.contains("Volume: -40.0% vs avg (LOW)"));
        assert!(!text.contains("NaN"));
    }

    #[test]
    fn insufficient_line_is_fixed() {
        assert_eq!(
            ReportLine::insufficient(&Instrument::new("SI=F", "Silver Futures")).to_string(),
            "<b>Silver Futures</b> (SI=F): ⚠️ insufficient data"
        );
    }

    #[test]
    fn failed_line_keeps_first_twenty_chars_of_the_cause() {
        let error = ReportError::Provider(ProviderError::Payload("unexpected token".to_string()));
        let line = ReportLine::failed(&spy(), &error);
        assert!(line.is_failed());
        // the stage prefix is dropped so the snippet carries the fault itself
        assert_eq!(line.body, LineBody::Failed("bad payload: unexpec".to_string()));
        assert_eq!(
            line.to_string(),
            "<b>S&amp;P 500</b> (SPY): ❌ error: bad payload: unexpec"
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ñandú-ñandú", 3), "ñan");
        assert_eq!(truncate_chars("short", 20), "short");
    }

    #[test]
    fn report_has_header_lines_and_footer_in_order() {
        let report = Report::new(vec![
            ReportLine::insufficient(&Instrument::new("AAA", "First")),
            ReportLine::failed(
                &Instrument::new("BBB", "Second"),
                &ReportError::Compute(IndicatorError::NonFinite),
            ),
        ]);
        let text = report.render();
        assert!(text.starts_with(HEADER));
        let first = text.find("First").unwrap();
        let second = text.find("Second").unwrap();
        assert!(first < second);
        assert!(text.ends_with(&footer()));
        assert!(text.contains("previous 20 sessions"));
        assert_eq!(report.lines().len(), 2);
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("a<b>&c"), "a&lt;b&gt;&amp;c");
        assert_eq!(chart_caption(&spy()), "📊 S&amp;P 500 - Candles + MA20/50");
        assert_eq!(chart_title(&spy()), "S&P 500 (SPY)");
    }
}
