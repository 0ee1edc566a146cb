use thiserror::Error;

/// Errors raised while retrieving a price series.
///
/// An unknown symbol is not an error: providers return an empty series for it.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, timeout or an undecodable response body.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The payload decoded but did not have the expected shape.
    #[error("bad payload: {0}")]
    Payload(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    #[error("insufficient data: need {needed} bars, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// No gains and no losses in the window, so the ratio has no value.
    #[error("indicator undefined on a flat series")]
    Undefined,

    #[error("invalid indicator period {0}")]
    InvalidPeriod(usize),

    #[error("non-finite value in indicator computation")]
    NonFinite,
}

#[derive(Debug, Error)]
pub enum ChartError {
    /// Nothing to plot. Callers treat this as a skip.
    #[error("empty price series")]
    EmptySeries,

    #[error("drawing failed: {0}")]
    Draw(String),

    #[error("png encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("pixel buffer does not match image size")]
    Buffer,
}

/// Delivery failures. These never leave the notifier; they are only logged.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("telegram returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Per-instrument failure collected by the report pipeline.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("fetch: {0}")]
    Provider(#[from] ProviderError),

    #[error("chart: {0}")]
    Render(#[from] ChartError),

    #[error("compute: {0}")]
    Compute(#[from] IndicatorError),
}

impl ReportError {
    /// The underlying fault without the stage prefix, for space-limited text.
    pub fn cause(&self) -> String {
        match self {
            ReportError::Provider(e) => e.to_string(),
            ReportError::Render(e) => e.to_string(),
            ReportError::Compute(e) => e.to_string(),
        }
    }
}
