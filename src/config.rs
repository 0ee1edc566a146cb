use secrecy::SecretString;

// CONFIGURATION STRUCTS

pub const TOKEN_VAR: &str = "TELEGRAM_TOKEN";
pub const CHAT_ID_VAR: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: String,       // as understood by the data provider, e.g. "GC=F"
    pub display_name: String, // e.g. "Gold Futures"
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            display_name: display_name.into(),
        }
    }
}

pub fn default_watchlist() -> Vec<Instrument> {
    vec![
        Instrument::new("SPY", "S&P 500"),
        Instrument::new("QQQ", "Nasdaq 100"),
        Instrument::new("EWZ", "Brazil ETF"),
        Instrument::new("GC=F", "Gold Futures"),
        Instrument::new("SI=F", "Silver Futures"),
    ]
}

#[derive(Debug)]
struct Credentials {
    token: SecretString,
    chat_id: String,
}

/// Telegram delivery settings.
///
/// Delivery is enabled only when both the bot token and the chat id are
/// present; that is decided once here and never rechecked per call.
#[derive(Debug)]
pub struct TelegramConfig {
    credentials: Option<Credentials>,
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let token: String = token.into();
        Self {
            credentials: Some(Credentials {
                token: SecretString::new(token.into_boxed_str()),
                chat_id: chat_id.into(),
            }),
        }
    }

    pub fn disabled() -> Self {
        Self { credentials: None }
    }

    /// Reads `TELEGRAM_TOKEN` and `TELEGRAM_CHAT_ID` from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Blank values count as missing.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        match (read(TOKEN_VAR), read(CHAT_ID_VAR)) {
            (Some(token), Some(chat_id)) => Self::new(token, chat_id),
            _ => Self::disabled(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn credentials(&self) -> Option<(&SecretString, &str)> {
        self.credentials
            .as_ref()
            .map(|c| (&c.token, c.chat_id.as_str()))
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub watchlist: Vec<Instrument>,
    pub telegram: TelegramConfig,
    /// Log what would be delivered instead of sending it.
    pub dry_run: bool,
}

impl AppConfig {
    pub fn load(dry_run: bool) -> Self {
        let telegram = if dry_run {
            TelegramConfig::disabled()
        } else {
            TelegramConfig::from_env()
        };
        Self {
            watchlist: default_watchlist(),
            telegram,
            dry_run,
        }
    }

    /// A run may proceed when delivery is configured or explicitly skipped.
    pub fn is_runnable(&self) -> bool {
        self.dry_run || self.telegram.enabled()
    }
}
