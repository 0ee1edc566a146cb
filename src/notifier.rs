//! Delivery of report messages and charts to a Telegram chat.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::chart::ChartImage;
use crate::config::TelegramConfig;
use crate::errors::NotifyError;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const PARSE_MODE: &str = "HTML";

/// Best-effort delivery. Implementations log failures and never return them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, message: &str);

    /// Takes ownership of the image so the buffer is released once sent.
    async fn send_image(&self, image: ChartImage, caption: &str);
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
    api_url: String,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, NotifyError> {
        Self::with_api_url(config, DEFAULT_API_URL)
    }

    pub fn with_api_url(config: TelegramConfig, api_url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            config,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled()
    }

    fn endpoint(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, token, method)
    }

    async fn post_message(&self, token: &str, chat_id: &str, message: &str) -> Result<(), NotifyError> {
        let payload = SendMessage {
            chat_id,
            text: message,
            parse_mode: PARSE_MODE,
        };
        let response = self
            .client
            .post(self.endpoint(token, "sendMessage"))
            .json(&payload)
            .send()
            .await?;
        check_status(response).await
    }

    async fn post_photo(
        &self,
        token: &str,
        chat_id: &str,
        image: ChartImage,
        caption: &str,
    ) -> Result<(), NotifyError> {
        let photo = Part::bytes(image.into_bytes())
            .file_name("chart.png")
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", PARSE_MODE)
            .part("photo", photo);

        let response = self
            .client
            .post(self.endpoint(token, "sendPhoto"))
            .multipart(form)
            .send()
            .await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<(), NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown API error".to_string());
    Err(NotifyError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, message: &str) {
        let Some((token, chat_id)) = self.config.credentials() else {
            tracing::info!(message, "delivery disabled, message not sent");
            return;
        };
        if let Err(e) = self.post_message(token.expose_secret(), chat_id, message).await {
            tracing::warn!(error = %e, "failed to send message");
        }
    }

    async fn send_image(&self, image: ChartImage, caption: &str) {
        let Some((token, chat_id)) = self.config.credentials() else {
            tracing::info!(caption, bytes = image.as_bytes().len(), "delivery disabled, chart not sent");
            return;
        };
        if let Err(e) = self.post_photo(token.expose_secret(), chat_id, image, caption).await {
            tracing::warn!(error = %e, caption, "failed to send chart");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png() -> ChartImage {
        ChartImage::new(b"PNGDATA".to_vec(), 1, 1)
    }

    #[tokio::test]
    async fn send_text_posts_html_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "42",
                "text": "<b>hello</b>",
                "parse_mode": "HTML",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::with_api_url(TelegramConfig::new("TOKEN", "42"), server.uri()).unwrap();
        notifier.send_text("<b>hello</b>").await;
    }

    #[tokio::test]
    async fn send_image_posts_multipart_photo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendPhoto"))
            .and(body_string_contains("name=\"photo\"; filename=\"chart.png\""))
            .and(body_string_contains("S&P 500"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::with_api_url(TelegramConfig::new("TOKEN", "42"), server.uri()).unwrap();
        notifier.send_image(png(), "📊 S&P 500 - Candles + MA20/50").await;
    }

    #[tokio::test]
    async fn api_errors_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: can't parse entities"))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::with_api_url(TelegramConfig::new("TOKEN", "42"), server.uri()).unwrap();
        notifier.send_text("<b>broken").await;
    }

    #[tokio::test]
    async fn disabled_notifier_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::with_api_url(TelegramConfig::disabled(), server.uri()).unwrap();
        assert!(!notifier.is_enabled());
        notifier.send_text("hello").await;
        notifier.send_image(png(), "caption").await;
    }
}
