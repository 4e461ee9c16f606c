//! # Flatshop Mailer
//!
//! Sends signup confirmation emails through the SendGrid v3 API.
//!
//! [`SendGridNotifier`] implements the core [`Notifier`] seam. Sending is fire-and-forget:
//! `send_confirmation` spawns the HTTP request on the current Tokio runtime and returns at
//! once, and delivery failures only reach the log. Bodies are rendered from the askama
//! templates under `templates/email/` before the request is spawned, so a rendering failure is
//! still reported to the caller.

use askama::Template;
use flatshop_core::{ConfirmationMessage, Notifier, NotifyError};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// SendGrid v3 send endpoint.
pub const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Sender address used when none is configured.
pub const DEFAULT_FROM: &str = "noreply@flatshop.local";

/// Confirmation endpoint linked from the email when none is configured.
pub const DEFAULT_CONFIRM_URL: &str = "http://localhost:3000/api/v1/sign-up/confirm";

const SUBJECT: &str = "Confirm your registration";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("failed to read mail config: {0}")]
    ConfigRead(std::io::Error),
    #[error("failed to parse mail config: {0}")]
    ConfigParse(serde_json::Error),
    #[error("mail config has no sendgridApiKey")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MailConfigFile {
    sendgrid_api_key: Option<String>,
}

/// Mail provider settings.
#[derive(Debug)]
pub struct MailerConfig {
    api_key: SecretString,
    from: String,
    confirm_url: String,
}

impl MailerConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            from: DEFAULT_FROM.into(),
            confirm_url: DEFAULT_CONFIRM_URL.into(),
        }
    }

    /// Reads the API key from a JSON file of the form `{"sendgridApiKey": "..."}`.
    ///
    /// # Errors
    ///
    /// Returns `MailerError::MissingApiKey` if the file has no non-empty key.
    pub fn from_file(path: &Path) -> Result<Self, MailerError> {
        let raw = std::fs::read_to_string(path).map_err(MailerError::ConfigRead)?;
        let file: MailConfigFile = serde_json::from_str(&raw).map_err(MailerError::ConfigParse)?;
        let key = file
            .sendgrid_api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(MailerError::MissingApiKey)?;
        Ok(Self::new(SecretString::from(key)))
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_confirm_url(mut self, confirm_url: impl Into<String>) -> Self {
        self.confirm_url = confirm_url.into();
        self
    }

    pub fn from_address(&self) -> &str {
        &self.from
    }

    pub fn confirm_url(&self) -> &str {
        &self.confirm_url
    }
}

/// Link the recipient follows to confirm their email.
pub fn confirm_link(base: &str, cpf: &str, code: &str) -> String {
    format!("{base}?cpf={cpf}&confirm={code}")
}

/// HTML body of the confirmation email.
#[derive(Template)]
#[template(path = "email/confirmation.html")]
struct ConfirmationEmailHtml<'a> {
    name: &'a str,
    link: &'a str,
}

/// Plain text body of the confirmation email.
#[derive(Template)]
#[template(path = "email/confirmation.txt")]
struct ConfirmationEmailText<'a> {
    name: &'a str,
    link: &'a str,
}

/// Notifier backed by SendGrid.
#[derive(Clone, Debug)]
pub struct SendGridNotifier {
    client: reqwest::Client,
    config: Arc<MailerConfig>,
    endpoint: String,
}

impl SendGridNotifier {
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: MailerConfig) -> Result<Self, MailerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config),
            endpoint: SENDGRID_SEND_URL.into(),
        })
    }

    /// Request body for `message` in the SendGrid v3 format.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render.
    fn payload(&self, message: &ConfirmationMessage) -> Result<Value, MailerError> {
        let link = confirm_link(&self.config.confirm_url, &message.cpf, &message.code);
        let name = message.name.as_str();
        let text = ConfirmationEmailText { name, link: &link }.render()?;
        let html = ConfirmationEmailHtml { name, link: &link }.render()?;

        Ok(json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": self.config.from },
            "subject": SUBJECT,
            "content": [
                { "type": "text/plain", "value": text },
                { "type": "text/html", "value": html },
            ],
        }))
    }

    /// Sends `message` and waits for SendGrid to accept it.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render, the request fails or SendGrid answers
    /// with a non-success status.
    pub async fn send(&self, message: &ConfirmationMessage) -> Result<(), MailerError> {
        let payload = self.payload(message)?;
        self.post(&payload).await
    }

    async fn post(&self, payload: &Value) -> Result<(), MailerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailerError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

impl Notifier for SendGridNotifier {
    fn send_confirmation(&self, message: ConfirmationMessage) -> Result<(), NotifyError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;

        let payload = self
            .payload(&message)
            .map_err(|e| NotifyError::Message(e.to_string()))?;

        let notifier = self.clone();
        handle.spawn(async move {
            match notifier.post(&payload).await {
                Ok(()) => tracing::info!(to = %message.to, cpf = %message.cpf, "confirmation email sent"),
                Err(e) => tracing::warn!(
                    to = %message.to,
                    cpf = %message.cpf,
                    error = %e,
                    "failed to send confirmation email"
                ),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn message() -> ConfirmationMessage {
        ConfirmationMessage {
            to: "a@x.com".into(),
            name: "Ana".into(),
            cpf: "52998224725".into(),
            code: "abc123".into(),
        }
    }

    fn notifier() -> SendGridNotifier {
        let config = MailerConfig::new(SecretString::from("SG.test".to_string()))
            .with_from("shop@example.com")
            .with_confirm_url("https://shop.example.com/api/v1/sign-up/confirm");
        SendGridNotifier::new(config).unwrap()
    }

    #[test]
    fn test_confirm_link() {
        assert_eq!(
            confirm_link("http://localhost:3000/confirm", "52998224725", "abc"),
            "http://localhost:3000/confirm?cpf=52998224725&confirm=abc"
        );
    }

    #[test]
    fn test_html_body_escapes_name() {
        let html = ConfirmationEmailHtml {
            name: "<b>Ana</b>",
            link: "http://x/confirm?cpf=1&confirm=2",
        }
        .render()
        .unwrap();
        assert!(!html.contains("<b>Ana</b>"));
        assert!(html.contains("Ana"));
        assert!(!html.contains("cpf=1&confirm=2"));
    }

    #[test]
    fn test_payload_shape() {
        let payload = notifier().payload(&message()).unwrap();
        assert_eq!(payload["personalizations"][0]["to"][0]["email"], "a@x.com");
        assert_eq!(payload["from"]["email"], "shop@example.com");
        assert_eq!(payload["subject"], SUBJECT);

        assert_eq!(payload["content"][0]["type"], "text/plain");
        let text = payload["content"][0]["value"].as_str().unwrap();
        assert!(text.contains("Hello Ana,"));
        assert!(text.contains(
            "https://shop.example.com/api/v1/sign-up/confirm?cpf=52998224725&confirm=abc123"
        ));

        assert_eq!(payload["content"][1]["type"], "text/html");
        let html = payload["content"][1]["value"].as_str().unwrap();
        assert!(html.contains("<h1>Hello Ana,</h1>"));
        assert!(html.contains("https://shop.example.com/api/v1/sign-up/confirm?cpf=52998224725"));
        assert!(html.contains("confirm=abc123"));
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mailConfig.json");

        std::fs::write(&path, r#"{"sendgridApiKey": "SG.key"}"#).unwrap();
        let config = MailerConfig::from_file(&path).unwrap();
        assert_eq!(config.api_key.expose_secret(), "SG.key");
        assert_eq!(config.from_address(), DEFAULT_FROM);
        assert_eq!(config.confirm_url(), DEFAULT_CONFIRM_URL);

        std::fs::write(&path, r#"{"sendgridApiKey": ""}"#).unwrap();
        assert!(matches!(
            MailerConfig::from_file(&path),
            Err(MailerError::MissingApiKey)
        ));

        assert!(matches!(
            MailerConfig::from_file(&dir.path().join("missing.json")),
            Err(MailerError::ConfigRead(_))
        ));
    }

    #[test]
    fn test_send_without_runtime_is_reported() {
        let result = notifier().send_confirmation(message());
        assert!(matches!(result, Err(NotifyError::Unavailable(_))));
    }

    #[test]
    fn test_debug_output_hides_api_key() {
        let rendered = format!("{:?}", notifier());
        assert!(!rendered.contains("SG.test"));
    }
}
