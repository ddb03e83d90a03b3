//! Email delivery provider (C14): a Brevo-backed adapter plus an
//! in-memory fake for tests.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::templates::RenderedEmail;
use crate::config::AppConfig;

/// The outcome of a single send attempt, consumed by the outbox dispatcher
/// to decide whether to mark the item sent, retry it, or kill it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSendResult {
    pub status: SendStatus,
    pub failure_class: Option<FailureClass>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub provider_message_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    Pending,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Permanent,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, to_email: &str, rendered: &RenderedEmail) -> ProviderSendResult;
}

/// Sends transactional email through Brevo's SMTP API, or short-circuits to
/// a canned success in dry-run mode.
pub struct BrevoEmailProvider {
    config: AppConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct BrevoSendResponse {
    #[serde(rename = "messageId")]
    message_id: Option<String>,
}

impl BrevoEmailProvider {
    pub fn new(config: AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");
        Self { config, http }
    }
}

#[async_trait]
impl EmailProvider for BrevoEmailProvider {
    async fn send(&self, to_email: &str, rendered: &RenderedEmail) -> ProviderSendResult {
        if self.config.email_dry_run {
            return ProviderSendResult {
                status: SendStatus::Sent,
                failure_class: None,
                error_code: None,
                error_message: None,
                provider_message_id: Some("dry-run".to_string()),
            };
        }

        let recipient_domain = to_email.rsplit('@').next().unwrap_or("").to_lowercase();
        if !self.config.allowed_recipient_domains.is_empty()
            && !self.config.allowed_recipient_domains.contains(&recipient_domain)
        {
            return dead("RECIPIENT_DOMAIN_NOT_ALLOWED", "recipient domain is not in whitelist");
        }

        if self.config.brevo_api_key.is_empty() {
            return dead("BREVO_API_KEY_MISSING", "BREVO_API_KEY missing");
        }

        let body = json!({
            "sender": {"name": self.config.email_from_name, "email": self.config.email_from_address},
            "to": [{"email": to_email}],
            "subject": rendered.subject,
            "textContent": rendered.text_body,
            "htmlContent": rendered.html_body,
            "tracking": {"opens": false, "clicks": false},
        });

        let url = format!("{}/smtp/email", self.config.brevo_base_url);
        let response = self
            .http
            .post(&url)
            .header("api-key", &self.config.brevo_api_key)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return retryable("TIMEOUT", &e.to_string()),
            Err(e) => return retryable("HTTP_ERROR", &e.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .json::<BrevoSendResponse>()
                .await
                .ok()
                .and_then(|b| b.message_id);
            return ProviderSendResult {
                status: SendStatus::Sent,
                failure_class: None,
                error_code: None,
                error_message: None,
                provider_message_id: message_id,
            };
        }

        let code = status.as_u16();
        let text = response.text().await.unwrap_or_default();
        let truncated: String = text.chars().take(500).collect();
        if matches!(code, 408 | 409 | 429) || code >= 500 {
            return retryable(&format!("HTTP_{code}"), &truncated);
        }
        dead(&format!("HTTP_{code}"), &truncated)
    }
}

fn retryable(error_code: &str, message: &str) -> ProviderSendResult {
    ProviderSendResult {
        status: SendStatus::Pending,
        failure_class: Some(FailureClass::Retryable),
        error_code: Some(error_code.to_string()),
        error_message: Some(message.to_string()),
        provider_message_id: None,
    }
}

fn dead(error_code: &str, message: &str) -> ProviderSendResult {
    ProviderSendResult {
        status: SendStatus::Dead,
        failure_class: Some(FailureClass::Permanent),
        error_code: Some(error_code.to_string()),
        error_message: Some(message.to_string()),
        provider_message_id: None,
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeEmailProvider;
    use super::*;

    fn cfg(dry_run: bool) -> AppConfig {
        AppConfig {
            app_base_url: "http://localhost:3000".into(),
            email_from_address: "noreply@example.com".into(),
            email_from_name: "Life Event".into(),
            brevo_api_key: String::new(),
            brevo_base_url: "https://api.brevo.com/v3".into(),
            email_dry_run: dry_run,
            allowed_recipient_domains: Default::default(),
            notification_token_secret: "s3cr3t".into(),
            cors_origins: Vec::new(),
            auto_create_schema: true,
            log_format_json: false,
            log_level: tracing::Level::INFO,
            scan_interval_secs: 300,
            dispatch_interval_secs: 30,
            outbox_batch_size: 50,
        }
    }

    #[tokio::test]
    async fn dry_run_always_reports_sent() {
        let provider = BrevoEmailProvider::new(cfg(true));
        let rendered = RenderedEmail {
            subject: "s".into(),
            text_body: "b".into(),
            html_body: None,
            short_text: "s".into(),
        };
        let result = provider.send("a@example.com", &rendered).await;
        assert_eq!(result.status, SendStatus::Sent);
        assert_eq!(result.provider_message_id.as_deref(), Some("dry-run"));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_permanent_dead_letter() {
        let mut c = cfg(false);
        c.brevo_api_key = String::new();
        let provider = BrevoEmailProvider::new(c);
        let rendered = RenderedEmail {
            subject: "s".into(),
            text_body: "b".into(),
            html_body: None,
            short_text: "s".into(),
        };
        let result = provider.send("a@example.com", &rendered).await;
        assert_eq!(result.status, SendStatus::Dead);
        assert_eq!(result.error_code.as_deref(), Some("BREVO_API_KEY_MISSING"));
    }

    #[tokio::test]
    async fn disallowed_recipient_domain_is_a_permanent_dead_letter() {
        let mut c = cfg(false);
        c.brevo_api_key = "key".into();
        c.allowed_recipient_domains.insert("allowed.com".to_string());
        let provider = BrevoEmailProvider::new(c);
        let rendered = RenderedEmail {
            subject: "s".into(),
            text_body: "b".into(),
            html_body: None,
            short_text: "s".into(),
        };
        let result = provider.send("a@blocked.com", &rendered).await;
        assert_eq!(result.status, SendStatus::Dead);
        assert_eq!(result.error_code.as_deref(), Some("RECIPIENT_DOMAIN_NOT_ALLOWED"));
    }

    #[tokio::test]
    async fn fake_provider_records_sends() {
        let provider = FakeEmailProvider::always(ProviderSendResult {
            status: SendStatus::Sent,
            failure_class: None,
            error_code: None,
            error_message: None,
            provider_message_id: Some("id-1".into()),
        });
        let rendered = RenderedEmail {
            subject: "s".into(),
            text_body: "b".into(),
            html_body: None,
            short_text: "s".into(),
        };
        provider.send("a@example.com", &rendered).await;
        assert_eq!(provider.sent.lock().unwrap().len(), 1);
    }
}
