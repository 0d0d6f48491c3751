use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::NotificationsConfig;
use crate::plugins::traits::{AlertEvent, NotificationResult, NotifierPlugin};
use crate::utils::error::{AppError, Result};

const SMTP_TIMEOUT_SECS: u64 = 30;

/// Plain-text SMTP alerts. Without an SMTP host the rendered message is only
/// logged and the channel reports "not delivered".
pub struct EmailNotifier {
    product_name: String,
    from: Mailbox,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailNotifier {
    pub fn new(config: &NotificationsConfig) -> Result<Self> {
        let smtp = &config.smtp;
        let from: Mailbox = smtp
            .from_address
            .parse()
            .map_err(|e| AppError::notification("email", format!("invalid from address: {}", e)))?;

        let transport = match smtp.host.as_deref().filter(|h| !h.trim().is_empty()) {
            Some(host) => {
                let builder = if smtp.use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                        .map_err(|e| AppError::notification("email", e.to_string()))?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                };
                let mut builder = builder
                    .port(smtp.port)
                    .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)));
                if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
                    builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
                }
                Some(builder.build())
            }
            None => None,
        };

        Ok(Self {
            product_name: config.product_name.clone(),
            from,
            transport,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    pub fn format_subject(&self, event: &AlertEvent) -> String {
        format!(
            "[{}] {} alert — Page #{}",
            self.product_name, event.alert_type, event.page_id
        )
    }

    pub fn format_text_body(&self, event: &AlertEvent) -> String {
        let mut text = String::new();
        text.push_str(&format!("Type: {}\n", event.alert_type));
        text.push_str(&format!("Severity: {}\n", event.severity));
        text.push_str(&format!("Page ID: {}\n\n", event.page_id));
        text.push_str(&format!("Summary: {}\n\n", event.summary));
        text.push_str(&format!("Recommendation: {}\n", event.recommendation));
        text
    }
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn plugin_type(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, target: &str, event: &AlertEvent) -> Result<NotificationResult> {
        let subject = self.format_subject(event);
        let body = self.format_text_body(event);

        let Some(transport) = &self.transport else {
            info!(
                to = %target,
                subject = %subject,
                "SMTP not configured, email logged only:\n{}",
                body
            );
            return Ok(NotificationResult::not_delivered("SMTP not configured"));
        };

        let to: Mailbox = target
            .parse()
            .map_err(|e| AppError::notification("email", format!("invalid recipient {}: {}", target, e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::notification("email", e.to_string()))?;

        match transport.send(email).await {
            Ok(_response) => Ok(NotificationResult::delivered(format!(
                "email-{}",
                chrono::Utc::now().timestamp()
            ))),
            Err(e) => {
                warn!(to = %target, "SMTP delivery failed: {}", e);
                Ok(NotificationResult::not_delivered(e.to_string()))
            }
        }
    }
}
