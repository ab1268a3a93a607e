//! Email notification backend (SMTP).

use std::collections::HashSet;

use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info};

use crate::config::EmailConfig;
use crate::notify::NotifyData;
use crate::templates;

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub sender: String,
    pub server: String,
    pub subject_tmpl: String,
    pub body_tmpl: String,
}

impl EmailSettings {
    pub fn from_config(config: Option<&EmailConfig>) -> Option<Self> {
        let Some(config) = config else {
            info!("email settings missing, no email notifications will be sent");
            return None;
        };
        if config.sender.is_empty() || config.subject_tmpl.is_empty() || config.body_tmpl.is_empty()
        {
            info!("email settings incomplete, no email notifications will be sent");
            return None;
        }
        debug!("valid email notification settings found");
        Some(Self {
            sender: config.sender.clone(),
            server: config.server.clone(),
            subject_tmpl: config.subject_tmpl.clone(),
            body_tmpl: config.body_tmpl.clone(),
        })
    }
}

pub async fn send_alert_notification(
    settings: &EmailSettings,
    recipients: &HashSet<String>,
    data: &NotifyData,
) {
    let subject = match templates::render(&settings.subject_tmpl, data) {
        Ok(subject) => subject,
        Err(e) => {
            error!("error rendering email subject template: {e}");
            return;
        }
    };
    let body = match templates::render(&settings.body_tmpl, data) {
        Ok(body) => body,
        Err(e) => {
            error!("error rendering email body template: {e}");
            return;
        }
    };
    send_email(settings, recipients, &subject, &body).await;
}

/// Send a plain text email to one or more recipients.
pub async fn send_email(
    settings: &EmailSettings,
    recipients: &HashSet<String>,
    subject: &str,
    body: &str,
) {
    let sender: Mailbox = match settings.sender.parse() {
        Ok(sender) => sender,
        Err(e) => {
            error!("invalid email sender address '{}': {e}", settings.sender);
            return;
        }
    };
    let transport: AsyncSmtpTransport<Tokio1Executor> =
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.server.as_str())
            .port(25)
            .build();
    for recipient in recipients {
        let mailbox: Mailbox = match recipient.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                error!("invalid email recipient address '{recipient}': {e}");
                continue;
            }
        };
        let message = match Message::builder()
            .from(sender.clone())
            .to(mailbox)
            .subject(subject)
            .body(body.to_string())
        {
            Ok(message) => message,
            Err(e) => {
                error!("error building email notification: {e}");
                continue;
            }
        };
        if let Err(e) = transport.send(message).await {
            error!("error sending smtp notification: {e}");
        }
    }
}
