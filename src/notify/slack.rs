//! Chat webhook notification backend (Slack-compatible).

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::config::SlackConfig;
use crate::notify::NotifyData;
use crate::templates;

const SLACK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SlackSettings {
    pub webhook_url: String,
    pub msg_tmpl: String,
    pub duration_tmpl: Option<String>,
    pub url_tmpl: Option<String>,
}

impl SlackSettings {
    pub fn from_config(config: Option<&SlackConfig>) -> Option<Self> {
        let Some(config) = config else {
            info!("slack settings missing, no slack notifications will be sent");
            return None;
        };
        if config.webhook_url.is_empty() || config.msg_tmpl.is_empty() {
            info!("slack settings incomplete, no slack notifications will be sent");
            return None;
        }
        debug!("valid slack notification settings found");
        Some(Self {
            webhook_url: config.webhook_url.clone(),
            msg_tmpl: config.msg_tmpl.clone(),
            duration_tmpl: config.duration_tmpl.clone(),
            url_tmpl: config.url_tmpl.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct Attachment {
    fallback: String,
    pretext: String,
    fields: Vec<AttachmentField>,
}

#[derive(Debug, Clone, Serialize)]
struct AttachmentField {
    title: String,
    value: String,
    short: bool,
}

pub async fn send_alert_notification(
    client: &reqwest::Client,
    settings: &SlackSettings,
    data: &NotifyData,
) {
    let message = match templates::render(&settings.msg_tmpl, data) {
        Ok(message) => message,
        Err(e) => {
            error!("error rendering slack message template: {e}");
            return;
        }
    };
    let mut attachment = Attachment {
        fallback: message.clone(),
        pretext: message,
        fields: Vec::new(),
    };
    if let Some(tmpl) = &settings.duration_tmpl
        && let Ok(value) = templates::render(tmpl, data)
    {
        attachment.fields.push(AttachmentField {
            title: "Duration".to_string(),
            value,
            short: false,
        });
    }
    if let Some(tmpl) = &settings.url_tmpl
        && let Ok(value) = templates::render(tmpl, data)
    {
        attachment.fields.push(AttachmentField {
            title: "URL".to_string(),
            value,
            short: false,
        });
    }

    let payload = json!({ "attachments": [attachment] });
    match client
        .post(&settings.webhook_url)
        .timeout(SLACK_TIMEOUT)
        .json(&payload)
        .send()
        .await
    {
        Ok(response) => {
            if !response.status().is_success() {
                error!(
                    "error sending slack notification: http status {}",
                    response.status()
                );
            }
        }
        Err(e) => {
            error!("error sending slack notification: {e}");
        }
    }
}
