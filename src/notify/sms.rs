//! SMS notification backend.
//!
//! Currently backed by the ClickSend HTTP API.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info};

use crate::config::SmsConfig;
use crate::notify::NotifyData;
use crate::templates;
use crate::util;

const CLICKSEND_URL: &str = "https://rest.clicksend.com/v3/sms/send";
const SMS_TIMEOUT: Duration = Duration::from_secs(30);

/// SMS bodies are capped by the transport.
const MAX_SMS_LEN: usize = 140;

#[derive(Debug, Clone)]
pub struct SmsSettings {
    pub username: String,
    pub api_key: String,
    pub sender: String,
    pub msg_tmpl: String,
}

impl SmsSettings {
    pub fn from_config(config: Option<&SmsConfig>) -> Option<Self> {
        let Some(SmsConfig::Clicksend {
            username,
            api_key,
            sender,
            msg_tmpl,
        }) = config
        else {
            info!("no SMS provider specified, no sms notifications will be sent");
            return None;
        };
        if username.is_empty() || api_key.is_empty() || sender.is_empty() || msg_tmpl.is_empty() {
            info!("SMS settings incomplete, no sms notifications will be sent");
            return None;
        }
        debug!("valid SMS notification settings found");
        Some(Self {
            username: username.clone(),
            api_key: api_key.clone(),
            sender: sender.clone(),
            msg_tmpl: msg_tmpl.clone(),
        })
    }
}

pub async fn send_alert_notification(
    client: &reqwest::Client,
    settings: &SmsSettings,
    recipients: &HashSet<String>,
    data: &NotifyData,
) {
    let message = match templates::render(&settings.msg_tmpl, data) {
        Ok(message) => message,
        Err(e) => {
            error!("error rendering sms template: {e}");
            return;
        }
    };
    send_sms(client, settings, recipients, &message).await;
}

/// Send an SMS to one or more recipients through ClickSend.
pub async fn send_sms(
    client: &reqwest::Client,
    settings: &SmsSettings,
    recipients: &HashSet<String>,
    message: &str,
) {
    let body = util::truncate_chars(message, MAX_SMS_LEN);
    let messages: Vec<_> = recipients
        .iter()
        .map(|recipient| {
            json!({
                "source": "vigil",
                "from": settings.sender,
                "body": body,
                "to": recipient,
                "schedule": "",
            })
        })
        .collect();
    let payload = json!({ "messages": messages });

    match client
        .post(CLICKSEND_URL)
        .basic_auth(&settings.username, Some(&settings.api_key))
        .timeout(SMS_TIMEOUT)
        .json(&payload)
        .send()
        .await
    {
        Ok(response) => {
            if !response.status().is_success() {
                error!(
                    "error sending clicksend sms notification: http status {}",
                    response.status()
                );
            }
        }
        Err(e) => {
            error!("error sending clicksend sms notification: {e}");
        }
    }
}
