//! HTTP webhook notification backend.
//!
//! Posts a JSON document with the recipient lists and the full template
//! data bag to a configured URL; the receiving end decides what to do
//! with it.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info};

use crate::config::HttpConfig;
use crate::notify::{NotifyData, Recipients};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub url: String,
}

impl HttpSettings {
    pub fn from_config(config: Option<&HttpConfig>) -> Option<Self> {
        let Some(config) = config else {
            info!("HTTP settings missing, no HTTP notifications will be sent");
            return None;
        };
        if config.url.is_empty() {
            info!("HTTP settings incomplete, no HTTP notifications will be sent");
            return None;
        }
        debug!("valid HTTP notification settings found");
        Some(Self {
            url: config.url.clone(),
        })
    }
}

pub async fn send_alert_notification(
    client: &reqwest::Client,
    settings: &HttpSettings,
    recipients: &Recipients,
    data: &NotifyData,
) {
    let payload = json!({
        "email_recipients": recipients.emails,
        "sms_recipients": recipients.phones,
        "data": data,
    });
    match client
        .post(&settings.url)
        .timeout(HTTP_TIMEOUT)
        .json(&payload)
        .send()
        .await
    {
        Ok(response) => {
            if !response.status().is_success() {
                error!(
                    "error sending http notification: http status {}",
                    response.status()
                );
            }
        }
        Err(e) => {
            error!("error sending http notification: {e}");
        }
    }
}
