//! Alert notification fan-out.
//!
//! A [`NotificationManager`] holds the settings for every configured
//! notification backend (email, SMS, HTTP webhook, chat webhook). Backend
//! settings are parsed once at startup; a backend with missing settings is
//! disabled with a log line. `send_notification` invokes every enabled
//! backend; backends are independent and a failure in one is logged
//! without affecting the others. Callers spawn the send so monitoring is
//! never blocked on notification delivery.

pub mod email;
pub mod http;
pub mod slack;
pub mod sms;

use std::collections::{HashMap, HashSet};

use futures::future::BoxFuture;
use tracing::info;

use crate::config::NotificationsConfig;

/// Notification addresses collected for a monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub emails: HashSet<String>,
    pub phones: HashSet<String>,
}

impl Recipients {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.phones.is_empty()
    }
}

/// Template values handed to every backend: `state`, `prev_state`,
/// `state_elapsed`, `type`, `id`, `monitor_description`, `msg` and one
/// `meta_<key>` entry per monitor metadata entry.
pub type NotifyData = HashMap<String, String>;

pub struct NotificationManager {
    email: Option<email::EmailSettings>,
    sms: Option<sms::SmsSettings>,
    http: Option<http::HttpSettings>,
    slack: Option<slack::SlackSettings>,
    client: reqwest::Client,
}

impl NotificationManager {
    pub fn new(config: Option<&NotificationsConfig>) -> Self {
        let Some(config) = config else {
            info!("no notification settings, alert notifications will not be sent");
            return Self::disabled();
        };
        Self {
            email: email::EmailSettings::from_config(config.email.as_ref()),
            sms: sms::SmsSettings::from_config(config.sms.as_ref()),
            http: http::HttpSettings::from_config(config.http.as_ref()),
            slack: slack::SlackSettings::from_config(config.slack.as_ref()),
            client: reqwest::Client::new(),
        }
    }

    /// A manager with every backend disabled.
    pub fn disabled() -> Self {
        Self {
            email: None,
            sms: None,
            http: None,
            slack: None,
            client: reqwest::Client::new(),
        }
    }

    /// Fan a notification out to every configured backend.
    ///
    /// Backends run concurrently; each one logs its own failures.
    pub async fn send_notification(&self, recipients: Recipients, data: NotifyData) {
        let mut sends: Vec<BoxFuture<'_, ()>> = Vec::new();
        if let Some(settings) = &self.email
            && !recipients.emails.is_empty()
        {
            sends.push(Box::pin(email::send_alert_notification(
                settings,
                &recipients.emails,
                &data,
            )));
        }
        if let Some(settings) = &self.sms
            && !recipients.phones.is_empty()
        {
            sends.push(Box::pin(sms::send_alert_notification(
                &self.client,
                settings,
                &recipients.phones,
                &data,
            )));
        }
        if let Some(settings) = &self.http {
            sends.push(Box::pin(http::send_alert_notification(
                &self.client,
                settings,
                &recipients,
                &data,
            )));
        }
        if let Some(settings) = &self.slack {
            sends.push(Box::pin(slack::send_alert_notification(
                &self.client,
                settings,
                &data,
            )));
        }
        futures::future::join_all(sends).await;
    }
}
