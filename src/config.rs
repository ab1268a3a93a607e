//! Startup configuration.
//!
//! The configuration is a single JSON file read at startup. Most sections
//! are optional and fall back to sensible defaults; notification backends
//! are disabled unless configured.

use std::path::PathBuf;

use tracing::trace;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Port the management API listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Credentials for the management API.
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Engine tuning.
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Log output destination.
    #[serde(default)]
    pub log: LogConfig,

    /// Notification backend settings (all backends optional).
    pub notifications: Option<NotificationsConfig>,
}

/// Database backend configuration.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// Embedded SQLite database file.
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./vigil.db")
}

fn default_listen_port() -> u16 {
    10000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    /// Global cap on concurrently running check plugins.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Debug mode: verbose logging and immediate first checks.
    #[serde(default)]
    pub debug: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            debug: false,
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    200
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub target: LogTarget,
}

/// Where log output goes.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Stdout,
    File {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotificationsConfig {
    pub email: Option<EmailConfig>,
    pub sms: Option<SmsConfig>,
    pub http: Option<HttpConfig>,
    pub slack: Option<SlackConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EmailConfig {
    /// Sender address for alert emails.
    pub sender: String,

    /// SMTP relay to deliver through.
    #[serde(default = "default_email_server")]
    pub server: String,

    /// Templates for the alert subject and body.
    pub subject_tmpl: String,
    pub body_tmpl: String,
}

fn default_email_server() -> String {
    "localhost".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum SmsConfig {
    Clicksend {
        username: String,
        api_key: String,
        sender: String,
        msg_tmpl: String,
    },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HttpConfig {
    /// URL alert payloads are POSTed to.
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub msg_tmpl: String,
    pub duration_tmpl: Option<String>,
    pub url_tmpl: Option<String>,
}

impl Config {
    /// Validate configuration values that serde cannot check.
    pub fn validate(&self) -> Result<(), String> {
        if self.monitoring.max_concurrent_jobs == 0 {
            return Err("max_concurrent_jobs must be at least 1".to_string());
        }
        if self.admin_user.is_some() != self.admin_password.is_some() {
            return Err("admin_user and admin_password must be set together".to_string());
        }
        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file: {e}"))?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
