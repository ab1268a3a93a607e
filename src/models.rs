//! Plain domain records shared across modules.
//!
//! These map one-to-one onto rows in the persistent schema. The engine keeps
//! richer in-memory structures (see `engine`), built from these records at
//! load time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable monitor state, after hysteresis has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorState {
    Up,
    Down,
    Unknown,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorState::Up => "UP",
            MonitorState::Down => "DOWN",
            MonitorState::Unknown => "UNKNOWN",
        }
    }

    /// Parse the database representation. Unrecognized values map to
    /// `Unknown` so a hand-edited database cannot wedge startup.
    pub fn from_db(s: &str) -> MonitorState {
        match s {
            "UP" => MonitorState::Up,
            "DOWN" => MonitorState::Down,
            _ => MonitorState::Unknown,
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A monitor definition row (`active_monitor_defs`).
#[derive(Debug, Clone)]
pub struct MonitorDefRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub active: bool,
    pub cmdline_filename: String,
    pub cmdline_args_tmpl: String,
    pub description_tmpl: String,
}

/// A parameter spec row for a monitor definition (`active_monitor_def_args`).
#[derive(Debug, Clone)]
pub struct DefArgRecord {
    pub id: i64,
    pub def_id: i64,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub required: bool,
    pub default_value: String,
}

/// An active monitor row (`active_monitors`).
#[derive(Debug, Clone)]
pub struct MonitorRecord {
    pub id: i64,
    pub def_id: i64,
    pub state: MonitorState,
    pub state_ts: i64,
    pub msg: String,
    pub alert_id: Option<i64>,
    pub deleted: bool,
    pub checks_enabled: bool,
    pub alerts_enabled: bool,
}

/// A monitor argument row (`active_monitor_args`).
#[derive(Debug, Clone)]
pub struct MonitorArgRecord {
    pub id: i64,
    pub monitor_id: i64,
    pub name: String,
    pub value: String,
}

/// An alert interval row (`active_monitor_alerts`).
///
/// `end_ts == 0` means the interval is still open.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub id: i64,
    pub monitor_id: i64,
    pub start_ts: i64,
    pub end_ts: i64,
    pub alert_msg: String,
}

impl AlertRecord {
    pub fn is_open(&self) -> bool {
        self.end_ts == 0
    }
}

/// A contact row (`contacts`).
#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
}

/// A contact group row (`contact_groups`).
#[derive(Debug, Clone, Serialize)]
pub struct ContactGroup {
    pub id: i64,
    pub name: String,
    pub active: bool,
}

/// A monitor group row (`monitor_groups`).
#[derive(Debug, Clone, Serialize)]
pub struct MonitorGroup {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
}

/// One metadata entry (`object_metadata`).
#[derive(Debug, Clone, Serialize)]
pub struct ObjectMetadata {
    pub object_type: String,
    pub object_id: i64,
    pub key: String,
    pub value: String,
}
