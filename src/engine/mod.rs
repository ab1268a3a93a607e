//! The active monitoring engine.
//!
//! Monitor definitions and monitors are loaded into memory at startup and
//! kept there, so every mutation updates both the database and the
//! in-memory registries owned by the manager.
//!
//! ```text
//! Scheduler tick ──▶ dispatch (concurrency cap) ──▶ check pipeline
//!                                                     │
//!                  template cache ◀── definition ◀────┤
//!                  plugin runner ─▶ classify ─▶ state machine
//!                                                     │
//!                    persistence (alert intervals) ◀──┤
//!                    notification fan-out (spawned) ◀─┘
//! ```

pub mod defs;
pub mod manager;
pub mod monitor;
pub mod sql;

pub use defs::{ActiveMonitorDef, DefArgSpec, MonitorDefUpdate};
pub use manager::{
    ActiveMonitorManager, DEFAULT_INTERVAL_SECS, DOWN_THRESHOLD, PLUGIN_TIMEOUT,
    UNKNOWN_THRESHOLD, create_active_monitor,
};
pub use monitor::{ActiveMonitor, CheckDelay, Decision, MonitorStatus, decide};
