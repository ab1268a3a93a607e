//! In-process event bus for engine lifecycle events.
//!
//! The engine publishes an [`Event`] for every notable monitor lifecycle
//! step (scheduling, runs, check results, state changes, create/delete).
//! Observers subscribe through a broadcast channel, optionally with an
//! [`EventFilter`]; each subscriber runs in its own task so a misbehaving
//! listener cannot affect the publisher or other listeners. Payloads carry
//! the monitor id and snapshot fields only, never references into the
//! registries.

use std::collections::HashSet;

use tokio::sync::broadcast;
use tracing::warn;

use crate::models::MonitorState;
use crate::stats;

const EVENT_CAPACITY: usize = 256;

/// Engine lifecycle events with their stable wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ScheduleActiveMonitor,
    CreateActiveMonitor,
    RunActiveMonitor,
    ActiveMonitorCheckResult,
    ActiveMonitorStateChange,
    DeleteActiveMonitor,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ScheduleActiveMonitor => "SCHEDULE_ACTIVE_MONITOR",
            EventKind::CreateActiveMonitor => "CREATE_ACTIVE_MONITOR",
            EventKind::RunActiveMonitor => "RUN_ACTIVE_MONITOR",
            EventKind::ActiveMonitorCheckResult => "ACTIVE_MONITOR_CHECK_RESULT",
            EventKind::ActiveMonitorStateChange => "ACTIVE_MONITOR_STATE_CHANGE",
            EventKind::DeleteActiveMonitor => "DELETE_ACTIVE_MONITOR",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of monitor an event refers to. Only active monitors exist
/// today; the tag leaves room for other monitor types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    Active,
}

/// Snapshot reference to a monitor; no registry handle is retained.
#[derive(Debug, Clone, Copy)]
pub struct MonitorRef {
    pub kind: MonitorKind,
    pub id: i64,
}

/// Event-specific payload fields.
#[derive(Debug, Clone)]
pub enum EventDetail {
    None,
    Scheduled { interval_secs: u64 },
    CheckResult { check_state: MonitorState, msg: String },
    StateChange { new_state: MonitorState },
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: i64,
    pub monitor: Option<MonitorRef>,
    pub detail: EventDetail,
}

impl Event {
    /// An event about an active monitor.
    pub fn monitor(kind: EventKind, monitor_id: i64, detail: EventDetail) -> Self {
        Self {
            kind,
            timestamp: chrono::Utc::now().timestamp(),
            monitor: Some(MonitorRef {
                kind: MonitorKind::Active,
                id: monitor_id,
            }),
            detail,
        }
    }
}

/// Filter for event subscriptions.
///
/// An empty event set matches every event kind. An empty monitor set
/// matches everything; a non-empty monitor set matches events without a
/// monitor reference and active-monitor events whose id is in the set.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub events: HashSet<EventKind>,
    pub monitors: HashSet<i64>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if !self.events.is_empty() && !self.events.contains(&event.kind) {
            return false;
        }
        if self.monitors.is_empty() {
            return true;
        }
        match event.monitor {
            None => true,
            Some(MonitorRef {
                kind: MonitorKind::Active,
                id,
            }) => self.monitors.contains(&id),
        }
    }
}

/// Handle for publishing and subscribing to engine events. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        stats::set("event", "events_fired", 0);
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Never blocks; events are dropped when no
    /// subscriber exists.
    pub fn publish(&self, event: Event) {
        stats::inc("event", "events_fired");
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> EventStream {
        self.subscribe_filtered(EventFilter::default())
    }

    /// Subscribe with a filter applied on the receiving side.
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A filtered event subscription.
pub struct EventStream {
    rx: broadcast::Receiver<Event>,
    filter: EventFilter,
}

impl EventStream {
    /// Receive the next matching event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event listener lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Replace the event-kind filter.
    pub fn set_event_filter(&mut self, events: HashSet<EventKind>) {
        self.filter.events = events;
    }

    /// Replace the monitor-id filter.
    pub fn set_monitor_filter(&mut self, monitors: HashSet<i64>) {
        self.filter.monitors = monitors;
    }
}
