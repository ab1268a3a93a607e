//! Active monitor instances and the check outcome pipeline.
//!
//! An [`ActiveMonitor`] is a concrete, schedulable monitor bound to a
//! definition with specific argument values. Each run of the pipeline
//! invokes the check plugin, classifies the outcome into a raw state,
//! applies the hysteresis state machine and persists any transition
//! together with its alert interval in a single database transaction.
//!
//! ## State machine
//!
//! Raw outcomes only become stable state after enough consecutive equal
//! observations:
//!
//! ```text
//! UP      --DOWN x(DOWN_THRESHOLD+1)-->    DOWN   (30s retries meanwhile)
//! UP      --UNKNOWN x(UNKNOWN_THRESHOLD+1)--> UNKNOWN (120s retries)
//! DOWN    --UP-->                          UP     (immediately)
//! UNKNOWN --DOWN-->                        DOWN   (immediately)
//! ```
//!
//! Entering DOWN opens an alert interval; leaving DOWN for UP closes it.
//! Transitions through UNKNOWN neither open nor close intervals.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::contacts;
use crate::db::{Database, DbError};
use crate::engine::manager::{
    ActiveMonitorManager, DEFAULT_INTERVAL_SECS, DOWN_THRESHOLD, PLUGIN_TIMEOUT, STATS_SECTION,
    UNKNOWN_THRESHOLD,
};
use crate::engine::sql;
use crate::errors::{EngineError, EngineResult};
use crate::event::{Event, EventDetail, EventKind};
use crate::metadata;
use crate::models::{MonitorRecord, MonitorState};
use crate::plugin::{self, PluginError};
use crate::stats;
use crate::util;

/// Stored monitor messages are capped at this many characters.
const MAX_MSG_LEN: usize = 199;

/// Delay used by [`ActiveMonitor::schedule_immediately`].
const IMMEDIATE_DELAY_SECS: u64 = 5;

/// A pending one-shot scheduler tick.
#[derive(Debug)]
pub struct ScheduledTick {
    handle: JoinHandle<()>,
    pub due_ts: i64,
}

/// Mutable monitor state, guarded by the instance's mutation lock. The
/// lock is held for the whole pipeline run, so at most one run per
/// monitor is ever in flight.
#[derive(Debug)]
pub struct RunState {
    pub args: HashMap<String, String>,
    pub state: MonitorState,
    pub state_ts: i64,
    pub msg: String,
    pub alert_id: Option<i64>,
    pub checks_enabled: bool,
    pub alerts_enabled: bool,
    pub last_check_state: Option<MonitorState>,
    pub consecutive_checks: u32,
    pub last_check: i64,
}

/// Read-only snapshot of a monitor's current state.
#[derive(Debug, Clone)]
pub struct MonitorStatus {
    pub id: i64,
    pub def_id: i64,
    pub state: MonitorState,
    pub state_ts: i64,
    pub msg: String,
    pub alert_id: Option<i64>,
    pub checks_enabled: bool,
    pub alerts_enabled: bool,
    pub last_check_state: Option<MonitorState>,
    pub consecutive_checks: u32,
    pub args: HashMap<String, String>,
}

#[derive(Debug)]
pub struct ActiveMonitor {
    pub id: i64,
    pub def_id: i64,
    running: AtomicBool,
    deleted: AtomicBool,
    pending_reset: AtomicBool,
    sched: StdMutex<Option<ScheduledTick>>,
    state: Mutex<RunState>,
}

/// What one observed raw state means for a monitor in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// State to transition into, if any.
    pub new_state: Option<MonitorState>,
    /// When to run the next check.
    pub delay: CheckDelay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDelay {
    /// The default monitoring interval.
    Interval,
    /// The default interval with a small random jitter to spread load.
    IntervalJittered,
    /// A fixed retry delay in seconds.
    Seconds(u64),
}

/// The hysteresis state machine.
///
/// `consecutive` counts prior checks with the same raw outcome; it resets
/// whenever the raw outcome changes, never on a state transition.
pub fn decide(current: MonitorState, observed: MonitorState, consecutive: u32) -> Decision {
    use MonitorState::*;
    match (current, observed) {
        (Up, Up) => Decision {
            new_state: None,
            delay: CheckDelay::IntervalJittered,
        },
        (Down, Up) | (Unknown, Up) => Decision {
            new_state: Some(Up),
            delay: CheckDelay::Interval,
        },
        (Down, Down) => Decision {
            new_state: None,
            delay: CheckDelay::Interval,
        },
        // No hysteresis out of UNKNOWN: the monitor was already not ok.
        (Unknown, Down) => Decision {
            new_state: Some(Down),
            delay: CheckDelay::Interval,
        },
        (Up, Down) => {
            if consecutive >= DOWN_THRESHOLD {
                Decision {
                    new_state: Some(Down),
                    delay: CheckDelay::Interval,
                }
            } else {
                Decision {
                    new_state: None,
                    delay: CheckDelay::Seconds(30),
                }
            }
        }
        (Unknown, Unknown) => Decision {
            new_state: None,
            delay: CheckDelay::Interval,
        },
        (Up, Unknown) | (Down, Unknown) => {
            if consecutive >= UNKNOWN_THRESHOLD {
                Decision {
                    new_state: Some(Unknown),
                    delay: CheckDelay::Interval,
                }
            } else {
                Decision {
                    new_state: None,
                    delay: CheckDelay::Seconds(120),
                }
            }
        }
    }
}

impl ActiveMonitor {
    /// Build an instance from its stored record. Used both at startup
    /// load and when a monitor is created.
    pub fn from_record(record: MonitorRecord, args: HashMap<String, String>) -> Self {
        let now = Utc::now().timestamp();
        let state_ts = if record.state_ts > 0 {
            record.state_ts
        } else {
            now
        };
        stats::inc(STATS_SECTION, "num_monitors");
        Self {
            id: record.id,
            def_id: record.def_id,
            running: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            pending_reset: AtomicBool::new(false),
            sched: StdMutex::new(None),
            state: Mutex::new(RunState {
                args,
                state: record.state,
                state_ts,
                msg: record.msg,
                alert_id: record.alert_id,
                checks_enabled: record.checks_enabled,
                alerts_enabled: record.alerts_enabled,
                last_check_state: None,
                consecutive_checks: 0,
                last_check: now,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn has_pending_tick(&self) -> bool {
        self.sched.lock().unwrap().is_some()
    }

    /// Epoch timestamp the pending tick is due at, if one is registered.
    pub fn pending_tick_due(&self) -> Option<i64> {
        self.sched.lock().unwrap().as_ref().map(|t| t.due_ts)
    }

    /// Register a new pending tick, cancelling any prior one.
    pub(crate) fn set_tick(&self, handle: JoinHandle<()>, due_ts: i64) {
        let mut sched = self.sched.lock().unwrap();
        if let Some(prior) = sched.take() {
            prior.handle.abort();
        }
        *sched = Some(ScheduledTick { handle, due_ts });
    }

    /// Drop the pending tick reference without aborting it. Called by the
    /// dispatcher when the tick fires.
    pub(crate) fn clear_tick(&self) {
        self.sched.lock().unwrap().take();
    }

    /// Cancel any pending tick.
    pub(crate) fn cancel_tick(&self) {
        if let Some(tick) = self.sched.lock().unwrap().take() {
            tick.handle.abort();
        }
    }

    pub async fn state(&self) -> MonitorState {
        self.state.lock().await.state
    }

    pub async fn status(&self) -> MonitorStatus {
        let st = self.state.lock().await;
        MonitorStatus {
            id: self.id,
            def_id: self.def_id,
            state: st.state,
            state_ts: st.state_ts,
            msg: st.msg.clone(),
            alert_id: st.alert_id,
            checks_enabled: st.checks_enabled,
            alerts_enabled: st.alerts_enabled,
            last_check_state: st.last_check_state,
            consecutive_checks: st.consecutive_checks,
            args: st.args.clone(),
        }
    }

    /// Run one check pipeline pass. Skips silently when the monitor is
    /// deleted or a run is already in flight.
    pub async fn run(
        self: &Arc<Self>,
        manager: &Arc<ActiveMonitorManager>,
    ) -> EngineResult<()> {
        if self.is_deleted() || self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut result = self.run_inner(manager).await;
        if self.is_deleted() {
            if let Err(e) = self.purge(manager).await {
                warn!("failed to purge deleted monitor {}: {}", self.id, e);
                result = result.and(Err(e));
            }
            self.cancel_tick();
        }
        self.running.store(false, Ordering::SeqCst);
        result
    }

    #[instrument(skip_all, fields(monitor = self.id))]
    async fn run_inner(
        self: &Arc<Self>,
        manager: &Arc<ActiveMonitorManager>,
    ) -> EngineResult<()> {
        let mut st = self.state.lock().await;

        if self.pending_reset.swap(false, Ordering::SeqCst) {
            self.apply_reset(&mut st, &manager.db).await?;
        }
        if !st.checks_enabled {
            debug!("skipping monitor check, disabled");
            manager.schedule(self, DEFAULT_INTERVAL_SECS);
            return Ok(());
        }
        st.last_check = Utc::now().timestamp();

        let def = manager
            .def(self.def_id)
            .ok_or_else(|| EngineError::NotFound(format!("monitor def {}", self.def_id)))?;
        let argv = def.expanded_args(self.id, &st.args)?;
        let executable = def.cmdline_filename();
        debug!("monitoring: {} {:?}", executable, argv);
        manager
            .events
            .publish(Event::monitor(EventKind::RunActiveMonitor, self.id, EventDetail::None));

        let (observed, raw_msg) = match plugin::run_plugin(&executable, &argv, PLUGIN_TIMEOUT).await
        {
            Ok(output) => (MonitorState::Up, output.text),
            Err(PluginError::Failed(msg)) => {
                debug!("monitoring failed: {msg}");
                (MonitorState::Down, msg)
            }
            Err(err) => {
                debug!("monitoring unknown error: {err}");
                (MonitorState::Unknown, err.to_string())
            }
        };
        let msg = util::truncate_chars(&raw_msg, MAX_MSG_LEN);
        st.msg = msg.clone();

        // Consecutive counter tracks equal raw outcomes, not states.
        if st.last_check_state == Some(observed) {
            st.consecutive_checks += 1;
        } else {
            st.consecutive_checks = 0;
        }
        st.last_check_state = Some(observed);

        match observed {
            MonitorState::Up => stats::inc(STATS_SECTION, "checks_up"),
            MonitorState::Down => stats::inc(STATS_SECTION, "checks_down"),
            MonitorState::Unknown => stats::inc(STATS_SECTION, "checks_unknown"),
        }

        let decision = decide(st.state, observed, st.consecutive_checks);
        if let Some(new_state) = decision.new_state {
            self.state_change(&mut st, new_state, &msg, manager).await?;
        }
        match decision.delay {
            CheckDelay::Interval => manager.schedule(self, DEFAULT_INTERVAL_SECS),
            CheckDelay::IntervalJittered => manager.schedule_jittered(self),
            CheckDelay::Seconds(secs) => manager.schedule(self, secs),
        }
        manager.events.publish(Event::monitor(
            EventKind::ActiveMonitorCheckResult,
            self.id,
            EventDetail::CheckResult {
                check_state: observed,
                msg,
            },
        ));
        debug!("monitoring complete");
        Ok(())
    }

    async fn state_change(
        &self,
        st: &mut RunState,
        new_state: MonitorState,
        msg: &str,
        manager: &Arc<ActiveMonitorManager>,
    ) -> EngineResult<()> {
        manager.events.publish(Event::monitor(
            EventKind::ActiveMonitorStateChange,
            self.id,
            EventDetail::StateChange { new_state },
        ));
        let prev_state = st.state;
        let prev_state_ts = st.state_ts;
        st.state = new_state;
        st.state_ts = Utc::now().timestamp();
        st.msg = msg.to_string();
        info!("monitor {} changed state to {} - {}", self.id, new_state, msg);

        match new_state {
            MonitorState::Down => {
                self.persist_down(st, &manager.db).await?;
                self.notify_state_change(st, prev_state, prev_state_ts, manager)
                    .await?;
            }
            MonitorState::Up => {
                self.persist_up(st, &manager.db).await?;
                if prev_state == MonitorState::Down {
                    self.notify_state_change(st, prev_state, prev_state_ts, manager)
                        .await?;
                }
            }
            MonitorState::Unknown => {
                self.persist_state(st, &manager.db).await?;
            }
        }
        Ok(())
    }

    /// Open a new alert interval and save the monitor row, atomically.
    async fn persist_down(&self, st: &mut RunState, db: &Database) -> EngineResult<()> {
        let mut tx = db.begin().await?;
        let sql =
            "INSERT INTO active_monitor_alerts (monitor_id, start_ts, end_ts, alert_msg) \
             VALUES (?, ?, 0, ?)";
        let result = sqlx::query(sql)
            .bind(self.id)
            .bind(st.state_ts)
            .bind(&st.msg)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        let alert_id = result.last_insert_rowid();
        Self::save_state_tx(&mut tx, self.id, st, Some(alert_id)).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::query("persist_down commit", e))?;
        st.alert_id = Some(alert_id);
        Ok(())
    }

    /// Close any open alert interval and save the monitor row, atomically.
    async fn persist_up(&self, st: &mut RunState, db: &Database) -> EngineResult<()> {
        let mut tx = db.begin().await?;
        if let Some(alert_id) = st.alert_id {
            let sql = "UPDATE active_monitor_alerts SET end_ts=? WHERE id=?";
            sqlx::query(sql)
                .bind(st.state_ts)
                .bind(alert_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::query(sql, e))?;
        }
        Self::save_state_tx(&mut tx, self.id, st, None).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::query("persist_up commit", e))?;
        st.alert_id = None;
        Ok(())
    }

    /// Save the monitor row without touching alert intervals.
    async fn persist_state(&self, st: &mut RunState, db: &Database) -> EngineResult<()> {
        let mut tx = db.begin().await?;
        Self::save_state_tx(&mut tx, self.id, st, st.alert_id).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::query("persist_state commit", e))?;
        Ok(())
    }

    async fn save_state_tx(
        tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
        monitor_id: i64,
        st: &RunState,
        alert_id: Option<i64>,
    ) -> EngineResult<()> {
        let sql = "UPDATE active_monitors SET state=?, state_ts=?, msg=?, alert_id=? WHERE id=?";
        sqlx::query(sql)
            .bind(st.state.as_str())
            .bind(st.state_ts)
            .bind(&st.msg)
            .bind(alert_id)
            .bind(monitor_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        Ok(())
    }

    /// Kick off notification fan-out for a state change. The actual sends
    /// run in a spawned task so monitoring never waits on delivery.
    async fn notify_state_change(
        &self,
        st: &RunState,
        prev_state: MonitorState,
        prev_state_ts: i64,
        manager: &Arc<ActiveMonitorManager>,
    ) -> EngineResult<()> {
        if !st.alerts_enabled {
            debug!("skipping alert notifications, disabled");
            return Ok(());
        }
        let recipients = contacts::recipients_for_active_monitor(&manager.db, self.id).await?;
        let monitor_metadata =
            metadata::get_metadata(&manager.db, metadata::ACTIVE_MONITOR, self.id).await?;

        let mut data: HashMap<String, String> = HashMap::new();
        for (key, value) in monitor_metadata {
            data.insert(format!("meta_{key}"), value);
        }
        if prev_state_ts > 0 && st.state_ts > prev_state_ts {
            data.insert(
                "state_elapsed".to_string(),
                util::display_duration(st.state_ts - prev_state_ts),
            );
        }
        data.insert("state".to_string(), st.state.as_str().to_string());
        data.insert("prev_state".to_string(), prev_state.as_str().to_string());
        data.insert("type".to_string(), "active_monitor".to_string());
        data.insert("id".to_string(), self.id.to_string());
        let description = manager
            .def(self.def_id)
            .and_then(|def| def.expanded_description(self.id, &st.args).ok())
            .unwrap_or_default();
        data.insert("monitor_description".to_string(), description);
        data.insert("msg".to_string(), st.msg.clone());

        let notifier = Arc::clone(&manager.notifier);
        tokio::spawn(async move {
            notifier.send_notification(recipients, data).await;
        });
        Ok(())
    }

    /// Reset to the initial state: UNKNOWN, zeroed counters, any open
    /// alert closed. Deferred with the pending-reset flag while a run is
    /// in flight.
    async fn apply_reset(&self, st: &mut RunState, db: &Database) -> EngineResult<()> {
        st.state = MonitorState::Unknown;
        st.state_ts = Utc::now().timestamp();
        st.msg = String::new();
        st.consecutive_checks = 0;
        self.persist_up(st, db).await
    }

    /// Replace the monitor's arguments after validating them against the
    /// definition schema. Flushes the cached template expansions.
    pub async fn update_args(
        &self,
        manager: &ActiveMonitorManager,
        args: HashMap<String, String>,
    ) -> EngineResult<()> {
        let def = manager
            .def(self.def_id)
            .ok_or_else(|| EngineError::NotFound(format!("monitor def {}", self.def_id)))?;
        def.validate_args(&args, false)?;
        info!("updating arguments for monitor {}", self.id);
        let mut st = self.state.lock().await;
        sql::replace_monitor_args(&manager.db, self.id, &args).await?;
        st.args = args;
        def.tmpl_cache.flush_monitor(self.id);
        Ok(())
    }

    /// Enable or disable check execution. Disabling resets the monitor;
    /// both directions trigger a prompt re-check.
    pub async fn set_checks_enabled(
        self: &Arc<Self>,
        manager: &Arc<ActiveMonitorManager>,
        checks_enabled: bool,
    ) -> EngineResult<()> {
        {
            let mut st = self.state.lock().await;
            if st.checks_enabled == checks_enabled {
                return Ok(());
            }
            debug!("setting monitor {} checks to {}", self.id, checks_enabled);
            st.checks_enabled = checks_enabled;
            if !checks_enabled {
                if self.is_running() {
                    self.pending_reset.store(true, Ordering::SeqCst);
                } else {
                    self.apply_reset(&mut st, &manager.db).await?;
                }
            }
            let sql = "UPDATE active_monitors SET checks_enabled=? WHERE id=?";
            sqlx::query(sql)
                .bind(checks_enabled)
                .bind(self.id)
                .execute(manager.db.pool())
                .await
                .map_err(|e| DbError::query(sql, e))?;
        }
        self.schedule_immediately(manager);
        Ok(())
    }

    /// Enable or disable alert notifications.
    pub async fn set_alerts_enabled(
        &self,
        manager: &ActiveMonitorManager,
        alerts_enabled: bool,
    ) -> EngineResult<()> {
        let mut st = self.state.lock().await;
        if st.alerts_enabled == alerts_enabled {
            return Ok(());
        }
        debug!("setting monitor {} alerts to {}", self.id, alerts_enabled);
        st.alerts_enabled = alerts_enabled;
        let sql = "UPDATE active_monitors SET alerts_enabled=? WHERE id=?";
        sqlx::query(sql)
            .bind(alerts_enabled)
            .bind(self.id)
            .execute(manager.db.pool())
            .await
            .map_err(|e| DbError::query(sql, e))?;
        Ok(())
    }

    /// Schedule a check for this monitor as soon as possible.
    pub fn schedule_immediately(self: &Arc<Self>, manager: &Arc<ActiveMonitorManager>) {
        if !self.is_running() && !self.is_deleted() {
            info!("forcing immediate check of monitor {}", self.id);
            manager.schedule(self, IMMEDIATE_DELAY_SECS);
        }
    }

    /// Delete this monitor.
    ///
    /// The instance disappears from the registry immediately. If a run is
    /// in flight the database purge happens when it completes; otherwise
    /// it happens now.
    pub async fn delete(
        self: &Arc<Self>,
        manager: &Arc<ActiveMonitorManager>,
    ) -> EngineResult<()> {
        if self.deleted.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("deleting monitor {}", self.id);
        manager.events.publish(Event::monitor(
            EventKind::DeleteActiveMonitor,
            self.id,
            EventDetail::None,
        ));
        manager.remove_monitor(self.id);
        self.cancel_tick();
        if self.is_running() {
            sql::mark_monitor_deleted(&manager.db, self.id).await?;
        } else {
            self.purge(manager).await?;
        }
        Ok(())
    }

    /// Remove every trace of this monitor from the database.
    async fn purge(&self, manager: &Arc<ActiveMonitorManager>) -> EngineResult<()> {
        info!("purging deleted monitor {}", self.id);
        stats::dec(STATS_SECTION, "num_monitors");
        if let Some(def) = manager.def(self.def_id) {
            def.tmpl_cache.flush_monitor(self.id);
        }
        sql::purge_monitor(&manager.db, self.id).await?;
        Ok(())
    }
}
