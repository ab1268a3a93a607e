//! The active monitor manager and scheduler.
//!
//! The manager owns the in-memory registries of monitor definitions and
//! monitors, schedules every check as a one-shot timer task, enforces the
//! global concurrency cap and supervises pipeline failures. A periodic
//! failsafe scan re-schedules any monitor that lost its pending tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::db::Database;
use crate::engine::defs::ActiveMonitorDef;
use crate::engine::monitor::ActiveMonitor;
use crate::engine::sql;
use crate::errors::{EngineError, EngineResult};
use crate::event::{Event, EventBus, EventDetail, EventKind};
use crate::models::{MonitorRecord, MonitorState};
use crate::notify::NotificationManager;
use crate::stats;

pub const DEFAULT_INTERVAL_SECS: u64 = 180;
pub const DOWN_THRESHOLD: u32 = 3;
pub const UNKNOWN_THRESHOLD: u32 = 5;
pub const PLUGIN_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const STATS_SECTION: &str = "active_monitor";

const FAILSAFE_INTERVAL_SECS: u64 = 600;

/// Jitter applied to the interval when a monitor stays UP, to spread
/// check times out.
const UP_JITTER_SECS: i64 = 5;

pub struct ActiveMonitorManager {
    pub db: Database,
    pub notifier: Arc<NotificationManager>,
    pub events: EventBus,
    defs: RwLock<HashMap<i64, Arc<ActiveMonitorDef>>>,
    monitors: RwLock<HashMap<i64, Arc<ActiveMonitor>>>,
    running_jobs: AtomicUsize,
    max_concurrent_jobs: usize,
    debug_mode: bool,
}

impl ActiveMonitorManager {
    pub fn new(
        db: Database,
        notifier: Arc<NotificationManager>,
        events: EventBus,
        max_concurrent_jobs: usize,
        debug_mode: bool,
    ) -> Arc<Self> {
        if debug_mode {
            debug!("debug mode active, all monitors will be started immediately");
        }
        for counter in [
            "total_jobs_run",
            "cur_running_jobs",
            "num_monitors",
            "jobs_deferred",
            "checks_up",
            "checks_down",
            "checks_unknown",
        ] {
            stats::set(STATS_SECTION, counter, 0);
        }
        Arc::new(Self {
            db,
            notifier,
            events,
            defs: RwLock::new(HashMap::new()),
            monitors: RwLock::new(HashMap::new()),
            running_jobs: AtomicUsize::new(0),
            max_concurrent_jobs,
            debug_mode,
        })
    }

    /// Load all definitions and monitors from the database. Monitors
    /// flagged deleted by an interrupted two-phase delete are purged
    /// first.
    #[instrument(skip_all)]
    pub async fn initialize(&self) -> EngineResult<()> {
        sql::purge_marked_deleted(&self.db).await?;

        let def_records = sql::get_all_monitor_defs(&self.db).await?;
        let mut def_args = sql::get_def_args_by_def(&self.db).await?;
        let monitor_records = sql::get_all_monitors(&self.db).await?;
        let mut monitor_args = sql::get_monitor_args_by_monitor(&self.db).await?;

        {
            let mut defs = self.defs.write().unwrap();
            for record in def_records {
                let args = def_args.remove(&record.id).unwrap_or_default();
                defs.insert(record.id, Arc::new(ActiveMonitorDef::new(record, args)));
            }
            info!("loaded {} active monitor definitions", defs.len());
        }

        let mut monitors = self.monitors.write().unwrap();
        for record in monitor_records {
            if !self.defs.read().unwrap().contains_key(&record.def_id) {
                warn!(
                    "skipping monitor {} referencing missing def {}",
                    record.id, record.def_id
                );
                continue;
            }
            let args = monitor_args.remove(&record.id).unwrap_or_default();
            let monitor = Arc::new(ActiveMonitor::from_record(record, args));
            monitors.insert(monitor.id, monitor);
        }
        info!("loaded {} active monitors", monitors.len());
        Ok(())
    }

    /// Schedule a first check for every monitor and arm the failsafe.
    ///
    /// Initial delays are spread randomly over one full interval so a
    /// restart does not fire every check at once. Debug mode starts
    /// everything immediately.
    pub fn start(self: &Arc<Self>) {
        for monitor in self.monitors() {
            let start_delay = if self.debug_mode {
                0
            } else {
                rand::thread_rng().gen_range(1..=DEFAULT_INTERVAL_SECS)
            };
            self.schedule(&monitor, start_delay);
        }
        self.arm_failsafe();
    }

    /// Schedule a check in `delay_secs` seconds, cancelling any pending
    /// tick for the monitor first.
    pub fn schedule(self: &Arc<Self>, monitor: &Arc<ActiveMonitor>, delay_secs: u64) {
        debug!("scheduling monitor {} in {}s", monitor.id, delay_secs);
        let manager = Arc::clone(self);
        let monitor_id = monitor.id;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            manager.dispatch(monitor_id).await;
        });
        monitor.set_tick(handle, Utc::now().timestamp() + delay_secs as i64);
        self.events.publish(Event::monitor(
            EventKind::ScheduleActiveMonitor,
            monitor_id,
            EventDetail::Scheduled {
                interval_secs: delay_secs,
            },
        ));
    }

    /// Schedule at the default interval with a little jitter.
    pub fn schedule_jittered(self: &Arc<Self>, monitor: &Arc<ActiveMonitor>) {
        let jitter = rand::thread_rng().gen_range(-UP_JITTER_SECS..=UP_JITTER_SECS);
        let delay = (DEFAULT_INTERVAL_SECS as i64 + jitter).max(0) as u64;
        self.schedule(monitor, delay);
    }

    /// Entry point for fired ticks: enforce the concurrency cap and run
    /// the pipeline. Pipeline errors stop here; the monitor is always
    /// left with a pending tick.
    async fn dispatch(self: &Arc<Self>, monitor_id: i64) {
        let Some(monitor) = self.monitor(monitor_id) else {
            debug!("skipping scheduled job for missing monitor {monitor_id}");
            return;
        };
        monitor.clear_tick();
        if self.running_jobs.load(Ordering::SeqCst) >= self.max_concurrent_jobs {
            info!("deferred monitor {} due to too many running jobs", monitor_id);
            stats::inc(STATS_SECTION, "jobs_deferred");
            let delay = rand::thread_rng().gen_range(10..=30);
            self.schedule(&monitor, delay);
            return;
        }
        self.running_jobs.fetch_add(1, Ordering::SeqCst);
        stats::inc(STATS_SECTION, "total_jobs_run");
        stats::inc(STATS_SECTION, "cur_running_jobs");
        let result = monitor.run(self).await;
        self.running_jobs.fetch_sub(1, Ordering::SeqCst);
        stats::dec(STATS_SECTION, "cur_running_jobs");
        if let Err(e) = result {
            warn!("monitor {} run raised error: {}", monitor_id, e);
            if !monitor.has_pending_tick() && !monitor.is_deleted() {
                self.schedule(&monitor, DEFAULT_INTERVAL_SECS);
            }
        }
    }

    /// Failsafe: periodically re-schedule monitors that lost their
    /// pending tick. This shouldn't happen; it guards against scheduler
    /// bugs.
    fn arm_failsafe(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(FAILSAFE_INTERVAL_SECS)).await;
                manager.check_missing_schedules();
            }
        });
    }

    fn check_missing_schedules(self: &Arc<Self>) {
        debug!("running monitor missing schedule check");
        for monitor in self.monitors() {
            if !monitor.is_deleted() && !monitor.is_running() && !monitor.has_pending_tick() {
                warn!(
                    "monitor {} is missing its scheduled job, scheduling now",
                    monitor.id
                );
                self.schedule(&monitor, DEFAULT_INTERVAL_SECS);
            }
        }
    }

    pub fn monitor(&self, monitor_id: i64) -> Option<Arc<ActiveMonitor>> {
        self.monitors.read().unwrap().get(&monitor_id).cloned()
    }

    pub fn monitors(&self) -> Vec<Arc<ActiveMonitor>> {
        self.monitors.read().unwrap().values().cloned().collect()
    }

    pub fn def(&self, def_id: i64) -> Option<Arc<ActiveMonitorDef>> {
        self.defs.read().unwrap().get(&def_id).cloned()
    }

    pub fn defs(&self) -> Vec<Arc<ActiveMonitorDef>> {
        self.defs.read().unwrap().values().cloned().collect()
    }

    /// Find a definition by name. Names are not unique; the first match
    /// wins.
    pub fn find_def_by_name(&self, name: &str) -> Option<Arc<ActiveMonitorDef>> {
        self.defs
            .read()
            .unwrap()
            .values()
            .find(|def| def.name() == name)
            .cloned()
    }

    /// Number of pipeline runs currently in flight.
    pub fn running_jobs(&self) -> usize {
        self.running_jobs.load(Ordering::SeqCst)
    }

    /// Register a new monitor and schedule its first check immediately.
    pub fn add_monitor(self: &Arc<Self>, monitor: Arc<ActiveMonitor>) {
        self.events.publish(Event::monitor(
            EventKind::CreateActiveMonitor,
            monitor.id,
            EventDetail::None,
        ));
        self.monitors
            .write()
            .unwrap()
            .insert(monitor.id, Arc::clone(&monitor));
        self.schedule(&monitor, 0);
    }

    pub(crate) fn remove_monitor(&self, monitor_id: i64) {
        self.monitors.write().unwrap().remove(&monitor_id);
    }

    pub(crate) fn insert_def(&self, def: Arc<ActiveMonitorDef>) {
        self.defs.write().unwrap().insert(def.id, def);
    }

    pub(crate) fn remove_def(&self, def_id: i64) {
        self.defs.write().unwrap().remove(&def_id);
    }

    /// Cancel every pending tick. Used on shutdown.
    pub fn shutdown(&self) {
        for monitor in self.monitors() {
            monitor.cancel_tick();
        }
    }
}

/// Create a new monitor for a definition, validate and persist its
/// arguments, register it and schedule an immediate first check.
pub async fn create_active_monitor(
    manager: &Arc<ActiveMonitorManager>,
    def_id: i64,
    args: HashMap<String, String>,
) -> EngineResult<Arc<ActiveMonitor>> {
    let def = manager
        .def(def_id)
        .ok_or_else(|| EngineError::NotFound(format!("monitor def {def_id}")))?;
    def.validate_args(&args, false)?;
    let monitor_id = sql::create_monitor(&manager.db, def_id, &args).await?;
    let record = MonitorRecord {
        id: monitor_id,
        def_id,
        state: MonitorState::Unknown,
        state_ts: 0,
        msg: String::new(),
        alert_id: None,
        deleted: false,
        checks_enabled: true,
        alerts_enabled: true,
    };
    let monitor = Arc::new(ActiveMonitor::from_record(record, args));
    info!("created active monitor {}", monitor_id);
    manager.add_monitor(Arc::clone(&monitor));
    Ok(monitor)
}
