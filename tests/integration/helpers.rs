//! Helper functions for integration tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use vigil::db::Database;
use vigil::engine::{self, ActiveMonitor, ActiveMonitorManager};
use vigil::event::EventBus;
use vigil::models::MonitorDefRecord;
use vigil::notify::NotificationManager;

pub struct TestEngine {
    pub dir: TempDir,
    pub db: Database,
    pub events: EventBus,
    pub manager: Arc<ActiveMonitorManager>,
}

/// Build an engine over a scratch database. Debug mode is on so initial
/// schedules have no random delay; notifications are disabled.
pub async fn test_engine(max_concurrent_jobs: usize) -> TestEngine {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::connect(dir.path().join("vigil.db")).await.unwrap();
    db.initialize().await.unwrap();
    let events = EventBus::new();
    let manager = ActiveMonitorManager::new(
        db.clone(),
        Arc::new(NotificationManager::disabled()),
        events.clone(),
        max_concurrent_jobs,
        true,
    );
    manager.initialize().await.unwrap();
    TestEngine {
        dir,
        db,
        events,
        manager,
    }
}

/// Write an executable shell script into the test directory.
pub fn write_plugin(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

/// A plugin whose behavior is switched through a mode file: `ok`,
/// `critical` or anything else (treated as ok).
pub fn write_mode_plugin(dir: &Path) -> (String, std::path::PathBuf) {
    let mode_file = dir.join("mode");
    std::fs::write(&mode_file, "ok").unwrap();
    let body = format!(
        r#"mode=$(cat {mode})
case "$mode" in
    critical)
        echo "CRITICAL - service busted"
        exit 2
        ;;
    *)
        echo "OK"
        exit 0
        ;;
esac"#,
        mode = mode_file.display()
    );
    let plugin = write_plugin(dir, "check_mode", &body);
    (plugin, mode_file)
}

pub fn set_mode(mode_file: &Path, mode: &str) {
    std::fs::write(mode_file, mode).unwrap();
}

/// Create a definition with no parameters around the given executable.
pub async fn create_plain_def(
    engine: &TestEngine,
    executable: &str,
) -> Arc<vigil::engine::ActiveMonitorDef> {
    engine::defs::create_monitor_def(
        &engine.manager,
        MonitorDefRecord {
            id: 0,
            name: "Test monitor".to_string(),
            description: "Test monitor def".to_string(),
            active: true,
            cmdline_filename: executable.to_string(),
            cmdline_args_tmpl: String::new(),
            description_tmpl: "Test monitor".to_string(),
        },
    )
    .await
    .unwrap()
}

/// Create a monitor for a definition and cancel its automatic first
/// tick so tests can drive runs by hand.
pub async fn create_idle_monitor(
    engine: &TestEngine,
    def_id: i64,
    args: HashMap<String, String>,
) -> Arc<ActiveMonitor> {
    let monitor = engine::create_active_monitor(&engine.manager, def_id, args)
        .await
        .unwrap();
    engine.manager.shutdown();
    monitor
}

/// Count rows in a table matching one integer bind.
pub async fn count_rows(db: &Database, sql: &str, id: i64) -> i64 {
    sqlx::query_scalar(sql)
        .bind(id)
        .fetch_one(db.pool())
        .await
        .unwrap()
}
