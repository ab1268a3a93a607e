//! End-to-end state machine scenarios driven through real plugin runs

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use sqlx::Row;

use vigil::engine::{DOWN_THRESHOLD, UNKNOWN_THRESHOLD};
use vigil::event::EventKind;
use vigil::models::MonitorState;

use super::helpers::*;

#[tokio::test]
async fn test_steady_up() {
    let engine = test_engine(10).await;
    let plugin = write_plugin(engine.dir.path(), "check_ok", "echo \"OK\"; exit 0");
    let def = create_plain_def(&engine, &plugin).await;
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    assert_eq!(monitor.state().await, MonitorState::Unknown);
    monitor.run(&engine.manager).await.unwrap();

    let status = monitor.status().await;
    assert_eq!(status.state, MonitorState::Up);
    assert_eq!(status.msg, "OK");
    assert_eq!(status.alert_id, None);

    let alerts = count_rows(
        &engine.db,
        "SELECT COUNT(id) FROM active_monitor_alerts WHERE monitor_id=?",
        monitor.id,
    )
    .await;
    assert_eq!(alerts, 0);
}

#[tokio::test]
async fn test_hysteretic_down_and_recovery() {
    let engine = test_engine(10).await;
    let (plugin, mode_file) = write_mode_plugin(engine.dir.path());
    let def = create_plain_def(&engine, &plugin).await;
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    // Establish UP first.
    monitor.run(&engine.manager).await.unwrap();
    assert_eq!(monitor.state().await, MonitorState::Up);

    set_mode(&mode_file, "critical");

    // The first DOWN_THRESHOLD failing runs must not transition; the
    // scheduler arms short retries instead.
    for run in 0..DOWN_THRESHOLD {
        monitor.run(&engine.manager).await.unwrap();
        let status = monitor.status().await;
        assert_eq!(status.state, MonitorState::Up, "run {run} transitioned early");
        assert_eq!(status.consecutive_checks, run);
        let due_in = monitor.pending_tick_due().unwrap() - chrono::Utc::now().timestamp();
        assert!(due_in <= 31, "expected a short retry, due in {due_in}s");
    }

    // One more failing run crosses the threshold.
    monitor.run(&engine.manager).await.unwrap();
    let status = monitor.status().await;
    assert_eq!(status.state, MonitorState::Down);
    let alert_id = status.alert_id.expect("open alert after going down");

    let row = sqlx::query(
        "SELECT start_ts, end_ts, alert_msg FROM active_monitor_alerts WHERE id=?",
    )
    .bind(alert_id)
    .fetch_one(engine.db.pool())
    .await
    .unwrap();
    let start_ts: i64 = row.get("start_ts");
    let end_ts: i64 = row.get("end_ts");
    let alert_msg: String = row.get("alert_msg");
    assert_eq!(end_ts, 0);
    assert!(alert_msg.starts_with("CRITICAL"));

    // Recovery: a single OK run closes the alert.
    set_mode(&mode_file, "ok");
    monitor.run(&engine.manager).await.unwrap();
    let status = monitor.status().await;
    assert_eq!(status.state, MonitorState::Up);
    assert_eq!(status.alert_id, None);

    let row = sqlx::query("SELECT end_ts FROM active_monitor_alerts WHERE id=?")
        .bind(alert_id)
        .fetch_one(engine.db.pool())
        .await
        .unwrap();
    let end_ts: i64 = row.get("end_ts");
    assert!(end_ts >= start_ts);

    let open = count_rows(
        &engine.db,
        "SELECT COUNT(id) FROM active_monitor_alerts WHERE end_ts=0 AND monitor_id=?",
        monitor.id,
    )
    .await;
    assert_eq!(open, 0);
}

#[tokio::test]
async fn test_missing_executable_stays_unknown() {
    let engine = test_engine(10).await;
    let def = create_plain_def(&engine, "/nonexistent/check_nothing").await;
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    monitor.run(&engine.manager).await.unwrap();

    let status = monitor.status().await;
    assert_eq!(status.state, MonitorState::Unknown);
    assert!(status.msg.contains("executable not found"));
    assert_eq!(status.last_check_state, Some(MonitorState::Unknown));
}

#[tokio::test]
async fn test_up_to_unknown_needs_threshold() {
    let engine = test_engine(10).await;
    let plugin = write_plugin(engine.dir.path(), "check_ok", "echo \"OK\"; exit 0");
    let def = create_plain_def(&engine, &plugin).await;
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    monitor.run(&engine.manager).await.unwrap();
    assert_eq!(monitor.state().await, MonitorState::Up);

    // The executable disappearing classifies every later run as UNKNOWN.
    std::fs::remove_file(&plugin).unwrap();

    for run in 0..UNKNOWN_THRESHOLD {
        monitor.run(&engine.manager).await.unwrap();
        assert_eq!(
            monitor.state().await,
            MonitorState::Up,
            "run {run} transitioned early"
        );
    }
    monitor.run(&engine.manager).await.unwrap();
    let status = monitor.status().await;
    assert_eq!(status.state, MonitorState::Unknown);
    // UNKNOWN transitions never touch alert intervals.
    assert_eq!(status.alert_id, None);
}

#[tokio::test]
async fn test_down_from_unknown_is_immediate() {
    let engine = test_engine(10).await;
    let (plugin, mode_file) = write_mode_plugin(engine.dir.path());
    set_mode(&mode_file, "critical");
    let def = create_plain_def(&engine, &plugin).await;
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    assert_eq!(monitor.state().await, MonitorState::Unknown);
    monitor.run(&engine.manager).await.unwrap();

    let status = monitor.status().await;
    assert_eq!(status.state, MonitorState::Down);
    assert!(status.alert_id.is_some());
}

#[tokio::test]
async fn test_long_plugin_output_is_truncated() {
    let engine = test_engine(10).await;
    let plugin = write_plugin(
        engine.dir.path(),
        "check_long",
        "head -c 500 /dev/zero | tr '\\0' 'x'; exit 0",
    );
    let def = create_plain_def(&engine, &plugin).await;
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    monitor.run(&engine.manager).await.unwrap();

    let status = monitor.status().await;
    assert_eq!(status.msg.chars().count(), 199);
}

#[tokio::test]
async fn test_run_emits_lifecycle_events() {
    let engine = test_engine(10).await;
    let plugin = write_plugin(engine.dir.path(), "check_ok", "echo \"OK\"; exit 0");
    let def = create_plain_def(&engine, &plugin).await;

    let mut stream = engine.events.subscribe();
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    // Creation publishes CREATE followed by the initial SCHEDULE.
    assert_eq!(stream.recv().await.unwrap().kind, EventKind::CreateActiveMonitor);
    assert_eq!(stream.recv().await.unwrap().kind, EventKind::ScheduleActiveMonitor);

    monitor.run(&engine.manager).await.unwrap();

    let kinds = [
        stream.recv().await.unwrap().kind,
        stream.recv().await.unwrap().kind,
        stream.recv().await.unwrap().kind,
        stream.recv().await.unwrap().kind,
    ];
    assert_eq!(
        kinds,
        [
            EventKind::RunActiveMonitor,
            EventKind::ActiveMonitorStateChange,
            EventKind::ScheduleActiveMonitor,
            EventKind::ActiveMonitorCheckResult,
        ]
    );
}

#[tokio::test]
async fn test_disabled_checks_skip_execution() {
    let engine = test_engine(10).await;
    let (plugin, mode_file) = write_mode_plugin(engine.dir.path());
    let def = create_plain_def(&engine, &plugin).await;
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    monitor.run(&engine.manager).await.unwrap();
    assert_eq!(monitor.state().await, MonitorState::Up);

    // Disabling resets the monitor to UNKNOWN and stops plugin runs.
    monitor
        .set_checks_enabled(&engine.manager, false)
        .await
        .unwrap();
    assert_eq!(monitor.state().await, MonitorState::Unknown);

    // With checks disabled the failing plugin is never executed: the raw
    // outcome still reflects the earlier OK run.
    set_mode(&mode_file, "critical");
    monitor.run(&engine.manager).await.unwrap();
    let status = monitor.status().await;
    assert_eq!(status.state, MonitorState::Unknown);
    assert_eq!(status.last_check_state, Some(MonitorState::Up));
}
