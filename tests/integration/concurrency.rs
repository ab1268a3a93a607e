//! Concurrency cap and scheduler behavior

use std::collections::HashMap;
use std::time::Duration;

use vigil::models::MonitorState;

use super::helpers::*;

#[tokio::test]
async fn test_concurrency_cap_is_never_exceeded() {
    let engine = test_engine(2).await;
    let plugin = write_plugin(
        engine.dir.path(),
        "check_slow",
        "sleep 0.3; echo \"OK\"; exit 0",
    );
    let def = create_plain_def(&engine, &plugin).await;

    let mut monitors = Vec::new();
    for _ in 0..10 {
        monitors.push(create_idle_monitor(&engine, def.id, HashMap::new()).await);
    }

    // Fire everything at once through the real scheduler.
    for monitor in &monitors {
        engine.manager.schedule(monitor, 0);
    }

    // Sample the in-flight count while the dispatches race for slots.
    let mut max_observed = 0;
    for _ in 0..300 {
        max_observed = max_observed.max(engine.manager.running_jobs());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(
        max_observed <= 2,
        "in-flight count exceeded the cap: {max_observed}"
    );
    assert!(max_observed > 0, "no run was ever observed in flight");

    // Slots were handed out: at least the first cap-full of monitors ran,
    // and every monitor holds a pending tick (either its 10-30s deferral
    // or its next regular check).
    let mut completed = 0;
    for monitor in &monitors {
        let status = monitor.status().await;
        if status.last_check_state == Some(MonitorState::Up) {
            completed += 1;
        }
        assert!(monitor.has_pending_tick());
    }
    assert!(completed >= 2, "expected at least 2 completed runs");

    engine.manager.shutdown();
}

#[tokio::test]
async fn test_deferred_monitors_get_short_retry_delay() {
    let engine = test_engine(1).await;
    let plugin = write_plugin(
        engine.dir.path(),
        "check_slow",
        "sleep 0.5; echo \"OK\"; exit 0",
    );
    let def = create_plain_def(&engine, &plugin).await;
    let first = create_idle_monitor(&engine, def.id, HashMap::new()).await;
    let second = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    engine.manager.schedule(&first, 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    // The slot is taken; the second dispatch must defer.
    engine.manager.schedule(&second, 0);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let due_in = second.pending_tick_due().unwrap() - chrono::Utc::now().timestamp();
    assert!(
        (9..=31).contains(&due_in),
        "deferral delay out of range: {due_in}s"
    );
    assert_eq!(second.status().await.last_check_state, None);

    engine.manager.shutdown();
}

#[tokio::test]
async fn test_rescheduling_replaces_pending_tick() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();
    let monitor = create_idle_monitor(
        &engine,
        ping.id,
        [("hostname".to_string(), "10.0.0.1".to_string())].into(),
    )
    .await;

    engine.manager.schedule(&monitor, 600);
    let first_due = monitor.pending_tick_due().unwrap();
    engine.manager.schedule(&monitor, 1200);
    let second_due = monitor.pending_tick_due().unwrap();

    // One pending tick at a time; the later schedule replaced the first.
    assert!(second_due >= first_due + 500);

    engine.manager.shutdown();
    assert!(!monitor.has_pending_tick());
}

#[tokio::test]
async fn test_delete_cancels_pending_tick() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();
    let monitor = create_idle_monitor(
        &engine,
        ping.id,
        [("hostname".to_string(), "10.0.0.1".to_string())].into(),
    )
    .await;

    // Arm a tick, then delete the monitor; no run may fire afterwards.
    engine.manager.schedule(&monitor, 0);
    monitor.delete(&engine.manager).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!monitor.has_pending_tick());
    assert_eq!(engine.manager.running_jobs(), 0);
    assert!(engine.manager.monitor(monitor.id).is_none());
    assert_eq!(monitor.status().await.last_check_state, None);
}
