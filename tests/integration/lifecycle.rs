//! Monitor lifecycle: creation, two-phase deletion, startup purge

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use vigil::contacts;
use vigil::engine::{self, ActiveMonitorManager};
use vigil::event::EventBus;
use vigil::metadata;
use vigil::models::MonitorState;
use vigil::monitor_groups;
use vigil::notify::NotificationManager;

use super::helpers::*;

/// Attach a contact, group membership, metadata and bindata to a monitor
/// so deletion has dependents to purge.
async fn attach_dependents(engine: &TestEngine, monitor_id: i64) {
    let contact_id = contacts::create_contact(
        &engine.db,
        Some("Ops"),
        Some("ops@example.com"),
        Some("+4612345"),
        true,
    )
    .await
    .unwrap();
    contacts::add_contact_to_active_monitor(&engine.db, contact_id, monitor_id)
        .await
        .unwrap();

    let group_id = monitor_groups::create_monitor_group(&engine.db, None, "Production")
        .await
        .unwrap();
    monitor_groups::add_active_monitor_to_monitor_group(&engine.db, group_id, monitor_id)
        .await
        .unwrap();

    let entries: HashMap<String, String> = [("customer".to_string(), "acme".to_string())].into();
    metadata::add_metadata(&engine.db, metadata::ACTIVE_MONITOR, monitor_id, &entries)
        .await
        .unwrap();
    metadata::set_bindata(&engine.db, metadata::ACTIVE_MONITOR, monitor_id, "icon", b"png")
        .await
        .unwrap();
}

async fn assert_no_dependent_rows(engine: &TestEngine, monitor_id: i64) {
    for sql in [
        "SELECT COUNT(*) FROM active_monitors WHERE id=?",
        "SELECT COUNT(*) FROM active_monitor_args WHERE monitor_id=?",
        "SELECT COUNT(*) FROM active_monitor_alerts WHERE monitor_id=?",
        "SELECT COUNT(*) FROM active_monitor_contacts WHERE active_monitor_id=?",
        "SELECT COUNT(*) FROM active_monitor_contact_groups WHERE active_monitor_id=?",
        "SELECT COUNT(*) FROM monitor_group_active_monitors WHERE active_monitor_id=?",
        "SELECT COUNT(*) FROM object_metadata WHERE object_type='active_monitor' AND object_id=?",
        "SELECT COUNT(*) FROM object_bindata WHERE object_type='active_monitor' AND object_id=?",
    ] {
        assert_eq!(count_rows(&engine.db, sql, monitor_id).await, 0, "{sql}");
    }
}

#[tokio::test]
async fn test_create_then_delete_leaves_no_rows() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();
    let monitor = create_idle_monitor(
        &engine,
        ping.id,
        [("hostname".to_string(), "10.0.0.1".to_string())].into(),
    )
    .await;
    attach_dependents(&engine, monitor.id).await;

    monitor.delete(&engine.manager).await.unwrap();

    assert!(engine.manager.monitor(monitor.id).is_none());
    assert_no_dependent_rows(&engine, monitor.id).await;
    // Deleting twice is harmless.
    monitor.delete(&engine.manager).await.unwrap();
}

#[tokio::test]
async fn test_delete_while_running_purges_after_completion() {
    let engine = test_engine(10).await;
    let plugin = write_plugin(
        engine.dir.path(),
        "check_slow",
        "sleep 1; echo \"OK\"; exit 0",
    );
    let def = create_plain_def(&engine, &plugin).await;
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;
    attach_dependents(&engine, monitor.id).await;

    // Kick off a run in the background and delete mid-flight.
    let run_manager = Arc::clone(&engine.manager);
    let run_monitor = Arc::clone(&monitor);
    let run_task = tokio::spawn(async move { run_monitor.run(&run_manager).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(monitor.is_running());

    monitor.delete(&engine.manager).await.unwrap();
    assert!(engine.manager.monitor(monitor.id).is_none());
    // The row is only flagged while the run is in flight.
    let flagged = count_rows(
        &engine.db,
        "SELECT COUNT(*) FROM active_monitors WHERE deleted=1 AND id=?",
        monitor.id,
    )
    .await;
    assert_eq!(flagged, 1);

    run_task.await.unwrap().unwrap();

    assert_no_dependent_rows(&engine, monitor.id).await;
    assert!(!monitor.has_pending_tick());
}

#[tokio::test]
async fn test_startup_purges_flagged_monitors() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();
    let monitor = create_idle_monitor(
        &engine,
        ping.id,
        [("hostname".to_string(), "10.0.0.1".to_string())].into(),
    )
    .await;
    attach_dependents(&engine, monitor.id).await;

    // Simulate a crash between the delete flag and the purge.
    sqlx::query("UPDATE active_monitors SET deleted=1 WHERE id=?")
        .bind(monitor.id)
        .execute(engine.db.pool())
        .await
        .unwrap();

    let manager = ActiveMonitorManager::new(
        engine.db.clone(),
        Arc::new(NotificationManager::disabled()),
        EventBus::new(),
        10,
        true,
    );
    manager.initialize().await.unwrap();

    assert!(manager.monitor(monitor.id).is_none());
    assert_no_dependent_rows(&engine, monitor.id).await;
}

#[tokio::test]
async fn test_open_alert_invariant() {
    let engine = test_engine(10).await;
    let (plugin, mode_file) = write_mode_plugin(engine.dir.path());
    let def = create_plain_def(&engine, &plugin).await;
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;

    set_mode(&mode_file, "critical");

    // UNKNOWN -> DOWN transition opens exactly one interval; repeated
    // DOWN observations must not open more.
    for _ in 0..3 {
        monitor.run(&engine.manager).await.unwrap();
        assert_eq!(monitor.state().await, MonitorState::Down);
        let open = engine::sql::get_open_alert_count(&engine.db, monitor.id)
            .await
            .unwrap();
        assert_eq!(open, 1);
    }

    set_mode(&mode_file, "ok");
    monitor.run(&engine.manager).await.unwrap();
    assert_eq!(monitor.state().await, MonitorState::Up);
    let open = engine::sql::get_open_alert_count(&engine.db, monitor.id)
        .await
        .unwrap();
    assert_eq!(open, 0);
}

#[tokio::test]
async fn test_alerts_enabled_toggle_roundtrip() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();
    let monitor = create_idle_monitor(
        &engine,
        ping.id,
        [("hostname".to_string(), "10.0.0.1".to_string())].into(),
    )
    .await;

    assert!(monitor.status().await.alerts_enabled);
    monitor
        .set_alerts_enabled(&engine.manager, false)
        .await
        .unwrap();
    assert!(!monitor.status().await.alerts_enabled);
    let stored: bool =
        sqlx::query_scalar("SELECT alerts_enabled FROM active_monitors WHERE id=?")
            .bind(monitor.id)
            .fetch_one(engine.db.pool())
            .await
            .unwrap();
    assert!(!stored);

    monitor
        .set_alerts_enabled(&engine.manager, true)
        .await
        .unwrap();
    assert!(monitor.status().await.alerts_enabled);
}

#[tokio::test]
async fn test_recipient_collection_unions_all_paths() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();
    let monitor = create_idle_monitor(
        &engine,
        ping.id,
        [("hostname".to_string(), "10.0.0.1".to_string())].into(),
    )
    .await;

    // Direct contact.
    let direct = contacts::create_contact(
        &engine.db,
        Some("Direct"),
        Some("direct@example.com"),
        None,
        true,
    )
    .await
    .unwrap();
    contacts::add_contact_to_active_monitor(&engine.db, direct, monitor.id)
        .await
        .unwrap();

    // Contact through a contact group on the monitor.
    let grouped = contacts::create_contact(
        &engine.db,
        Some("Grouped"),
        Some("group@example.com"),
        Some("+111"),
        true,
    )
    .await
    .unwrap();
    let contact_group = contacts::create_contact_group(&engine.db, "Oncall", true)
        .await
        .unwrap();
    contacts::add_contact_to_contact_group(&engine.db, contact_group, grouped)
        .await
        .unwrap();
    contacts::add_contact_group_to_active_monitor(&engine.db, contact_group, monitor.id)
        .await
        .unwrap();

    // Contact through a monitor group.
    let mg_contact = contacts::create_contact(
        &engine.db,
        Some("MonitorGroup"),
        Some("mg@example.com"),
        None,
        true,
    )
    .await
    .unwrap();
    let monitor_group = monitor_groups::create_monitor_group(&engine.db, None, "Prod")
        .await
        .unwrap();
    monitor_groups::add_active_monitor_to_monitor_group(&engine.db, monitor_group, monitor.id)
        .await
        .unwrap();
    monitor_groups::add_contact_to_monitor_group(&engine.db, monitor_group, mg_contact)
        .await
        .unwrap();

    // Contact through a contact group on the monitor group.
    let mgcg_contact = contacts::create_contact(
        &engine.db,
        Some("Escalation"),
        Some("escalation@example.com"),
        None,
        true,
    )
    .await
    .unwrap();
    let escalation_group = contacts::create_contact_group(&engine.db, "Escalation", true)
        .await
        .unwrap();
    contacts::add_contact_to_contact_group(&engine.db, escalation_group, mgcg_contact)
        .await
        .unwrap();
    monitor_groups::add_contact_group_to_monitor_group(&engine.db, monitor_group, escalation_group)
        .await
        .unwrap();

    // An inactive contact must be filtered out everywhere.
    let inactive = contacts::create_contact(
        &engine.db,
        Some("Gone"),
        Some("gone@example.com"),
        None,
        false,
    )
    .await
    .unwrap();
    contacts::add_contact_to_active_monitor(&engine.db, inactive, monitor.id)
        .await
        .unwrap();

    let recipients = contacts::recipients_for_active_monitor(&engine.db, monitor.id)
        .await
        .unwrap();
    let mut emails: Vec<_> = recipients.emails.iter().cloned().collect();
    emails.sort();
    assert_eq!(
        emails,
        vec![
            "direct@example.com",
            "escalation@example.com",
            "group@example.com",
            "mg@example.com"
        ]
    );
    assert_eq!(recipients.phones.len(), 1);
    assert!(recipients.phones.contains("+111"));
}

#[tokio::test]
async fn test_contact_attachment_requires_existing_objects() {
    let engine = test_engine(10).await;
    let err = contacts::add_contact_to_active_monitor(&engine.db, 999, 999)
        .await
        .unwrap_err();
    assert!(matches!(err, vigil::errors::EngineError::InvalidArguments(_)));

    let err = monitor_groups::update_monitor_group(
        &engine.db,
        5,
        &monitor_groups::MonitorGroupUpdate {
            parent_id: Some(Some(5)),
            name: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, vigil::errors::EngineError::InvalidArguments(_)));
}
