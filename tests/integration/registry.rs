//! Definition registry and template cache behavior

use std::collections::HashMap;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use vigil::engine::defs::{self, DefArgSpec, MonitorDefUpdate};
use vigil::errors::EngineError;
use vigil::models::MonitorDefRecord;

use super::helpers::*;

fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_seeded_defs_are_loaded() {
    let engine = test_engine(10).await;
    assert_eq!(engine.manager.defs().len(), 3);
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();
    assert_eq!(
        ping.cmdline_filename(),
        "/usr/lib/nagios/plugins/check_ping"
    );
    // The seed monitor for the ping def is loaded too.
    assert_eq!(engine.manager.monitors().len(), 1);
}

#[tokio::test]
async fn test_seeded_ping_monitor_expansion() {
    let engine = test_engine(10).await;
    let monitor = engine.manager.monitor(1).unwrap();
    let def = engine.manager.def(monitor.def_id).unwrap();
    let status = monitor.status().await;

    // Defaults fill in rtt/pl; the instance provides the hostname.
    let argv = def.expanded_args(monitor.id, &status.args).unwrap();
    assert_eq!(
        argv,
        vec!["-H", "127.0.0.1", "-w", "500,50%", "-c", "500,50%"]
    );
    let description = def.expanded_description(monitor.id, &status.args).unwrap();
    assert_eq!(description, "Ping monitor for 127.0.0.1");
}

#[tokio::test]
async fn test_validate_args() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();

    ping.validate_args(&args(&[("hostname", "10.0.0.1")]), false)
        .unwrap();
    ping.validate_args(&args(&[("hostname", "10.0.0.1"), ("rtt", "100")]), false)
        .unwrap();

    // Unknown keys are rejected either way.
    let err = ping
        .validate_args(&args(&[("hostname", "h"), ("bogus", "1")]), false)
        .unwrap_err();
    assert_matches!(err, EngineError::InvalidArguments(_));

    // Required parameters may only be omitted with permit_missing.
    let err = ping.validate_args(&args(&[("rtt", "100")]), false).unwrap_err();
    assert_matches!(err, EngineError::InvalidArguments(_));
    ping.validate_args(&args(&[("rtt", "100")]), true).unwrap();
}

#[tokio::test]
async fn test_create_monitor_validates_args() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();

    let err = vigil::engine::create_active_monitor(&engine.manager, ping.id, args(&[]))
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::InvalidArguments(_));

    let monitor = create_idle_monitor(&engine, ping.id, args(&[("hostname", "10.1.1.1")])).await;
    assert!(engine.manager.monitor(monitor.id).is_some());
}

#[tokio::test]
async fn test_def_update_flushes_template_cache() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();
    let monitor = create_idle_monitor(&engine, ping.id, args(&[("hostname", "10.1.1.1")])).await;

    let before = ping
        .expanded_args(monitor.id, &monitor.status().await.args)
        .unwrap();
    assert_eq!(before[1], "10.1.1.1");

    defs::update_monitor_def(
        &engine.manager,
        ping.id,
        &MonitorDefUpdate {
            cmdline_args_tmpl: Some("-H {{hostname}} -n 3".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let after = ping
        .expanded_args(monitor.id, &monitor.status().await.args)
        .unwrap();
    assert_eq!(after, vec!["-H", "10.1.1.1", "-n", "3"]);

    // The database row changed as well.
    let stored: String = sqlx::query_scalar(
        "SELECT cmdline_args_tmpl FROM active_monitor_defs WHERE id=?",
    )
    .bind(ping.id)
    .fetch_one(engine.db.pool())
    .await
    .unwrap();
    assert_eq!(stored, "-H {{hostname}} -n 3");
}

#[tokio::test]
async fn test_update_args_flushes_monitor_cache() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();
    let monitor = create_idle_monitor(&engine, ping.id, args(&[("hostname", "10.1.1.1")])).await;

    let first = ping
        .expanded_args(monitor.id, &monitor.status().await.args)
        .unwrap();

    // Re-applying identical arguments yields the identical expansion.
    monitor
        .update_args(&engine.manager, args(&[("hostname", "10.1.1.1")]))
        .await
        .unwrap();
    let same = ping
        .expanded_args(monitor.id, &monitor.status().await.args)
        .unwrap();
    assert_eq!(first, same);

    monitor
        .update_args(&engine.manager, args(&[("hostname", "10.2.2.2")]))
        .await
        .unwrap();
    let changed = ping
        .expanded_args(monitor.id, &monitor.status().await.args)
        .unwrap();
    assert_eq!(changed[1], "10.2.2.2");

    // Argument rows were replaced, not appended.
    let arg_rows = count_rows(
        &engine.db,
        "SELECT COUNT(id) FROM active_monitor_args WHERE monitor_id=?",
        monitor.id,
    )
    .await;
    assert_eq!(arg_rows, 1);

    let err = monitor
        .update_args(&engine.manager, args(&[("bogus", "x")]))
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::InvalidArguments(_));
}

#[tokio::test]
async fn test_def_delete_requires_no_monitors() {
    let engine = test_engine(10).await;
    let ping = engine.manager.find_def_by_name("Ping monitor").unwrap();

    // The seed monitor references the ping def.
    let err = defs::delete_monitor_def(&engine.manager, ping.id)
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::DefinitionInUse);

    let monitor = engine.manager.monitor(1).unwrap();
    monitor.delete(&engine.manager).await.unwrap();
    defs::delete_monitor_def(&engine.manager, ping.id).await.unwrap();

    assert!(engine.manager.def(ping.id).is_none());
    let def_rows = count_rows(
        &engine.db,
        "SELECT COUNT(id) FROM active_monitor_defs WHERE id=?",
        ping.id,
    )
    .await;
    assert_eq!(def_rows, 0);
    let arg_rows = count_rows(
        &engine.db,
        "SELECT COUNT(id) FROM active_monitor_def_args WHERE active_monitor_def_id=?",
        ping.id,
    )
    .await;
    assert_eq!(arg_rows, 0);
}

#[tokio::test]
async fn test_set_and_delete_def_arg() {
    let engine = test_engine(10).await;
    let def = defs::create_monitor_def(
        &engine.manager,
        MonitorDefRecord {
            id: 0,
            name: "DNS monitor".to_string(),
            description: "Monitor a DNS server.".to_string(),
            active: true,
            cmdline_filename: "/usr/lib/nagios/plugins/check_dns".to_string(),
            cmdline_args_tmpl: "-H {{hostname}}".to_string(),
            description_tmpl: "DNS monitor for {{hostname}}".to_string(),
        },
    )
    .await
    .unwrap();

    defs::set_def_arg(
        &engine.manager,
        def.id,
        DefArgSpec {
            name: "hostname".to_string(),
            display_name: "Hostname".to_string(),
            description: "Host to query".to_string(),
            required: true,
            default_value: String::new(),
        },
    )
    .await
    .unwrap();
    assert_eq!(def.arg_spec().len(), 1);

    // Upsert by name updates in place.
    defs::set_def_arg(
        &engine.manager,
        def.id,
        DefArgSpec {
            name: "hostname".to_string(),
            display_name: "DNS hostname".to_string(),
            description: "Host to query".to_string(),
            required: false,
            default_value: "localhost".to_string(),
        },
    )
    .await
    .unwrap();
    let spec = def.arg_spec();
    assert_eq!(spec.len(), 1);
    assert_eq!(spec[0].display_name, "DNS hostname");
    assert!(!spec[0].required);

    // The default value now applies to monitors omitting the parameter.
    let monitor = create_idle_monitor(&engine, def.id, HashMap::new()).await;
    let argv = def
        .expanded_args(monitor.id, &monitor.status().await.args)
        .unwrap();
    assert_eq!(argv, vec!["-H", "localhost"]);

    defs::delete_def_arg(&engine.manager, def.id, "hostname").await.unwrap();
    assert!(def.arg_spec().is_empty());
    // Deleting a missing parameter is a no-op.
    defs::delete_def_arg(&engine.manager, def.id, "hostname").await.unwrap();
}

#[tokio::test]
async fn test_find_def_by_name_misses() {
    let engine = test_engine(10).await;
    assert!(engine.manager.find_def_by_name("No such monitor").is_none());
}
