//! Row access for monitor definitions and monitors.

use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use std::collections::HashMap;

use crate::db::{Database, DbError, DbResult};
use crate::metadata;
use crate::models::{DefArgRecord, MonitorArgRecord, MonitorDefRecord, MonitorRecord, MonitorState};

fn def_from_row(row: &SqliteRow) -> MonitorDefRecord {
    MonitorDefRecord {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        active: row.get("active"),
        cmdline_filename: row.get("cmdline_filename"),
        cmdline_args_tmpl: row.get("cmdline_args_tmpl"),
        description_tmpl: row.get("description_tmpl"),
    }
}

fn monitor_from_row(row: &SqliteRow) -> MonitorRecord {
    let state: String = row.get("state");
    MonitorRecord {
        id: row.get("id"),
        def_id: row.get("def_id"),
        state: MonitorState::from_db(&state),
        state_ts: row.get("state_ts"),
        msg: row.get("msg"),
        alert_id: row.get("alert_id"),
        deleted: row.get("deleted"),
        checks_enabled: row.get("checks_enabled"),
        alerts_enabled: row.get("alerts_enabled"),
    }
}

pub async fn get_all_monitor_defs(db: &Database) -> DbResult<Vec<MonitorDefRecord>> {
    let sql = "SELECT id, name, description, active, cmdline_filename, cmdline_args_tmpl, \
               description_tmpl FROM active_monitor_defs";
    let rows = sqlx::query(sql)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(rows.iter().map(def_from_row).collect())
}

/// Load every definition parameter spec, grouped by definition id.
pub async fn get_def_args_by_def(db: &Database) -> DbResult<HashMap<i64, Vec<DefArgRecord>>> {
    let sql = "SELECT id, active_monitor_def_id, name, display_name, description, required, \
               default_value FROM active_monitor_def_args";
    let rows = sqlx::query(sql)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    let mut ret: HashMap<i64, Vec<DefArgRecord>> = HashMap::new();
    for row in rows {
        let arg = DefArgRecord {
            id: row.get("id"),
            def_id: row.get("active_monitor_def_id"),
            name: row.get("name"),
            display_name: row.get("display_name"),
            description: row.get("description"),
            required: row.get("required"),
            default_value: row.get("default_value"),
        };
        ret.entry(arg.def_id).or_default().push(arg);
    }
    Ok(ret)
}

pub async fn get_all_monitors(db: &Database) -> DbResult<Vec<MonitorRecord>> {
    let sql = "SELECT id, def_id, state, state_ts, msg, alert_id, deleted, checks_enabled, \
               alerts_enabled FROM active_monitors";
    let rows = sqlx::query(sql)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(rows.iter().map(monitor_from_row).collect())
}

/// Load every monitor argument, grouped by monitor id as a name→value map.
pub async fn get_monitor_args_by_monitor(
    db: &Database,
) -> DbResult<HashMap<i64, HashMap<String, String>>> {
    let sql = "SELECT id, monitor_id, name, value FROM active_monitor_args";
    let rows = sqlx::query(sql)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    let mut ret: HashMap<i64, HashMap<String, String>> = HashMap::new();
    for row in rows {
        let arg = MonitorArgRecord {
            id: row.get("id"),
            monitor_id: row.get("monitor_id"),
            name: row.get("name"),
            value: row.get("value"),
        };
        ret.entry(arg.monitor_id).or_default().insert(arg.name, arg.value);
    }
    Ok(ret)
}

pub async fn create_monitor_def(db: &Database, record: &MonitorDefRecord) -> DbResult<i64> {
    let sql = "INSERT INTO active_monitor_defs \
               (name, description, active, cmdline_filename, cmdline_args_tmpl, description_tmpl) \
               VALUES (?, ?, ?, ?, ?, ?)";
    let result = sqlx::query(sql)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.active)
        .bind(&record.cmdline_filename)
        .bind(&record.cmdline_args_tmpl)
        .bind(&record.description_tmpl)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(result.last_insert_rowid())
}

pub async fn delete_monitor_def(db: &Database, def_id: i64) -> DbResult<()> {
    let mut tx = db.begin().await?;
    for sql in [
        "DELETE FROM active_monitor_defs WHERE id=?",
        "DELETE FROM active_monitor_def_args WHERE active_monitor_def_id=?",
    ] {
        sqlx::query(sql)
            .bind(def_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    tx.commit()
        .await
        .map_err(|e| DbError::query("delete_monitor_def commit", e))?;
    Ok(())
}

pub async fn create_def_arg(db: &Database, arg: &DefArgRecord) -> DbResult<i64> {
    let sql = "INSERT INTO active_monitor_def_args \
               (active_monitor_def_id, name, display_name, description, required, default_value) \
               VALUES (?, ?, ?, ?, ?, ?)";
    let result = sqlx::query(sql)
        .bind(arg.def_id)
        .bind(&arg.name)
        .bind(&arg.display_name)
        .bind(&arg.description)
        .bind(arg.required)
        .bind(&arg.default_value)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(result.last_insert_rowid())
}

pub async fn update_def_arg(db: &Database, arg: &DefArgRecord) -> DbResult<()> {
    let sql = "UPDATE active_monitor_def_args \
               SET name=?, display_name=?, description=?, required=?, default_value=? WHERE id=?";
    sqlx::query(sql)
        .bind(&arg.name)
        .bind(&arg.display_name)
        .bind(&arg.description)
        .bind(arg.required)
        .bind(&arg.default_value)
        .bind(arg.id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn delete_def_arg(db: &Database, arg_id: i64) -> DbResult<()> {
    let sql = "DELETE FROM active_monitor_def_args WHERE id=?";
    sqlx::query(sql)
        .bind(arg_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

/// Insert a new monitor row and its arguments in one transaction. New
/// monitors start in UNKNOWN with a zero state timestamp.
pub async fn create_monitor(
    db: &Database,
    def_id: i64,
    args: &HashMap<String, String>,
) -> DbResult<i64> {
    let mut tx = db.begin().await?;
    let sql = "INSERT INTO active_monitors (def_id, state, state_ts, msg) VALUES (?, ?, ?, ?)";
    let result = sqlx::query(sql)
        .bind(def_id)
        .bind(MonitorState::Unknown.as_str())
        .bind(0_i64)
        .bind("")
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query(sql, e))?;
    let monitor_id = result.last_insert_rowid();
    let sql = "INSERT INTO active_monitor_args (monitor_id, name, value) VALUES (?, ?, ?)";
    for (name, value) in args {
        sqlx::query(sql)
            .bind(monitor_id)
            .bind(name)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    tx.commit()
        .await
        .map_err(|e| DbError::query("create_monitor commit", e))?;
    Ok(monitor_id)
}

/// Replace a monitor's arguments in one transaction.
pub async fn replace_monitor_args(
    db: &Database,
    monitor_id: i64,
    args: &HashMap<String, String>,
) -> DbResult<()> {
    let mut tx = db.begin().await?;
    let sql = "DELETE FROM active_monitor_args WHERE monitor_id=?";
    sqlx::query(sql)
        .bind(monitor_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query(sql, e))?;
    let sql = "INSERT INTO active_monitor_args (monitor_id, name, value) VALUES (?, ?, ?)";
    for (name, value) in args {
        sqlx::query(sql)
            .bind(monitor_id)
            .bind(name)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    tx.commit()
        .await
        .map_err(|e| DbError::query("replace_monitor_args commit", e))?;
    Ok(())
}

pub async fn mark_monitor_deleted(db: &Database, monitor_id: i64) -> DbResult<()> {
    let sql = "UPDATE active_monitors SET deleted=1 WHERE id=?";
    sqlx::query(sql)
        .bind(monitor_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

/// Remove all traces of a monitor: its row, arguments, alert history,
/// contact and group attachments, metadata and bindata.
pub async fn purge_monitor(db: &Database, monitor_id: i64) -> DbResult<()> {
    let mut tx = db.begin().await?;
    for sql in [
        "DELETE FROM active_monitors WHERE id=?",
        "DELETE FROM active_monitor_args WHERE monitor_id=?",
        "DELETE FROM active_monitor_alerts WHERE monitor_id=?",
        "DELETE FROM active_monitor_contacts WHERE active_monitor_id=?",
        "DELETE FROM active_monitor_contact_groups WHERE active_monitor_id=?",
        "DELETE FROM monitor_group_active_monitors WHERE active_monitor_id=?",
    ] {
        sqlx::query(sql)
            .bind(monitor_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    for sql in [
        "DELETE FROM object_metadata WHERE object_type=? AND object_id=?",
        "DELETE FROM object_bindata WHERE object_type=? AND object_id=?",
    ] {
        sqlx::query(sql)
            .bind(metadata::ACTIVE_MONITOR)
            .bind(monitor_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    tx.commit()
        .await
        .map_err(|e| DbError::query("purge_monitor commit", e))?;
    Ok(())
}

/// Purge any monitor previously flagged deleted. Runs once at startup to
/// finish two-phase deletions interrupted by a shutdown.
pub async fn purge_marked_deleted(db: &Database) -> DbResult<()> {
    let sql = "SELECT id FROM active_monitors WHERE deleted=1";
    let ids: Vec<i64> = sqlx::query_scalar(sql)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    for monitor_id in ids {
        tracing::info!("purging previously deleted monitor {}", monitor_id);
        purge_monitor(db, monitor_id).await?;
    }
    Ok(())
}

pub async fn get_open_alert_count(db: &Database, monitor_id: i64) -> DbResult<i64> {
    db.count(
        "SELECT COUNT(id) FROM active_monitor_alerts WHERE end_ts=0 AND monitor_id=?",
        monitor_id,
    )
    .await
}
