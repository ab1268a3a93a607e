//! Monitor groups.
//!
//! Monitor groups collect monitors, optionally in a hierarchy. Besides
//! organization they connect whole sets of monitors to contacts and
//! contact groups for alert notifications.

use sqlx::Row;

use crate::contacts::{active_monitor_exists, contact_exists, contact_group_exists};
use crate::db::{Database, DbError};
use crate::errors::{EngineError, EngineResult};
use crate::metadata;
use crate::models::{Contact, ContactGroup, MonitorGroup};

pub async fn monitor_group_exists(db: &Database, monitor_group_id: i64) -> EngineResult<bool> {
    let count = db
        .count("SELECT COUNT(id) FROM monitor_groups WHERE id=?", monitor_group_id)
        .await?;
    Ok(count > 0)
}

pub async fn create_monitor_group(
    db: &Database,
    parent_id: Option<i64>,
    name: &str,
) -> EngineResult<i64> {
    if name.is_empty() {
        return Err(EngineError::InvalidArguments("missing monitor group name".to_string()));
    }
    if let Some(parent_id) = parent_id
        && !monitor_group_exists(db, parent_id).await?
    {
        return Err(EngineError::InvalidArguments(
            "parent monitor group does not exist".to_string(),
        ));
    }
    let sql = "INSERT INTO monitor_groups (parent_id, name) VALUES (?, ?)";
    let result = sqlx::query(sql)
        .bind(parent_id)
        .bind(name)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(result.last_insert_rowid())
}

/// Partial update for a monitor group.
#[derive(Debug, Clone, Default)]
pub struct MonitorGroupUpdate {
    pub parent_id: Option<Option<i64>>,
    pub name: Option<String>,
}

pub async fn update_monitor_group(
    db: &Database,
    monitor_group_id: i64,
    update: &MonitorGroupUpdate,
) -> EngineResult<()> {
    if let Some(parent_id) = update.parent_id {
        if let Some(parent_id) = parent_id {
            if parent_id == monitor_group_id {
                return Err(EngineError::InvalidArguments(
                    "monitor group can't be its own parent".to_string(),
                ));
            }
            if !monitor_group_exists(db, parent_id).await? {
                return Err(EngineError::InvalidArguments(
                    "parent monitor group does not exist".to_string(),
                ));
            }
        }
        let sql = "UPDATE monitor_groups SET parent_id=? WHERE id=?";
        sqlx::query(sql)
            .bind(parent_id)
            .bind(monitor_group_id)
            .execute(db.pool())
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    if let Some(name) = &update.name {
        let sql = "UPDATE monitor_groups SET name=? WHERE id=?";
        sqlx::query(sql)
            .bind(name)
            .bind(monitor_group_id)
            .execute(db.pool())
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    Ok(())
}

pub async fn delete_monitor_group(db: &Database, monitor_group_id: i64) -> EngineResult<()> {
    let mut tx = db.begin().await?;
    for sql in [
        "DELETE FROM monitor_groups WHERE id=?",
        "DELETE FROM monitor_group_active_monitors WHERE monitor_group_id=?",
        "DELETE FROM monitor_group_contacts WHERE monitor_group_id=?",
        "DELETE FROM monitor_group_contact_groups WHERE monitor_group_id=?",
    ] {
        sqlx::query(sql)
            .bind(monitor_group_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    let sql = "DELETE FROM object_metadata WHERE object_type=? AND object_id=?";
    sqlx::query(sql)
        .bind(metadata::MONITOR_GROUP)
        .bind(monitor_group_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query(sql, e))?;
    tx.commit()
        .await
        .map_err(|e| DbError::query("delete_monitor_group commit", e))?;
    Ok(())
}

pub async fn get_monitor_group(
    db: &Database,
    monitor_group_id: i64,
) -> EngineResult<Option<MonitorGroup>> {
    let sql = "SELECT id, parent_id, name FROM monitor_groups WHERE id=?";
    let row = sqlx::query(sql)
        .bind(monitor_group_id)
        .fetch_optional(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(row.map(|row| MonitorGroup {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        name: row.get("name"),
    }))
}

pub async fn get_all_monitor_groups(db: &Database) -> EngineResult<Vec<MonitorGroup>> {
    let sql = "SELECT id, parent_id, name FROM monitor_groups";
    let rows = sqlx::query(sql)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(rows
        .into_iter()
        .map(|row| MonitorGroup {
            id: row.get("id"),
            parent_id: row.get("parent_id"),
            name: row.get("name"),
        })
        .collect())
}

pub async fn add_active_monitor_to_monitor_group(
    db: &Database,
    monitor_group_id: i64,
    monitor_id: i64,
) -> EngineResult<()> {
    if !active_monitor_exists(db, monitor_id).await? {
        return Err(EngineError::InvalidArguments("monitor does not exist".to_string()));
    }
    if !monitor_group_exists(db, monitor_group_id).await? {
        return Err(EngineError::InvalidArguments("monitor group does not exist".to_string()));
    }
    let sql = "REPLACE INTO monitor_group_active_monitors (monitor_group_id, active_monitor_id) \
               VALUES (?, ?)";
    sqlx::query(sql)
        .bind(monitor_group_id)
        .bind(monitor_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn delete_active_monitor_from_monitor_group(
    db: &Database,
    monitor_group_id: i64,
    monitor_id: i64,
) -> EngineResult<()> {
    let sql = "DELETE FROM monitor_group_active_monitors \
               WHERE monitor_group_id=? AND active_monitor_id=?";
    sqlx::query(sql)
        .bind(monitor_group_id)
        .bind(monitor_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn add_contact_to_monitor_group(
    db: &Database,
    monitor_group_id: i64,
    contact_id: i64,
) -> EngineResult<()> {
    if !contact_exists(db, contact_id).await? {
        return Err(EngineError::InvalidArguments("contact does not exist".to_string()));
    }
    if !monitor_group_exists(db, monitor_group_id).await? {
        return Err(EngineError::InvalidArguments("monitor group does not exist".to_string()));
    }
    let sql = "REPLACE INTO monitor_group_contacts (monitor_group_id, contact_id) VALUES (?, ?)";
    sqlx::query(sql)
        .bind(monitor_group_id)
        .bind(contact_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn delete_contact_from_monitor_group(
    db: &Database,
    monitor_group_id: i64,
    contact_id: i64,
) -> EngineResult<()> {
    let sql = "DELETE FROM monitor_group_contacts WHERE monitor_group_id=? AND contact_id=?";
    sqlx::query(sql)
        .bind(monitor_group_id)
        .bind(contact_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn add_contact_group_to_monitor_group(
    db: &Database,
    monitor_group_id: i64,
    contact_group_id: i64,
) -> EngineResult<()> {
    if !contact_group_exists(db, contact_group_id).await? {
        return Err(EngineError::InvalidArguments("contact group does not exist".to_string()));
    }
    if !monitor_group_exists(db, monitor_group_id).await? {
        return Err(EngineError::InvalidArguments("monitor group does not exist".to_string()));
    }
    let sql = "REPLACE INTO monitor_group_contact_groups (monitor_group_id, contact_group_id) \
               VALUES (?, ?)";
    sqlx::query(sql)
        .bind(monitor_group_id)
        .bind(contact_group_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn delete_contact_group_from_monitor_group(
    db: &Database,
    monitor_group_id: i64,
    contact_group_id: i64,
) -> EngineResult<()> {
    let sql = "DELETE FROM monitor_group_contact_groups \
               WHERE monitor_group_id=? AND contact_group_id=?";
    sqlx::query(sql)
        .bind(monitor_group_id)
        .bind(contact_group_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn get_contacts_for_monitor_group(
    db: &Database,
    monitor_group_id: i64,
) -> EngineResult<Vec<Contact>> {
    let sql = "SELECT contacts.id, contacts.name, contacts.email, contacts.phone, contacts.active \
               FROM contacts, monitor_group_contacts \
               WHERE contacts.id = monitor_group_contacts.contact_id \
               AND monitor_group_contacts.monitor_group_id = ?";
    let rows = sqlx::query(sql)
        .bind(monitor_group_id)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(rows
        .into_iter()
        .map(|row| Contact {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            phone: row.get("phone"),
            active: row.get("active"),
        })
        .collect())
}

pub async fn get_contact_groups_for_monitor_group(
    db: &Database,
    monitor_group_id: i64,
) -> EngineResult<Vec<ContactGroup>> {
    let sql = "SELECT cg.id, cg.name, cg.active \
               FROM contact_groups AS cg, monitor_group_contact_groups \
               WHERE cg.id = monitor_group_contact_groups.contact_group_id \
               AND monitor_group_contact_groups.monitor_group_id = ?";
    let rows = sqlx::query(sql)
        .bind(monitor_group_id)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(rows
        .into_iter()
        .map(|row| ContactGroup {
            id: row.get("id"),
            name: row.get("name"),
            active: row.get("active"),
        })
        .collect())
}
