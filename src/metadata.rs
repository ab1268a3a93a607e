//! Key/value metadata attached to arbitrary objects.
//!
//! Metadata entries are short string pairs keyed by (object type, object
//! id, key). Bindata is the binary sibling for individually larger values.
//! Both are opaque to the engine; alert notifications expose a monitor's
//! metadata as `meta_<key>` template values.

use std::collections::HashMap;

use sqlx::Row;

use crate::db::{Database, DbError, DbResult};

/// Object type tag used for active monitors.
pub const ACTIVE_MONITOR: &str = "active_monitor";

/// Object type tag used for monitor groups.
pub const MONITOR_GROUP: &str = "monitor_group";

/// Return all metadata for an object as a map.
pub async fn get_metadata(
    db: &Database,
    object_type: &str,
    object_id: i64,
) -> DbResult<HashMap<String, String>> {
    let sql = "SELECT key, value FROM object_metadata WHERE object_type=? AND object_id=?";
    let rows = sqlx::query(sql)
        .bind(object_type)
        .bind(object_id)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("key"), row.get("value")))
        .collect())
}

/// Add metadata entries to an object.
pub async fn add_metadata(
    db: &Database,
    object_type: &str,
    object_id: i64,
    entries: &HashMap<String, String>,
) -> DbResult<()> {
    let mut tx = db.begin().await?;
    let sql = "INSERT INTO object_metadata (object_type, object_id, key, value) VALUES (?, ?, ?, ?)";
    for (key, value) in entries {
        sqlx::query(sql)
            .bind(object_type)
            .bind(object_id)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    tx.commit().await.map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

/// Update metadata entries for an object. A `None` value deletes the key.
pub async fn update_metadata(
    db: &Database,
    object_type: &str,
    object_id: i64,
    entries: &HashMap<String, Option<String>>,
) -> DbResult<()> {
    let mut tx = db.begin().await?;
    for (key, value) in entries {
        match value {
            Some(value) => {
                let sql = "REPLACE INTO object_metadata (object_type, object_id, key, value) \
                           VALUES (?, ?, ?, ?)";
                sqlx::query(sql)
                    .bind(object_type)
                    .bind(object_id)
                    .bind(key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| DbError::query(sql, e))?;
            }
            None => {
                let sql =
                    "DELETE FROM object_metadata WHERE object_type=? AND object_id=? AND key=?";
                sqlx::query(sql)
                    .bind(object_type)
                    .bind(object_id)
                    .bind(key)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| DbError::query(sql, e))?;
            }
        }
    }
    tx.commit()
        .await
        .map_err(|e| DbError::query("update_metadata commit", e))?;
    Ok(())
}

/// Delete metadata for an object; with `keys` given only those keys,
/// otherwise everything.
pub async fn delete_metadata(
    db: &Database,
    object_type: &str,
    object_id: i64,
    keys: Option<&[String]>,
) -> DbResult<()> {
    match keys {
        Some(keys) => {
            let mut tx = db.begin().await?;
            let sql = "DELETE FROM object_metadata WHERE object_type=? AND object_id=? AND key=?";
            for key in keys {
                sqlx::query(sql)
                    .bind(object_type)
                    .bind(object_id)
                    .bind(key)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| DbError::query(sql, e))?;
            }
            tx.commit().await.map_err(|e| DbError::query(sql, e))?;
        }
        None => {
            let sql = "DELETE FROM object_metadata WHERE object_type=? AND object_id=?";
            sqlx::query(sql)
                .bind(object_type)
                .bind(object_id)
                .execute(db.pool())
                .await
                .map_err(|e| DbError::query(sql, e))?;
        }
    }
    Ok(())
}

/// Fetch one bindata value.
pub async fn get_bindata(
    db: &Database,
    object_type: &str,
    object_id: i64,
    key: &str,
) -> DbResult<Option<Vec<u8>>> {
    let sql = "SELECT value FROM object_bindata WHERE object_type=? AND object_id=? AND key=?";
    sqlx::query_scalar(sql)
        .bind(object_type)
        .bind(object_id)
        .bind(key)
        .fetch_optional(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))
}

/// Set one bindata value, replacing any existing value for the key.
pub async fn set_bindata(
    db: &Database,
    object_type: &str,
    object_id: i64,
    key: &str,
    value: &[u8],
) -> DbResult<()> {
    let sql = "REPLACE INTO object_bindata (object_type, object_id, key, value) VALUES (?, ?, ?, ?)";
    sqlx::query(sql)
        .bind(object_type)
        .bind(object_id)
        .bind(key)
        .bind(value)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

/// Delete one bindata value.
pub async fn delete_bindata(
    db: &Database,
    object_type: &str,
    object_id: i64,
    key: &str,
) -> DbResult<()> {
    let sql = "DELETE FROM object_bindata WHERE object_type=? AND object_id=? AND key=?";
    sqlx::query(sql)
        .bind(object_type)
        .bind(object_id)
        .bind(key)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}
