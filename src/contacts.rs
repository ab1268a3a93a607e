//! Contact and contact group management.
//!
//! Contacts are name/email/phone sets linked to monitors directly, through
//! contact groups, or through monitor groups. They determine where alert
//! notifications are sent. Contacts live only in the database; they are
//! loaded fresh each time a notification goes out.

use sqlx::Row;

use crate::db::{Database, DbError};
use crate::errors::{EngineError, EngineResult};
use crate::models::{Contact, ContactGroup};
use crate::notify::Recipients;

/// Partial update for a contact.
#[derive(Debug, Clone, Default)]
pub struct ContactUpdate {
    pub name: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub active: Option<bool>,
}

pub async fn contact_exists(db: &Database, contact_id: i64) -> EngineResult<bool> {
    let count = db
        .count("SELECT COUNT(id) FROM contacts WHERE id=?", contact_id)
        .await?;
    Ok(count > 0)
}

pub async fn contact_group_exists(db: &Database, contact_group_id: i64) -> EngineResult<bool> {
    let count = db
        .count("SELECT COUNT(id) FROM contact_groups WHERE id=?", contact_group_id)
        .await?;
    Ok(count > 0)
}

pub async fn active_monitor_exists(db: &Database, monitor_id: i64) -> EngineResult<bool> {
    let count = db
        .count("SELECT COUNT(id) FROM active_monitors WHERE id=?", monitor_id)
        .await?;
    Ok(count > 0)
}

pub async fn create_contact(
    db: &Database,
    name: Option<&str>,
    email: Option<&str>,
    phone: Option<&str>,
    active: bool,
) -> EngineResult<i64> {
    let sql = "INSERT INTO contacts (name, email, phone, active) VALUES (?, ?, ?, ?)";
    let result = sqlx::query(sql)
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(active)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(result.last_insert_rowid())
}

pub async fn update_contact(db: &Database, contact_id: i64, update: &ContactUpdate) -> EngineResult<()> {
    let mut tx = db.begin().await?;
    if let Some(name) = &update.name {
        let sql = "UPDATE contacts SET name=? WHERE id=?";
        sqlx::query(sql)
            .bind(name)
            .bind(contact_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    if let Some(email) = &update.email {
        let sql = "UPDATE contacts SET email=? WHERE id=?";
        sqlx::query(sql)
            .bind(email)
            .bind(contact_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    if let Some(phone) = &update.phone {
        let sql = "UPDATE contacts SET phone=? WHERE id=?";
        sqlx::query(sql)
            .bind(phone)
            .bind(contact_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    if let Some(active) = update.active {
        let sql = "UPDATE contacts SET active=? WHERE id=?";
        sqlx::query(sql)
            .bind(active)
            .bind(contact_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    tx.commit()
        .await
        .map_err(|e| DbError::query("update_contact commit", e))?;
    Ok(())
}

pub async fn delete_contact(db: &Database, contact_id: i64) -> EngineResult<()> {
    let mut tx = db.begin().await?;
    for sql in [
        "DELETE FROM contacts WHERE id=?",
        "DELETE FROM contact_group_contacts WHERE contact_id=?",
        "DELETE FROM active_monitor_contacts WHERE contact_id=?",
        "DELETE FROM monitor_group_contacts WHERE contact_id=?",
    ] {
        sqlx::query(sql)
            .bind(contact_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    tx.commit()
        .await
        .map_err(|e| DbError::query("delete_contact commit", e))?;
    Ok(())
}

fn contact_from_row(row: &sqlx::sqlite::SqliteRow) -> Contact {
    Contact {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        active: row.get("active"),
    }
}

pub async fn get_contact(db: &Database, contact_id: i64) -> EngineResult<Option<Contact>> {
    let sql = "SELECT id, name, email, phone, active FROM contacts WHERE id=?";
    let row = sqlx::query(sql)
        .bind(contact_id)
        .fetch_optional(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(row.as_ref().map(contact_from_row))
}

pub async fn get_all_contacts(db: &Database) -> EngineResult<Vec<Contact>> {
    let sql = "SELECT id, name, email, phone, active FROM contacts";
    let rows = sqlx::query(sql)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(rows.iter().map(contact_from_row).collect())
}

/// Contacts directly attached to an active monitor.
pub async fn get_contacts_for_active_monitor(
    db: &Database,
    monitor_id: i64,
) -> EngineResult<Vec<Contact>> {
    let sql = "SELECT contacts.id, contacts.name, contacts.email, contacts.phone, contacts.active \
               FROM active_monitor_contacts, contacts \
               WHERE active_monitor_contacts.active_monitor_id = ? \
               AND active_monitor_contacts.contact_id = contacts.id";
    let rows = sqlx::query(sql)
        .bind(monitor_id)
        .fetch_all(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(rows.iter().map(contact_from_row).collect())
}

pub async fn add_contact_to_active_monitor(
    db: &Database,
    contact_id: i64,
    monitor_id: i64,
) -> EngineResult<()> {
    if !active_monitor_exists(db, monitor_id).await? {
        return Err(EngineError::InvalidArguments("monitor does not exist".to_string()));
    }
    if !contact_exists(db, contact_id).await? {
        return Err(EngineError::InvalidArguments("contact does not exist".to_string()));
    }
    let sql = "REPLACE INTO active_monitor_contacts (active_monitor_id, contact_id) VALUES (?, ?)";
    sqlx::query(sql)
        .bind(monitor_id)
        .bind(contact_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn delete_contact_from_active_monitor(
    db: &Database,
    contact_id: i64,
    monitor_id: i64,
) -> EngineResult<()> {
    let sql = "DELETE FROM active_monitor_contacts WHERE active_monitor_id=? AND contact_id=?";
    sqlx::query(sql)
        .bind(monitor_id)
        .bind(contact_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

/// Replace the directly attached contacts of an active monitor.
pub async fn set_active_monitor_contacts(
    db: &Database,
    contact_ids: &[i64],
    monitor_id: i64,
) -> EngineResult<()> {
    if !active_monitor_exists(db, monitor_id).await? {
        return Err(EngineError::InvalidArguments("monitor does not exist".to_string()));
    }
    let mut tx = db.begin().await?;
    let sql = "DELETE FROM active_monitor_contacts WHERE active_monitor_id=?";
    sqlx::query(sql)
        .bind(monitor_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query(sql, e))?;
    let sql = "INSERT INTO active_monitor_contacts (active_monitor_id, contact_id) VALUES (?, ?)";
    for contact_id in contact_ids {
        sqlx::query(sql)
            .bind(monitor_id)
            .bind(contact_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    tx.commit()
        .await
        .map_err(|e| DbError::query("set_active_monitor_contacts commit", e))?;
    Ok(())
}

pub async fn create_contact_group(db: &Database, name: &str, active: bool) -> EngineResult<i64> {
    if name.is_empty() {
        return Err(EngineError::InvalidArguments("missing contact group name".to_string()));
    }
    let sql = "INSERT INTO contact_groups (name, active) VALUES (?, ?)";
    let result = sqlx::query(sql)
        .bind(name)
        .bind(active)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(result.last_insert_rowid())
}

pub async fn delete_contact_group(db: &Database, contact_group_id: i64) -> EngineResult<()> {
    let mut tx = db.begin().await?;
    for sql in [
        "DELETE FROM contact_groups WHERE id=?",
        "DELETE FROM contact_group_contacts WHERE contact_group_id=?",
        "DELETE FROM active_monitor_contact_groups WHERE contact_group_id=?",
        "DELETE FROM monitor_group_contact_groups WHERE contact_group_id=?",
    ] {
        sqlx::query(sql)
            .bind(contact_group_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query(sql, e))?;
    }
    tx.commit()
        .await
        .map_err(|e| DbError::query("delete_contact_group commit", e))?;
    Ok(())
}

pub async fn get_contact_group(
    db: &Database,
    contact_group_id: i64,
) -> EngineResult<Option<ContactGroup>> {
    let sql = "SELECT id, name, active FROM contact_groups WHERE id=?";
    let row = sqlx::query(sql)
        .bind(contact_group_id)
        .fetch_optional(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(row.map(|row| ContactGroup {
        id: row.get("id"),
        name: row.get("name"),
        active: row.get("active"),
    }))
}

pub async fn add_contact_to_contact_group(
    db: &Database,
    contact_group_id: i64,
    contact_id: i64,
) -> EngineResult<()> {
    if !contact_group_exists(db, contact_group_id).await? {
        return Err(EngineError::InvalidArguments("contact group does not exist".to_string()));
    }
    if !contact_exists(db, contact_id).await? {
        return Err(EngineError::InvalidArguments("contact does not exist".to_string()));
    }
    let sql = "REPLACE INTO contact_group_contacts (contact_group_id, contact_id) VALUES (?, ?)";
    sqlx::query(sql)
        .bind(contact_group_id)
        .bind(contact_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn delete_contact_from_contact_group(
    db: &Database,
    contact_group_id: i64,
    contact_id: i64,
) -> EngineResult<()> {
    let sql = "DELETE FROM contact_group_contacts WHERE contact_group_id=? AND contact_id=?";
    sqlx::query(sql)
        .bind(contact_group_id)
        .bind(contact_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn add_contact_group_to_active_monitor(
    db: &Database,
    contact_group_id: i64,
    monitor_id: i64,
) -> EngineResult<()> {
    if !active_monitor_exists(db, monitor_id).await? {
        return Err(EngineError::InvalidArguments("monitor does not exist".to_string()));
    }
    if !contact_group_exists(db, contact_group_id).await? {
        return Err(EngineError::InvalidArguments("contact group does not exist".to_string()));
    }
    let sql =
        "REPLACE INTO active_monitor_contact_groups (active_monitor_id, contact_group_id) VALUES (?, ?)";
    sqlx::query(sql)
        .bind(monitor_id)
        .bind(contact_group_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

pub async fn delete_contact_group_from_active_monitor(
    db: &Database,
    contact_group_id: i64,
    monitor_id: i64,
) -> EngineResult<()> {
    let sql =
        "DELETE FROM active_monitor_contact_groups WHERE active_monitor_id=? AND contact_group_id=?";
    sqlx::query(sql)
        .bind(monitor_id)
        .bind(contact_group_id)
        .execute(db.pool())
        .await
        .map_err(|e| DbError::query(sql, e))?;
    Ok(())
}

/// Queries that together cover every path from a monitor to a contact:
/// direct contacts, contact groups on the monitor, contacts on monitor
/// groups containing the monitor, and contact groups on those monitor
/// groups. Inactive contacts and groups are filtered out.
const RECIPIENT_QUERIES: [&str; 4] = [
    "SELECT contacts.email, contacts.phone \
     FROM active_monitor_contacts, contacts \
     WHERE active_monitor_contacts.active_monitor_id = ? \
     AND active_monitor_contacts.contact_id = contacts.id \
     AND contacts.active = 1",
    "SELECT contacts.email, contacts.phone \
     FROM active_monitor_contact_groups, contact_groups, contact_group_contacts, contacts \
     WHERE active_monitor_contact_groups.active_monitor_id = ? \
     AND active_monitor_contact_groups.contact_group_id = contact_groups.id \
     AND contact_groups.active = 1 \
     AND contact_groups.id = contact_group_contacts.contact_group_id \
     AND contact_group_contacts.contact_id = contacts.id \
     AND contacts.active = 1",
    "SELECT contacts.email, contacts.phone \
     FROM monitor_group_active_monitors \
     LEFT JOIN monitor_groups ON monitor_group_active_monitors.monitor_group_id = monitor_groups.id \
     LEFT JOIN monitor_group_contacts ON monitor_group_contacts.monitor_group_id = monitor_groups.id \
     LEFT JOIN contacts ON contacts.id = monitor_group_contacts.contact_id \
     WHERE monitor_group_active_monitors.active_monitor_id = ? AND contacts.active = 1",
    "SELECT contacts.email, contacts.phone \
     FROM monitor_group_active_monitors \
     LEFT JOIN monitor_groups ON monitor_group_active_monitors.monitor_group_id = monitor_groups.id \
     LEFT JOIN monitor_group_contact_groups \
         ON monitor_group_contact_groups.monitor_group_id = monitor_groups.id \
     LEFT JOIN contact_groups ON contact_groups.id = monitor_group_contact_groups.contact_group_id \
     LEFT JOIN contact_group_contacts ON contact_group_contacts.contact_group_id = contact_groups.id \
     LEFT JOIN contacts ON contacts.id = contact_group_contacts.contact_id \
     WHERE monitor_group_active_monitors.active_monitor_id = ? \
     AND contact_groups.active = 1 \
     AND contacts.active = 1",
];

/// Collect every notification address for an active monitor.
pub async fn recipients_for_active_monitor(
    db: &Database,
    monitor_id: i64,
) -> EngineResult<Recipients> {
    let mut recipients = Recipients::default();
    for sql in RECIPIENT_QUERIES {
        let rows = sqlx::query(sql)
            .bind(monitor_id)
            .fetch_all(db.pool())
            .await
            .map_err(|e| DbError::query(sql, e))?;
        for row in rows {
            let email: Option<String> = row.get("email");
            let phone: Option<String> = row.get("phone");
            if let Some(email) = email
                && !email.is_empty()
            {
                recipients.emails.insert(email);
            }
            if let Some(phone) = phone
                && !phone.is_empty()
            {
                recipients.phones.insert(phone);
            }
        }
    }
    Ok(recipients)
}
