//! Monitor definitions.
//!
//! A monitor definition is the reusable template monitors are created
//! from: a check executable, a command line template, a description
//! template and an ordered parameter schema. Definitions are kept in
//! memory by the manager and mirrored to the database on every change.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::engine::manager::ActiveMonitorManager;
use crate::engine::sql;
use crate::errors::{EngineError, EngineResult};
use crate::models::{DefArgRecord, MonitorDefRecord};
use crate::templates::{self, TemplateCache};

/// Parameter spec for [`set_def_arg`]; upserted by name.
#[derive(Debug, Clone)]
pub struct DefArgSpec {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub required: bool,
    pub default_value: String,
}

/// Whitelisted partial update for a monitor definition. Mutating a
/// template or the schema flushes the definition's template cache.
#[derive(Debug, Clone, Default)]
pub struct MonitorDefUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
    pub cmdline_filename: Option<String>,
    pub cmdline_args_tmpl: Option<String>,
    pub description_tmpl: Option<String>,
}

#[derive(Debug, Clone)]
struct DefFields {
    name: String,
    description: String,
    active: bool,
    cmdline_filename: String,
    cmdline_args_tmpl: String,
    description_tmpl: String,
    arg_spec: Vec<DefArgRecord>,
}

/// An in-memory monitor definition. Monitors hold its id and look it up
/// through the manager registry; the manager is the single owner.
pub struct ActiveMonitorDef {
    pub id: i64,
    fields: RwLock<DefFields>,
    pub tmpl_cache: TemplateCache,
}

impl ActiveMonitorDef {
    pub fn new(record: MonitorDefRecord, arg_spec: Vec<DefArgRecord>) -> Self {
        Self {
            id: record.id,
            fields: RwLock::new(DefFields {
                name: record.name,
                description: record.description,
                active: record.active,
                cmdline_filename: record.cmdline_filename,
                cmdline_args_tmpl: record.cmdline_args_tmpl,
                description_tmpl: record.description_tmpl,
                arg_spec,
            }),
            tmpl_cache: TemplateCache::new(),
        }
    }

    pub fn name(&self) -> String {
        self.fields.read().unwrap().name.clone()
    }

    pub fn cmdline_filename(&self) -> String {
        self.fields.read().unwrap().cmdline_filename.clone()
    }

    pub fn is_active(&self) -> bool {
        self.fields.read().unwrap().active
    }

    /// Copy of the definition as a plain record.
    pub fn snapshot(&self) -> MonitorDefRecord {
        let fields = self.fields.read().unwrap();
        MonitorDefRecord {
            id: self.id,
            name: fields.name.clone(),
            description: fields.description.clone(),
            active: fields.active,
            cmdline_filename: fields.cmdline_filename.clone(),
            cmdline_args_tmpl: fields.cmdline_args_tmpl.clone(),
            description_tmpl: fields.description_tmpl.clone(),
        }
    }

    /// Copy of the parameter schema.
    pub fn arg_spec(&self) -> Vec<DefArgRecord> {
        self.fields.read().unwrap().arg_spec.clone()
    }

    fn arg_with_name(&self, name: &str) -> Option<DefArgRecord> {
        let fields = self.fields.read().unwrap();
        fields.arg_spec.iter().find(|a| a.name == name).cloned()
    }

    /// Check monitor arguments against the parameter schema.
    ///
    /// Every argument key must name a schema parameter. Unless
    /// `permit_missing` is set, every required parameter must be present.
    pub fn validate_args(
        &self,
        args: &HashMap<String, String>,
        permit_missing: bool,
    ) -> EngineResult<()> {
        let fields = self.fields.read().unwrap();
        if !permit_missing {
            for arg in &fields.arg_spec {
                if arg.required && !args.contains_key(&arg.name) {
                    return Err(EngineError::InvalidArguments(format!(
                        "missing argument {}",
                        arg.name
                    )));
                }
            }
        }
        let known: HashSet<&str> = fields.arg_spec.iter().map(|a| a.name.as_str()).collect();
        for key in args.keys() {
            if !known.contains(key.as_str()) {
                return Err(EngineError::InvalidArguments(format!(
                    "invalid argument {key}"
                )));
            }
        }
        Ok(())
    }

    /// Schema default values overlaid with the monitor's arguments.
    fn effective_args(fields: &DefFields, monitor_args: &HashMap<String, String>) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> = fields
            .arg_spec
            .iter()
            .map(|a| (a.name.clone(), a.default_value.clone()))
            .collect();
        vars.extend(monitor_args.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }

    /// Expand the command line for a monitor, using the cached value when
    /// available.
    pub fn expanded_args(
        &self,
        monitor_id: i64,
        monitor_args: &HashMap<String, String>,
    ) -> EngineResult<Vec<String>> {
        if let Some(args) = self.tmpl_cache.cached_args(monitor_id) {
            return Ok(args);
        }
        let fields = self.fields.read().unwrap();
        let vars = Self::effective_args(&fields, monitor_args);
        let args = templates::render_args(&fields.cmdline_args_tmpl, &vars)
            .map_err(|e| EngineError::Template(e.to_string()))?;
        drop(fields);
        Ok(self.tmpl_cache.store_args(monitor_id, args))
    }

    /// Expand the human readable description for a monitor, using the
    /// cached value when available. Used in alert notifications.
    pub fn expanded_description(
        &self,
        monitor_id: i64,
        monitor_args: &HashMap<String, String>,
    ) -> EngineResult<String> {
        if let Some(description) = self.tmpl_cache.cached_description(monitor_id) {
            return Ok(description);
        }
        let fields = self.fields.read().unwrap();
        let vars = Self::effective_args(&fields, monitor_args);
        let description = templates::render(&fields.description_tmpl, &vars)
            .map_err(|e| EngineError::Template(e.to_string()))?;
        drop(fields);
        Ok(self.tmpl_cache.store_description(monitor_id, description))
    }

    fn apply_update(&self, update: &MonitorDefUpdate) {
        let mut fields = self.fields.write().unwrap();
        if let Some(name) = &update.name {
            fields.name = name.clone();
        }
        if let Some(description) = &update.description {
            fields.description = description.clone();
        }
        if let Some(active) = update.active {
            fields.active = active;
        }
        if let Some(cmdline_filename) = &update.cmdline_filename {
            fields.cmdline_filename = cmdline_filename.clone();
        }
        if let Some(cmdline_args_tmpl) = &update.cmdline_args_tmpl {
            fields.cmdline_args_tmpl = cmdline_args_tmpl.clone();
        }
        if let Some(description_tmpl) = &update.description_tmpl {
            fields.description_tmpl = description_tmpl.clone();
        }
    }
}

/// Create a monitor definition and register it. The record's id field is
/// ignored; the database assigns the id.
pub async fn create_monitor_def(
    manager: &ActiveMonitorManager,
    record: MonitorDefRecord,
) -> EngineResult<Arc<ActiveMonitorDef>> {
    let def_id = sql::create_monitor_def(&manager.db, &record).await?;
    let def = Arc::new(ActiveMonitorDef::new(
        MonitorDefRecord {
            id: def_id,
            ..record
        },
        Vec::new(),
    ));
    manager.insert_def(Arc::clone(&def));
    info!("created active monitor def {} ({})", def.id, def.name());
    Ok(def)
}

/// Apply a whitelisted update to a definition, in the database and in
/// memory, and flush its template cache.
pub async fn update_monitor_def(
    manager: &ActiveMonitorManager,
    def_id: i64,
    update: &MonitorDefUpdate,
) -> EngineResult<()> {
    let def = manager
        .def(def_id)
        .ok_or_else(|| EngineError::NotFound(format!("monitor def {def_id}")))?;
    info!("updating monitor def {def_id}");

    let mut tx = manager.db.begin().await?;
    let updates: [(&str, Option<String>); 6] = [
        ("name", update.name.clone()),
        ("description", update.description.clone()),
        (
            "active",
            update.active.map(|a| if a { "1" } else { "0" }.to_string()),
        ),
        ("cmdline_filename", update.cmdline_filename.clone()),
        ("cmdline_args_tmpl", update.cmdline_args_tmpl.clone()),
        ("description_tmpl", update.description_tmpl.clone()),
    ];
    for (column, value) in updates {
        let Some(value) = value else { continue };
        let sql = format!("UPDATE active_monitor_defs SET {column}=? WHERE id=?");
        sqlx::query(&sql)
            .bind(value)
            .bind(def_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| crate::db::DbError::query(&sql, e))?;
    }
    tx.commit()
        .await
        .map_err(|e| crate::db::DbError::query("update_monitor_def commit", e))?;

    def.apply_update(update);
    def.tmpl_cache.flush_all();
    Ok(())
}

/// Delete a definition. Fails while any monitor references it.
pub async fn delete_monitor_def(manager: &ActiveMonitorManager, def_id: i64) -> EngineResult<()> {
    let def = manager
        .def(def_id)
        .ok_or_else(|| EngineError::NotFound(format!("monitor def {def_id}")))?;
    if manager.monitors().iter().any(|m| m.def_id == def_id) {
        return Err(EngineError::DefinitionInUse);
    }
    manager.remove_def(def_id);
    def.tmpl_cache.flush_all();
    sql::delete_monitor_def(&manager.db, def_id).await?;
    info!("deleted active monitor def {def_id}");
    Ok(())
}

/// Insert or update a parameter spec, matching on name.
pub async fn set_def_arg(
    manager: &ActiveMonitorManager,
    def_id: i64,
    spec: DefArgSpec,
) -> EngineResult<()> {
    let def = manager
        .def(def_id)
        .ok_or_else(|| EngineError::NotFound(format!("monitor def {def_id}")))?;
    match def.arg_with_name(&spec.name) {
        Some(mut existing) => {
            existing.display_name = spec.display_name;
            existing.description = spec.description;
            existing.required = spec.required;
            existing.default_value = spec.default_value;
            sql::update_def_arg(&manager.db, &existing).await?;
            let mut fields = def.fields.write().unwrap();
            if let Some(slot) = fields.arg_spec.iter_mut().find(|a| a.id == existing.id) {
                *slot = existing;
            }
        }
        None => {
            let mut record = DefArgRecord {
                id: 0,
                def_id,
                name: spec.name,
                display_name: spec.display_name,
                description: spec.description,
                required: spec.required,
                default_value: spec.default_value,
            };
            record.id = sql::create_def_arg(&manager.db, &record).await?;
            def.fields.write().unwrap().arg_spec.push(record);
        }
    }
    def.tmpl_cache.flush_all();
    Ok(())
}

/// Remove a parameter spec by name. Removing a missing name is a no-op.
pub async fn delete_def_arg(
    manager: &ActiveMonitorManager,
    def_id: i64,
    name: &str,
) -> EngineResult<()> {
    let def = manager
        .def(def_id)
        .ok_or_else(|| EngineError::NotFound(format!("monitor def {def_id}")))?;
    let Some(arg) = def.arg_with_name(name) else {
        return Ok(());
    };
    def.fields.write().unwrap().arg_spec.retain(|a| a.id != arg.id);
    def.tmpl_cache.flush_all();
    sql::delete_def_arg(&manager.db, arg.id).await?;
    Ok(())
}
