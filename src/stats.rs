//! Process-wide statistics counters.
//!
//! A single global registry of named counters, grouped into sections
//! ("active_monitor", "sql", "event", ...). Modules update their counters
//! through the helpers here instead of keeping module-level mutable state.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

type Registry = Mutex<BTreeMap<(String, String), i64>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Mutex::new(BTreeMap::new()))
}

/// Set a counter to an absolute value.
pub fn set(section: &str, name: &str, value: i64) {
    let mut reg = registry().lock().unwrap();
    reg.insert((section.to_string(), name.to_string()), value);
}

/// Increment a counter, creating it at zero if missing.
pub fn inc(section: &str, name: &str) {
    add(section, name, 1);
}

/// Decrement a counter, creating it at zero if missing.
pub fn dec(section: &str, name: &str) {
    add(section, name, -1);
}

fn add(section: &str, name: &str, delta: i64) {
    let mut reg = registry().lock().unwrap();
    *reg.entry((section.to_string(), name.to_string())).or_insert(0) += delta;
}

/// Read a single counter. Missing counters read as zero.
pub fn get(section: &str, name: &str) -> i64 {
    let reg = registry().lock().unwrap();
    reg.get(&(section.to_string(), name.to_string()))
        .copied()
        .unwrap_or(0)
}

/// Snapshot of all counters, grouped by section.
pub fn snapshot() -> BTreeMap<String, BTreeMap<String, i64>> {
    let reg = registry().lock().unwrap();
    let mut ret: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for ((section, name), value) in reg.iter() {
        ret.entry(section.clone())
            .or_default()
            .insert(name.clone(), *value);
    }
    ret
}
