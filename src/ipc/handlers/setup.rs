use crate::db;
use crate::import::DuplicatePolicy;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
const MIN_MAX_FILE_BYTES: i64 = 1024;
const MAX_MAX_FILE_BYTES: i64 = 50 * 1024 * 1024;
pub const DEFAULT_SEARCH_LIMIT: i64 = 20;

#[derive(Clone, Copy)]
enum SetupSection {
    Import,
    Students,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(Self::Import),
            "students" => Some(Self::Students),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Import => "setup.import",
            Self::Students => "setup.students",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Import => json!({
            "maxFileBytes": DEFAULT_MAX_FILE_BYTES,
            "defaultDuplicatePolicy": "skip"
        }),
        SetupSection::Students => json!({
            "searchLimit": DEFAULT_SEARCH_LIMIT
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Import => match k.as_str() {
                "maxFileBytes" => {
                    let n = parse_i64_range(v, k, MIN_MAX_FILE_BYTES, MAX_MAX_FILE_BYTES)?;
                    obj.insert(k.clone(), Value::from(n));
                }
                "defaultDuplicatePolicy" => {
                    let policy = v
                        .as_str()
                        .and_then(DuplicatePolicy::parse)
                        .ok_or_else(|| "defaultDuplicatePolicy must be one of: skip, update".to_string())?;
                    obj.insert(k.clone(), Value::String(policy.as_str().to_string()));
                }
                _ => return Err(format!("unknown import field: {}", k)),
            },
            SetupSection::Students => match k.as_str() {
                "searchLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 500)?));
                }
                _ => return Err(format!("unknown students field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                log::warn!("ignoring saved {}: {}", section.key(), msg);
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    pub max_file_bytes: u64,
    pub default_policy: DuplicatePolicy,
}

pub fn import_settings(conn: &Connection) -> anyhow::Result<ImportSettings> {
    let section = load_section(conn, SetupSection::Import)?;
    Ok(ImportSettings {
        max_file_bytes: section
            .get("maxFileBytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_FILE_BYTES),
        default_policy: section
            .get("defaultDuplicatePolicy")
            .and_then(|v| v.as_str())
            .and_then(DuplicatePolicy::parse)
            .unwrap_or(DuplicatePolicy::Skip),
    })
}

pub fn student_search_limit(conn: &Connection) -> anyhow::Result<i64> {
    let section = load_section(conn, SetupSection::Students)?;
    Ok(section
        .get("searchLimit")
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_SEARCH_LIMIT))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let import = match load_section(conn, SetupSection::Import) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = match load_section(conn, SetupSection::Students) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "import": import,
            "students": students
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    log::info!("setup section {} updated", section.key());
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
