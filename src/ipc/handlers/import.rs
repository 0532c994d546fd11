use crate::import::{self, DuplicatePolicy, ImportError, StudentStore};
use crate::ipc::error::{db_err, err, ok, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::types::{AppState, PendingImport, Request};
use crate::store::SqliteStudentStore;
use crate::xlsx;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

fn import_err(e: ImportError, path: &Path) -> HandlerErr {
    HandlerErr::new(e.code(), e.to_string()).with_details(json!({ "path": path.to_string_lossy() }))
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn handle_import_template(state: &mut AppState, req: &Request) -> Value {
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    let out_path = match get_required_str(&req.params, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = xlsx::write_template(&out_path) {
        return err(
            &req.id,
            "export_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path.to_string_lossy() })),
        );
    }
    ok(&req.id, json!({ "path": out_path.to_string_lossy() }))
}

fn build_preview(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let path = PathBuf::from(get_required_str(params, "path")?);
    let settings = setup::import_settings(conn).map_err(db_err("db_query_failed"))?;

    let meta = std::fs::metadata(&path)
        .map_err(|e| import_err(ImportError::Unreadable(e.to_string()), &path))?;
    import::check_file(&path, meta.len(), settings.max_file_bytes)
        .map_err(|e| import_err(e, &path))?;
    let bytes = std::fs::read(&path)
        .map_err(|e| import_err(ImportError::Unreadable(e.to_string()), &path))?;
    let file_sha256 = sha256_hex(&bytes);

    // Parse the same bytes that were fingerprinted.
    let rows = xlsx::parse_rows(&bytes)
        .map_err(|e| import_err(ImportError::Unreadable(format!("{e:#}")), &path))?;
    let snapshot = SqliteStudentStore::new(conn)
        .list_active_students()
        .map_err(db_err("db_query_failed"))?;
    let outcome = import::validate_import(&rows, &snapshot).map_err(|e| import_err(e, &path))?;

    let preview_id = Uuid::new_v4().to_string();
    let rows_total = rows.iter().skip(1).filter(|r| !r.is_empty()).count();
    let result = json!({
        "previewId": preview_id,
        "path": path.to_string_lossy(),
        "fileSha256": file_sha256,
        "rowsTotal": rows_total,
        "validCount": outcome.valid_students.len(),
        "duplicateCount": outcome.duplicates.len(),
        "errorCount": outcome.errors.len(),
        "validStudents": outcome.valid_students,
        "duplicates": outcome.duplicates,
        "errors": outcome.errors,
        "defaultPolicy": settings.default_policy.as_str()
    });

    log::info!(
        "import preview {} ready for {} (sha256 {})",
        preview_id,
        path.to_string_lossy(),
        file_sha256
    );
    state.pending_import = Some(PendingImport {
        preview_id,
        path,
        file_sha256,
        outcome,
    });
    Ok(result)
}

fn handle_import_preview(state: &mut AppState, req: &Request) -> Value {
    match build_preview(state, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            // Any fatal check sends the cycle back to idle.
            if e.code != "bad_params" && e.code != "no_workspace" {
                log::warn!("import preview rejected: {} ({})", e.message, e.code);
                state.pending_import = None;
            }
            e.response(&req.id)
        }
    }
}

fn handle_import_commit(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let preview_id = match get_required_str(&req.params, "previewId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let policy = match req.params.get("policy").and_then(|v| v.as_str()) {
        Some(raw) => match DuplicatePolicy::parse(raw) {
            Some(p) => p,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "policy must be one of: skip, update",
                    None,
                )
            }
        },
        None => match setup::import_settings(conn) {
            Ok(s) => s.default_policy,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
    };

    let Some(pending) = state.pending_import.take() else {
        return err(&req.id, "import_no_preview", "no import preview is pending", None);
    };
    if pending.preview_id != preview_id {
        let details = json!({ "pendingPreviewId": pending.preview_id });
        state.pending_import = Some(pending);
        return err(
            &req.id,
            "import_preview_mismatch",
            "previewId does not match the pending import",
            Some(details),
        );
    }

    let mut store = SqliteStudentStore::new(conn);
    let report = import::commit_import(&mut store, &pending.outcome, policy);
    ok(
        &req.id,
        json!({
            "previewId": pending.preview_id,
            "path": pending.path.to_string_lossy(),
            "fileSha256": pending.file_sha256,
            "policy": report.policy,
            "insertedCount": report.inserted_count,
            "updatedCount": report.updated_count,
            "processedCount": report.processed_count(),
            "failures": report.failures
        }),
    )
}

fn handle_import_cancel(state: &mut AppState, req: &Request) -> Value {
    let cancelled = state.pending_import.take();
    if let Some(p) = cancelled.as_ref() {
        log::info!("import preview {} cancelled", p.preview_id);
    }
    ok(
        &req.id,
        json!({
            "cancelled": cancelled.is_some(),
            "previewId": cancelled.map(|p| p.preview_id)
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.template" => Some(handle_import_template(state, req)),
        "import.preview" => Some(handle_import_preview(state, req)),
        "import.commit" => Some(handle_import_commit(state, req)),
        "import.cancel" => Some(handle_import_cancel(state, req)),
        _ => None,
    }
}
