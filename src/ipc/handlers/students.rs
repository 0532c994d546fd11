use crate::import::{validate_fields, StudentFields};
use crate::ipc::error::{db_err, err, ok, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::types::{AppState, Request};
use crate::model::StudentRecord;
use crate::store::{self, StudentFilter};
use rusqlite::Connection;
use serde_json::{json, Value};

fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn checked_fields(
    student_id: &str,
    name: &str,
    class_name: &str,
    gender: &str,
) -> Result<StudentFields, HandlerErr> {
    validate_fields(student_id, name, class_name, gender).map_err(|violations| {
        HandlerErr::new("bad_params", violations.join(", "))
            .with_details(json!({ "violations": violations }))
    })
}

/// NIS must stay unique among active students other than `except_id`.
fn ensure_student_id_free(
    conn: &Connection,
    student_id: &str,
    except_id: Option<&str>,
) -> Result<(), HandlerErr> {
    let holder = store::find_active_by_student_id(conn, student_id).map_err(db_err("db_query_failed"))?;
    match holder {
        Some(s) if Some(s.id.as_str()) != except_id => Err(HandlerErr::new(
            "duplicate_student_id",
            format!("NIS {} is already used by {}", student_id, s.name),
        )
        .with_details(json!({ "existingId": s.id, "existingName": s.name }))),
        _ => Ok(()),
    }
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let query = optional_str(params, "query");
    let limit = match params.get("limit") {
        Some(v) if !v.is_null() => {
            let n = v
                .as_i64()
                .ok_or_else(|| HandlerErr::new("bad_params", "limit must be integer"))?;
            Some(n.clamp(1, 500))
        }
        // Free-text search is capped unless the caller asks otherwise.
        _ if query.is_some() => {
            Some(setup::student_search_limit(conn).map_err(db_err("db_query_failed"))?)
        }
        _ => None,
    };
    let filter = StudentFilter {
        class_name: optional_str(params, "className"),
        query,
        limit,
    };
    let students = store::list_students(conn, &filter).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "students": students }))
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let text = |key: &str| params.get(key).and_then(|v| v.as_str()).unwrap_or("");
    let fields = checked_fields(
        text("studentId"),
        text("name"),
        text("className"),
        text("gender"),
    )?;
    ensure_student_id_free(conn, &fields.student_id, None)?;
    let student = store::create_student(conn, &fields).map_err(db_err("db_insert_failed"))?;
    log::info!("student created: NIS {}", student.student_id);
    Ok(json!({ "student": student }))
}

fn students_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new("bad_params", "patch must be an object"));
    };
    for k in patch.keys() {
        if !matches!(k.as_str(), "studentId" | "name" | "className" | "gender") {
            return Err(HandlerErr::new("bad_params", format!("unknown student field: {}", k)));
        }
    }

    let current: StudentRecord = store::get_student(conn, &id)
        .map_err(db_err("db_query_failed"))?
        .filter(|s| s.active)
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    let pick = |key: &str, fallback: &str| -> String {
        patch
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(fallback)
            .to_string()
    };
    let fields = checked_fields(
        &pick("studentId", &current.student_id),
        &pick("name", &current.name),
        &pick("className", &current.class_name),
        &pick("gender", &current.gender),
    )?;
    ensure_student_id_free(conn, &fields.student_id, Some(&id))?;
    store::update_student_fields(conn, &id, &fields).map_err(db_err("db_update_failed"))?;

    let student = store::get_student(conn, &id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    Ok(json!({ "student": student }))
}

fn students_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let changed = store::deactivate_student(conn, &id).map_err(db_err("db_update_failed"))?;
    if !changed {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    log::info!("student {} deactivated", id);
    Ok(json!({ "ok": true }))
}

fn students_classes(conn: &Connection) -> Result<Value, HandlerErr> {
    let classes = store::class_names(conn).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "classes": classes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let method = req.method.as_str();
    if !matches!(
        method,
        "students.list"
            | "students.classes"
            | "students.create"
            | "students.update"
            | "students.delete"
    ) {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };

    let result = match method {
        "students.list" => students_list(conn, &req.params),
        "students.classes" => students_classes(conn),
        "students.create" => students_create(conn, &req.params),
        "students.update" => students_update(conn, &req.params),
        _ => students_delete(conn, &req.params),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
