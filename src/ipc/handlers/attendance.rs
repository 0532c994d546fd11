use crate::db;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceStatus;
use crate::store;
use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{json, Value};
use uuid::Uuid;

const RECENT_DAYS_DEFAULT: i64 = 7;
const RECENT_LIMIT_DEFAULT: i64 = 5;

const RECORD_SELECT: &str = "SELECT a.id, s.id, s.student_id, s.name, s.class_name,
                                    a.date, a.status, a.notes
                             FROM attendance a
                             JOIN students s ON s.id = a.student_id";

fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

fn query_failed(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}

fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::new("bad_params", "date must be YYYY-MM-DD"))
}

fn parse_status(raw: &str) -> Result<AttendanceStatus, HandlerErr> {
    AttendanceStatus::parse(raw).ok_or_else(|| {
        HandlerErr::new(
            "bad_params",
            "status must be one of: Hadir, Izin, Sakit, Alpha",
        )
    })
}

fn parse_notes(params: &Value) -> Result<Option<String>, HandlerErr> {
    match params.get("notes") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err(HandlerErr::new("bad_params", "notes must be string or null")),
    }
}

fn parse_i64_param(
    params: &Value,
    key: &str,
    default: i64,
    min: i64,
    max: i64,
) -> Result<i64, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_i64()
            .map(|n| n.clamp(min, max))
            .ok_or_else(|| HandlerErr::new("bad_params", format!("{} must be integer", key))),
    }
}

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "nis": r.get::<_, String>(2)?,
        "name": r.get::<_, String>(3)?,
        "className": r.get::<_, String>(4)?,
        "date": r.get::<_, String>(5)?,
        "status": r.get::<_, String>(6)?,
        "notes": r.get::<_, Option<String>>(7)?
    }))
}

fn load_record(conn: &Connection, id: &str) -> Result<Option<Value>, HandlerErr> {
    conn.query_row(
        &format!("{RECORD_SELECT} WHERE a.id = ?"),
        [id],
        record_from_row,
    )
    .optional()
    .map_err(query_failed)
}

fn attendance_record(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_pk = get_required_str(params, "studentId")?;
    let date = parse_date(&get_required_str(params, "date")?)?;
    let status = parse_status(&get_required_str(params, "status")?)?;
    let notes = parse_notes(params)?;

    let student = store::get_student(conn, &student_pk)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?
        .filter(|s| s.active)
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;

    let date_key = date.format("%Y-%m-%d").to_string();
    let now = db::now_timestamp();
    conn.execute(
        "INSERT INTO attendance(id, student_id, date, status, notes, created_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET
           status = excluded.status,
           notes = excluded.notes,
           updated_at = excluded.created_at",
        (
            Uuid::new_v4().to_string(),
            &student.id,
            &date_key,
            status.as_str(),
            &notes,
            &now,
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    // The upsert keeps the first id for this student and day.
    let record = conn
        .query_row(
            &format!("{RECORD_SELECT} WHERE a.student_id = ? AND a.date = ?"),
            (&student.id, &date_key),
            record_from_row,
        )
        .map_err(query_failed)?;

    log::info!(
        "attendance {} recorded for NIS {} on {}",
        status.as_str(),
        student.student_id,
        date_key
    );
    Ok(json!({ "record": record }))
}

fn attendance_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let status = match params.get("status") {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_status(v.as_str().unwrap_or(""))?),
    };
    let notes = if params.get("notes").is_some() {
        Some(parse_notes(params)?)
    } else {
        None
    };
    if status.is_none() && notes.is_none() {
        return Err(HandlerErr::new("bad_params", "nothing to update: give status or notes"));
    }

    let current = load_record(conn, &id)?
        .ok_or_else(|| HandlerErr::new("not_found", "attendance record not found"))?;
    let status_text = match status {
        Some(s) => s.as_str().to_string(),
        None => current["status"].as_str().unwrap_or_default().to_string(),
    };
    let notes = match notes {
        Some(n) => n,
        None => current["notes"].as_str().map(str::to_string),
    };

    conn.execute(
        "UPDATE attendance SET status = ?, notes = ?, updated_at = ? WHERE id = ?",
        (&status_text, &notes, db::now_timestamp(), &id),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    let record = load_record(conn, &id)?
        .ok_or_else(|| HandlerErr::new("not_found", "attendance record not found"))?;
    log::info!("attendance {} updated to {}", id, status_text);
    Ok(json!({ "record": record }))
}

fn attendance_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let changed = conn
        .execute("DELETE FROM attendance WHERE id = ?", [&id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if changed == 0 {
        return Err(HandlerErr::new("not_found", "attendance record not found"));
    }
    log::info!("attendance {} deleted", id);
    Ok(json!({ "ok": true }))
}

fn attendance_day(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let date = parse_date(&get_required_str(params, "date")?)?;
    let date_key = date.format("%Y-%m-%d").to_string();
    let class_name = params
        .get("className")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let mut sql = format!("{RECORD_SELECT} WHERE a.date = ? AND s.active = 1");
    let mut bind = vec![SqlValue::Text(date_key.clone())];
    if let Some(c) = class_name {
        sql.push_str(" AND s.class_name = ?");
        bind.push(SqlValue::Text(c));
    }
    sql.push_str(" ORDER BY s.class_name, s.name");

    let mut stmt = conn.prepare(&sql).map_err(query_failed)?;
    let records = stmt
        .query_map(params_from_iter(bind), record_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;

    Ok(json!({ "date": date_key, "records": records }))
}

/// Active students with attendance touched in the last `days` days, most
/// recent first, one entry per student.
fn attendance_recent_students(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let days = parse_i64_param(params, "days", RECENT_DAYS_DEFAULT, 1, 366)?;
    let limit = parse_i64_param(params, "limit", RECENT_LIMIT_DEFAULT, 1, 50)?;
    let since = db::timestamp_days_ago(days);

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.student_id, s.name, s.class_name, s.gender,
                    MAX(COALESCE(a.updated_at, a.created_at)) AS last_seen
             FROM attendance a
             JOIN students s ON s.id = a.student_id
             WHERE s.active = 1 AND COALESCE(a.updated_at, a.created_at) >= ?
             GROUP BY s.id
             ORDER BY last_seen DESC, s.name
             LIMIT ?",
        )
        .map_err(query_failed)?;
    let students = stmt
        .query_map((&since, limit), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
                "className": r.get::<_, String>(3)?,
                "gender": r.get::<_, String>(4)?,
                "lastRecordedAt": r.get::<_, String>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;

    Ok(json!({ "since": since, "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let method = req.method.as_str();
    if !matches!(
        method,
        "attendance.record"
            | "attendance.update"
            | "attendance.delete"
            | "attendance.day"
            | "attendance.recentStudents"
    ) {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let result = match method {
        "attendance.record" => attendance_record(conn, &req.params),
        "attendance.update" => attendance_update(conn, &req.params),
        "attendance.delete" => attendance_delete(conn, &req.params),
        "attendance.day" => attendance_day(conn, &req.params),
        _ => attendance_recent_students(conn, &req.params),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
