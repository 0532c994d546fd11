use crate::db;
use crate::import::{CommitFailure, ImportRow, StudentFields, StudentStore};
use crate::model::StudentRecord;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

const STUDENT_COLUMNS: &str = "id, student_id, name, class_name, gender, active";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        name: r.get(2)?,
        class_name: r.get(3)?,
        gender: r.get(4)?,
        active: r.get::<_, i64>(5)? != 0,
    })
}

#[derive(Debug, Default, Clone)]
pub struct StudentFilter {
    pub class_name: Option<String>,
    pub query: Option<String>,
    pub limit: Option<i64>,
}

pub fn list_active_students(conn: &Connection) -> anyhow::Result<Vec<StudentRecord>> {
    list_students(conn, &StudentFilter::default())
}

/// Active students ordered by name. `query` matches a case-insensitive
/// substring of the name or the NIS.
pub fn list_students(conn: &Connection, filter: &StudentFilter) -> anyhow::Result<Vec<StudentRecord>> {
    let mut sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE active = 1");
    let mut bind: Vec<Value> = Vec::new();
    if let Some(class_name) = filter.class_name.as_deref() {
        sql.push_str(" AND class_name = ?");
        bind.push(Value::Text(class_name.to_string()));
    }
    if let Some(q) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let needle = q.to_lowercase();
        sql.push_str(" AND (instr(lower(name), ?) > 0 OR instr(lower(student_id), ?) > 0)");
        bind.push(Value::Text(needle.clone()));
        bind.push(Value::Text(needle));
    }
    sql.push_str(" ORDER BY name, student_id");
    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        bind.push(Value::Integer(limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, id: &str) -> anyhow::Result<Option<StudentRecord>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    Ok(conn.query_row(&sql, [id], student_from_row).optional()?)
}

pub fn find_active_by_student_id(
    conn: &Connection,
    student_id: &str,
) -> anyhow::Result<Option<StudentRecord>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE student_id = ? AND active = 1");
    Ok(conn.query_row(&sql, [student_id], student_from_row).optional()?)
}

pub fn class_names(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT class_name FROM students
         WHERE active = 1 AND class_name <> ''
         ORDER BY class_name",
    )?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

pub fn create_student(conn: &Connection, fields: &StudentFields) -> anyhow::Result<StudentRecord> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, student_id, name, class_name, gender, active, created_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        (
            &id,
            &fields.student_id,
            &fields.name,
            &fields.class_name,
            fields.gender.as_str(),
            db::now_timestamp(),
        ),
    )?;
    Ok(StudentRecord {
        id,
        student_id: fields.student_id.clone(),
        name: fields.name.clone(),
        class_name: fields.class_name.clone(),
        gender: fields.gender.as_str().to_string(),
        active: true,
    })
}

/// Returns false when no student has this id.
pub fn update_student_fields(
    conn: &Connection,
    id: &str,
    fields: &StudentFields,
) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE students
         SET student_id = ?, name = ?, class_name = ?, gender = ?, updated_at = ?
         WHERE id = ?",
        (
            &fields.student_id,
            &fields.name,
            &fields.class_name,
            fields.gender.as_str(),
            db::now_timestamp(),
            id,
        ),
    )?;
    Ok(changed > 0)
}

/// Soft delete. Returns false when the student does not exist or is
/// already inactive.
pub fn deactivate_student(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE students SET active = 0, updated_at = ? WHERE id = ? AND active = 1",
        (db::now_timestamp(), id),
    )?;
    Ok(changed > 0)
}

pub struct SqliteStudentStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStudentStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl StudentStore for SqliteStudentStore<'_> {
    fn list_active_students(&self) -> anyhow::Result<Vec<StudentRecord>> {
        list_active_students(self.conn)
    }

    fn insert_students(&mut self, rows: &[ImportRow]) -> anyhow::Result<Vec<CommitFailure>> {
        // A failed statement only rolls back itself, so conflicting rows are
        // reported while the rest of the batch commits together.
        let tx = self.conn.unchecked_transaction()?;
        let now = db::now_timestamp();
        let mut failures = Vec::new();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO students(id, student_id, name, class_name, gender, active, created_at)
                 VALUES(?, ?, ?, ?, ?, 1, ?)",
            )?;
            for row in rows {
                if let Err(e) = stmt.execute((
                    Uuid::new_v4().to_string(),
                    &row.student_id,
                    &row.name,
                    &row.class_name,
                    row.gender.as_str(),
                    &now,
                )) {
                    failures.push(CommitFailure {
                        target: row.student_id.clone(),
                        row_number: row.row_number,
                        reason: e.to_string(),
                    });
                }
            }
        }
        tx.commit()?;
        Ok(failures)
    }

    fn update_student(&mut self, id: &str, row: &ImportRow) -> anyhow::Result<()> {
        let changed = self.conn.execute(
            "UPDATE students SET name = ?, class_name = ?, gender = ?, updated_at = ?
             WHERE id = ? AND active = 1",
            (
                &row.name,
                &row.class_name,
                row.gender.as_str(),
                db::now_timestamp(),
                id,
            ),
        )?;
        if changed == 0 {
            anyhow::bail!("student {} is no longer active", id);
        }
        Ok(())
    }
}
