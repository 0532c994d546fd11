//! Bulk student import: header check, per-row validation, duplicate
//! classification and best-effort commit against a [`StudentStore`].

use crate::model::{Gender, StudentRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const EXPECTED_HEADERS: [&str; 4] = ["NIS", "Nama Lengkap", "Kelas", "Jenis Kelamin"];

pub const MSG_NIS_EMPTY: &str = "NIS kosong";
pub const MSG_NIS_NOT_NUMERIC: &str = "NIS harus berupa angka";
pub const MSG_NAME_EMPTY: &str = "Nama kosong";
pub const MSG_NAME_TOO_SHORT: &str = "Nama terlalu pendek";
pub const MSG_CLASS_EMPTY: &str = "Kelas kosong";
pub const MSG_GENDER_INVALID: &str = "Jenis kelamin harus \"Laki-laki\" atau \"Perempuan\"";

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("file must be .xlsx or .xls: {0}")]
    UnsupportedExtension(String),
    #[error("file is {size} bytes, limit is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },
    #[error("failed to read spreadsheet: {0}")]
    Unreadable(String),
    #[error("spreadsheet has no rows")]
    Empty,
    #[error("header must be: NIS, Nama Lengkap, Kelas, Jenis Kelamin")]
    HeaderMismatch,
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedExtension(_) => "import_unsupported_file",
            Self::FileTooLarge { .. } => "import_file_too_large",
            Self::Unreadable(_) => "import_unreadable",
            Self::Empty => "import_empty",
            Self::HeaderMismatch => "import_header_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    pub row_number: usize,
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRow {
    #[serde(flatten)]
    pub incoming: ImportRow,
    pub existing_id: String,
    pub existing_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub valid_students: Vec<ImportRow>,
    pub duplicates: Vec<DuplicateRow>,
    pub errors: Vec<String>,
}

/// Trimmed, validated student fields shared by the importer and manual edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentFields {
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    pub gender: Gender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    Skip,
    Update,
}

impl DuplicatePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "update" => Some(Self::Update),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Update => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFailure {
    pub target: String,
    pub row_number: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub policy: DuplicatePolicy,
    pub inserted_count: usize,
    pub updated_count: usize,
    pub failures: Vec<CommitFailure>,
}

impl CommitReport {
    pub fn processed_count(&self) -> usize {
        self.inserted_count + self.updated_count
    }
}

pub trait StudentStore {
    fn list_active_students(&self) -> anyhow::Result<Vec<StudentRecord>>;

    /// Inserts every row as a new active student. Rows that fail individually
    /// are returned; the rest stay inserted. `Err` means none were inserted.
    fn insert_students(&mut self, rows: &[ImportRow]) -> anyhow::Result<Vec<CommitFailure>>;

    /// Overwrites name, class and gender of an existing student.
    fn update_student(&mut self, id: &str, row: &ImportRow) -> anyhow::Result<()>;
}

pub fn check_file(path: &Path, size: u64, max_bytes: u64) -> Result<(), ImportError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ext != "xlsx" && ext != "xls" {
        return Err(ImportError::UnsupportedExtension(
            path.to_string_lossy().to_string(),
        ));
    }
    if size > max_bytes {
        return Err(ImportError::FileTooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

pub fn header_matches(header: &[String]) -> bool {
    EXPECTED_HEADERS.iter().enumerate().all(|(i, expected)| {
        header
            .get(i)
            .map(|cell| cell.to_lowercase().contains(&expected.to_lowercase()))
            .unwrap_or(false)
    })
}

pub fn validate_fields(
    student_id: &str,
    name: &str,
    class_name: &str,
    gender: &str,
) -> Result<StudentFields, Vec<&'static str>> {
    let student_id = student_id.trim();
    let name = name.trim();
    let class_name = class_name.trim();
    let gender_token = gender.trim();

    let mut violations = Vec::new();
    if student_id.is_empty() {
        violations.push(MSG_NIS_EMPTY);
    } else if !student_id.chars().all(|c| c.is_ascii_digit()) {
        violations.push(MSG_NIS_NOT_NUMERIC);
    }
    if name.is_empty() {
        violations.push(MSG_NAME_EMPTY);
    } else if name.chars().count() < 2 {
        violations.push(MSG_NAME_TOO_SHORT);
    }
    if class_name.is_empty() {
        violations.push(MSG_CLASS_EMPTY);
    }
    let gender = Gender::parse(gender_token);
    if gender.is_none() {
        violations.push(MSG_GENDER_INVALID);
    }

    match gender {
        Some(gender) if violations.is_empty() => Ok(StudentFields {
            student_id: student_id.to_string(),
            name: name.to_string(),
            class_name: class_name.to_string(),
            gender,
        }),
        _ => Err(violations),
    }
}

pub fn validate_row(cells: &[String], row_number: usize) -> Result<ImportRow, Vec<&'static str>> {
    let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");
    let fields = validate_fields(cell(0), cell(1), cell(2), cell(3))?;
    Ok(ImportRow {
        row_number,
        student_id: fields.student_id,
        name: fields.name,
        class_name: fields.class_name,
        gender: fields.gender,
    })
}

/// Partitions the data rows of a parsed sheet. `rows[0]` is the header;
/// `existing` is the active-student snapshot taken once for this import.
pub fn validate_import(
    rows: &[Vec<String>],
    existing: &[StudentRecord],
) -> Result<ValidationOutcome, ImportError> {
    let Some((header, data)) = rows.split_first() else {
        return Err(ImportError::Empty);
    };
    if !header_matches(header) {
        return Err(ImportError::HeaderMismatch);
    }

    let mut by_student_id: HashMap<&str, &StudentRecord> = HashMap::new();
    for s in existing.iter().filter(|s| s.active) {
        by_student_id.entry(s.student_id.as_str()).or_insert(s);
    }

    let mut outcome = ValidationOutcome::default();
    let mut accepted = HashSet::<String>::new();
    for (i, raw) in data.iter().enumerate() {
        // Only a row with no cells at all is skipped; blank strings still
        // go through field validation.
        if raw.is_empty() {
            continue;
        }
        let row_number = i + 2;
        let row = match validate_row(raw, row_number) {
            Ok(r) => r,
            Err(violations) => {
                outcome
                    .errors
                    .push(format!("Baris {}: {}", row_number, violations.join(", ")));
                continue;
            }
        };

        if accepted.contains(&row.student_id) {
            outcome.errors.push(format!(
                "Baris {}: NIS \"{}\" duplikat dalam file",
                row_number, row.student_id
            ));
            continue;
        }

        if let Some(found) = by_student_id.get(row.student_id.as_str()) {
            outcome.duplicates.push(DuplicateRow {
                existing_id: found.id.clone(),
                existing_name: found.name.clone(),
                incoming: row,
            });
            continue;
        }

        accepted.insert(row.student_id.clone());
        outcome.valid_students.push(row);
    }

    log::info!(
        "import validated: {} valid, {} duplicates, {} errors",
        outcome.valid_students.len(),
        outcome.duplicates.len(),
        outcome.errors.len()
    );
    Ok(outcome)
}

pub fn commit_import<S: StudentStore>(
    store: &mut S,
    outcome: &ValidationOutcome,
    policy: DuplicatePolicy,
) -> CommitReport {
    let mut report = CommitReport {
        policy,
        inserted_count: 0,
        updated_count: 0,
        failures: Vec::new(),
    };

    if policy == DuplicatePolicy::Update {
        for dup in &outcome.duplicates {
            match store.update_student(&dup.existing_id, &dup.incoming) {
                Ok(()) => report.updated_count += 1,
                Err(e) => {
                    log::warn!(
                        "import: update of NIS {} (row {}) failed: {e:#}",
                        dup.incoming.student_id,
                        dup.incoming.row_number
                    );
                    report.failures.push(CommitFailure {
                        target: dup.incoming.student_id.clone(),
                        row_number: dup.incoming.row_number,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    if !outcome.valid_students.is_empty() {
        match store.insert_students(&outcome.valid_students) {
            Ok(failed) => {
                report.inserted_count = outcome.valid_students.len() - failed.len();
                for f in &failed {
                    log::warn!(
                        "import: insert of NIS {} (row {}) failed: {}",
                        f.target,
                        f.row_number,
                        f.reason
                    );
                }
                report.failures.extend(failed);
            }
            Err(e) => {
                log::warn!("import: bulk insert failed: {e:#}");
                let reason = e.to_string();
                report
                    .failures
                    .extend(outcome.valid_students.iter().map(|r| CommitFailure {
                        target: r.student_id.clone(),
                        row_number: r.row_number,
                        reason: reason.clone(),
                    }));
            }
        }
    }

    log::info!(
        "import committed ({}): {} inserted, {} updated, {} failed",
        policy.as_str(),
        report.inserted_count,
        report.updated_count,
        report.failures.len()
    );
    report
}
