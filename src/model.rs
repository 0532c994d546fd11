use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "Laki-laki")]
    Male,
    #[serde(rename = "Perempuan")]
    Female,
}

impl Gender {
    /// Accepts the two full words and their single-letter forms. Case-sensitive:
    /// `l` and `p` are not valid.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "Laki-laki" | "L" => Some(Self::Male),
            "Perempuan" | "P" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "Laki-laki",
            Self::Female => "Perempuan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Hadir,
    Izin,
    Sakit,
    Alpha,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hadir" | "present" => Some(Self::Hadir),
            "izin" | "excused" => Some(Self::Izin),
            "sakit" | "sick" => Some(Self::Sakit),
            "alpha" | "absent" => Some(Self::Alpha),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hadir => "Hadir",
            Self::Izin => "Izin",
            Self::Sakit => "Sakit",
            Self::Alpha => "Alpha",
        }
    }
}

/// A persisted student. `student_id` is the school-issued NIS; `id` is the
/// store's own key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    pub gender: String,
    pub active: bool,
}
