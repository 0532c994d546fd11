use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::import::ValidationOutcome;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A validated import waiting for the user's skip/update decision.
pub struct PendingImport {
    pub preview_id: String,
    pub path: PathBuf,
    pub file_sha256: String,
    pub outcome: ValidationOutcome,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub pending_import: Option<PendingImport>,
}
