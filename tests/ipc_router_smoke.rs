mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_reports_health_unknown_methods_and_missing_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["version"].is_string());
    assert!(health["workspacePath"].is_null());

    let unknown = request(&mut stdin, &mut reader, "2", "grid.get", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    for (i, method) in [
        "setup.get",
        "students.list",
        "attendance.day",
        "import.preview",
        "import.commit",
        "import.template",
    ]
    .iter()
    .enumerate()
    {
        let resp = request(&mut stdin, &mut reader, &format!("nw{}", i), method, json!({}));
        assert_eq!(error_code(&resp), Some("no_workspace"), "{}", method);
    }

    // Garbage lines still get an envelope back.
    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse reply");
    assert_eq!(error_code(&value), Some("bad_json"));

    let workspace = temp_dir("absensid-router");
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(selected["workspacePath"].is_string());
    assert!(workspace.join("absensi.sqlite3").exists());

    let health = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    assert!(health["workspacePath"].is_string());
    assert!(health["pendingImport"].is_null());

    let missing = request(&mut stdin, &mut reader, "5", "workspace.select", json!({}));
    assert_eq!(error_code(&missing), Some("bad_params"));
}
