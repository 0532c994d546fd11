mod test_support;

use serde_json::json;
use test_support::{error_code, open_workspace, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn attendance_record_upserts_one_row_per_student_and_day() {
    let workspace = temp_dir("absensid-attendance");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);

    let ahmad = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "studentId": "12345", "name": "Ahmad Rizki", "className": "7A", "gender": "L" }),
    );
    let siti = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "studentId": "12346", "name": "Siti Nurhaliza", "className": "7B", "gender": "P" }),
    );
    let ahmad_id = ahmad["student"]["id"].clone();

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.record",
        json!({ "studentId": ahmad_id, "date": "2024-07-15", "status": "hadir" }),
    );
    assert_eq!(first["record"]["status"].as_str(), Some("Hadir"));
    assert_eq!(first["record"]["nis"].as_str(), Some("12345"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.record",
        json!({ "studentId": ahmad_id, "date": "2024-07-15", "status": "Sakit", "notes": " demam " }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.record",
        json!({ "studentId": siti["student"]["id"], "date": "2024-07-15", "status": "absent" }),
    );

    let day = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.day",
        json!({ "date": "2024-07-15" }),
    );
    let records = day["records"].as_array().expect("records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["className"].as_str(), Some("7A"));
    assert_eq!(records[0]["status"].as_str(), Some("Sakit"));
    assert_eq!(records[0]["notes"].as_str(), Some("demam"));
    assert_eq!(records[1]["status"].as_str(), Some("Alpha"));

    let class_day = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.day",
        json!({ "date": "2024-07-15", "className": "7B" }),
    );
    assert_eq!(class_day["records"].as_array().map(|a| a.len()), Some(1));

    let other_day = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.day",
        json!({ "date": "2024-07-16" }),
    );
    assert_eq!(other_day["records"].as_array().map(|a| a.len()), Some(0));
}

#[test]
fn attendance_record_rejects_bad_input_and_inactive_students() {
    let workspace = temp_dir("absensid-attendance-invalid");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "studentId": "300", "name": "Rina Wati", "className": "8A", "gender": "P" }),
    );
    let id = student["student"]["id"].clone();

    let bad_status = request(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.record",
        json!({ "studentId": id, "date": "2024-07-15", "status": "late" }),
    );
    assert_eq!(error_code(&bad_status), Some("bad_params"));

    let bad_date = request(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.record",
        json!({ "studentId": id, "date": "15/07/2024", "status": "Hadir" }),
    );
    assert_eq!(error_code(&bad_date), Some("bad_params"));

    let bad_notes = request(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.record",
        json!({ "studentId": id, "date": "2024-07-15", "status": "Izin", "notes": 5 }),
    );
    assert_eq!(error_code(&bad_notes), Some("bad_params"));

    let _ = request_ok(&mut stdin, &mut reader, "5", "students.delete", json!({ "id": id }));
    let inactive = request(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.record",
        json!({ "studentId": id, "date": "2024-07-15", "status": "Hadir" }),
    );
    assert_eq!(error_code(&inactive), Some("not_found"));
}

#[test]
fn attendance_records_can_be_edited_and_deleted_by_id() {
    let workspace = temp_dir("absensid-attendance-edit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "studentId": "400", "name": "Dewi Sartika", "className": "8B", "gender": "P" }),
    );
    let recorded = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.record",
        json!({ "studentId": student["student"]["id"], "date": "2024-08-01", "status": "Hadir" }),
    );
    let record_id = recorded["record"]["id"].as_str().expect("record id").to_string();

    let day = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.day",
        json!({ "date": "2024-08-01" }),
    );
    assert_eq!(day["records"][0]["id"].as_str(), Some(record_id.as_str()));

    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.update",
        json!({ "id": record_id, "status": "izin", "notes": "acara keluarga" }),
    );
    assert_eq!(edited["record"]["status"].as_str(), Some("Izin"));
    assert_eq!(edited["record"]["notes"].as_str(), Some("acara keluarga"));

    // Notes alone leave the status as it was.
    let notes_only = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.update",
        json!({ "id": record_id, "notes": null }),
    );
    assert_eq!(notes_only["record"]["status"].as_str(), Some("Izin"));
    assert!(notes_only["record"]["notes"].is_null());

    let empty_patch = request(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.update",
        json!({ "id": record_id }),
    );
    assert_eq!(error_code(&empty_patch), Some("bad_params"));

    let bad_status = request(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.update",
        json!({ "id": record_id, "status": "late" }),
    );
    assert_eq!(error_code(&bad_status), Some("bad_params"));

    // Re-recording the same day keeps the record id.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.record",
        json!({ "studentId": student["student"]["id"], "date": "2024-08-01", "status": "Sakit" }),
    );
    assert_eq!(again["record"]["id"].as_str(), Some(record_id.as_str()));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.delete",
        json!({ "id": record_id }),
    );
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.day",
        json!({ "date": "2024-08-01" }),
    );
    assert_eq!(after["records"].as_array().map(|a| a.len()), Some(0));

    let gone = request(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.delete",
        json!({ "id": record_id }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));
    let gone_update = request(
        &mut stdin,
        &mut reader,
        "12",
        "attendance.update",
        json!({ "id": record_id, "status": "Hadir" }),
    );
    assert_eq!(error_code(&gone_update), Some("not_found"));
}

#[test]
fn recent_students_lists_each_active_student_once() {
    let workspace = temp_dir("absensid-attendance-recent");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);

    let mut ids = Vec::new();
    for (i, (nis, name)) in [("500", "Andi Pratama"), ("501", "Maya Sari"), ("502", "Rina Wati")]
        .iter()
        .enumerate()
    {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "students.create",
            json!({ "studentId": nis, "name": name, "className": "9A", "gender": "L" }),
        );
        ids.push(created["student"]["id"].clone());
    }
    for (i, date) in ["2024-09-02", "2024-09-03"].iter().enumerate() {
        for (j, id) in ids.iter().enumerate() {
            let _ = request_ok(
                &mut stdin,
                &mut reader,
                &format!("r{}-{}", i, j),
                "attendance.record",
                json!({ "studentId": id, "date": date, "status": "Hadir" }),
            );
        }
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.delete",
        json!({ "id": ids[2] }),
    );

    let recent = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.recentStudents",
        json!({}),
    );
    let mut names: Vec<&str> = recent["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Andi Pratama", "Maya Sari"]);

    let capped = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.recentStudents",
        json!({ "limit": 1 }),
    );
    assert_eq!(capped["students"].as_array().map(|a| a.len()), Some(1));

    let bad = request(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.recentStudents",
        json!({ "days": "week" }),
    );
    assert_eq!(error_code(&bad), Some("bad_params"));
}
