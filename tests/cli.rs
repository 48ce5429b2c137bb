use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

fn valid_session_json() -> &'static str {
    r#"
{
  "version": 1,
  "settings": { "dpi": 20 },
  "children": [
    {
      "name": "하민",
      "theme": "blue",
      "entries": [
        { "activity": "학교", "days": "월,수,금", "start": "09:00", "end": "13:00", "color": "하늘" },
        { "activity": "피아노", "days": "화", "start": "15:00", "end": "14:00", "color": "분홍" },
        { "activity": "", "days": "", "start": "", "end": "", "color": "" }
      ]
    },
    {
      "name": "하율",
      "theme": "yellow",
      "entries": [
        { "activity": "유치원", "days": "월,화,수,목,금", "start": "09:30", "end": "14:00", "color": "노랑" }
      ]
    }
  ]
}
"#
}

fn gate_json() -> &'static str {
    r#"
{
  "version": 1,
  "profile": { "start_position": 100, "v1": 50, "s1": 70, "v2": 80, "s2": 40, "v3": 60, "vp_position": 15 },
  "gates": [
    { "id": 1, "open": "80", "close": "50" },
    { "id": 2, "open": "30", "close": "60" }
  ]
}
"#
}

#[test]
fn check_reports_children_and_row_errors() {
    let dir = tempdir().expect("tempdir");
    let session = dir.path().join("schedule.json");
    fs::write(&session, valid_session_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("timetable");
    cmd.arg("check")
        .arg("--session")
        .arg(&session)
        .assert()
        .success()
        .stdout(predicate::str::contains("Children: 2"))
        .stdout(predicate::str::contains("row 2 (피아노)"));
}

#[test]
fn malformed_json_fails_with_clear_error() {
    let dir = tempdir().expect("tempdir");
    let session = dir.path().join("schedule.json");
    fs::write(&session, "{ not-valid-json ").expect("write invalid json");

    let mut cmd = cargo_bin_cmd!("timetable");
    cmd.arg("check")
        .arg("--session")
        .arg(&session)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid JSON"));
}

#[test]
fn unsupported_version_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let session = dir.path().join("schedule.json");
    fs::write(&session, r#"{ "version": 9 }"#).expect("write json");

    let mut cmd = cargo_bin_cmd!("timetable");
    cmd.arg("expand")
        .arg("--session")
        .arg(&session)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported session version 9"));
}

#[test]
fn expand_prints_intervals_as_json() {
    let dir = tempdir().expect("tempdir");
    let session = dir.path().join("schedule.json");
    fs::write(&session, valid_session_json()).expect("write json");

    let output = cargo_bin_cmd!("timetable")
        .arg("expand")
        .arg("--session")
        .arg(&session)
        .arg("--child")
        .arg("하민")
        .output()
        .expect("run expand");
    assert!(output.status.success());

    let parsed = serde_json::from_slice::<serde_json::Value>(&output.stdout)
        .expect("expand output should be valid json");
    let intervals = parsed["intervals"].as_array().expect("intervals");
    assert_eq!(intervals.len(), 3);
    assert_eq!(intervals[0]["label"], "09:00~13:00");
    assert_eq!(intervals[0]["duration_hours"], 4.0);
    assert_eq!(parsed["errors"].as_array().map(Vec::len), Some(1));
}

#[test]
fn render_writes_named_png() {
    let dir = tempdir().expect("tempdir");
    let session = dir.path().join("schedule.json");
    fs::write(&session, valid_session_json()).expect("write json");
    let out_dir = dir.path().join("charts");

    let mut cmd = cargo_bin_cmd!("timetable");
    cmd.arg("render")
        .arg("--session")
        .arg(&session)
        .arg("--child")
        .arg("하민")
        .arg("--layout")
        .arg("weekly")
        .arg("--out-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("하민_주간일정.png"));

    let bytes = fs::read(out_dir.join("하민_주간일정.png")).expect("png written");
    assert!(bytes.starts_with(b"\x89PNG"));
}

#[test]
fn render_dual_layout_pairs_children() {
    let dir = tempdir().expect("tempdir");
    let session = dir.path().join("schedule.json");
    fs::write(&session, valid_session_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("timetable");
    cmd.arg("render")
        .arg("--session")
        .arg(&session)
        .arg("--layout")
        .arg("dual")
        .arg("--with")
        .arg("하율")
        .arg("--out-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("excluded 하민: row 2 (피아노)"));
    assert!(dir.path().join("하민_함께보기.png").exists());
}

#[test]
fn render_grid_without_grid_fails() {
    let dir = tempdir().expect("tempdir");
    let session = dir.path().join("schedule.json");
    fs::write(&session, valid_session_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("timetable");
    cmd.arg("render")
        .arg("--session")
        .arg(&session)
        .arg("--layout")
        .arg("grid")
        .arg("--out-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no timetable grid"));
}

#[test]
fn csv_export_then_import_keeps_rows() {
    let dir = tempdir().expect("tempdir");
    let session = dir.path().join("schedule.json");
    fs::write(&session, valid_session_json()).expect("write json");
    let csv_path = dir.path().join("rows.csv");

    cargo_bin_cmd!("timetable")
        .arg("export-csv")
        .arg("--session")
        .arg(&session)
        .arg("--child")
        .arg("하민")
        .arg("--output")
        .arg(&csv_path)
        .assert()
        .success();
    let text = fs::read_to_string(&csv_path).expect("csv written");
    assert!(text.starts_with("\u{feff}활동명,요일,시작시간,종료시간,배경색,글자색"));

    cargo_bin_cmd!("timetable")
        .arg("import-csv")
        .arg("--session")
        .arg(&session)
        .arg("--child")
        .arg("하율")
        .arg("--input")
        .arg(&csv_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 3 rows for 하율"));

    let saved = fs::read_to_string(&session).expect("session saved");
    let parsed = serde_json::from_str::<serde_json::Value>(&saved).expect("saved json");
    assert_eq!(parsed["children"][1]["entries"][0]["activity"], "학교");
    assert_eq!(parsed["children"][1]["entries"][1]["activity"], "피아노");
}

#[test]
fn gates_writes_csv_to_stdout() {
    let dir = tempdir().expect("tempdir");
    let gates = dir.path().join("gates.json");
    fs::write(&gates, gate_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("timetable");
    cmd.arg("gates")
        .arg("--input")
        .arg(&gates)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Gate,Open(s),Close(s)\n1,0.40,0.85\n"))
        .stdout(predicate::str::contains("\n2,").not());
}

#[test]
fn gates_fail_on_non_positive_speed() {
    let dir = tempdir().expect("tempdir");
    let gates = dir.path().join("gates.json");
    fs::write(&gates, gate_json().replace("\"v2\": 80", "\"v2\": 0")).expect("write json");

    let mut cmd = cargo_bin_cmd!("timetable");
    cmd.arg("gates")
        .arg("--input")
        .arg(&gates)
        .assert()
        .failure()
        .stderr(predicate::str::contains("speed"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = tempdir().expect("tempdir");
    let session = dir.path().join("schedule.json");

    cargo_bin_cmd!("timetable")
        .arg("init")
        .arg("--session")
        .arg(&session)
        .assert()
        .success();
    cargo_bin_cmd!("timetable")
        .arg("init")
        .arg("--session")
        .arg(&session)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    cargo_bin_cmd!("timetable")
        .arg("check")
        .arg("--session")
        .arg(&session)
        .assert()
        .success()
        .stdout(predicate::str::contains("첫째(하민)"));
}
