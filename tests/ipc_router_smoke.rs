use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_reportcardd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reportcardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(v: &serde_json::Value) -> Option<&str> {
    v.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("reportcard-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert!(health["result"]["workspacePath"].is_null());

    let before = request(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(error_code(&before), Some("no_workspace"));

    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    let _ = request(&mut stdin, &mut reader, "5", "students.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "6", "subjects.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "7", "periods.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "8", "scores.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "marks.band",
        json!({ "score": 50, "level": "upper_primary" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "calc.average",
        json!({ "records": [] }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "calc.rank",
        json!({ "entries": [] }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "calc.advice",
        json!({ "subjects": [], "average": 0 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "reports.batch",
        json!({ "grade": "7" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "reports.student",
        json!({ "studentId": "missing" }),
    );

    writeln!(stdin, "{{\"id\":\"15\",\"method\":\"nope\",\"params\":{{}}}}").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let unknown: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    writeln!(stdin, "this is not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(error_code(&bad), Some("bad_json"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
