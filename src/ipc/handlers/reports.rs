use crate::calc::CalcError;
use crate::db;
use crate::ipc::error::{calc_err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use rusqlite::Connection;
use serde_json::json;

fn db_err(e: anyhow::Error) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

fn stamp(conn: &Connection, mut model: serde_json::Value) -> Result<serde_json::Value, CalcError> {
    if setup::show_generated_at(conn).map_err(db_err)? {
        model["generatedAt"] = json!(chrono::Utc::now().to_rfc3339());
    }
    Ok(model)
}

fn student_report(
    conn: &Connection,
    student_id: &str,
    period_id: Option<&str>,
) -> Result<serde_json::Value, CalcError> {
    let Some(student) = db::find_student(conn, student_id).map_err(db_err)? else {
        return Err(CalcError::new("not_found", "student not found"));
    };
    let opts = setup::report_options(conn).map_err(db_err)?;
    let snap = db::load_grade_snapshot(conn, &student.grade).map_err(db_err)?;
    let report = reports::build_student_report(&snap, student_id, period_id, &opts)?;
    stamp(conn, json!(report))
}

fn batch_report(
    conn: &Connection,
    grade: &str,
    stream: Option<&str>,
    period_id: Option<&str>,
) -> Result<serde_json::Value, CalcError> {
    let opts = setup::report_options(conn).map_err(db_err)?;
    let snap = db::load_grade_snapshot(conn, grade).map_err(db_err)?;
    if snap.students.is_empty() {
        return Err(CalcError::new("not_found", "no students in grade")
            .with_details(json!({ "grade": grade })));
    }
    if let Some(s) = stream {
        if !snap.students.iter().any(|st| st.stream == s) {
            return Err(CalcError::new("not_found", "no students in stream")
                .with_details(json!({ "grade": grade, "stream": s })));
        }
    }
    let report = reports::build_batch_report(&snap, stream, period_id, &opts)?;
    stamp(conn, json!(report))
}

fn handle_reports_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match optional_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match student_report(conn, &student_id, period_id.as_deref()) {
        Ok(model) => ok(&req.id, model),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_reports_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade = match required_str(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let stream = match optional_str(req, "stream") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match optional_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match batch_report(conn, &grade, stream.as_deref(), period_id.as_deref()) {
        Ok(model) => ok(&req.id, model),
        Err(e) => {
            if e.code != "not_found" {
                tracing::error!(code = %e.code, message = %e.message, "batch report failed");
            }
            calc_err(&req.id, e)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.student" => Some(handle_reports_student(state, req)),
        "reports.batch" => Some(handle_reports_batch(state, req)),
        _ => None,
    }
}
