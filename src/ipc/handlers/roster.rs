use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_i64, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade = match optional_str(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let stream = match optional_str(req, "stream") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::list_students(conn, grade.as_deref(), stream.as_deref()) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let display_name = match required_str(req, "displayName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade = match required_str(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let stream = match optional_str(req, "stream") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e,
    };
    let sort_order = match optional_i64(req, "sortOrder") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student_id = uuid::Uuid::new_v4().to_string();
    match db::insert_student(conn, &student_id, &display_name, &grade, &stream, sort_order) {
        Ok(sort_order) => ok(
            &req.id,
            json!({ "studentId": student_id, "sortOrder": sort_order }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::delete_student(conn, &student_id) {
        Ok(true) => ok(&req.id, json!({ "deleted": true })),
        Ok(false) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::list_subjects(conn) {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level = match required_str(req, "level") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };

    let subject_id = uuid::Uuid::new_v4().to_string();
    match db::insert_subject(conn, &subject_id, &name, &level) {
        Ok(()) => ok(
            &req.id,
            json!({
                "subjectId": subject_id,
                "level": crate::calc::SubjectLevel::parse(&level)
            }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_periods_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::list_periods(conn) {
        Ok(periods) => {
            let rows: Vec<serde_json::Value> = periods
                .into_iter()
                .map(|(p, sort_order)| {
                    json!({ "id": p.id, "name": p.name, "sortOrder": sort_order })
                })
                .collect();
            ok(&req.id, json!({ "periods": rows }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_periods_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sort_order = match optional_i64(req, "sortOrder") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let period_id = uuid::Uuid::new_v4().to_string();
    match db::insert_period(conn, &period_id, &name, sort_order) {
        Ok(sort_order) => ok(
            &req.id,
            json!({ "periodId": period_id, "sortOrder": sort_order }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "periods.list" => Some(handle_periods_list(state, req)),
        "periods.create" => Some(handle_periods_create(state, req)),
        _ => None,
    }
}
