use crate::calc::is_score_in_range;
use crate::db::{self, ScoreQuery, ScoreWrite};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_conn_mut, optional_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const MAX_BATCH: usize = 5000;

/// Parses and validates a score batch. Every problem is collected so the
/// caller can fix the whole batch at once.
fn parse_writes(
    raw: &[serde_json::Value],
) -> Result<Vec<ScoreWrite>, Vec<serde_json::Value>> {
    let mut writes = Vec::with_capacity(raw.len());
    let mut problems = Vec::new();
    for (i, row) in raw.iter().enumerate() {
        let field = |k: &str| {
            row.get(k)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let (Some(student_id), Some(subject_id), Some(period_id)) =
            (field("studentId"), field("subjectId"), field("periodId"))
        else {
            problems.push(json!({
                "index": i,
                "reason": "studentId, subjectId and periodId are required"
            }));
            continue;
        };
        let Some(score) = row.get("score").and_then(|v| v.as_f64()) else {
            problems.push(json!({ "index": i, "reason": "score must be a number" }));
            continue;
        };
        if !is_score_in_range(score) {
            problems.push(json!({
                "index": i,
                "reason": "score must be within 0..=100",
                "score": score
            }));
            continue;
        }
        writes.push(ScoreWrite {
            student_id,
            subject_id,
            period_id,
            score,
        });
    }
    if problems.is_empty() {
        Ok(writes)
    } else {
        Err(problems)
    }
}

fn unknown_refs(
    conn: &rusqlite::Connection,
    writes: &[ScoreWrite],
) -> anyhow::Result<Vec<serde_json::Value>> {
    let students = db::known_ids(conn, "students")?;
    let subjects = db::known_ids(conn, "subjects")?;
    let periods = db::known_ids(conn, "periods")?;
    let mut problems = Vec::new();
    for (i, w) in writes.iter().enumerate() {
        if !students.contains(&w.student_id) {
            problems.push(json!({ "index": i, "reason": "unknown studentId" }));
        } else if !subjects.contains(&w.subject_id) {
            problems.push(json!({ "index": i, "reason": "unknown subjectId" }));
        } else if !periods.contains(&w.period_id) {
            problems.push(json!({ "index": i, "reason": "unknown periodId" }));
        }
    }
    Ok(problems)
}

fn handle_scores_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("scores").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "scores must be an array", None);
    };
    if raw.len() > MAX_BATCH {
        return err(
            &req.id,
            "bad_params",
            format!("at most {} scores per request", MAX_BATCH),
            Some(json!({ "count": raw.len() })),
        );
    }
    let writes = match parse_writes(raw) {
        Ok(v) => v,
        Err(problems) => {
            tracing::warn!(rejected = problems.len(), "score batch rejected");
            return err(
                &req.id,
                "bad_params",
                "score batch rejected",
                Some(json!({ "problems": problems })),
            );
        }
    };

    let conn = match db_conn_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match unknown_refs(conn, &writes) {
        Ok(problems) if !problems.is_empty() => {
            tracing::warn!(rejected = problems.len(), "score batch references unknown ids");
            return err(
                &req.id,
                "bad_params",
                "score batch rejected",
                Some(json!({ "problems": problems })),
            );
        }
        Ok(_) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    match db::upsert_scores(conn, &writes) {
        Ok(n) => ok(&req.id, json!({ "written": n })),
        Err(e) => {
            tracing::error!(error = %e, "score upsert failed");
            err(&req.id, "db_update_failed", e.to_string(), None)
        }
    }
}

fn handle_scores_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match optional_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade = match optional_str(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match optional_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let q = ScoreQuery {
        student_id: student_id.as_deref(),
        grade: grade.as_deref(),
        period_id: period_id.as_deref(),
    };
    match db::list_scores(conn, &q) {
        Ok(records) => ok(&req.id, json!({ "scores": records })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.upsert" => Some(handle_scores_upsert(state, req)),
        "scores.list" => Some(handle_scores_list(state, req)),
        _ => None,
    }
}
