//! Direct access to the engine over caller-supplied data. Nothing here
//! touches the workspace except to read calc settings when one is open.

use crate::advice::{self, AdviceMode, SubjectScore};
use crate::average;
use crate::bands;
use crate::calc::{CalcSettings, OutOfRangePolicy, ScoreRecord, SubjectLevel, TieBreak};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::types::{AppState, Request};
use crate::ranking::{self, PopulationEntry};
use serde::de::DeserializeOwned;
use serde_json::json;

fn parse_list<T: DeserializeOwned>(req: &Request, key: &str) -> Result<Vec<T>, serde_json::Value> {
    let Some(raw) = req.params.get(key) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    serde_json::from_value(raw.clone()).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("{} is malformed: {}", key, e),
            None,
        )
    })
}

fn parse_level(req: &Request) -> Result<SubjectLevel, serde_json::Value> {
    req.params
        .get("level")
        .and_then(|v| v.as_str())
        .map(SubjectLevel::parse)
        .ok_or_else(|| err(&req.id, "bad_params", "missing level", None))
}

/// Workspace settings, with per-request `tieBreak` / `outOfRange` overrides.
fn effective_settings(state: &AppState, req: &Request) -> Result<CalcSettings, serde_json::Value> {
    let mut settings = setup::calc_settings(state)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    if let Some(v) = req.params.get("tieBreak").and_then(|v| v.as_str()) {
        settings.tie_break = TieBreak::parse(v).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "tieBreak must be one of: studentId, inputOrder",
                None,
            )
        })?;
    }
    if let Some(v) = req.params.get("outOfRange").and_then(|v| v.as_str()) {
        settings.out_of_range = OutOfRangePolicy::parse(v).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "outOfRange must be one of: exclude, include, clamp",
                None,
            )
        })?;
    }
    Ok(settings)
}

fn handle_marks_band(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(score) = req.params.get("score").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "score must be a number", None);
    };
    let level = match parse_level(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let band = bands::classify(score, level);
    if band.is_some_and(|b| b.is_invalid()) {
        tracing::debug!(score, "score outside band tables");
    }
    ok(
        &req.id,
        json!({
            "level": level,
            "band": band,
            "invalid": band.is_some_and(|b| b.is_invalid())
        }),
    )
}

fn handle_calc_band_table(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let level = match parse_level(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows: Vec<serde_json::Value> = bands::band_table(level)
        .unwrap_or(&[])
        .iter()
        .map(|r| {
            let band = bands::classify(f64::from(r.min), level);
            json!({
                "min": r.min,
                "max": r.max,
                "label": r.label,
                "points": r.points,
                "severity": band.map(|b| b.severity)
            })
        })
        .collect();
    ok(&req.id, json!({ "level": level, "rows": rows }))
}

fn handle_calc_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match effective_settings(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records: Vec<ScoreRecord> = match parse_list(req, "records") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = req
        .params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| records.first().map(|r| r.student_id.clone()))
        .unwrap_or_default();

    let avg = average::student_average(&student_id, &records, settings.out_of_range);
    let subjects = average::subject_averages(&records, settings.out_of_range);
    ok(
        &req.id,
        json!({
            "average": avg,
            "subjects": subjects,
            "outOfRange": settings.out_of_range
        }),
    )
}

fn handle_calc_rank(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match effective_settings(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entries: Vec<PopulationEntry> = match parse_list(req, "entries") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mode = req
        .params
        .get("mode")
        .and_then(|v| v.as_str())
        .unwrap_or("class");
    let tie = settings.tie_break;

    let mut result = match mode {
        "class" => json!({ "ranked": ranking::rank_population(&entries, tie) }),
        "stream" => {
            let Some(stream) = req.params.get("stream").and_then(|v| v.as_str()) else {
                return err(&req.id, "bad_params", "stream mode requires stream", None);
            };
            json!({ "stream": stream, "ranked": ranking::rank_stream(&entries, stream, tie) })
        }
        "crossStream" => json!(ranking::rank_cross_stream(&entries, tie)),
        other => {
            return err(
                &req.id,
                "bad_params",
                "mode must be one of: class, stream, crossStream",
                Some(json!({ "mode": other })),
            )
        }
    };
    result["tieBreak"] = json!(tie);
    ok(&req.id, result)
}

fn handle_calc_advice(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let subjects: Vec<SubjectScore> = match parse_list(req, "subjects") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(average) = req.params.get("average").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "average must be a number", None);
    };
    let mode = match req.params.get("mode").and_then(|v| v.as_str()) {
        None => AdviceMode::default(),
        Some(s) => match AdviceMode::parse(s) {
            Some(m) => m,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "mode must be one of: detailed, summary",
                    None,
                )
            }
        },
    };
    ok(
        &req.id,
        json!({
            "mode": mode,
            "advice": advice::advice(mode, &subjects, average)
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.band" => Some(handle_marks_band(state, req)),
        "calc.bandTable" => Some(handle_calc_band_table(state, req)),
        "calc.average" => Some(handle_calc_average(state, req)),
        "calc.rank" => Some(handle_calc_rank(state, req)),
        "calc.advice" => Some(handle_calc_advice(state, req)),
        _ => None,
    }
}
