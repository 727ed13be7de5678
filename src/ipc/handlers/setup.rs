use crate::calc::{CalcSettings, OutOfRangePolicy, TieBreak};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::reports::ReportOptions;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Calc,
    Reports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "calc" => Some(Self::Calc),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Calc => "setup.calc",
            Self::Reports => "setup.reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Calc => json!({
            "tieBreak": TieBreak::default().as_str(),
            "outOfRange": OutOfRangePolicy::default().as_str()
        }),
        SetupSection::Reports => json!({
            "showGeneratedAt": true,
            "includeUnscored": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Calc => match k.as_str() {
                "tieBreak" => {
                    let s = parse_string_max(v, k, 16)?;
                    let Some(tie) = TieBreak::parse(&s) else {
                        return Err("tieBreak must be one of: studentId, inputOrder".into());
                    };
                    obj.insert(k.clone(), Value::String(tie.as_str().to_string()));
                }
                "outOfRange" => {
                    let s = parse_string_max(v, k, 16)?;
                    let Some(policy) = OutOfRangePolicy::parse(&s) else {
                        return Err("outOfRange must be one of: exclude, include, clamp".into());
                    };
                    obj.insert(k.clone(), Value::String(policy.as_str().to_string()));
                }
                _ => return Err(format!("unknown calc field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "showGeneratedAt" | "includeUnscored" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values fall back to defaults rather than block reports.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(key = section.key(), error = %e, "ignoring saved settings");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

fn calc_settings_from(section: &Value) -> CalcSettings {
    CalcSettings {
        tie_break: section
            .get("tieBreak")
            .and_then(|v| v.as_str())
            .and_then(TieBreak::parse)
            .unwrap_or_default(),
        out_of_range: section
            .get("outOfRange")
            .and_then(|v| v.as_str())
            .and_then(OutOfRangePolicy::parse)
            .unwrap_or_default(),
    }
}

/// Settings in effect for engine calls: saved workspace settings, or
/// defaults when no workspace is open.
pub fn calc_settings(state: &AppState) -> anyhow::Result<CalcSettings> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(CalcSettings::default());
    };
    Ok(calc_settings_from(&load_section(conn, SetupSection::Calc)?))
}

pub fn report_options(conn: &rusqlite::Connection) -> anyhow::Result<ReportOptions> {
    let calc = calc_settings_from(&load_section(conn, SetupSection::Calc)?);
    let reports = load_section(conn, SetupSection::Reports)?;
    Ok(ReportOptions {
        calc,
        include_unscored: reports
            .get("includeUnscored")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
    })
}

pub fn show_generated_at(conn: &rusqlite::Connection) -> anyhow::Result<bool> {
    Ok(load_section(conn, SetupSection::Reports)?
        .get("showGeneratedAt")
        .and_then(|v| v.as_bool())
        .unwrap_or(true))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let calc = match load_section(conn, SetupSection::Calc) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let reports = match load_section(conn, SetupSection::Reports) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "calc": calc, "reports": reports }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(key = section.key(), "settings updated");
    ok(&req.id, json!({ "section": section_raw, "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calc_patch_canonicalises_values() {
        let mut current = default_section(SetupSection::Calc);
        let patch = json!({ "tieBreak": "input_order", "outOfRange": "CLAMP" });
        merge_section_patch(
            SetupSection::Calc,
            &mut current,
            patch.as_object().expect("object"),
        )
        .expect("merge");
        assert_eq!(current["tieBreak"], "inputOrder");
        assert_eq!(current["outOfRange"], "clamp");
        let settings = calc_settings_from(&current);
        assert_eq!(settings.tie_break, TieBreak::InputOrder);
        assert_eq!(settings.out_of_range, OutOfRangePolicy::Clamp);
    }

    #[test]
    fn unknown_fields_and_values_are_rejected() {
        let mut current = default_section(SetupSection::Calc);
        let bad_value = json!({ "outOfRange": "round" });
        assert!(merge_section_patch(
            SetupSection::Calc,
            &mut current,
            bad_value.as_object().expect("object")
        )
        .is_err());
        let mut reports = default_section(SetupSection::Reports);
        let bad_field = json!({ "fontScale": 3 });
        assert!(merge_section_patch(
            SetupSection::Reports,
            &mut reports,
            bad_field.as_object().expect("object")
        )
        .is_err());
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let settings = calc_settings_from(&default_section(SetupSection::Calc));
        assert_eq!(settings, CalcSettings::default());
    }
}
