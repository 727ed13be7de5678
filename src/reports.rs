use crate::advice::{self, SubjectScore};
use crate::average::{self, PeriodAverage, StudentAverage};
use crate::bands::{self, Band};
use crate::calc::{round_off_1_decimal, CalcError, CalcSettings, ScoreRecord, SubjectLevel};
use crate::ranking::{self, CrossStreamRanking, PopulationEntry};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub id: String,
    pub display_name: String,
    pub grade: String,
    pub stream: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectInfo {
    pub id: String,
    pub name: String,
    pub level: SubjectLevel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodInfo {
    pub id: String,
    pub name: String,
}

/// Everything a report needs for one grade, already fetched.
/// Students are in roster order; periods in sort order.
#[derive(Debug, Clone, Default)]
pub struct GradeSnapshot {
    pub grade: String,
    pub students: Vec<StudentInfo>,
    pub subjects: Vec<SubjectInfo>,
    pub periods: Vec<PeriodInfo>,
    /// All periods; scoping happens per report.
    pub records: Vec<ScoreRecord>,
}

impl GradeSnapshot {
    fn subject(&self, id: &str) -> Option<&SubjectInfo> {
        self.subjects.iter().find(|s| s.id == id)
    }

    fn subject_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.subject(id).map(|s| s.name.as_str()).unwrap_or(id)
    }

    fn scoped<'a>(&'a self, period_id: Option<&'a str>) -> impl Iterator<Item = &'a ScoreRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| period_id.map(|p| r.period_id == p).unwrap_or(true))
    }

    fn scoped_for(&self, student_id: &str, period_id: Option<&str>) -> Vec<ScoreRecord> {
        self.scoped(period_id)
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLine {
    pub subject_id: String,
    pub subject_name: String,
    pub level: SubjectLevel,
    /// Display value, one decimal.
    pub score: f64,
    /// Unrounded mean; advice thresholds apply to this.
    #[serde(skip)]
    pub mean: f64,
    pub record_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodLine {
    pub period_id: String,
    pub period_name: String,
    pub average: f64,
    pub subject_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub grade_rank: usize,
    pub grade_size: usize,
    pub stream_rank: usize,
    pub stream_size: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student: StudentInfo,
    pub period_id: Option<String>,
    pub subjects: Vec<SubjectLine>,
    pub periods: Vec<PeriodLine>,
    pub overall: StudentAverage,
    /// `None` when the student has no scores in scope and
    /// `reports.includeUnscored` is off.
    pub position: Option<Position>,
    pub advice: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRow {
    pub student_id: String,
    pub display_name: String,
    pub stream: String,
    pub average: f64,
    pub subject_count: usize,
    pub rank: Option<usize>,
    pub grade_rank: Option<usize>,
    pub stream_rank: Option<usize>,
    pub advice: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub subject_id: String,
    pub subject_name: String,
    pub level: SubjectLevel,
    pub average: f64,
    pub record_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub grade: String,
    pub stream: Option<String>,
    pub period_id: Option<String>,
    pub population_size: usize,
    pub population_average: Option<f64>,
    pub students: Vec<BatchRow>,
    pub subjects: Vec<SubjectSummary>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub calc: CalcSettings,
    pub include_unscored: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            calc: CalcSettings::default(),
            include_unscored: true,
        }
    }
}

/// Per-subject means over `records`, labelled and banded.
fn subject_lines(
    snap: &GradeSnapshot,
    records: &[ScoreRecord],
    settings: &CalcSettings,
) -> Vec<SubjectLine> {
    let level_by_subject: HashMap<&str, SubjectLevel> = records
        .iter()
        .map(|r| (r.subject_id.as_str(), r.subject_level))
        .collect();
    average::subject_averages(records, settings.out_of_range)
        .into_iter()
        .map(|sa| {
            let level = snap
                .subject(&sa.subject_id)
                .map(|s| s.level)
                .or_else(|| level_by_subject.get(sa.subject_id.as_str()).copied())
                .unwrap_or(SubjectLevel::Unclassified);
            SubjectLine {
                subject_name: snap.subject_name(&sa.subject_id).to_string(),
                band: bands::classify(sa.average, level),
                score: round_off_1_decimal(sa.average),
                mean: sa.average,
                record_count: sa.record_count,
                level,
                subject_id: sa.subject_id,
            }
        })
        .collect()
}

fn advice_input(lines: &[SubjectLine]) -> Vec<SubjectScore> {
    lines
        .iter()
        .map(|l| SubjectScore::new(l.subject_name.clone(), l.mean))
        .collect()
}

/// Grade-wide population for the scope, one entry per rostered student
/// (unscored students only when `include_unscored`). Student and batch
/// reports both rank from this.
fn population(
    snap: &GradeSnapshot,
    period_id: Option<&str>,
    opts: &ReportOptions,
) -> (Vec<PopulationEntry>, HashMap<String, StudentAverage>) {
    let scoped: Vec<ScoreRecord> = snap.scoped(period_id).cloned().collect();
    let mut by_student: HashMap<String, StudentAverage> =
        average::averages_by_student(&scoped, opts.calc.out_of_range)
            .into_iter()
            .map(|a| (a.student_id.clone(), a))
            .collect();

    let mut entries = Vec::with_capacity(snap.students.len());
    for s in &snap.students {
        let avg = by_student
            .entry(s.id.clone())
            .or_insert_with(|| StudentAverage {
                student_id: s.id.clone(),
                average: 0.0,
                subject_count: 0,
            });
        if avg.subject_count == 0 && !opts.include_unscored {
            continue;
        }
        let mut entry = PopulationEntry::new(s.id.clone(), avg.average).in_stream(s.stream.clone());
        if avg.subject_count == 0 {
            entry = entry.without_scores();
        }
        entries.push(entry);
    }
    (entries, by_student)
}

fn cross_stream(
    snap: &GradeSnapshot,
    period_id: Option<&str>,
    opts: &ReportOptions,
) -> (CrossStreamRanking, HashMap<String, StudentAverage>) {
    let (entries, by_student) = population(snap, period_id, opts);
    (
        ranking::rank_cross_stream(&entries, opts.calc.tie_break),
        by_student,
    )
}

/// Single-student report: scoped subject lines, period-over-period
/// averages, overall average, grade/stream position and detailed advice.
pub fn build_student_report(
    snap: &GradeSnapshot,
    student_id: &str,
    period_id: Option<&str>,
    opts: &ReportOptions,
) -> Result<StudentReport, CalcError> {
    let Some(student) = snap.students.iter().find(|s| s.id == student_id) else {
        return Err(CalcError::new("not_found", "student not found"));
    };
    if let Some(pid) = period_id {
        if !snap.periods.iter().any(|p| p.id == pid) {
            return Err(CalcError::new("not_found", "period not found"));
        }
    }
    let policy = opts.calc.out_of_range;

    let scoped = snap.scoped_for(student_id, period_id);
    let subjects = subject_lines(snap, &scoped, &opts.calc);
    let overall = average::student_average(student_id, &scoped, policy);

    let history = snap.scoped_for(student_id, None);
    let order: Vec<&str> = snap.periods.iter().map(|p| p.id.as_str()).collect();
    let periods = average::period_averages(&history, &order, policy)
        .into_iter()
        .map(|pa: PeriodAverage| PeriodLine {
            period_name: snap
                .periods
                .iter()
                .find(|p| p.id == pa.period_id)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            period_id: pa.period_id,
            average: round_off_1_decimal(pa.average),
            subject_count: pa.subject_count,
        })
        .collect();

    let (cross, _) = cross_stream(snap, period_id, opts);
    let position = cross.find(student_id).map(|row| Position {
        grade_rank: row.grade_rank,
        grade_size: cross.grade_size(),
        stream_rank: row.stream_rank,
        stream_size: cross.stream_size(&row.stream),
    });

    let advice = advice::detailed_advice(&advice_input(&subjects), overall.average);

    Ok(StudentReport {
        student: student.clone(),
        period_id: period_id.map(str::to_string),
        subjects,
        periods,
        overall: StudentAverage {
            average: round_off_1_decimal(overall.average),
            ..overall
        },
        position,
        advice,
    })
}

/// Class (whole grade) or stream batch report. Ranks come from one
/// cross-stream ranking of the grade, so `gradeRank` and `streamRank`
/// agree across every view.
pub fn build_batch_report(
    snap: &GradeSnapshot,
    stream: Option<&str>,
    period_id: Option<&str>,
    opts: &ReportOptions,
) -> Result<BatchReport, CalcError> {
    if let Some(pid) = period_id {
        if !snap.periods.iter().any(|p| p.id == pid) {
            return Err(CalcError::new("not_found", "period not found"));
        }
    }
    let (cross, by_student) = cross_stream(snap, period_id, opts);

    let members: Vec<&StudentInfo> = snap
        .students
        .iter()
        .filter(|s| stream.map(|st| s.stream == st).unwrap_or(true))
        .collect();

    let mut rows: Vec<BatchRow> = Vec::with_capacity(members.len());
    for s in &members {
        let scoped = snap.scoped_for(&s.id, period_id);
        let lines = subject_lines(snap, &scoped, &opts.calc);
        let (average, subject_count) = by_student
            .get(&s.id)
            .map(|a| (a.average, a.subject_count))
            .unwrap_or((0.0, 0));
        let ranked = cross.find(&s.id);
        let grade_rank = ranked.map(|r| r.grade_rank);
        let stream_rank = ranked.map(|r| r.stream_rank);
        rows.push(BatchRow {
            student_id: s.id.clone(),
            display_name: s.display_name.clone(),
            stream: s.stream.clone(),
            average: round_off_1_decimal(average),
            subject_count,
            rank: if stream.is_some() { stream_rank } else { grade_rank },
            grade_rank,
            stream_rank,
            advice: advice::summary_advice(&advice_input(&lines), average),
        });
    }
    rows.sort_by(|a, b| match (a.rank, b.rank) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let scored: Vec<f64> = members
        .iter()
        .filter_map(|s| by_student.get(&s.id))
        .filter(|a| a.subject_count > 0)
        .map(|a| a.average)
        .collect();
    let population_average = if scored.is_empty() {
        None
    } else {
        Some(round_off_1_decimal(
            scored.iter().sum::<f64>() / (scored.len() as f64),
        ))
    };

    let member_records: Vec<ScoreRecord> = snap
        .scoped(period_id)
        .filter(|r| members.iter().any(|m| m.id == r.student_id))
        .cloned()
        .collect();
    let subjects = subject_lines(snap, &member_records, &opts.calc)
        .into_iter()
        .map(|l| SubjectSummary {
            subject_id: l.subject_id,
            subject_name: l.subject_name,
            level: l.level,
            average: l.score,
            record_count: l.record_count,
            band: l.band,
        })
        .collect();

    Ok(BatchReport {
        grade: snap.grade.clone(),
        stream: stream.map(str::to_string),
        period_id: period_id.map(str::to_string),
        population_size: members.len(),
        population_average,
        students: rows,
        subjects,
    })
}
