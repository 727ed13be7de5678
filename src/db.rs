use crate::calc::{ScoreRecord, SubjectLevel};
use crate::reports::{GradeSnapshot, PeriodInfo, StudentInfo, SubjectInfo};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("reportcard.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            grade TEXT NOT NULL,
            stream TEXT NOT NULL DEFAULT '',
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    // Workspaces created before streams were tracked lack the column.
    ensure_students_stream(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_grade_stream ON students(grade, stream)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            level TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            score REAL NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(student_id, subject_id, period_id),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(period_id) REFERENCES periods(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_period ON scores(period_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_stream(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "stream")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE students ADD COLUMN stream TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn list_students(
    conn: &Connection,
    grade: Option<&str>,
    stream: Option<&str>,
) -> anyhow::Result<Vec<StudentInfo>> {
    let mut sql = String::from(
        "SELECT id, display_name, grade, stream, sort_order FROM students WHERE 1 = 1",
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(g) = grade {
        sql.push_str(" AND grade = ?");
        binds.push(Value::Text(g.to_string()));
    }
    if let Some(s) = stream {
        sql.push_str(" AND stream = ?");
        binds.push(Value::Text(s.to_string()));
    }
    sql.push_str(" ORDER BY grade, sort_order, display_name");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(StudentInfo {
                id: r.get(0)?,
                display_name: r.get(1)?,
                grade: r.get(2)?,
                stream: r.get(3)?,
                sort_order: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<StudentInfo>> {
    Ok(conn
        .query_row(
            "SELECT id, display_name, grade, stream, sort_order FROM students WHERE id = ?",
            [student_id],
            |r| {
                Ok(StudentInfo {
                    id: r.get(0)?,
                    display_name: r.get(1)?,
                    grade: r.get(2)?,
                    stream: r.get(3)?,
                    sort_order: r.get(4)?,
                })
            },
        )
        .optional()?)
}

/// Inserts a student; `sort_order` defaults to the end of the grade.
pub fn insert_student(
    conn: &Connection,
    id: &str,
    display_name: &str,
    grade: &str,
    stream: &str,
    sort_order: Option<i64>,
) -> anyhow::Result<i64> {
    let sort_order = match sort_order {
        Some(v) => v,
        None => conn.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE grade = ?",
            [grade],
            |r| r.get(0),
        )?,
    };
    conn.execute(
        "INSERT INTO students(id, display_name, grade, stream, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            id,
            display_name,
            grade,
            stream,
            sort_order,
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(sort_order)
}

pub fn delete_student(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    Ok(n > 0)
}

pub fn list_subjects(conn: &Connection) -> anyhow::Result<Vec<SubjectInfo>> {
    let mut stmt = conn.prepare("SELECT id, name, level FROM subjects ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| {
            let level: String = r.get(2)?;
            Ok(SubjectInfo {
                id: r.get(0)?,
                name: r.get(1)?,
                level: SubjectLevel::parse(&level),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `level` is stored as given so unbanded levels keep their own name.
pub fn insert_subject(conn: &Connection, id: &str, name: &str, level: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO subjects(id, name, level) VALUES(?, ?, ?)",
        (id, name, level),
    )?;
    Ok(())
}

pub fn list_periods(conn: &Connection) -> anyhow::Result<Vec<(PeriodInfo, i64)>> {
    let mut stmt = conn.prepare("SELECT id, name, sort_order FROM periods ORDER BY sort_order, name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                PeriodInfo {
                    id: r.get(0)?,
                    name: r.get(1)?,
                },
                r.get(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_period(
    conn: &Connection,
    id: &str,
    name: &str,
    sort_order: Option<i64>,
) -> anyhow::Result<i64> {
    let sort_order = match sort_order {
        Some(v) => v,
        None => conn.query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM periods",
            [],
            |r| r.get(0),
        )?,
    };
    conn.execute(
        "INSERT INTO periods(id, name, sort_order) VALUES(?, ?, ?)",
        (id, name, sort_order),
    )?;
    Ok(sort_order)
}

#[derive(Debug, Clone)]
pub struct ScoreWrite {
    pub student_id: String,
    pub subject_id: String,
    pub period_id: String,
    pub score: f64,
}

/// Writes every score or none. A later write for the same
/// `(student, subject, period)` replaces the earlier one.
pub fn upsert_scores(conn: &mut Connection, writes: &[ScoreWrite]) -> anyhow::Result<usize> {
    let tx = conn.transaction()?;
    let now = chrono::Utc::now().to_rfc3339();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO scores(student_id, subject_id, period_id, score, updated_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject_id, period_id)
             DO UPDATE SET score = excluded.score, updated_at = excluded.updated_at",
        )?;
        for w in writes {
            stmt.execute((
                &w.student_id,
                &w.subject_id,
                &w.period_id,
                w.score,
                &now,
            ))?;
        }
    }
    tx.commit()?;
    Ok(writes.len())
}

#[derive(Debug, Clone, Default)]
pub struct ScoreQuery<'a> {
    pub student_id: Option<&'a str>,
    pub grade: Option<&'a str>,
    pub period_id: Option<&'a str>,
}

pub fn list_scores(conn: &Connection, q: &ScoreQuery<'_>) -> anyhow::Result<Vec<ScoreRecord>> {
    let mut sql = String::from(
        "SELECT sc.student_id, sc.subject_id, sc.period_id, sc.score, sub.level
         FROM scores sc
         JOIN students st ON st.id = sc.student_id
         JOIN subjects sub ON sub.id = sc.subject_id
         JOIN periods p ON p.id = sc.period_id
         WHERE 1 = 1",
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(v) = q.student_id {
        sql.push_str(" AND sc.student_id = ?");
        binds.push(Value::Text(v.to_string()));
    }
    if let Some(v) = q.grade {
        sql.push_str(" AND st.grade = ?");
        binds.push(Value::Text(v.to_string()));
    }
    if let Some(v) = q.period_id {
        sql.push_str(" AND sc.period_id = ?");
        binds.push(Value::Text(v.to_string()));
    }
    sql.push_str(" ORDER BY st.sort_order, p.sort_order, sub.name");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), |r| {
            let level: String = r.get(4)?;
            Ok(ScoreRecord {
                student_id: r.get(0)?,
                subject_id: r.get(1)?,
                period_id: r.get(2)?,
                score: r.get(3)?,
                subject_level: SubjectLevel::parse(&level),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Everything needed to report on one grade, read in one pass.
pub fn load_grade_snapshot(conn: &Connection, grade: &str) -> anyhow::Result<GradeSnapshot> {
    let students = list_students(conn, Some(grade), None)?;
    let subjects = list_subjects(conn)?;
    let periods = list_periods(conn)?.into_iter().map(|(p, _)| p).collect();
    let records = list_scores(
        conn,
        &ScoreQuery {
            grade: Some(grade),
            ..ScoreQuery::default()
        },
    )?;
    Ok(GradeSnapshot {
        grade: grade.to_string(),
        students,
        subjects,
        periods,
        records,
    })
}

pub fn known_ids(conn: &Connection, table: &str) -> anyhow::Result<std::collections::HashSet<String>> {
    let sql = format!("SELECT id FROM {}", table);
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<std::collections::HashSet<_>, _>>()?;
    Ok(ids)
}
