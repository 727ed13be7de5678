use serde::{Deserialize, Serialize};

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

/// One-decimal display rounding used on every average leaving the daemon:
/// `Int(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

pub fn is_score_in_range(score: f64) -> bool {
    score.is_finite() && (SCORE_MIN..=SCORE_MAX).contains(&score)
}

/// Curriculum level of a subject. Only the two banded levels get a band;
/// everything else (pre-primary, secondary, ...) passes through unclassified.
/// Deserializes through [`SubjectLevel::parse`], same as stored levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum SubjectLevel {
    UpperPrimary,
    JuniorSecondary,
    Unclassified,
}

impl From<String> for SubjectLevel {
    fn from(s: String) -> Self {
        SubjectLevel::parse(&s)
    }
}

impl SubjectLevel {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "upper_primary" => SubjectLevel::UpperPrimary,
            "junior_secondary" => SubjectLevel::JuniorSecondary,
            _ => SubjectLevel::Unclassified,
        }
    }
}

/// One student's result in one subject for one assessment period.
/// Records reach the engine already deduplicated by
/// `(student_id, subject_id, period_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub student_id: String,
    pub subject_id: String,
    pub period_id: String,
    pub score: f64,
    #[serde(default = "unclassified")]
    pub subject_level: SubjectLevel,
}

fn unclassified() -> SubjectLevel {
    SubjectLevel::Unclassified
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutOfRangePolicy {
    /// Skip the record; it does not count toward `subject_count`.
    #[default]
    Exclude,
    /// Use the raw value as-is.
    Include,
    /// Clamp into [0, 100].
    Clamp,
}

impl OutOfRangePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclude" => Some(Self::Exclude),
            "include" => Some(Self::Include),
            "clamp" => Some(Self::Clamp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exclude => "exclude",
            Self::Include => "include",
            Self::Clamp => "clamp",
        }
    }

    /// Value that contributes to a mean, or `None` when the record is skipped.
    /// Non-finite values are skipped under every policy.
    pub fn admit(self, score: f64) -> Option<f64> {
        if !score.is_finite() {
            return None;
        }
        if is_score_in_range(score) {
            return Some(score);
        }
        match self {
            Self::Exclude => None,
            Self::Include => Some(score),
            Self::Clamp => Some(score.clamp(SCORE_MIN, SCORE_MAX)),
        }
    }
}

/// Ordering applied between students whose averages are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TieBreak {
    /// Student id ascending.
    #[default]
    StudentId,
    /// Stable over the order the population was supplied in.
    InputOrder,
}

impl TieBreak {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "studentid" | "student_id" => Some(Self::StudentId),
            "inputorder" | "input_order" => Some(Self::InputOrder),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StudentId => "studentId",
            Self::InputOrder => "inputOrder",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcSettings {
    pub tie_break: TieBreak,
    pub out_of_range: OutOfRangePolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
