use crate::calc::round_off_1_decimal;
use serde::{Deserialize, Serialize};

pub const EXCELLENT_MIN: f64 = 80.0;
pub const GOOD_MIN: f64 = 60.0;
pub const WEAK_BELOW: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub subject: String,
    pub score: f64,
}

impl SubjectScore {
    pub fn new(subject: impl Into<String>, score: f64) -> Self {
        Self {
            subject: subject.into(),
            score,
        }
    }
}

/// Subjects split by score. Scores in [50, 60) land in none of the lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectPartition<'a> {
    pub excellent: Vec<&'a str>,
    pub good: Vec<&'a str>,
    pub weak: Vec<&'a str>,
}

pub fn partition_subjects(subjects: &[SubjectScore]) -> SubjectPartition<'_> {
    let mut out = SubjectPartition::default();
    for s in subjects {
        if s.score >= EXCELLENT_MIN {
            out.excellent.push(&s.subject);
        } else if s.score >= GOOD_MIN {
            out.good.push(&s.subject);
        } else if s.score < WEAK_BELOW {
            out.weak.push(&s.subject);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdviceMode {
    /// Report card / single-student report.
    #[default]
    Detailed,
    /// One line for the plain report list.
    Summary,
}

impl AdviceMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detailed" => Some(Self::Detailed),
            "summary" => Some(Self::Summary),
            _ => None,
        }
    }
}

fn join(names: &[&str]) -> String {
    names.join(", ")
}

/// Recommendation text for the report card. The overall bucket is chosen
/// from the same one-decimal average the text prints.
pub fn detailed_advice(subjects: &[SubjectScore], average: f64) -> String {
    let p = partition_subjects(subjects);
    let mut parts: Vec<String> = Vec::new();
    let average = round_off_1_decimal(average);

    if average >= 80.0 {
        parts.push(format!(
            "Outstanding performance with an overall average of {:.1}%.",
            average
        ));
        if !p.excellent.is_empty() {
            parts.push(format!("Excellent results in {}.", join(&p.excellent)));
        }
        parts.push("Keep up the consistent effort.".to_string());
    } else if average >= 65.0 {
        parts.push(format!("Good overall performance at {:.1}%.", average));
        if !p.excellent.is_empty() {
            parts.push(format!("Strong work in {}.", join(&p.excellent)));
        }
        if !p.weak.is_empty() {
            parts.push(format!("More attention is needed in {}.", join(&p.weak)));
        }
    } else if average >= 50.0 {
        parts.push(format!("Steady progress with an average of {:.1}%.", average));
        if !p.good.is_empty() {
            parts.push(format!("Build on the good results in {}.", join(&p.good)));
        }
        if !p.weak.is_empty() {
            parts.push(format!("Focus revision on {}.", join(&p.weak)));
        }
    } else {
        parts.push(format!(
            "Needs support to raise the overall average of {:.1}%.",
            average
        ));
        if p.good.is_empty() {
            parts.push("A structured support plan across all subjects is recommended.".to_string());
        } else {
            parts.push(format!(
                "Use {} as a foundation for improvement.",
                join(&p.good)
            ));
        }
    }

    parts.join(" ")
}

/// Short line for list views; only the weak-subject count matters.
pub fn summary_advice(subjects: &[SubjectScore], _average: f64) -> String {
    let p = partition_subjects(subjects);
    match p.weak.as_slice() {
        [] => "Keep up the good work.".to_string(),
        [one] => format!("Needs improvement in {}.", one),
        many => format!("Needs improvement in {} subjects.", many.len()),
    }
}

pub fn advice(mode: AdviceMode, subjects: &[SubjectScore], average: f64) -> String {
    match mode {
        AdviceMode::Detailed => detailed_advice(subjects, average),
        AdviceMode::Summary => summary_advice(subjects, average),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<SubjectScore> {
        vec![
            SubjectScore::new("Mathematics", 85.0),
            SubjectScore::new("English", 72.0),
            SubjectScore::new("Kiswahili", 55.0),
            SubjectScore::new("Science", 45.0),
            SubjectScore::new("Art", 80.0),
        ]
    }

    #[test]
    fn partition_thresholds() {
        let subjects = sample();
        let p = partition_subjects(&subjects);
        assert_eq!(p.excellent, vec!["Mathematics", "Art"]);
        assert_eq!(p.good, vec!["English"]);
        assert_eq!(p.weak, vec!["Science"]);
    }

    #[test]
    fn partition_edges() {
        let subjects = vec![
            SubjectScore::new("a", 79.99),
            SubjectScore::new("b", 60.0),
            SubjectScore::new("c", 59.9),
            SubjectScore::new("d", 50.0),
            SubjectScore::new("e", 49.9),
        ];
        let p = partition_subjects(&subjects);
        assert!(p.excellent.is_empty());
        assert_eq!(p.good, vec!["a", "b"]);
        assert_eq!(p.weak, vec!["e"]);
    }

    #[test]
    fn commendation_bucket_names_excellent_subjects() {
        let text = detailed_advice(&sample(), 82.0);
        assert_eq!(
            text,
            "Outstanding performance with an overall average of 82.0%. \
             Excellent results in Mathematics, Art. Keep up the consistent effort."
        );
    }

    #[test]
    fn good_overall_bucket_names_excellent_and_weak() {
        let text = detailed_advice(&sample(), 67.4);
        assert_eq!(
            text,
            "Good overall performance at 67.4%. Strong work in Mathematics, Art. \
             More attention is needed in Science."
        );
    }

    #[test]
    fn progress_bucket_names_good_and_weak() {
        let text = detailed_advice(&sample(), 64.9);
        assert_eq!(
            text,
            "Steady progress with an average of 64.9%. Build on the good results in English. \
             Focus revision on Science."
        );
    }

    #[test]
    fn support_bucket_uses_good_subjects_as_foundation() {
        let text = detailed_advice(&sample(), 42.0);
        assert_eq!(
            text,
            "Needs support to raise the overall average of 42.0%. \
             Use English as a foundation for improvement."
        );
        let none_good = vec![SubjectScore::new("Science", 30.0)];
        assert!(detailed_advice(&none_good, 30.0).ends_with("across all subjects is recommended."));
    }

    #[test]
    fn bucket_follows_printed_average() {
        let subjects = sample();
        assert!(detailed_advice(&subjects, 79.96)
            .starts_with("Outstanding performance with an overall average of 80.0%."));
        assert!(detailed_advice(&subjects, 79.94).starts_with("Good overall performance at 79.9%."));
        assert!(detailed_advice(&subjects, 49.96).starts_with("Steady progress with an average of 50.0%."));
    }

    #[test]
    fn same_input_same_text() {
        let subjects = sample();
        for avg in [0.0, 49.99, 50.0, 64.99, 65.0, 79.99, 80.0, 100.0] {
            assert_eq!(detailed_advice(&subjects, avg), detailed_advice(&subjects, avg));
            assert_eq!(summary_advice(&subjects, avg), summary_advice(&subjects, avg));
        }
    }

    #[test]
    fn summary_counts_weak_subjects() {
        let none = vec![SubjectScore::new("Mathematics", 70.0)];
        assert_eq!(summary_advice(&none, 70.0), "Keep up the good work.");
        let one = vec![
            SubjectScore::new("Mathematics", 70.0),
            SubjectScore::new("Science", 20.0),
        ];
        assert_eq!(summary_advice(&one, 45.0), "Needs improvement in Science.");
        let many = vec![
            SubjectScore::new("Mathematics", 10.0),
            SubjectScore::new("Science", 20.0),
        ];
        assert_eq!(summary_advice(&many, 15.0), "Needs improvement in 2 subjects.");
    }

    #[test]
    fn modes_are_distinct() {
        let subjects = sample();
        assert_ne!(
            advice(AdviceMode::Detailed, &subjects, 70.0),
            advice(AdviceMode::Summary, &subjects, 70.0)
        );
    }
}
