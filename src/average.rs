use crate::calc::{OutOfRangePolicy, ScoreRecord};
use serde::Serialize;
use std::collections::HashMap;

/// Mean over every record visible to the query. `average` is 0 when
/// nothing contributed; check `subject_count` to tell that apart from a
/// genuine zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAverage {
    pub student_id: String,
    pub average: f64,
    pub subject_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject_id: String,
    pub average: f64,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodAverage {
    pub period_id: String,
    pub average: f64,
    pub subject_count: usize,
}

/// Unweighted mean of the admitted values, with the number admitted.
pub fn mean<I>(scores: I, policy: OutOfRangePolicy) -> (f64, usize)
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0_f64;
    let mut count = 0_usize;
    for v in scores.into_iter().filter_map(|s| policy.admit(s)) {
        sum += v;
        count += 1;
    }
    let avg = if count > 0 { sum / (count as f64) } else { 0.0 };
    (avg, count)
}

/// Average Calculator. The caller scopes `records` (one period, all
/// periods, ...); no filtering happens here beyond the out-of-range policy.
pub fn student_average(
    student_id: &str,
    records: &[ScoreRecord],
    policy: OutOfRangePolicy,
) -> StudentAverage {
    let (average, subject_count) = mean(records.iter().map(|r| r.score), policy);
    StudentAverage {
        student_id: student_id.to_string(),
        average,
        subject_count,
    }
}

/// Groups `records` by key in first-seen order.
fn group_by<'a, F>(records: &'a [ScoreRecord], key: F) -> Vec<(&'a str, Vec<f64>)>
where
    F: Fn(&'a ScoreRecord) -> &'a str,
{
    let mut slot_by_key: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<f64>)> = Vec::new();
    for r in records {
        let k = key(r);
        let slot = *slot_by_key.entry(k).or_insert_with(|| {
            groups.push((k, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(r.score);
    }
    groups
}

/// One average per student present in `records`, first-seen order.
pub fn averages_by_student(records: &[ScoreRecord], policy: OutOfRangePolicy) -> Vec<StudentAverage> {
    group_by(records, |r| r.student_id.as_str())
        .into_iter()
        .map(|(id, scores)| {
            let (average, subject_count) = mean(scores, policy);
            StudentAverage {
                student_id: id.to_string(),
                average,
                subject_count,
            }
        })
        .collect()
}

/// Population mean per subject for the subject-performance summary.
/// Subjects whose records were all rejected by the policy are dropped.
pub fn subject_averages(records: &[ScoreRecord], policy: OutOfRangePolicy) -> Vec<SubjectAverage> {
    group_by(records, |r| r.subject_id.as_str())
        .into_iter()
        .filter_map(|(id, scores)| {
            let (average, record_count) = mean(scores, policy);
            (record_count > 0).then(|| SubjectAverage {
                subject_id: id.to_string(),
                average,
                record_count,
            })
        })
        .collect()
}

/// Per-period averages in `period_order`; periods with no records are skipped.
pub fn period_averages(
    records: &[ScoreRecord],
    period_order: &[&str],
    policy: OutOfRangePolicy,
) -> Vec<PeriodAverage> {
    let groups: HashMap<&str, Vec<f64>> = group_by(records, |r| r.period_id.as_str())
        .into_iter()
        .collect();
    period_order
        .iter()
        .filter_map(|pid| {
            let scores = groups.get(pid)?;
            let (average, subject_count) = mean(scores.iter().copied(), policy);
            Some(PeriodAverage {
                period_id: pid.to_string(),
                average,
                subject_count,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::SubjectLevel;

    fn rec(student: &str, subject: &str, period: &str, score: f64) -> ScoreRecord {
        ScoreRecord {
            student_id: student.to_string(),
            subject_id: subject.to_string(),
            period_id: period.to_string(),
            score,
            subject_level: SubjectLevel::JuniorSecondary,
        }
    }

    #[test]
    fn empty_records_average_zero_with_zero_count() {
        let avg = student_average("s1", &[], OutOfRangePolicy::Exclude);
        assert_eq!(avg.average, 0.0);
        assert_eq!(avg.subject_count, 0);
    }

    #[test]
    fn all_zero_scores_are_distinguishable_from_no_records() {
        let records = vec![rec("s1", "math", "t1", 0.0), rec("s1", "eng", "t1", 0.0)];
        let avg = student_average("s1", &records, OutOfRangePolicy::Exclude);
        assert_eq!(avg.average, 0.0);
        assert_eq!(avg.subject_count, 2);
    }

    #[test]
    fn mean_of_80_and_60_is_70() {
        let records = vec![rec("s1", "math", "t1", 80.0), rec("s1", "eng", "t1", 60.0)];
        let avg = student_average("s1", &records, OutOfRangePolicy::Exclude);
        assert_eq!(avg.average, 70.0);
        assert_eq!(avg.subject_count, 2);
    }

    #[test]
    fn average_is_order_invariant() {
        let mut records = vec![
            rec("s1", "math", "t1", 81.0),
            rec("s1", "eng", "t1", 47.5),
            rec("s1", "sci", "t1", 66.0),
            rec("s1", "kis", "t1", 12.25),
        ];
        let forward = student_average("s1", &records, OutOfRangePolicy::Exclude);
        records.reverse();
        records.swap(0, 2);
        let shuffled = student_average("s1", &records, OutOfRangePolicy::Exclude);
        assert!((forward.average - shuffled.average).abs() < 1e-9);
        assert_eq!(forward.subject_count, shuffled.subject_count);
    }

    #[test]
    fn no_rounding_applied() {
        let records = vec![
            rec("s1", "a", "t1", 70.0),
            rec("s1", "b", "t1", 70.0),
            rec("s1", "c", "t1", 71.0),
        ];
        let avg = student_average("s1", &records, OutOfRangePolicy::Exclude);
        assert!((avg.average - 211.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_score_handling_follows_policy() {
        let records = vec![rec("s1", "math", "t1", 150.0), rec("s1", "eng", "t1", 50.0)];

        let excluded = student_average("s1", &records, OutOfRangePolicy::Exclude);
        assert_eq!(excluded.average, 50.0);
        assert_eq!(excluded.subject_count, 1);

        let included = student_average("s1", &records, OutOfRangePolicy::Include);
        assert_eq!(included.average, 100.0);
        assert_eq!(included.subject_count, 2);

        let clamped = student_average("s1", &records, OutOfRangePolicy::Clamp);
        assert_eq!(clamped.average, 75.0);
        assert_eq!(clamped.subject_count, 2);
    }

    #[test]
    fn per_subject_and_per_student_grouping() {
        let records = vec![
            rec("s1", "math", "t1", 90.0),
            rec("s2", "math", "t1", 70.0),
            rec("s1", "eng", "t1", 40.0),
            rec("s2", "eng", "t1", 60.0),
        ];
        let by_subject = subject_averages(&records, OutOfRangePolicy::Exclude);
        assert_eq!(by_subject.len(), 2);
        assert_eq!(by_subject[0].subject_id, "math");
        assert_eq!(by_subject[0].average, 80.0);
        assert_eq!(by_subject[0].record_count, 2);
        assert_eq!(by_subject[1].subject_id, "eng");
        assert_eq!(by_subject[1].average, 50.0);

        let by_student = averages_by_student(&records, OutOfRangePolicy::Exclude);
        assert_eq!(by_student[0].student_id, "s1");
        assert_eq!(by_student[0].average, 65.0);
        assert_eq!(by_student[1].student_id, "s2");
        assert_eq!(by_student[1].average, 65.0);
    }

    #[test]
    fn period_averages_follow_requested_order() {
        let records = vec![
            rec("s1", "math", "t2", 80.0),
            rec("s1", "math", "t1", 50.0),
            rec("s1", "eng", "t1", 70.0),
        ];
        let periods = period_averages(&records, &["t1", "t2", "t3"], OutOfRangePolicy::Exclude);
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].period_id, "t1");
        assert_eq!(periods[0].average, 60.0);
        assert_eq!(periods[0].subject_count, 2);
        assert_eq!(periods[1].period_id, "t2");
        assert_eq!(periods[1].average, 80.0);
    }
}
