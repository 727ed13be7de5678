use crate::calc::{is_score_in_range, SubjectLevel};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Destructive,
    Warning,
    Secondary,
    Success,
}

impl Severity {
    /// Display tag derived from the band label; not a ranking signal.
    pub fn for_label(label: &str) -> Self {
        if label.contains("Below") {
            Severity::Destructive
        } else if label.contains("Approaching") {
            Severity::Warning
        } else if label.contains("Meeting") {
            Severity::Secondary
        } else if label.contains("Exceeding") {
            Severity::Success
        } else {
            Severity::Destructive
        }
    }
}

/// One row of a band table. `min..=max` are whole-number percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandRow {
    pub min: u8,
    pub max: u8,
    pub label: &'static str,
    pub points: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    pub label: &'static str,
    pub severity: Severity,
    pub points: &'static str,
    /// 1-based position in the level's table (lowest band = 1); 0 for `INVALID`.
    pub tier: u8,
}

impl Band {
    pub const INVALID: Band = Band {
        label: "Invalid Score",
        severity: Severity::Destructive,
        points: "-",
        tier: 0,
    };

    pub fn is_invalid(&self) -> bool {
        self.tier == 0
    }

    fn from_row(row: &BandRow, tier: usize) -> Self {
        Band {
            label: row.label,
            severity: Severity::for_label(row.label),
            points: row.points,
            tier: (tier + 1) as u8,
        }
    }
}

const UPPER_PRIMARY: &[BandRow] = &[
    BandRow { min: 0, max: 29, label: "Below Expectation", points: "1" },
    BandRow { min: 30, max: 45, label: "Approaching Expectation", points: "2" },
    BandRow { min: 46, max: 69, label: "Meeting Expectations", points: "3" },
    BandRow { min: 70, max: 100, label: "Exceeding Expectations", points: "4" },
];

const JUNIOR_SECONDARY: &[BandRow] = &[
    BandRow { min: 0, max: 14, label: "Below Expectation 2", points: "D" },
    BandRow { min: 15, max: 29, label: "Below Expectation 1", points: "D+" },
    BandRow { min: 30, max: 37, label: "Approaching Expectation 2", points: "C" },
    BandRow { min: 38, max: 45, label: "Approaching Expectation 1", points: "C+" },
    BandRow { min: 46, max: 57, label: "Meeting Expectations 2", points: "B" },
    BandRow { min: 58, max: 69, label: "Meeting Expectations 1", points: "B+" },
    BandRow { min: 70, max: 79, label: "Exceeding Expectations 2", points: "A-" },
    BandRow { min: 80, max: 100, label: "Exceeding Expectations", points: "A" },
];

/// Canonical table for a level, lowest band first. `None` for unbanded levels.
pub fn band_table(level: SubjectLevel) -> Option<&'static [BandRow]> {
    match level {
        SubjectLevel::UpperPrimary => Some(UPPER_PRIMARY),
        SubjectLevel::JuniorSecondary => Some(JUNIOR_SECONDARY),
        SubjectLevel::Unclassified => None,
    }
}

/// Classify a score for a level.
///
/// Returns `None` when the level has no band table. Scores outside
/// [0, 100] (or non-finite) yield [`Band::INVALID`]. A fractional score
/// falls in the row with the greatest lower bound not above it, so 29.5
/// is still in the 0–29 row.
pub fn classify(score: f64, level: SubjectLevel) -> Option<Band> {
    let table = band_table(level)?;
    if !is_score_in_range(score) {
        return Some(Band::INVALID);
    }
    let idx = table
        .iter()
        .rposition(|row| score >= f64::from(row.min))
        .unwrap_or(0);
    Some(Band::from_row(&table[idx], idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVELS: [SubjectLevel; 2] = [SubjectLevel::UpperPrimary, SubjectLevel::JuniorSecondary];

    #[test]
    fn every_integer_score_matches_exactly_one_row() {
        for level in LEVELS {
            let table = band_table(level).expect("banded level");
            for s in 0..=100u8 {
                let hits = table.iter().filter(|r| r.min <= s && s <= r.max).count();
                assert_eq!(hits, 1, "{:?} score {}", level, s);
            }
        }
    }

    #[test]
    fn tables_are_contiguous_from_0_to_100() {
        for level in LEVELS {
            let table = band_table(level).expect("banded level");
            assert_eq!(table.first().map(|r| r.min), Some(0));
            assert_eq!(table.last().map(|r| r.max), Some(100));
            for pair in table.windows(2) {
                assert_eq!(pair[0].max + 1, pair[1].min);
            }
        }
    }

    #[test]
    fn classify_agrees_with_table_rows() {
        for level in LEVELS {
            let table = band_table(level).expect("banded level");
            for s in 0..=100u8 {
                let row = table
                    .iter()
                    .find(|r| r.min <= s && s <= r.max)
                    .expect("row");
                let band = classify(f64::from(s), level).expect("band");
                assert_eq!(band.label, row.label);
                assert_eq!(band.points, row.points);
            }
        }
    }

    #[test]
    fn higher_score_never_lands_in_lower_band() {
        for level in LEVELS {
            let mut prev = 0u8;
            let mut s = 0.0;
            while s <= 100.0 {
                let tier = classify(s, level).expect("band").tier;
                assert!(tier >= prev, "{:?} at {}", level, s);
                prev = tier;
                s += 0.25;
            }
        }
    }

    #[test]
    fn upper_primary_boundaries() {
        let lp = SubjectLevel::UpperPrimary;
        assert_eq!(classify(29.0, lp).map(|b| b.points), Some("1"));
        assert_eq!(classify(30.0, lp).map(|b| b.points), Some("2"));
        assert_eq!(classify(45.0, lp).map(|b| b.points), Some("2"));
        assert_eq!(classify(46.0, lp).map(|b| b.points), Some("3"));
        assert_eq!(classify(69.0, lp).map(|b| b.points), Some("3"));
        assert_eq!(classify(70.0, lp).map(|b| b.points), Some("4"));
        assert_eq!(classify(100.0, lp).map(|b| b.points), Some("4"));
    }

    #[test]
    fn junior_secondary_splits_exceeding_at_80() {
        let js = SubjectLevel::JuniorSecondary;
        let b79 = classify(79.0, js).expect("band");
        let b80 = classify(80.0, js).expect("band");
        assert_eq!(b79.label, "Exceeding Expectations 2");
        assert_eq!(b79.points, "A-");
        assert_eq!(b80.label, "Exceeding Expectations");
        assert_eq!(b80.points, "A");
        assert_eq!(classify(14.0, js).map(|b| b.points), Some("D"));
        assert_eq!(classify(15.0, js).map(|b| b.points), Some("D+"));
        assert_eq!(classify(37.0, js).map(|b| b.points), Some("C"));
        assert_eq!(classify(38.0, js).map(|b| b.points), Some("C+"));
        assert_eq!(classify(57.0, js).map(|b| b.points), Some("B"));
        assert_eq!(classify(58.0, js).map(|b| b.points), Some("B+"));
    }

    #[test]
    fn fractional_scores_stay_in_lower_row() {
        let band = classify(29.5, SubjectLevel::UpperPrimary).expect("band");
        assert_eq!(band.label, "Below Expectation");
        let band = classify(79.99, SubjectLevel::JuniorSecondary).expect("band");
        assert_eq!(band.points, "A-");
    }

    #[test]
    fn severity_follows_label_family() {
        let js = SubjectLevel::JuniorSecondary;
        assert_eq!(classify(10.0, js).map(|b| b.severity), Some(Severity::Destructive));
        assert_eq!(classify(40.0, js).map(|b| b.severity), Some(Severity::Warning));
        assert_eq!(classify(60.0, js).map(|b| b.severity), Some(Severity::Secondary));
        assert_eq!(classify(90.0, js).map(|b| b.severity), Some(Severity::Success));
    }

    #[test]
    fn out_of_range_is_invalid_not_a_panic() {
        let band = classify(150.0, SubjectLevel::UpperPrimary).expect("band");
        assert!(band.is_invalid());
        assert_eq!(band.label, "Invalid Score");
        assert_eq!(band.severity, Severity::Destructive);
        assert_eq!(classify(-0.5, SubjectLevel::JuniorSecondary), Some(Band::INVALID));
        assert_eq!(classify(f64::NAN, SubjectLevel::JuniorSecondary), Some(Band::INVALID));
    }

    #[test]
    fn unbanded_levels_produce_no_band() {
        assert_eq!(classify(50.0, SubjectLevel::Unclassified), None);
        assert_eq!(classify(150.0, SubjectLevel::Unclassified), None);
    }
}
