//! Ranking over a population of student averages.
//!
//! Rank is the 1-based position after sorting by average descending; equal
//! averages are ordered by the configured [`TieBreak`] so every student
//! gets a distinct rank. Entries marked unscored always trail scored ones.
//! The cross-stream ranking sorts a whole grade once and derives each
//! stream's ranks from that single order.

use crate::calc::TieBreak;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationEntry {
    pub student_id: String,
    pub average: f64,
    #[serde(default)]
    pub stream: Option<String>,
    /// No score counted toward `average`; ranks after every scored entry.
    #[serde(default)]
    pub unscored: bool,
}

impl PopulationEntry {
    pub fn new(student_id: impl Into<String>, average: f64) -> Self {
        Self {
            student_id: student_id.into(),
            average,
            stream: None,
            unscored: false,
        }
    }

    pub fn without_scores(mut self) -> Self {
        self.unscored = true;
        self
    }

    pub fn in_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    fn stream_key(&self) -> &str {
        self.stream.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub student_id: String,
    pub average: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossStreamRanked {
    pub student_id: String,
    pub stream: String,
    pub average: f64,
    pub grade_rank: usize,
    pub stream_rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRanking {
    pub stream: String,
    pub students: Vec<RankedStudent>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossStreamRanking {
    /// Whole grade in rank order.
    pub students: Vec<CrossStreamRanked>,
    /// One entry per stream, first appearance in grade order.
    pub streams: Vec<StreamRanking>,
}

impl CrossStreamRanking {
    pub fn find(&self, student_id: &str) -> Option<&CrossStreamRanked> {
        self.students.iter().find(|s| s.student_id == student_id)
    }

    pub fn stream(&self, stream: &str) -> Option<&StreamRanking> {
        self.streams.iter().find(|s| s.stream == stream)
    }

    pub fn grade_size(&self) -> usize {
        self.students.len()
    }

    pub fn stream_size(&self, stream: &str) -> usize {
        self.stream(stream).map(|s| s.students.len()).unwrap_or(0)
    }
}

// NaN sorts below every real average.
fn sort_key(avg: f64) -> f64 {
    if avg.is_nan() {
        f64::NEG_INFINITY
    } else {
        avg
    }
}

fn compare(a: &PopulationEntry, b: &PopulationEntry, tie: TieBreak) -> Ordering {
    let by_avg = a
        .unscored
        .cmp(&b.unscored)
        .then_with(|| sort_key(b.average).total_cmp(&sort_key(a.average)));
    match tie {
        TieBreak::StudentId => by_avg.then_with(|| a.student_id.cmp(&b.student_id)),
        TieBreak::InputOrder => by_avg,
    }
}

/// Population in rank order. `sort_by` is stable, which is what makes
/// `TieBreak::InputOrder` hold.
fn ordered<'a>(entries: &'a [PopulationEntry], tie: TieBreak) -> Vec<&'a PopulationEntry> {
    let mut sorted: Vec<&PopulationEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| compare(a, b, tie));
    sorted
}

/// Class (or any flat population) ranking.
pub fn rank_population(entries: &[PopulationEntry], tie: TieBreak) -> Vec<RankedStudent> {
    ordered(entries, tie)
        .into_iter()
        .enumerate()
        .map(|(i, e)| RankedStudent {
            student_id: e.student_id.clone(),
            average: e.average,
            rank: i + 1,
        })
        .collect()
}

/// Stream-only population: the students of `stream`, ranked among themselves.
pub fn rank_stream(entries: &[PopulationEntry], stream: &str, tie: TieBreak) -> Vec<RankedStudent> {
    let members: Vec<PopulationEntry> = entries
        .iter()
        .filter(|e| e.stream_key() == stream)
        .cloned()
        .collect();
    rank_population(&members, tie)
}

/// Grade-wide ranking with stream ranks taken as subsequences of the grade
/// order. Students without a stream form the `""` stream.
pub fn rank_cross_stream(entries: &[PopulationEntry], tie: TieBreak) -> CrossStreamRanking {
    let mut out = CrossStreamRanking::default();
    for (i, e) in ordered(entries, tie).into_iter().enumerate() {
        let stream = e.stream_key().to_string();
        let slot = match out.streams.iter().position(|s| s.stream == stream) {
            Some(p) => p,
            None => {
                out.streams.push(StreamRanking {
                    stream: stream.clone(),
                    students: Vec::new(),
                });
                out.streams.len() - 1
            }
        };
        let members = &mut out.streams[slot].students;
        let stream_rank = members.len() + 1;
        members.push(RankedStudent {
            student_id: e.student_id.clone(),
            average: e.average,
            rank: stream_rank,
        });
        out.students.push(CrossStreamRanked {
            student_id: e.student_id.clone(),
            stream,
            average: e.average,
            grade_rank: i + 1,
            stream_rank,
        });
    }
    out
}
