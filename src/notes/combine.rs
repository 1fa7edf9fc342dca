//! Bag-of-words notes and their per-admission combination.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::data::model::parse_datetime;
use crate::data::{Record, Value};

use super::clean::{CleanedNote, NoteKey};
use super::vectorizer::BagOfWords;

/// A note reduced to its bag of words, as stored in its `.cleaned-bow` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BowNote {
    pub row_id: i64,
    pub subject_id: i64,
    pub hadm_id: i64,
    pub charttime: Option<String>,
    pub category: String,
    pub description: String,
    pub bow: BagOfWords,
}

impl BowNote {
    pub fn new(note: &CleanedNote, bow: BagOfWords) -> Self {
        BowNote {
            row_id: note.row_id,
            subject_id: note.subject_id,
            hadm_id: note.hadm_id,
            charttime: note.charttime.clone(),
            category: note.category.clone(),
            description: note.description.clone(),
            bow,
        }
    }

    pub fn charttime(&self) -> Option<NaiveDateTime> {
        self.charttime.as_deref().and_then(parse_datetime)
    }
}

/// All bag-of-words notes of one hospital admission, in chart order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AdmissionNotes {
    pub subject_id: i64,
    pub hadm_id: i64,
    pub notes: Vec<BowNote>,
}

impl AdmissionNotes {
    /// Combine the notes of one admission. Notes without a chart time sort
    /// last; ties keep row id order.
    pub fn combine(subject_id: i64, hadm_id: i64, mut notes: Vec<BowNote>) -> Self {
        notes.sort_by(|a, b| {
            let key = |n: &BowNote| (n.charttime().is_none(), n.charttime(), n.row_id);
            key(a).cmp(&key(b))
        });
        AdmissionNotes {
            subject_id,
            hadm_id,
            notes,
        }
    }
}

/// Group note keys by `(SUBJECT_ID, HADM_ID)`.
pub fn group_by_admission(keys: &[NoteKey]) -> Vec<((i64, i64), Vec<NoteKey>)> {
    let mut groups: BTreeMap<(i64, i64), Vec<NoteKey>> = BTreeMap::new();
    for key in keys {
        groups
            .entry((key.subject_id, key.hadm_id))
            .or_default()
            .push(*key);
    }
    groups.into_iter().collect()
}

/// Row of the episode notes index.
pub fn index_record(notes: &AdmissionNotes, notes_file: &std::path::Path) -> Record {
    vec![
        ("SUBJECT_ID".into(), Value::Integer(notes.subject_id)),
        ("HADM_ID".into(), Value::Integer(notes.hadm_id)),
        ("NUM_NOTES".into(), Value::Integer(notes.notes.len() as i64)),
        (
            "NOTES_FILE".into(),
            Value::String(notes_file.display().to_string()),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(row_id: i64, charttime: Option<&str>) -> BowNote {
        BowNote {
            row_id,
            subject_id: 3,
            hadm_id: 145834,
            charttime: charttime.map(str::to_string),
            category: "Nursing".into(),
            description: String::new(),
            bow: BagOfWords::default(),
        }
    }

    #[test]
    fn combine_sorts_by_chart_time() {
        let combined = AdmissionNotes::combine(
            3,
            145834,
            vec![
                note(5, None),
                note(4, Some("2101-10-21 08:00:00")),
                note(2, Some("2101-10-20")),
                note(1, Some("2101-10-21 08:00:00")),
            ],
        );
        let rows: Vec<i64> = combined.notes.iter().map(|n| n.row_id).collect();
        assert_eq!(rows, vec![2, 1, 4, 5]);
    }

    #[test]
    fn keys_group_per_admission() {
        let keys = [
            NoteKey { subject_id: 3, hadm_id: 20, row_id: 1 },
            NoteKey { subject_id: 3, hadm_id: 10, row_id: 2 },
            NoteKey { subject_id: 3, hadm_id: 20, row_id: 3 },
        ];
        let groups = group_by_admission(&keys);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, (3, 10));
        assert_eq!(groups[1].1.len(), 2);
    }
}
