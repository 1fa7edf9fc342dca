//! NOTEEVENTS rows and their cleaned token form.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

use crate::data::{Table, Value};

/// English stop words removed from every note.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

fn deid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\*\*[^\]]*\*\*\]").expect("compile de-identification regex"))
}

fn token_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("compile token separator regex"))
}

fn stemmer() -> &'static Stemmer {
    static STEMMER: OnceLock<Stemmer> = OnceLock::new();
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Tokenize a note: remove de-identification placeholders (`[**...**]`),
/// lowercase, split on anything but letters and digits, drop stop words,
/// numbers and single characters, and reduce the rest to their Snowball
/// English stems.
pub fn clean_doc(text: &str) -> Vec<String> {
    let text = deid_pattern().replace_all(text, " ").to_lowercase();
    token_separator()
        .split(&text)
        .filter(|t| t.len() > 1)
        .filter(|t| !t.bytes().all(|b| b.is_ascii_digit()))
        .filter(|t| !is_stop_word(t))
        .map(|t| stemmer().stem(t).into_owned())
        .collect()
}

/// Identifies one note and the files derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteKey {
    pub subject_id: i64,
    pub hadm_id: i64,
    pub row_id: i64,
}

/// One row of the NOTEEVENTS table.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub row_id: i64,
    pub subject_id: i64,
    pub hadm_id: Option<i64>,
    pub chartdate: Option<String>,
    pub charttime: Option<String>,
    pub storetime: Option<String>,
    pub category: String,
    pub description: String,
    pub cgid: Option<i64>,
    pub iserror: Option<i64>,
    pub text: String,
}

fn opt_text(v: &Value) -> Option<String> {
    if v.is_null() { None } else { Some(v.to_field()) }
}

impl NoteEvent {
    /// Read every row of a NOTEEVENTS table.
    pub fn from_table(table: &Table) -> Result<Vec<NoteEvent>> {
        for col in ["ROW_ID", "SUBJECT_ID", "HADM_ID", "CATEGORY", "TEXT"] {
            table.require_column(col)?;
        }
        (0..table.len())
            .map(|row| {
                let id = |col: &str| {
                    table
                        .get(row, col)
                        .as_i64()
                        .with_context(|| format!("NOTEEVENTS row {row}: invalid {col}"))
                };
                Ok(NoteEvent {
                    row_id: id("ROW_ID")?,
                    subject_id: id("SUBJECT_ID")?,
                    hadm_id: table.get(row, "HADM_ID").as_i64(),
                    chartdate: opt_text(table.get(row, "CHARTDATE")),
                    charttime: opt_text(table.get(row, "CHARTTIME")),
                    storetime: opt_text(table.get(row, "STORETIME")),
                    category: table.get(row, "CATEGORY").to_field(),
                    description: table.get(row, "DESCRIPTION").to_field(),
                    cgid: table.get(row, "CGID").as_i64(),
                    iserror: table.get(row, "ISERROR").as_i64(),
                    text: table.get(row, "TEXT").to_field(),
                })
            })
            .collect()
    }

    /// The note's key; `None` for notes outside any hospital admission.
    pub fn key(&self) -> Option<NoteKey> {
        Some(NoteKey {
            subject_id: self.subject_id,
            hadm_id: self.hadm_id?,
            row_id: self.row_id,
        })
    }
}

/// A note after cleaning, as stored in its `.cleaned` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CleanedNote {
    pub row_id: i64,
    pub subject_id: i64,
    pub hadm_id: i64,
    /// Chart time, or the chart date when the time was not recorded.
    pub charttime: Option<String>,
    pub storetime: Option<String>,
    pub category: String,
    pub description: String,
    pub cgid: Option<i64>,
    pub iserror: Option<i64>,
    pub tokens: Vec<String>,
}

impl CleanedNote {
    pub fn key(&self) -> NoteKey {
        NoteKey {
            subject_id: self.subject_id,
            hadm_id: self.hadm_id,
            row_id: self.row_id,
        }
    }
}

/// Clean one note. Notes without an `HADM_ID` are dropped.
pub fn clean_note(note: &NoteEvent) -> Option<CleanedNote> {
    let hadm_id = note.hadm_id?;
    Some(CleanedNote {
        row_id: note.row_id,
        subject_id: note.subject_id,
        hadm_id,
        charttime: note.charttime.clone().or_else(|| note.chartdate.clone()),
        storetime: note.storetime.clone(),
        category: note.category.trim().to_string(),
        description: note.description.clone(),
        cgid: note.cgid,
        iserror: note.iserror,
        tokens: clean_doc(&note.text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::read_csv;
    use rstest::rstest;

    #[test]
    fn stop_words_are_sorted() {
        assert!(STOP_WORDS.windows(2).all(|w| w[0] < w[1]));
    }

    #[rstest]
    #[case("Pt is a 65 yo M with [**Hospital 1234**] hx of CHF.", &["pt", "yo", "hx", "chf"])]
    #[case("BP 120/80, HR 86; on Lasix-drip", &["bp", "hr", "lasix", "drip"])]
    #[case("[**2101-10-20**]", &[])]
    #[case("", &[])]
    fn clean_doc_tokens(#[case] text: &str, #[case] expected: &[&str]) {
        assert_eq!(clean_doc(text), expected);
    }

    #[test]
    fn inflections_share_a_stem() {
        let tokens = clean_doc("patients intubated, patient intubation");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0], "patient");
        assert_eq!(tokens[0], tokens[2]);
        assert_eq!(tokens[1], tokens[3]);
    }

    #[test]
    fn notes_without_admission_are_dropped() {
        let table = read_csv(
            "ROW_ID,SUBJECT_ID,HADM_ID,CHARTDATE,CHARTTIME,CATEGORY,DESCRIPTION,TEXT\n\
             1,3,145834,2101-10-20,,Radiology ,CHEST,Bilateral effusions\n\
             2,3,,2101-10-21,2101-10-21 08:00:00,ECG,Report,Sinus rhythm\n"
                .as_bytes(),
        )
        .unwrap();
        let notes = NoteEvent::from_table(&table).unwrap();
        assert_eq!(notes.len(), 2);
        assert!(notes[1].key().is_none());
        assert!(clean_note(&notes[1]).is_none());

        let cleaned = clean_note(&notes[0]).unwrap();
        assert_eq!(cleaned.charttime.as_deref(), Some("2101-10-20"));
        assert_eq!(cleaned.category, "Radiology");
        assert_eq!(cleaned.tokens, clean_doc("bilateral effusions"));
        assert_eq!(cleaned.tokens.len(), 2);
        assert_eq!(cleaned.key(), notes[0].key().unwrap());
    }

    #[test]
    fn missing_text_column_is_an_error() {
        let table = read_csv("ROW_ID,SUBJECT_ID,HADM_ID,CATEGORY\n1,3,4,ECG\n".as_bytes()).unwrap();
        assert!(NoteEvent::from_table(&table).is_err());
    }
}
