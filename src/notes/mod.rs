//! Clinical notes to bags of words.
//!
//! The stage runs in four passes over NOTEEVENTS, each reading the files
//! written by the previous one:
//!
//! 1. clean every note (`.cleaned`)
//! 2. fit one count vectorizer per chunk, merge and prune them
//! 3. transform every cleaned note to a bag of words (`.cleaned-bow`)
//! 4. combine the bags of each admission (`.cleaned-bow.combined`)

pub mod clean;
pub mod combine;
pub mod vectorizer;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::data::{Record, Table, read_table, store, write_table};
use crate::filenames::{self, DEFAULT_COMPRESSION};
use crate::parallel;

use clean::{CleanedNote, NoteEvent, NoteKey};
use combine::{AdmissionNotes, BowNote};
use vectorizer::IncrementalCountVectorizer;

pub const CLEANED_NOTE: &str = "cleaned";
pub const BOW_NOTE: &str = "cleaned-bow";
pub const COMBINED_NOTE: &str = "cleaned-bow.combined";

// ---------------------------------------------------------------------------
// Note categories
// ---------------------------------------------------------------------------

/// Record columns holding the bag of words of each note type.
pub const NOTE_TYPES: [&str; 14] = [
    "NOTES_CASE_MANAGEMENT",
    "NOTES_CONSULT",
    "NOTES_DISCHARGE_SUMMARY",
    "NOTES_ECG",
    "NOTES_ECHO",
    "NOTES_GENERAL",
    "NOTES_NURSING",
    "NOTES_NUTRITION",
    "NOTES_PHARMACY",
    "NOTES_PHYSICIAN",
    "NOTES_RADIOLOGY",
    "NOTES_REHAB_SERVICES",
    "NOTES_RESPIRATORY",
    "NOTES_SOCIAL_WORK",
];

/// The note type of a NOTEEVENTS `CATEGORY`.
pub fn note_type(category: &str) -> Option<&'static str> {
    let t = match category.trim() {
        "Case Management" => "NOTES_CASE_MANAGEMENT",
        "Consult" => "NOTES_CONSULT",
        "Discharge summary" => "NOTES_DISCHARGE_SUMMARY",
        "ECG" => "NOTES_ECG",
        "Echo" => "NOTES_ECHO",
        "General" => "NOTES_GENERAL",
        "Nursing" | "Nursing/other" => "NOTES_NURSING",
        "Nutrition" => "NOTES_NUTRITION",
        "Pharmacy" => "NOTES_PHARMACY",
        "Physician" => "NOTES_PHYSICIAN",
        "Radiology" => "NOTES_RADIOLOGY",
        "Rehab Services" => "NOTES_REHAB_SERVICES",
        "Respiratory" => "NOTES_RESPIRATORY",
        "Social Work" => "NOTES_SOCIAL_WORK",
        _ => return None,
    };
    Some(t)
}

// ---------------------------------------------------------------------------
// Per-note files
// ---------------------------------------------------------------------------

fn note_file(base: &Path, key: &NoteKey, note: &str) -> PathBuf {
    filenames::note_event_filename(
        base,
        key.subject_id,
        key.hadm_id,
        Some(key.row_id),
        DEFAULT_COMPRESSION,
        Some(note),
    )
}

/// The combined notes file of one admission.
pub fn combined_notes_file(base: &Path, subject_id: i64, hadm_id: i64) -> PathBuf {
    filenames::note_event_filename(
        base,
        subject_id,
        hadm_id,
        None,
        DEFAULT_COMPRESSION,
        Some(COMBINED_NOTE),
    )
}

/// Load the raw notes, keeping the first `num_notes` rows if given.
pub fn load_notes(mimic_basepath: &Path, num_notes: Option<usize>) -> Result<Vec<NoteEvent>> {
    let path = filenames::mimic_table_filename(mimic_basepath, "NOTEEVENTS");
    let mut table = read_table(&path)?;
    if let Some(n) = num_notes {
        table = table.head(n);
    }
    NoteEvent::from_table(&table).with_context(|| format!("reading {}", path.display()))
}

/// Clean the notes and store each one. Returns the keys of the stored notes.
pub fn clean_notes(notes: &[NoteEvent], base: &Path, chunk_size: usize) -> Result<Vec<NoteKey>> {
    let keys = parallel::map_chunked(notes, chunk_size, "clean notes", |note| {
        let Some(cleaned) = clean::clean_note(note) else {
            return Ok(None);
        };
        let key = cleaned.key();
        store::dump(&cleaned, &note_file(base, &key, CLEANED_NOTE))?;
        Ok(Some(key))
    })?;
    Ok(keys.into_iter().flatten().collect())
}

/// Fit a vectorizer per chunk of cleaned notes, then merge and prune them.
pub fn create_count_vectorizer(
    keys: &[NoteKey],
    base: &Path,
    config: &Config,
) -> Result<IncrementalCountVectorizer> {
    let fitted = parallel::apply_chunks(
        keys,
        config.processing.chunk_size,
        "count vectorizer",
        |chunk| {
            let docs = chunk
                .iter()
                .map(|key| store::load::<CleanedNote>(&note_file(base, key, CLEANED_NOTE)))
                .collect::<Result<Vec<_>>>()?;
            Ok(IncrementalCountVectorizer::new().fit(docs.iter().map(|d| d.tokens.as_slice())))
        },
    )?;

    let merged =
        IncrementalCountVectorizer::merge(fitted, config.notes.min_df, config.notes.max_df)?;
    log::info!(
        "Vocabulary of {} tokens from {} notes",
        merged.vocabulary_size(),
        merged.n_docs
    );
    Ok(merged)
}

/// Transform every cleaned note to a bag of words and store it.
pub fn create_bow(
    keys: &[NoteKey],
    base: &Path,
    vectorizer: &IncrementalCountVectorizer,
    chunk_size: usize,
) -> Result<()> {
    parallel::map_chunked(keys, chunk_size, "bag-of-words", |key| {
        let cleaned: CleanedNote = store::load(&note_file(base, key, CLEANED_NOTE))?;
        let bow = vectorizer.transform(&cleaned.tokens)?;
        store::dump(&BowNote::new(&cleaned, bow), &note_file(base, key, BOW_NOTE))
    })?;
    Ok(())
}

/// Combine the bag-of-words notes of every admission into one file each.
/// Returns the index of the combined files.
pub fn combine_episode_notes(keys: &[NoteKey], base: &Path, chunk_size: usize) -> Result<Table> {
    let groups = combine::group_by_admission(keys);
    let records: Vec<Record> = parallel::map_chunked(
        &groups,
        chunk_size,
        "combine notes",
        |((subject_id, hadm_id), keys)| {
            let notes = keys
                .iter()
                .map(|key| store::load::<BowNote>(&note_file(base, key, BOW_NOTE)))
                .collect::<Result<Vec<_>>>()?;
            let combined = AdmissionNotes::combine(*subject_id, *hadm_id, notes);
            let path = combined_notes_file(base, *subject_id, *hadm_id);
            store::dump(&combined, &path)?;
            Ok(combine::index_record(&combined, &path))
        },
    )?;
    Ok(Table::from_records(records))
}

/// Stage entry point. `num_notes` limits processing to the first rows of
/// NOTEEVENTS.
pub fn run(config: &Config, num_notes: Option<usize>) -> Result<Table> {
    let base = config.analysis_basepath.as_path();
    let chunk_size = config.processing.chunk_size;

    log::info!("Loading notes... this may be slow.");
    let notes = load_notes(&config.mimic_basepath, num_notes)?;

    log::info!("Cleaning {} notes", notes.len());
    let keys = clean_notes(&notes, base, chunk_size)?;
    drop(notes);
    log::debug!("{} notes belong to an admission", keys.len());

    log::info!("Creating count vectorizer for notes");
    let vectorizer = create_count_vectorizer(&keys, base, config)?;
    let vectorizer_file = filenames::notes_count_vectorizer_filename(base);
    store::dump(&vectorizer, &vectorizer_file)?;

    log::info!("Creating the bag-of-words for the notes");
    create_bow(&keys, base, &vectorizer, chunk_size)?;

    log::info!("Combining bag-of-words types per episode");
    let episode_notes = combine_episode_notes(&keys, base, chunk_size)?;

    log::info!(
        "Writing bag-of-words index to disk: '{}'",
        config.episode_notes.display()
    );
    write_table(&episode_notes, &config.episode_notes)?;
    Ok(episode_notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use rstest::rstest;

    #[rstest]
    #[case("Nursing/other", Some("NOTES_NURSING"))]
    #[case("Nursing", Some("NOTES_NURSING"))]
    #[case("Discharge summary", Some("NOTES_DISCHARGE_SUMMARY"))]
    #[case("Radiology ", Some("NOTES_RADIOLOGY"))]
    #[case("Discharge Summary", None)]
    fn categories_map_to_note_types(#[case] category: &str, #[case] expected: Option<&str>) {
        assert_eq!(note_type(category), expected);
    }

    #[test]
    fn every_note_type_is_reachable() {
        let categories = [
            "Case Management", "Consult", "Discharge summary", "ECG", "Echo", "General",
            "Nursing", "Nutrition", "Pharmacy", "Physician", "Radiology", "Rehab Services",
            "Respiratory", "Social Work",
        ];
        let types: Vec<&str> = categories.iter().filter_map(|c| note_type(c)).collect();
        assert_eq!(types, NOTE_TYPES);
    }

    fn config_with_notes(root: &Path) -> Config {
        let mut config = Config::under_root(root);
        config.processing.chunk_size = 2;
        std::fs::create_dir_all(&config.mimic_basepath).unwrap();
        std::fs::write(
            config.mimic_basepath.join("NOTEEVENTS.csv"),
            "ROW_ID,SUBJECT_ID,HADM_ID,CHARTDATE,CHARTTIME,STORETIME,CATEGORY,DESCRIPTION,CGID,ISERROR,TEXT\n\
             1,3,145834,2101-10-20,2101-10-20 10:00:00,,Nursing/other,Report,,,\"Pt resting, HR stable\"\n\
             2,3,145834,2101-10-20,,,Radiology,CHEST,,,Bilateral effusions; HR 90\n\
             3,3,,2101-10-22,,,ECG,Report,,,Sinus rhythm\n\
             4,9,150000,2101-11-01,2101-11-01 12:00:00,,Physician ,Note,17,,Sepsis resolving\n",
        )
        .unwrap();
        config
    }

    #[test]
    fn stage_writes_every_intermediate_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_notes(dir.path());

        let index = run(&config, None).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(0, "HADM_ID"), &Value::Integer(145834));
        assert_eq!(index.get(0, "NUM_NOTES"), &Value::Integer(2));

        let base = &config.analysis_basepath;
        let key = NoteKey { subject_id: 3, hadm_id: 145834, row_id: 2 };
        assert!(note_file(base, &key, CLEANED_NOTE).exists());
        assert!(note_file(base, &key, BOW_NOTE).exists());
        assert!(config.episode_notes.exists());

        let vectorizer: IncrementalCountVectorizer =
            store::load(&filenames::notes_count_vectorizer_filename(base)).unwrap();
        assert_eq!(vectorizer.n_docs, 3);
        assert_eq!(vectorizer.doc_freq["hr"], 2);

        let combined: AdmissionNotes = store::load(&combined_notes_file(base, 3, 145834)).unwrap();
        // the radiology note only has a chart date, so it sorts first
        assert_eq!(combined.notes[0].row_id, 2);
        assert_eq!(combined.notes[1].category, "Nursing/other");
        let hr = vectorizer.vocabulary["hr"];
        assert!(combined.notes[1].bow.indices.contains(&hr));
    }

    #[test]
    fn note_limit_keeps_the_first_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_notes(dir.path());

        let index = run(&config, Some(2)).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0, "HADM_ID"), &Value::Integer(145834));
        assert_eq!(index.get(0, "NUM_NOTES"), &Value::Integer(2));

        let base = &config.analysis_basepath;
        let vectorizer: IncrementalCountVectorizer =
            store::load(&filenames::notes_count_vectorizer_filename(base)).unwrap();
        assert_eq!(vectorizer.n_docs, 2);
        assert!(!combined_notes_file(base, 9, 150000).exists());

        let notes = load_notes(&config.mimic_basepath, Some(3)).unwrap();
        let rows: Vec<i64> = notes.iter().map(|n| n.row_id).collect();
        assert_eq!(rows, vec![1, 2, 3]);
    }
}
