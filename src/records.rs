//! Assemble one complete record per benchmark episode: demographic and
//! admission fields, diagnoses, the label, time-series features and one bag
//! of words per note type.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::data::filter::{equals, filtered_indices};
use crate::data::{Record, Table, Value, read_table, store, write_table};
use crate::episodes::DIAGNOSIS_ICD9_PREFIX;
use crate::filenames::{self, DEFAULT_COMPRESSION};
use crate::listfile::{self, ListEntry};
use crate::notes::combine::AdmissionNotes;
use crate::notes::vectorizer::BagOfWords;
use crate::notes::{self, NOTE_TYPES};
use crate::parallel;

/// Episode fields copied into every record. Outcome fields (discharge,
/// death, length of stay) are left out.
pub const FIELDS_TO_KEEP: [&str; 22] = [
    "SUBJECT_ID",
    "HADM_ID",
    "ICUSTAY_ID",
    "EPISODE",
    "GENDER",
    "AGE",
    "ETHNICITY",
    "HEIGHT",
    "WEIGHT",
    "LAST_CAREUNIT",
    "DBSOURCE",
    "ADMITTIME",
    "INTIME",
    "ADMISSION_LOCATION",
    "ADMISSION_TYPE",
    "EDREGTIME",
    "EDOUTTIME",
    "HAS_CHARTEVENTS_DATA",
    "INSURANCE",
    "LANGUAGE",
    "MARITAL_STATUS",
    "RELIGION",
];

/// Time-series record columns already present among the episode fields.
const TS_ID_COLUMNS: [&str; 3] = ["SUBJECT_ID", "EPISODE", "stay"];

/// A complete episode record as stored in its record file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub fields: Record,
    /// Note type → summed bag of words.
    pub notes: BTreeMap<String, BagOfWords>,
}

impl EpisodeRecord {
    /// Flatten into a table row; bags become `index:count;...` strings.
    pub fn to_row(&self) -> Record {
        let mut row = self.fields.clone();
        for (note_type, bag) in &self.notes {
            row.push((note_type.clone(), Value::String(bag.encode())));
        }
        row
    }
}

// ---------------------------------------------------------------------------
// Episode lookup
// ---------------------------------------------------------------------------

/// The extended episodes, partitioned by subject.
pub struct EpisodeIndex {
    by_subject: HashMap<i64, Table>,
}

impl EpisodeIndex {
    pub fn new(all_episodes: &Table) -> Result<Self> {
        let subjects = all_episodes.column(listfile::SUBJECT_ID)?;
        let mut rows: HashMap<i64, Vec<usize>> = HashMap::new();
        for (i, subject) in subjects.iter().enumerate() {
            if let Some(s) = subject.as_i64() {
                rows.entry(s).or_default().push(i);
            }
        }
        let by_subject = rows
            .into_iter()
            .map(|(s, idx)| (s, all_episodes.take(&idx)))
            .collect();
        Ok(EpisodeIndex { by_subject })
    }

    /// The first episode row of `subject_id` named `episode`.
    pub fn select(&self, subject_id: i64, episode: &str) -> Option<Record> {
        let table = self.by_subject.get(&subject_id)?;
        let filters = equals([(listfile::EPISODE, Value::from(episode))]);
        filtered_indices(table, &filters)
            .first()
            .map(|&row| table.record(row))
    }
}

// ---------------------------------------------------------------------------
// Record assembly
// ---------------------------------------------------------------------------

fn field<'a>(record: &'a Record, name: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    record
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
        .unwrap_or(&NULL)
}

/// Per-type bags of the notes charted less than `episode_length_hours`
/// after admission. Every note type is present, possibly empty.
pub fn note_bags(
    notes: Option<&AdmissionNotes>,
    admittime: &Value,
    episode_length_hours: f64,
) -> BTreeMap<String, BagOfWords> {
    let mut bags: BTreeMap<String, BagOfWords> = NOTE_TYPES
        .iter()
        .map(|t| (t.to_string(), BagOfWords::default()))
        .collect();

    let (Some(notes), Some(admit)) = (notes, admittime.as_datetime()) else {
        return bags;
    };

    for note in &notes.notes {
        let Some(charttime) = note.charttime() else {
            log::debug!("note {} has no chart time", note.row_id);
            continue;
        };
        let hours = (charttime - admit).num_seconds() as f64 / 3600.0;
        if hours >= episode_length_hours {
            continue;
        }
        let Some(note_type) = notes::note_type(&note.category) else {
            log::warn!("note {}: unknown category '{}'", note.row_id, note.category);
            continue;
        };
        if let Some(bag) = bags.get_mut(note_type) {
            *bag = bag.add(&note.bow);
        }
    }
    bags
}

/// Combine the pieces of one episode's record.
pub fn assemble_record(
    entry: &ListEntry,
    episode: &Record,
    ts_features: Record,
    notes: Option<&AdmissionNotes>,
    episode_length_hours: f64,
) -> EpisodeRecord {
    let mut fields: Record = FIELDS_TO_KEEP
        .iter()
        .map(|&f| (f.to_string(), field(episode, f).clone()))
        .collect();

    fields.extend(
        episode
            .iter()
            .filter(|(k, _)| k.starts_with(DIAGNOSIS_ICD9_PREFIX))
            .cloned(),
    );

    fields.push((listfile::STAY.to_string(), Value::String(entry.stay.clone())));
    fields.push((listfile::SPLIT.to_string(), Value::from(entry.split.as_str())));
    fields.push(("y_true".to_string(), entry.y_true.clone()));

    fields.extend(
        ts_features
            .into_iter()
            .filter(|(k, _)| !TS_ID_COLUMNS.contains(&k.as_str())),
    );

    let notes = note_bags(notes, field(episode, "ADMITTIME"), episode_length_hours);
    EpisodeRecord { fields, notes }
}

fn load_ts_features(entry: &ListEntry) -> Result<Option<Record>> {
    if !entry.ts_file.exists() {
        log::warn!(
            "{}: no time-series features at '{}'",
            entry.stay,
            entry.ts_file.display()
        );
        return Ok(None);
    }
    Ok(Some(store::load(&entry.ts_file)?))
}

fn load_admission_notes(base: &Path, subject_id: i64, hadm_id: Option<i64>) -> Result<Option<AdmissionNotes>> {
    let Some(hadm_id) = hadm_id else {
        return Ok(None);
    };
    let path = notes::combined_notes_file(base, subject_id, hadm_id);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(store::load(&path)?))
}

/// Build and store the record of one list-file entry. `None` when the
/// episode is missing from the extended episodes or has no time-series
/// features.
pub fn process_entry(
    entry: &ListEntry,
    episodes: &EpisodeIndex,
    config: &Config,
) -> Result<Option<EpisodeRecord>> {
    let Some(episode) = episodes.select(entry.subject_id, &entry.episode) else {
        log::warn!("{}: episode not found in the extended episodes", entry.stay);
        return Ok(None);
    };

    let Some(ts) = load_ts_features(entry)? else {
        return Ok(None);
    };
    let hadm_id = field(&episode, "HADM_ID").as_i64();
    let notes = load_admission_notes(&config.analysis_basepath, entry.subject_id, hadm_id)?;

    let record = assemble_record(
        entry,
        &episode,
        ts,
        notes.as_ref(),
        config.notes.episode_length_hours,
    );

    let path = filenames::record_filename(
        &config.analysis_basepath,
        entry.split,
        entry.subject_id,
        &entry.episode,
        DEFAULT_COMPRESSION,
        None,
    );
    store::dump(&record, &path)?;
    Ok(Some(record))
}

/// Stage entry point.
pub fn run(config: &Config) -> Result<Table> {
    log::info!("Loading the list file");
    let listfile = read_table(&config.complete_listfile)?;
    let entries = listfile::entries(&listfile)?;

    log::info!("Loading the extended episodes");
    let episodes = EpisodeIndex::new(&read_table(&config.all_episodes)?)?;

    log::info!("Assembling {} records", entries.len());
    let records = parallel::map_chunked(
        &entries,
        config.processing.chunk_size,
        "records",
        |entry| process_entry(entry, &episodes, config),
    )?;

    let rows: Vec<Record> = records.iter().flatten().map(EpisodeRecord::to_row).collect();
    if rows.len() < entries.len() {
        log::warn!("{} of {} episodes skipped", entries.len() - rows.len(), entries.len());
    }
    let table = Table::from_records(rows);

    log::info!(
        "Writing complete records to disk: '{}'",
        config.complete_records.display()
    );
    write_table(&table, &config.complete_records)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::read_csv;
    use crate::filenames::Split;
    use crate::notes::combine::BowNote;

    fn entry(ts_file: &Path) -> ListEntry {
        ListEntry {
            stay: "3_episode1_timeseries.csv".into(),
            subject_id: 3,
            episode: "episode1".into(),
            split: Split::Test,
            ts_file: ts_file.to_path_buf(),
            y_true: Value::Integer(1),
        }
    }

    fn bow_note(row_id: i64, charttime: &str, category: &str, indices: Vec<usize>) -> BowNote {
        BowNote {
            row_id,
            subject_id: 3,
            hadm_id: 145834,
            charttime: Some(charttime.into()),
            category: category.into(),
            description: String::new(),
            bow: BagOfWords {
                counts: vec![1; indices.len()],
                indices,
            },
        }
    }

    fn episodes() -> Table {
        read_csv(
            "SUBJECT_ID,HADM_ID,ICUSTAY_ID,EPISODE,ADMITTIME,GENDER,DISCHTIME,DIAGNOSIS_ICD9_4019\n\
             3,145834,211552,episode1,2101-10-20 19:08:00,M,2101-10-31 13:58:00,1\n\
             3,150000,211553,episode2,2102-01-01 00:00:00,M,2102-01-05 00:00:00,0\n\
             9,160000,211554,episode1,2103-01-01 00:00:00,F,2103-01-02 00:00:00,0\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn index_selects_subject_and_episode() {
        let index = EpisodeIndex::new(&episodes()).unwrap();
        let ep = index.select(3, "episode2").unwrap();
        assert_eq!(field(&ep, "HADM_ID"), &Value::Integer(150000));
        assert!(index.select(3, "episode3").is_none());
        assert!(index.select(4, "episode1").is_none());
    }

    #[test]
    fn note_bags_respect_the_episode_length() {
        let notes = AdmissionNotes::combine(
            3,
            145834,
            vec![
                bow_note(1, "2101-10-20 20:00:00", "Nursing/other", vec![0, 2]),
                bow_note(2, "2101-10-21 09:00:00", "Nursing", vec![2]),
                bow_note(3, "2101-10-22 19:08:00", "Nursing", vec![5]),
                bow_note(4, "2101-10-21 09:00:00", "Unheard of", vec![7]),
            ],
        );
        let admit = Value::parse("2101-10-20 19:08:00");
        let bags = note_bags(Some(&notes), &admit, 48.0);

        assert_eq!(bags.len(), NOTE_TYPES.len());
        // exactly 48 hours after admission is outside the episode
        assert_eq!(bags["NOTES_NURSING"].encode(), "0:1;2:2");
        assert!(bags["NOTES_RADIOLOGY"].is_empty());

        let no_admit = note_bags(Some(&notes), &Value::Null, 48.0);
        assert!(no_admit.values().all(BagOfWords::is_empty));
    }

    #[test]
    fn record_combines_fields_features_and_notes() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry(&dir.path().join("missing.json.gz"));
        let episode = EpisodeIndex::new(&episodes()).unwrap().select(3, "episode1").unwrap();
        let ts: Record = vec![
            ("Heart Rate__0.00-48.00__MEAN".into(), Value::Float(88.0)),
            ("SUBJECT_ID".into(), Value::Integer(3)),
            ("EPISODE".into(), Value::from("episode1")),
            ("stay".into(), Value::from("3_episode1_timeseries.csv")),
        ];

        let record = assemble_record(&entry, &episode, ts, None, 48.0);
        let names: Vec<&str> = record.fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names.len(), FIELDS_TO_KEEP.len() + 1 + 3 + 1);
        assert!(!names.contains(&"DISCHTIME"));
        assert_eq!(names.iter().filter(|n| **n == "SUBJECT_ID").count(), 1);
        assert_eq!(field(&record.fields, "DIAGNOSIS_ICD9_4019"), &Value::Integer(1));
        assert_eq!(field(&record.fields, "y_true"), &Value::Integer(1));
        assert_eq!(field(&record.fields, "SPLIT"), &Value::from("test"));
        assert_eq!(field(&record.fields, "AGE"), &Value::Null);

        let row = record.to_row();
        assert_eq!(row.len(), names.len() + NOTE_TYPES.len());
        assert_eq!(field(&row, "NOTES_ECG"), &Value::from(""));
        assert!(load_ts_features(&entry).unwrap().is_none());
    }

    #[test]
    fn entries_without_features_get_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::under_root(dir.path());
        let entry = entry(&dir.path().join("missing.json.gz"));
        let index = EpisodeIndex::new(&episodes()).unwrap();

        assert!(process_entry(&entry, &index, &config).unwrap().is_none());
        let path = filenames::record_filename(
            &config.analysis_basepath,
            entry.split,
            entry.subject_id,
            &entry.episode,
            DEFAULT_COMPRESSION,
            None,
        );
        assert!(!path.exists());
    }
}
