//! Time-series feature stage.
//!
//! ```text
//!  complete list file ──► raw <episode>_timeseries.csv per stay
//!                               │ melt, drop empty cells
//!                               ▼
//!                       clean (GCS text → score)
//!                               │
//!                               ▼
//!                  windows × statistics per kind ──► feature table
//!                                                  └► TS_FILE per stay
//! ```

pub mod clean;
pub mod features;
pub mod stats;

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::data::{Record, Table, Value, read_table, store, write_table};
use crate::filenames;
use crate::listfile::{self, ListEntry};
use crate::parallel;

use features::Window;

/// Name of the time column in the benchmark time-series files.
pub const HOURS: &str = "Hours";

/// One non-empty cell of a raw time-series file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub hours: f64,
    pub kind: String,
    pub value: Value,
}

/// One cleaned measurement; `None` when a text value had no score.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub hours: f64,
    pub kind: String,
    pub value: Option<f64>,
}

/// The cleaned observations of one ICU stay.
#[derive(Debug, Clone, PartialEq)]
pub struct Stay {
    pub stay: String,
    pub subject_id: i64,
    pub episode: String,
    pub observations: Vec<Observation>,
}

/// Melt a raw time-series table into `(Hours, kind, value)` triples,
/// dropping empty cells.
pub fn melt(table: &Table) -> Result<Vec<RawObservation>> {
    let hours_idx = table.require_column(HOURS)?;
    let mut ret = Vec::new();
    for (i, row) in table.rows.iter().enumerate() {
        let hours = row[hours_idx]
            .as_f64()
            .with_context(|| format!("row {i}: invalid {HOURS} value '{}'", row[hours_idx]))?;
        for (kind, value) in table.columns.iter().zip(row) {
            if kind == HOURS || value.is_null() {
                continue;
            }
            ret.push(RawObservation {
                hours,
                kind: kind.clone(),
                value: value.clone(),
            });
        }
    }
    Ok(ret)
}

/// Convert every raw observation to a number.
pub fn clean_text_fields(raw: Vec<RawObservation>) -> Result<Vec<Observation>> {
    raw.into_iter()
        .map(|o| {
            let value = match &o.value {
                Value::Integer(_) | Value::Float(_) => o.value.as_f64(),
                other => clean::numeric_value(&o.kind, &other.to_field())?,
            };
            Ok(Observation {
                hours: o.hours,
                kind: o.kind,
                value,
            })
        })
        .collect()
}

/// Read and clean the raw time series of one list-file entry.
pub fn load_stay(benchmark_base: &Path, entry: &ListEntry) -> Result<Stay> {
    let path = filenames::benchmark_ts_raw_filename(
        benchmark_base,
        entry.split,
        entry.subject_id,
        &entry.episode,
    );
    let table = read_table(&path)?;
    let observations = melt(&table)
        .and_then(clean_text_fields)
        .with_context(|| format!("cleaning {}", path.display()))?;

    Ok(Stay {
        stay: entry.stay.clone(),
        subject_id: entry.subject_id,
        episode: entry.episode.clone(),
        observations,
    })
}

/// Features of one list-file entry; also stored at the entry's `TS_FILE`.
/// `None` when the stay has no observations at all.
pub fn process_entry(
    benchmark_base: &Path,
    entry: &ListEntry,
    windows: &[Window],
) -> Result<Option<Record>> {
    let stay = load_stay(benchmark_base, entry)?;
    if stay.observations.is_empty() {
        log::warn!("{}: no observations, skipping", entry.stay);
        return Ok(None);
    }
    let record = features::extract_episode_time_series_features(&stay, windows);
    store::dump(&record, &entry.ts_file)?;
    Ok(Some(record))
}

/// Stage entry point. `num_episodes` limits processing to the first rows of
/// the list file.
pub fn run(config: &Config, num_episodes: Option<usize>) -> Result<Table> {
    log::info!(
        "Loading the list file: '{}'",
        config.complete_listfile.display()
    );
    let mut listfile = read_table(&config.complete_listfile)?;
    if let Some(n) = num_episodes {
        listfile = listfile.head(n);
    }
    let entries = listfile::entries(&listfile)?;

    let windows = features::subsequence_windows(config.time_series.period_length_hours);

    log::info!("Extracting features from {} stays", entries.len());
    let records = parallel::map_chunked(
        &entries,
        config.processing.chunk_size,
        "time series",
        |entry| process_entry(&config.benchmark_base, entry, &windows),
    )?;

    let records: Vec<Record> = records.into_iter().flatten().collect();
    if records.len() < entries.len() {
        log::warn!("{} of {} stays had no observations", entries.len() - records.len(), entries.len());
    }
    let table = Table::from_records(records);
    log::info!(
        "Writing features to disk: '{}'",
        config.time_series_features.display()
    );
    write_table(&table, &config.time_series_features)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::read_csv;
    use crate::filenames::Split;

    const RAW: &str = "\
Hours,Glascow coma scale eye opening,Heart Rate,pH
0.5,4 Spontaneously,86,
1.5,,90,7.38
50.0,To Pain,,
";

    #[test]
    fn melt_drops_empty_cells() {
        let table = read_csv(RAW.as_bytes()).unwrap();
        let raw = melt(&table).unwrap();
        assert_eq!(raw.len(), 5);
        assert_eq!(raw[0].kind, "Glascow coma scale eye opening");
        assert_eq!(raw[2].hours, 1.5);
        assert_eq!(raw[3].value, Value::Float(7.38));
    }

    #[test]
    fn cleaning_maps_scores_and_rejects_text() {
        let table = read_csv(RAW.as_bytes()).unwrap();
        let clean = clean_text_fields(melt(&table).unwrap()).unwrap();
        assert_eq!(clean[0].value, Some(4.0));
        assert_eq!(clean[1].value, Some(86.0));
        assert_eq!(clean[4].value, Some(2.0));

        let bad = vec![RawObservation {
            hours: 0.0,
            kind: "Heart Rate".into(),
            value: Value::from("fast"),
        }];
        assert!(clean_text_fields(bad).is_err());
    }

    #[test]
    fn process_entry_stores_the_features() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let raw = filenames::benchmark_ts_raw_filename(base, Split::Train, 7, "episode1");
        std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
        std::fs::write(&raw, RAW).unwrap();

        let entry = ListEntry {
            stay: "7_episode1_timeseries.csv".into(),
            subject_id: 7,
            episode: "episode1".into(),
            split: Split::Train,
            ts_file: base.join("ts/7_episode1_timeseries.json.gz"),
            y_true: Value::Integer(0),
        };
        let windows = features::subsequence_windows(48.0);
        let record = process_entry(base, &entry, &windows).unwrap().unwrap();
        // three kinds, seven windows, nine statistics, three identifiers
        assert_eq!(record.len(), 3 * 7 * 9 + 3);

        let stored: Record = store::load(&entry.ts_file).unwrap();
        assert_eq!(stored.len(), record.len());
        assert_eq!(stored.last(), record.last());

        let count = record
            .iter()
            .find(|(k, _)| k == "Glascow coma scale eye opening__0.00-48.00__COUNT")
            .map(|(_, v)| v.clone());
        assert_eq!(count, Some(Value::Integer(1)));
    }

    #[test]
    fn stays_without_observations_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let raw = filenames::benchmark_ts_raw_filename(base, Split::Test, 8, "episode2");
        std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
        std::fs::write(&raw, "Hours,Heart Rate,pH\n0.5,,\n3.0,,\n").unwrap();

        let entry = ListEntry {
            stay: "8_episode2_timeseries.csv".into(),
            subject_id: 8,
            episode: "episode2".into(),
            split: Split::Test,
            ts_file: base.join("ts/8_episode2_timeseries.json.gz"),
            y_true: Value::Integer(1),
        };
        let record = process_entry(base, &entry, &features::subsequence_windows(48.0)).unwrap();
        assert!(record.is_none());
        assert!(!entry.ts_file.exists());
    }
}
