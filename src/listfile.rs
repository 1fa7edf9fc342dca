//! Build the extended list file: the benchmark list files of both splits
//! plus the identifiers and paths every later stage needs.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::data::{Table, Value, read_table, write_table};
use crate::filenames::{self, BENCHMARK_PROBLEM, DEFAULT_COMPRESSION, Split};

pub const STAY: &str = "stay";
pub const SUBJECT_ID: &str = "SUBJECT_ID";
pub const EPISODE: &str = "EPISODE";
pub const STAYS_FILE: &str = "STAYS_FILE";
pub const EPISODE_FILE: &str = "EPISODE_FILE";
pub const ALL_EPISODES_FILE: &str = "ALL_EPISODES_FILE";
pub const TS_FILE: &str = "TS_FILE";
pub const SPLIT: &str = "SPLIT";

/// One row of the extended list file.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    /// e.g. `12741_episode1_timeseries.csv`
    pub stay: String,
    pub subject_id: i64,
    /// e.g. `episode1`
    pub episode: String,
    pub split: Split,
    pub ts_file: std::path::PathBuf,
    /// The label column of the benchmark list file, if present.
    pub y_true: Value,
}

/// Split a benchmark stay name into `(subject_id, episode)`.
pub fn parse_stay(stay: &str) -> Result<(i64, String)> {
    let mut parts = stay.split('_');
    let subject = parts.next().unwrap_or("");
    let subject_id = subject
        .parse::<i64>()
        .with_context(|| format!("stay '{stay}' does not start with a subject id"))?;
    let episode = parts
        .next()
        .with_context(|| format!("stay '{stay}' has no episode part"))?;
    Ok((subject_id, episode.to_string()))
}

fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}

/// Read one split's benchmark list file and add the derived columns.
pub fn build_listfile(benchmark_base: &Path, split: Split) -> Result<Table> {
    let listfile = filenames::benchmark_listfile(benchmark_base, split);
    log::info!("Loading listfile: '{}'", listfile.display());

    let mut table = read_table(&listfile)?;
    let stays = table.column(STAY)?;

    let mut subject_ids = Vec::with_capacity(stays.len());
    let mut episodes = Vec::with_capacity(stays.len());
    let mut stays_files = Vec::with_capacity(stays.len());
    let mut episode_files = Vec::with_capacity(stays.len());
    let mut all_episodes_files = Vec::with_capacity(stays.len());
    let mut ts_files = Vec::with_capacity(stays.len());

    for stay in stays {
        let stay = stay.to_field();
        let (subject_id, episode) = parse_stay(&stay)?;

        stays_files.push(path_value(&filenames::benchmark_stays_filename(
            benchmark_base,
            split,
            subject_id,
            "csv.gz",
            None,
            true,
        )));
        episode_files.push(path_value(&filenames::benchmark_single_episode_filename(
            benchmark_base,
            split,
            subject_id,
            &episode,
            "csv",
            None,
        )));
        all_episodes_files.push(path_value(&filenames::benchmark_episodes_filename(
            benchmark_base,
            split,
            subject_id,
            "csv.gz",
            None,
        )));
        ts_files.push(path_value(&filenames::benchmark_ts_filename(
            benchmark_base,
            BENCHMARK_PROBLEM,
            split,
            subject_id,
            &episode,
            DEFAULT_COMPRESSION,
            None,
        )));
        subject_ids.push(Value::Integer(subject_id));
        episodes.push(Value::String(episode));
    }

    let n = table.len();
    table.add_column(SUBJECT_ID, subject_ids)?;
    table.add_column(EPISODE, episodes)?;
    table.add_column(STAYS_FILE, stays_files)?;
    table.add_column(EPISODE_FILE, episode_files)?;
    table.add_column(ALL_EPISODES_FILE, all_episodes_files)?;
    table.add_column(TS_FILE, ts_files)?;
    table.add_column(SPLIT, vec![Value::from(split.as_str()); n])?;

    Ok(table)
}

/// Interpret the rows of an extended list file.
pub fn entries(table: &Table) -> Result<Vec<ListEntry>> {
    (0..table.len())
        .map(|row| {
            let stay = table.get(row, STAY).to_field();
            let subject_id = table
                .get(row, SUBJECT_ID)
                .as_i64()
                .with_context(|| format!("list file row {row}: invalid {SUBJECT_ID}"))?;
            let split: Split = table.get(row, SPLIT).to_field().parse()?;
            Ok(ListEntry {
                stay,
                subject_id,
                episode: table.get(row, EPISODE).to_field(),
                split,
                ts_file: table.get(row, TS_FILE).to_field().into(),
                y_true: table.get(row, "y_true").clone(),
            })
        })
        .collect()
}

/// Stage entry point: build both splits and write the complete list file.
pub fn run(config: &Config) -> Result<Table> {
    let tables = Split::ALL
        .iter()
        .map(|&split| build_listfile(&config.benchmark_base, split))
        .collect::<Result<Vec<_>>>()?;
    let listfile = Table::concat(tables);

    log::info!(
        "Writing extended list file: '{}'",
        config.complete_listfile.display()
    );
    write_table(&listfile, &config.complete_listfile)?;
    Ok(listfile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12741_episode1_timeseries.csv", 12741, "episode1")]
    #[case("3_episode12_timeseries.csv", 3, "episode12")]
    fn stays_split_into_subject_and_episode(
        #[case] stay: &str,
        #[case] subject: i64,
        #[case] episode: &str,
    ) {
        assert_eq!(parse_stay(stay).unwrap(), (subject, episode.to_string()));
    }

    #[rstest]
    #[case("abc_episode1_timeseries.csv")]
    #[case("12741")]
    fn malformed_stays_are_rejected(#[case] stay: &str) {
        assert!(parse_stay(stay).is_err());
    }

    #[test]
    fn build_listfile_adds_paths_and_split() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let listfile = filenames::benchmark_listfile(base, Split::Test);
        std::fs::create_dir_all(listfile.parent().unwrap()).unwrap();
        std::fs::write(&listfile, "stay,y_true\n12741_episode1_timeseries.csv,1\n").unwrap();

        let table = build_listfile(base, Split::Test).unwrap();
        assert_eq!(table.get(0, SUBJECT_ID), &Value::Integer(12741));
        assert_eq!(table.get(0, EPISODE), &Value::from("episode1"));
        assert_eq!(table.get(0, SPLIT), &Value::from("test"));
        assert_eq!(
            table.get(0, EPISODE_FILE).to_field(),
            base.join("test/12741/episode1.csv").display().to_string()
        );
        assert_eq!(
            table.get(0, STAYS_FILE).to_field(),
            base.join("test/12741/stays-updated.csv.gz").display().to_string()
        );

        let entries = entries(&table).unwrap();
        assert_eq!(entries[0].split, Split::Test);
        assert_eq!(entries[0].y_true, Value::Integer(1));
        assert!(entries[0].ts_file.ends_with("in-hospital-mortality/test/ts-features/12741_episode1_timeseries.json.gz"));
    }
}
