//! Path construction for the benchmark, MIMIC and analysis file trees.
//!
//! Every file the pipeline reads or writes is named here so that stages
//! agree on the layout:
//!
//! ```text
//! <benchmark_base>/<split>/<subject>/episode1.csv
//! <benchmark_base>/<split>/<subject>/episode1_timeseries.csv
//! <benchmark_base>/in-hospital-mortality/<split>/listfile.csv
//! <benchmark_base>/<problem>/<split>/ts-features/<subject>_<episode>_timeseries.json.gz
//! <analysis_base>/processed-note-events/subject-<s>_hadm-<h>_row-<r>.cleaned.json.gz
//! <analysis_base>/<split>/complete-records/<subject>_<episode>.json.gz
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Extension of serialized objects (the payload is JSON).
pub const OBJECT_EXT: &str = "json";
/// Default compression suffix for serialized objects.
pub const DEFAULT_COMPRESSION: Option<&str> = Some("gz");

const NOTE_EVENTS_DIR: &str = "processed-note-events";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilenameError {
    #[error("invalid split name: {0}. valid names are: train, test")]
    InvalidSplit(String),
    #[error(
        "invalid problem name: {0}. valid names are: decompensation, \
         in-hospital-mortality, length-of-stay, multitask, phenotyping"
    )]
    InvalidProblem(String),
}

// ---------------------------------------------------------------------------
// Harutyunyan et al. benchmarks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = FilenameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => Err(FilenameError::InvalidSplit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BenchmarkProblem {
    Decompensation,
    InHospitalMortality,
    LengthOfStay,
    Multitask,
    Phenotyping,
}

impl BenchmarkProblem {
    pub fn as_str(self) -> &'static str {
        match self {
            BenchmarkProblem::Decompensation => "decompensation",
            BenchmarkProblem::InHospitalMortality => "in-hospital-mortality",
            BenchmarkProblem::LengthOfStay => "length-of-stay",
            BenchmarkProblem::Multitask => "multitask",
            BenchmarkProblem::Phenotyping => "phenotyping",
        }
    }
}

impl fmt::Display for BenchmarkProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BenchmarkProblem {
    type Err = FilenameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decompensation" => Ok(BenchmarkProblem::Decompensation),
            "in-hospital-mortality" => Ok(BenchmarkProblem::InHospitalMortality),
            "length-of-stay" => Ok(BenchmarkProblem::LengthOfStay),
            "multitask" => Ok(BenchmarkProblem::Multitask),
            "phenotyping" => Ok(BenchmarkProblem::Phenotyping),
            other => Err(FilenameError::InvalidProblem(other.to_string())),
        }
    }
}

/// All features are built for predictions at 48 hours, so the dataset is
/// always derived from the in-hospital mortality problem.
pub const BENCHMARK_PROBLEM: BenchmarkProblem = BenchmarkProblem::InHospitalMortality;

// -- optional name pieces --

fn note_str(note: Option<&str>) -> String {
    match note {
        Some(n) if !n.is_empty() => format!(".{n}"),
        _ => String::new(),
    }
}

fn compression_str(compression: Option<&str>) -> String {
    match compression {
        Some(c) if !c.is_empty() => format!(".{c}"),
        _ => String::new(),
    }
}

fn row_str(row: Option<i64>) -> String {
    row.map(|r| format!("_row-{r}")).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// The actual filenames
// ---------------------------------------------------------------------------

/// All demographic and admission information for a subject's benchmark
/// episodes. `filetype` is typically `"csv.gz"` or `"parq"`.
pub fn benchmark_episodes_filename(
    benchmark_base: &Path,
    split: Split,
    subject_id: i64,
    filetype: &str,
    note: Option<&str>,
) -> PathBuf {
    let fname = format!("episodes-updated{}.{filetype}", note_str(note));
    benchmark_base
        .join(split.as_str())
        .join(subject_id.to_string())
        .join(fname)
}

/// The raw time series written by the benchmark scripts.
pub fn benchmark_ts_raw_filename(
    benchmark_base: &Path,
    split: Split,
    subject_id: i64,
    episode_id: &str,
) -> PathBuf {
    benchmark_base
        .join(split.as_str())
        .join(subject_id.to_string())
        .join(format!("{episode_id}_timeseries.csv"))
}

/// A single benchmark episode file, e.g. `.../12741/episode1.csv`.
pub fn benchmark_single_episode_filename(
    benchmark_base: &Path,
    split: Split,
    subject_id: i64,
    episode_id: &str,
    filetype: &str,
    note: Option<&str>,
) -> PathBuf {
    let fname = format!("{episode_id}{}.{filetype}", note_str(note));
    benchmark_base
        .join(split.as_str())
        .join(subject_id.to_string())
        .join(fname)
}

/// The subject's stays file; `updated` picks `stays-updated` over `stays`.
pub fn benchmark_stays_filename(
    benchmark_base: &Path,
    split: Split,
    subject_id: i64,
    filetype: &str,
    note: Option<&str>,
    updated: bool,
) -> PathBuf {
    let stem = if updated { "stays-updated" } else { "stays" };
    let fname = format!("{stem}{}.{filetype}", note_str(note));
    benchmark_base
        .join(split.as_str())
        .join(subject_id.to_string())
        .join(fname)
}

/// Time-series features for one subject and episode.
pub fn benchmark_ts_filename(
    benchmark_base: &Path,
    problem: BenchmarkProblem,
    split: Split,
    subject_id: i64,
    episode_id: &str,
    compression: Option<&str>,
    note: Option<&str>,
) -> PathBuf {
    let fname = format!(
        "{subject_id}_{episode_id}_timeseries{}.{OBJECT_EXT}{}",
        note_str(note),
        compression_str(compression)
    );
    benchmark_base
        .join(problem.as_str())
        .join(split.as_str())
        .join("ts-features")
        .join(fname)
}

/// The benchmark list file of a split.
pub fn benchmark_listfile(benchmark_base: &Path, split: Split) -> PathBuf {
    benchmark_base
        .join(BENCHMARK_PROBLEM.as_str())
        .join(split.as_str())
        .join("listfile.csv")
}

/// The fitted count vectorizer for the notes.
pub fn notes_count_vectorizer_filename(base_path: &Path) -> PathBuf {
    base_path
        .join(NOTE_EVENTS_DIR)
        .join(format!("notes-bow-count-vectorizer.{OBJECT_EXT}.gz"))
}

/// A processed NOTEEVENTS file. With a `row_id` the file holds one note,
/// without one it holds all notes of the admission.
pub fn note_event_filename(
    base_path: &Path,
    subject_id: i64,
    hadm_id: i64,
    row_id: Option<i64>,
    compression: Option<&str>,
    note: Option<&str>,
) -> PathBuf {
    let fname = format!(
        "subject-{subject_id}_hadm-{hadm_id}{}{}.{OBJECT_EXT}{}",
        row_str(row_id),
        note_str(note),
        compression_str(compression)
    );
    base_path.join(NOTE_EVENTS_DIR).join(fname)
}

/// The complete record (all features) for one episode.
pub fn record_filename(
    base_path: &Path,
    split: Split,
    subject_id: i64,
    episode_id: &str,
    compression: Option<&str>,
    note: Option<&str>,
) -> PathBuf {
    let fname = format!(
        "{subject_id}_{episode_id}{}.{OBJECT_EXT}{}",
        note_str(note),
        compression_str(compression)
    );
    base_path
        .join(split.as_str())
        .join("complete-records")
        .join(fname)
}

/// A raw MIMIC table such as `ADMISSIONS` or `NOTEEVENTS`. The compressed
/// `.csv.gz` distribution is preferred; a plain `.csv` is used when it is
/// the only one present.
pub fn mimic_table_filename(mimic_base: &Path, table: &str) -> PathBuf {
    let gz = mimic_base.join(format!("{table}.csv.gz"));
    let plain = mimic_base.join(format!("{table}.csv"));
    if !gz.exists() && plain.exists() { plain } else { gz }
}
