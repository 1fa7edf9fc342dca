//! Join the MIMIC ADMISSIONS table with the "stays" and "episode" files
//! created by the Harutyunyan et al. benchmark scripts.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::data::filter::{NullRules, null_out};
use crate::data::{Table, Value, read_table, write_table};
use crate::filenames;
use crate::parallel;

pub const ADMISSIONS_COLS: [&str; 12] = [
    "ADMISSION_LOCATION",
    "ADMISSION_TYPE",
    "DISCHARGE_LOCATION",
    "EDOUTTIME",
    "EDREGTIME",
    "HAS_CHARTEVENTS_DATA",
    "HOSPITAL_EXPIRE_FLAG",
    "INSURANCE",
    "LANGUAGE",
    "MARITAL_STATUS",
    "RELIGION",
    // and join on the HADM_ID
    "HADM_ID",
];

pub const EPISODE_RENAME_COLS: [(&str, &str); 3] = [
    ("Height", "HEIGHT"),
    ("Weight", "WEIGHT"),
    ("Icustay", "ICUSTAY_ID"),
];

pub const UNKNOWN_ETHNICITIES: [&str; 3] = [
    "UNKNOWN/NOT SPECIFIED",
    "PATIENT DECLINED TO ANSWER",
    "UNABLE TO OBTAIN",
];

const DIAGNOSIS_PREFIX: &str = "Diagnosis ";
pub const DIAGNOSIS_ICD9_PREFIX: &str = "DIAGNOSIS_ICD9_";

/// Placeholder values in the joined table that stand for "unknown".
pub fn unknown_value_rules() -> NullRules {
    let mut rules = NullRules::new();
    rules.insert(
        "ETHNICITY".into(),
        UNKNOWN_ETHNICITIES.iter().map(|&e| Value::from(e)).collect(),
    );
    rules.insert(
        "ADMISSION_LOCATION".into(),
        BTreeSet::from([Value::from("** INFO NOT AVAILABLE **")]),
    );
    rules.insert(
        "MARITAL_STATUS".into(),
        BTreeSet::from([Value::from("UNKNOWN (DEFAULT)")]),
    );
    rules
}

/// Column renames applied to every episode file: the fixed renames plus
/// `Diagnosis <code>` → `DIAGNOSIS_ICD9_<code>` for every diagnosis column
/// of the reference episode.
#[derive(Debug, Clone)]
pub struct EpisodeSchema {
    pub renames: BTreeMap<String, String>,
    /// Columns kept after renaming, `EPISODE` last.
    pub columns: Vec<String>,
}

impl EpisodeSchema {
    pub fn from_reference(reference_columns: &[String]) -> Self {
        let mut renames: BTreeMap<String, String> = EPISODE_RENAME_COLS
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        let mut columns: Vec<String> = EPISODE_RENAME_COLS
            .iter()
            .map(|(_, to)| to.to_string())
            .collect();

        for c in reference_columns {
            if let Some(code) = c.strip_prefix(DIAGNOSIS_PREFIX) {
                let renamed = format!("{DIAGNOSIS_ICD9_PREFIX}{code}");
                renames.insert(c.clone(), renamed.clone());
                columns.push(renamed);
            }
        }
        columns.push("EPISODE".to_string());

        EpisodeSchema { renames, columns }
    }

    /// Read the reference episode file and derive the schema from its header.
    pub fn load(reference_episode: &Path) -> Result<Self> {
        let reference = read_table(reference_episode)
            .context("reading the diagnosis reference episode")?;
        Ok(Self::from_reference(&reference.columns))
    }
}

/// Load one episode file, rename its columns and keep the schema columns.
pub fn load_and_clean_episode(episode: &Path, schema: &EpisodeSchema) -> Result<Table> {
    let mut table = read_table(episode)?;
    let episode_name = episode
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("episode file without a name: {}", episode.display()))?
        .to_string();

    table.rename_columns(&schema.renames);
    let n = table.len();
    table.add_column("EPISODE", vec![Value::String(episode_name); n])?;

    table
        .select(schema.columns.as_slice())
        .with_context(|| format!("selecting episode columns of {}", episode.display()))
}

/// Load every episode file, `chunk_size` files per parallel task.
pub fn load_and_clean_episodes(
    episodes: &[PathBuf],
    schema: &EpisodeSchema,
    chunk_size: usize,
) -> Result<Table> {
    let chunks = parallel::apply_chunks(episodes, chunk_size, "episode files", |chunk| {
        chunk
            .iter()
            .map(|e| load_and_clean_episode(e, schema))
            .collect::<Result<Vec<_>>>()
    })?;
    Ok(Table::concat(chunks.into_iter().flatten().collect()))
}

/// Read the episode list: one path per line, blank lines ignored.
pub fn read_episode_list(path: &Path) -> Result<Vec<PathBuf>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading episode list {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Join stays, admissions and episodes into the extended episode table.
pub fn extend_episodes(stays: &Table, admissions: &Table, episodes: &Table) -> Result<Table> {
    log::info!("Merging stays and admissions");
    let admissions = admissions.select(&ADMISSIONS_COLS[..])?;
    let extended = stays.inner_join(&admissions, "HADM_ID")?;

    log::info!("Joining the \"episode\" information");
    let mut extended = extended.inner_join(episodes, "ICUSTAY_ID")?;

    log::info!("Cleaning up various \"unknown\" fields");
    let nulled = null_out(&mut extended, &unknown_value_rules());
    log::debug!("replaced {nulled} unknown values");

    log::info!("Adding \"episode\" filenames");
    let episode_names = (0..extended.len())
        .map(|row| {
            Value::String(format!(
                "{}_{}_timeseries.csv",
                extended.get(row, "SUBJECT_ID").to_field(),
                extended.get(row, "EPISODE").to_field()
            ))
        })
        .collect();
    extended.add_column("EPISODE_NAME", episode_names)?;

    Ok(extended)
}

/// Stage entry point.
pub fn run(config: &Config) -> Result<Table> {
    log::info!("Reading the \"stays\" information");
    let stays = read_table(&config.all_stays)?;

    log::info!("Loading the admissions table");
    let admissions = read_table(&filenames::mimic_table_filename(
        &config.mimic_basepath,
        "ADMISSIONS",
    ))?;

    log::info!("Loading the \"episode\" information");
    let episode_files = read_episode_list(&config.all_episodes_list)?;
    let reference = match &config.diagnosis_reference_episode {
        Some(path) => path.clone(),
        None => episode_files
            .first()
            .cloned()
            .context("the episode list is empty")?,
    };
    let schema = EpisodeSchema::load(&reference)?;
    log::debug!(
        "{} diagnosis columns from {}",
        schema.columns.len() - EPISODE_RENAME_COLS.len() - 1,
        reference.display()
    );

    let episodes =
        load_and_clean_episodes(&episode_files, &schema, config.processing.chunk_size)?;

    let extended = extend_episodes(&stays, &admissions, &episodes)?;

    log::info!(
        "Writing extended data frame to: '{}'",
        config.all_episodes.display()
    );
    write_table(&extended, &config.all_episodes)?;
    Ok(extended)
}
