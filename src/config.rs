//! Configuration for the extended dataset pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration: where every input lives and every output goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the Harutyunyan et al. benchmark tree
    pub benchmark_base: PathBuf,

    /// Directory holding the MIMIC-III tables (ADMISSIONS, NOTEEVENTS, ...)
    pub mimic_basepath: PathBuf,

    /// Directory for processed notes and complete records
    pub analysis_basepath: PathBuf,

    /// The benchmark `all_stays.csv`
    pub all_stays: PathBuf,

    /// Text file listing every benchmark episode file, one per line
    pub all_episodes_list: PathBuf,

    /// Output of the extend-episodes stage
    pub all_episodes: PathBuf,

    /// Output of the build-listfile stage
    pub complete_listfile: PathBuf,

    /// Output of the time-series feature stage
    pub time_series_features: PathBuf,

    /// Output of the notes stage (per-admission index)
    pub episode_notes: PathBuf,

    /// Output of the record assembly stage
    pub complete_records: PathBuf,

    /// Episode file whose `Diagnosis <code>` columns define the diagnosis
    /// features. Defaults to the first entry of `all_episodes_list`.
    #[serde(default)]
    pub diagnosis_reference_episode: Option<PathBuf>,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Time-series feature configuration
    #[serde(default)]
    pub time_series: TimeSeriesConfig,

    /// Clinical notes configuration
    #[serde(default)]
    pub notes: NotesConfig,
}

/// Chunking and thread pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of items handed to one parallel task
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Rayon thread pool size (null = num CPUs)
    #[serde(default)]
    pub threads: Option<usize>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            threads: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesConfig {
    /// Length of the observation period the windows are fractions of
    #[serde(default = "default_period_hours")]
    pub period_length_hours: f64,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            period_length_hours: default_period_hours(),
        }
    }
}

/// Document frequency bound for vocabulary pruning: an absolute number of
/// documents, or a proportion of all documents in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocFrequency {
    Count(u64),
    Proportion(f64),
}

impl DocFrequency {
    /// Resolve to a document count for a corpus of `n_docs` documents.
    pub fn resolve(self, n_docs: u64) -> f64 {
        match self {
            DocFrequency::Count(c) => c as f64,
            DocFrequency::Proportion(p) => p * n_docs as f64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesConfig {
    /// Notes charted later than this after admission are not used
    #[serde(default = "default_period_hours")]
    pub episode_length_hours: f64,

    /// Ignore tokens found in fewer documents
    #[serde(default = "default_min_df")]
    pub min_df: DocFrequency,

    /// Ignore tokens found in more documents
    #[serde(default = "default_max_df")]
    pub max_df: DocFrequency,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            episode_length_hours: default_period_hours(),
            min_df: default_min_df(),
            max_df: default_max_df(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            // YAML is a superset of JSON
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processing.chunk_size == 0 {
            anyhow::bail!("Chunk size must be > 0");
        }
        if self.processing.threads == Some(0) {
            anyhow::bail!("Thread count must be > 0");
        }
        if !(self.time_series.period_length_hours > 0.0) {
            anyhow::bail!("Time series period length must be > 0 hours");
        }
        if !(self.notes.episode_length_hours > 0.0) {
            anyhow::bail!("Notes episode length must be > 0 hours");
        }
        for (name, bound) in [("min_df", self.notes.min_df), ("max_df", self.notes.max_df)] {
            if let DocFrequency::Proportion(p) = bound {
                if !(0.0..=1.0).contains(&p) {
                    anyhow::bail!("{name} proportion must be within [0, 1], got {p}");
                }
            }
        }
        if let (DocFrequency::Count(min), DocFrequency::Count(max)) =
            (self.notes.min_df, self.notes.max_df)
        {
            if max < min {
                anyhow::bail!("max_df ({max}) corresponds to fewer documents than min_df ({min})");
            }
        }
        Ok(())
    }

    /// Configuration with every file laid out under one directory, the way
    /// the sample generator and `generate-config` arrange them.
    pub fn under_root(root: &Path) -> Self {
        let benchmark_base = root.join("benchmarks");
        let analysis = root.join("analysis");
        Self {
            all_stays: benchmark_base.join("root").join("all_stays.csv"),
            all_episodes_list: benchmark_base.join("all_episodes_list.txt"),
            benchmark_base,
            mimic_basepath: root.join("mimic"),
            all_episodes: analysis.join("all-episodes.csv.gz"),
            complete_listfile: analysis.join("complete-listfile.csv"),
            time_series_features: analysis.join("time-series-features.csv.gz"),
            episode_notes: analysis.join("episode-notes.csv"),
            complete_records: analysis.join("complete-records.parquet"),
            analysis_basepath: analysis,
            diagnosis_reference_episode: None,
            processing: ProcessingConfig::default(),
            time_series: TimeSeriesConfig::default(),
            notes: NotesConfig::default(),
        }
    }
}

// Default value functions for serde
fn default_chunk_size() -> usize { 100 }
fn default_period_hours() -> f64 { 48.0 }
fn default_min_df() -> DocFrequency { DocFrequency::Count(1) }
fn default_max_df() -> DocFrequency { DocFrequency::Proportion(1.0) }

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
benchmark_base: /data/benchmarks
mimic_basepath: /data/mimic
analysis_basepath: /data/analysis
all_stays: /data/benchmarks/root/all_stays.csv
all_episodes_list: /data/all-episodes.txt
all_episodes: /data/analysis/all-episodes.csv.gz
complete_listfile: /data/analysis/listfile.csv
time_series_features: /data/analysis/ts.csv.gz
episode_notes: /data/analysis/notes.csv
complete_records: /data/analysis/records.parquet
"#;

    #[test]
    fn minimal_yaml_uses_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.processing.chunk_size, 100);
        assert_eq!(config.time_series.period_length_hours, 48.0);
        assert_eq!(config.notes.min_df, DocFrequency::Count(1));
        assert_eq!(config.notes.max_df, DocFrequency::Proportion(1.0));
        assert!(config.diagnosis_reference_episode.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn doc_frequencies_accept_counts_and_proportions() {
        let yaml = format!("{MINIMAL}notes:\n  min_df: 5\n  max_df: 0.8\n");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.notes.min_df, DocFrequency::Count(5));
        assert_eq!(config.notes.max_df, DocFrequency::Proportion(0.8));
        assert_eq!(config.notes.max_df.resolve(10), 8.0);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.processing.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.notes.max_df = DocFrequency::Proportion(1.5);
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.notes.min_df = DocFrequency::Count(10);
        config.notes.max_df = DocFrequency::Count(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_round_trip_of_generated_layout() {
        let config = Config::under_root(Path::new("/tmp/mimic-sample"));
        let back = Config::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(back.all_stays, config.all_stays);
        assert_eq!(back.complete_records, config.complete_records);
    }
}
