//! Extended MIMIC-III dataset CLI
//!
//! Runs the pipeline stages one at a time or all together.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use mimic_extended::{Config, Limits, episodes, init_rayon, listfile, notes, records, run_pipeline, timeseries};

#[derive(Parser)]
#[command(name = "mimic-extended")]
#[command(about = "Build the extended MIMIC-III benchmark dataset", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override the number of items per parallel task
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Override the worker thread count
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Log filter, e.g. `debug` or `info,mimic_extended::notes=debug`
    /// (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage in order (default if no command specified)
    Run {
        /// Only process the first N list file rows
        #[arg(long)]
        num_episodes: Option<usize>,

        /// Only process the first N notes
        #[arg(long)]
        num_notes: Option<usize>,
    },

    /// Expand the benchmark list files with identifiers and file paths
    BuildListfile,

    /// Join stays, admissions and episode files
    ExtendEpisodes,

    /// Extract window statistics from the episode time series
    ExtractTsFeatures {
        /// Only process the first N list file rows
        #[arg(long)]
        num_episodes: Option<usize>,
    },

    /// Clean, vectorize and combine the clinical notes
    NotesBow {
        /// Only process the first N notes
        #[arg(long)]
        num_notes: Option<usize>,
    },

    /// Assemble the complete per-episode records
    AssembleRecords,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::new()
        .parse_filters(&cli.log_level)
        .parse_default_env()
        .init();

    match &cli.command {
        None => run_pipeline(&setup(&cli)?, Limits::default())?,

        Some(Commands::Run { num_episodes, num_notes }) => {
            let limits = Limits {
                num_episodes: *num_episodes,
                num_notes: *num_notes,
            };
            run_pipeline(&setup(&cli)?, limits)?;
        }

        Some(Commands::BuildListfile) => {
            listfile::run(&setup(&cli)?)?;
        }

        Some(Commands::ExtendEpisodes) => {
            episodes::run(&setup(&cli)?)?;
        }

        Some(Commands::ExtractTsFeatures { num_episodes }) => {
            timeseries::run(&setup(&cli)?, *num_episodes)?;
        }

        Some(Commands::NotesBow { num_notes }) => {
            notes::run(&setup(&cli)?, *num_notes)?;
        }

        Some(Commands::AssembleRecords) => {
            records::run(&setup(&cli)?)?;
        }

        Some(Commands::Validate) => {
            validate_command(&cli.config)?;
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
        }
    }

    Ok(())
}

/// Load the configuration with command line overrides and size the pool.
fn setup(cli: &Cli) -> Result<Config> {
    let config = load_config(&cli.config, cli.chunk_size, cli.threads)?;
    init_rayon(config.processing.threads)?;
    Ok(config)
}

fn load_config(path: &Path, chunk_size: Option<usize>, threads: Option<usize>) -> Result<Config> {
    let mut config = Config::from_file(path)?;

    // Apply overrides
    if let Some(c) = chunk_size {
        config.processing.chunk_size = c;
    }
    if threads.is_some() {
        config.processing.threads = threads;
    }

    config.validate()?;
    Ok(config)
}

fn validate_command(config_path: &Path) -> Result<()> {
    let config = Config::from_file(config_path)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: &Path) -> Result<()> {
    let yaml = r#"# Extended MIMIC-III dataset configuration

# === INPUTS ===
# Root of the Harutyunyan et al. benchmark tree
benchmark_base: "/data/mimic-benchmarks"

# Directory with the MIMIC-III tables (ADMISSIONS.csv.gz, NOTEEVENTS.csv.gz)
mimic_basepath: "/data/mimic-iii-1.4"

# all_stays.csv written by the benchmark scripts
all_stays: "/data/mimic-benchmarks/root/all_stays.csv"

# Text file listing every benchmark episode file, one path per line
all_episodes_list: "/data/mimic-benchmarks/all-episodes.txt"

# Episode file whose "Diagnosis <code>" columns define the diagnosis features
# (default: first entry of all_episodes_list)
# diagnosis_reference_episode: "/data/mimic-benchmarks/train/12741/episode1.csv"

# === OUTPUTS ===
# Processed notes and per-episode records are written below this directory
analysis_basepath: "/data/mimic-extended"

all_episodes: "/data/mimic-extended/all-episodes.csv.gz"
complete_listfile: "/data/mimic-extended/complete-listfile.csv"
time_series_features: "/data/mimic-extended/time-series-features.csv.gz"
episode_notes: "/data/mimic-extended/episode-notes.csv"
complete_records: "/data/mimic-extended/complete-records.parquet"

# === PROCESSING ===
processing:
  # Items handed to one parallel task
  chunk_size: 100

  # Worker threads (null = num CPUs)
  # threads: 16

time_series:
  # Observation period the feature windows are fractions of
  period_length_hours: 48

notes:
  # Notes charted later than this after admission are ignored
  episode_length_hours: 48

  # Vocabulary pruning: integer = number of notes, float = proportion
  min_df: 1
  max_df: 1.0
"#;

    std::fs::write(output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_default() {
        // No subcommand - should default to Run
        let cli = Cli::try_parse_from(["mimic-extended"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_cli_parse_stage_with_limit() {
        let cli = Cli::try_parse_from([
            "mimic-extended",
            "extract-ts-features",
            "--num-episodes",
            "10",
            "-c",
            "other.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("other.yaml"));
        assert!(matches!(
            cli.command,
            Some(Commands::ExtractTsFeatures { num_episodes: Some(10) })
        ));
    }

    #[test]
    fn test_cli_parse_global_overrides() {
        let cli = Cli::try_parse_from([
            "mimic-extended",
            "notes-bow",
            "--chunk-size",
            "7",
            "--threads",
            "2",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.chunk_size, Some(7));
        assert_eq!(cli.threads, Some(2));
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_generated_config_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        generate_config_command(&path).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.processing.chunk_size, 100);
    }

    #[test]
    fn test_overrides_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        generate_config_command(&path).unwrap();
        assert_eq!(load_config(&path, Some(5), Some(3)).unwrap().processing.threads, Some(3));
        assert!(load_config(&path, Some(0), None).is_err());
    }
}
