//! Extended MIMIC-III benchmark dataset.
//!
//! Batch pipeline over the MIMIC-III tables and the Harutyunyan et al.
//! benchmark tree. Each stage reads the files written by the ones before it:
//!
//! ```text
//!  listfile ──► episodes ──► timeseries ──► notes ──► records
//!  (list file)  (ADMISSIONS   (window        (bag of    (one row per
//!               ⋈ stays       statistics)    words)     episode)
//!               ⋈ episodes)
//! ```

pub mod config;
pub mod data;
pub mod episodes;
pub mod filenames;
pub mod listfile;
pub mod notes;
pub mod parallel;
pub mod records;
pub mod sample;
pub mod timeseries;

pub use config::Config;
pub use parallel::init_rayon;

use anyhow::Result;

/// Row limits for debugging runs; `None` processes everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    pub num_episodes: Option<usize>,
    pub num_notes: Option<usize>,
}

/// Run every stage in order.
pub fn run_pipeline(config: &Config, limits: Limits) -> Result<()> {
    log::info!("Building the extended list file");
    listfile::run(config)?;

    log::info!("Extending the episodes");
    episodes::run(config)?;

    log::info!("Extracting time-series features");
    timeseries::run(config, limits.num_episodes)?;

    log::info!("Creating the notes bags-of-words");
    notes::run(config, limits.num_notes)?;

    log::info!("Assembling the complete records");
    let records = records::run(config)?;
    log::info!("Pipeline complete: {} records", records.len());
    Ok(())
}
