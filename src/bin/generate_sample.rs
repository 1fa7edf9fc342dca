//! Write a small synthetic MIMIC-III and benchmark tree for trying the
//! pipeline without credentialed data access.
//!
//! ```text
//! generate_sample [OUTPUT_DIR] [--seed N]
//! mimic-extended -c OUTPUT_DIR/config.yaml run
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use mimic_extended::sample;

#[derive(Parser)]
#[command(name = "generate_sample")]
#[command(about = "Write a synthetic MIMIC-III / benchmark tree", long_about = None)]
struct Args {
    /// Directory to write the tree into
    #[arg(default_value = "mimic-sample")]
    output: PathBuf,

    /// Seed of the deterministic generator
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    sample::write_sample_tree(&args.output, args.seed)?;

    println!(
        "Wrote sample data to {}; run the pipeline with:\n  mimic-extended -c {} run",
        args.output.display(),
        args.output.join(sample::CONFIG_FILE).display()
    );
    Ok(())
}
