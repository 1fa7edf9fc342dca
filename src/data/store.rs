use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::loader::open_maybe_gz;
use super::writer::ensure_parent_dir;

/// Serialize `value` as JSON to `path`, gzip-compressed when the path ends
/// in `.gz`. Parent directories are created.
pub fn dump<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let writer = BufWriter::new(file);

    let is_gz = path.extension().and_then(|e| e.to_str()) == Some("gz");
    if is_gz {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        serde_json::to_writer(&mut encoder, value)
            .with_context(|| format!("serializing {}", path.display()))?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = writer;
        serde_json::to_writer(&mut writer, value)
            .with_context(|| format!("serializing {}", path.display()))?;
        writer.flush()?;
    }
    Ok(())
}

/// Read back an object written by [`dump`].
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = open_maybe_gz(path)?;
    serde_json::from_reader(reader).with_context(|| format!("deserializing {}", path.display()))
}
