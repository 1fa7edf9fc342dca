use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use flate2::Compression;
use flate2::write::GzEncoder;
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Value as JsonValue};

use super::loader::TableFormat;
use super::model::{Table, Value};

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write a table to a file, choosing the format from the extension.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let result = match TableFormat::from_path(path)? {
        TableFormat::Csv => {
            let file = File::create(path)?;
            write_csv(table, BufWriter::new(file))
        }
        TableFormat::CsvGz => {
            let file = File::create(path)?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            write_csv(table, &mut encoder)?;
            encoder.finish()?.flush()?;
            Ok(())
        }
        TableFormat::Parquet => write_parquet(table, path),
        TableFormat::Json => write_json(table, path),
    };
    result.with_context(|| format!("writing table {}", path.display()))
}

// ---------------------------------------------------------------------------
// CSV writer
// ---------------------------------------------------------------------------

/// Write the header and every row; missing values become empty fields.
pub fn write_csv<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(Value::to_field))?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON writer
// ---------------------------------------------------------------------------

fn write_json(table: &Table, path: &Path) -> Result<()> {
    let records: Vec<JsonValue> = table
        .rows
        .iter()
        .map(|row| {
            let obj: Map<String, JsonValue> = table
                .columns
                .iter()
                .zip(row)
                .map(|(c, v)| (c.clone(), value_to_json(v)))
                .collect();
            JsonValue::Object(obj)
        })
        .collect();
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), &records)?;
    Ok(())
}

fn value_to_json(v: &Value) -> JsonValue {
    match v {
        Value::String(s) | Value::Date(s) => JsonValue::String(s.clone()),
        Value::Integer(i) => JsonValue::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Null => JsonValue::Null,
    }
}

// ---------------------------------------------------------------------------
// Parquet writer
// ---------------------------------------------------------------------------

/// Narrowest Arrow type that holds every non-null cell of a column.
fn column_type(table: &Table, idx: usize) -> DataType {
    let mut ints = true;
    let mut numbers = true;
    let mut bools = true;
    for row in &table.rows {
        match &row[idx] {
            Value::Null => {}
            Value::Integer(_) => bools = false,
            Value::Float(_) => {
                ints = false;
                bools = false;
            }
            Value::Bool(_) => {
                ints = false;
                numbers = false;
            }
            Value::String(_) | Value::Date(_) => {
                ints = false;
                numbers = false;
                bools = false;
            }
        }
    }
    if ints {
        DataType::Int64
    } else if numbers {
        DataType::Float64
    } else if bools {
        DataType::Boolean
    } else {
        DataType::Utf8
    }
}

fn build_array(table: &Table, idx: usize, data_type: &DataType) -> ArrayRef {
    let cells = table.rows.iter().map(|r| &r[idx]);
    match data_type {
        DataType::Int64 => Arc::new(Int64Array::from(
            cells.map(Value::as_i64).collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            cells.map(Value::as_f64).collect::<Vec<_>>(),
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            cells
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        _ => Arc::new(StringArray::from(
            cells
                .map(|v| if v.is_null() { None } else { Some(v.to_field()) })
                .collect::<Vec<_>>(),
        )),
    }
}

fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    let types: Vec<DataType> = (0..table.columns.len())
        .map(|i| column_type(table, i))
        .collect();

    let schema = Arc::new(Schema::new(
        table
            .columns
            .iter()
            .zip(&types)
            .map(|(name, t)| Field::new(name, t.clone(), true))
            .collect::<Vec<_>>(),
    ));

    let arrays: Vec<ArrayRef> = types
        .iter()
        .enumerate()
        .map(|(i, t)| build_array(table, i, t))
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
