use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Value – a single cell in a table column
// ---------------------------------------------------------------------------

/// A dynamically-typed cell covering the column types found in the MIMIC
/// and benchmark CSV files.
/// Tables index rows by these values, so `Value` must be `Ord` and `Hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// `YYYY-MM-DD[ HH:MM:SS]` timestamp kept as text.
    Date(String),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) | (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) | Value::Date(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Null => write!(f, "<null>"),
        }
    }
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

impl Value {
    /// Guess the type of a raw CSV field. Empty fields are missing.
    pub fn parse(s: &str) -> Value {
        if s.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Value::from_f64(f);
        }
        if s == "True" || s == "False" {
            return Value::Bool(s == "True");
        }
        if parse_datetime(s).is_some() {
            return Value::Date(s.to_string());
        }
        Value::String(s.to_string())
    }

    /// Wrap a float; NaN and infinities are stored as missing.
    pub fn from_f64(v: f64) -> Value {
        if v.is_finite() { Value::Float(v) } else { Value::Null }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Interpret the value as an integer identifier (`12741` or `12741.0`).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Date(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(s) | Value::String(s) => parse_datetime(s),
            _ => None,
        }
    }

    /// Normalised form used when matching rows across tables: integral
    /// floats compare equal to integers, and null never matches.
    pub fn join_key(&self) -> Option<Value> {
        match self {
            Value::Null => None,
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => {
                Some(Value::Integer(*v as i64))
            }
            other => Some(other.clone()),
        }
    }

    /// Text written to a CSV field. Missing values become empty fields.
    pub fn to_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Float(v) if v.is_nan() => String::new(),
            Value::Float(v) => format!("{v:?}"),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::from_f64(v)
    }
}

/// Parse a MIMIC timestamp, accepting plain dates as midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ---------------------------------------------------------------------------
// Record – one ordered row built column by column
// ---------------------------------------------------------------------------

/// Ordered `column → value` pairs, the shape of one output row before it
/// is collected into a [`Table`].
pub type Record = Vec<(String, Value)>;

// ---------------------------------------------------------------------------
// Table – a loaded flat file
// ---------------------------------------------------------------------------

/// A flat table: ordered column names and rows of cells of the same width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Collect records into a table. Columns are the union of all record
    /// keys in order of first appearance; absent cells are null.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for record in &records {
            for (name, _) in record {
                if !index.contains_key(name) {
                    index.insert(name.clone(), columns.len());
                    columns.push(name.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|record| {
                let mut row = vec![Value::Null; columns.len()];
                for (name, value) in record {
                    row[index[&name]] = value;
                }
                row
            })
            .collect();

        Table { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .with_context(|| format!("table missing '{name}' column"))
    }

    /// Cell at `row` in column `name`, null when the column is absent.
    pub fn get(&self, row: usize, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        match (self.rows.get(row), self.column_index(name)) {
            (Some(r), Some(c)) => &r[c],
            _ => &NULL,
        }
    }

    /// All cells of one column.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// One row as an ordered record.
    pub fn record(&self, row: usize) -> Record {
        self.columns
            .iter()
            .cloned()
            .zip(self.rows[row].iter().cloned())
            .collect()
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "row has {} values but table has {} columns",
                row.len(),
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a column, or replace it when it already exists.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            bail!(
                "column '{name}' has {} values but table has {} rows",
                values.len(),
                self.rows.len()
            );
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        Ok(())
    }

    /// Rename columns present in `mapping`; other names are left alone.
    pub fn rename_columns(&mut self, mapping: &BTreeMap<String, String>) {
        for col in &mut self.columns {
            if let Some(new) = mapping.get(col) {
                *col = new.clone();
            }
        }
    }

    /// Keep only `names`, in that order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|n| self.require_column(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            columns: names.iter().map(|n| n.as_ref().to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }

    /// First `n` rows.
    pub fn head(mut self, n: usize) -> Table {
        self.rows.truncate(n);
        self
    }

    /// Keep the rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Inner join on a shared key column.
    ///
    /// The result holds every left column followed by the right columns
    /// except the key. Left row order is preserved; each left row appears
    /// once per matching right row. Overlapping non-key names get `_x`
    /// (left) and `_y` (right) suffixes. Null keys never match.
    pub fn inner_join(&self, right: &Table, on: &str) -> Result<Table> {
        let left_key = self
            .require_column(on)
            .context("left side of join")?;
        let right_key = right
            .require_column(on)
            .context("right side of join")?;

        let mut matches: HashMap<Value, Vec<usize>> = HashMap::new();
        for (i, row) in right.rows.iter().enumerate() {
            if let Some(key) = row[right_key].join_key() {
                matches.entry(key).or_default().push(i);
            }
        }

        let right_cols: Vec<usize> = (0..right.columns.len())
            .filter(|&i| i != right_key)
            .collect();
        let overlapping: BTreeSet<&str> = right_cols
            .iter()
            .map(|&i| right.columns[i].as_str())
            .filter(|c| *c != on && self.column_index(c).is_some())
            .collect();

        let mut columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if overlapping.contains(c.as_str()) {
                    format!("{c}_x")
                } else {
                    c.clone()
                }
            })
            .collect();
        columns.extend(right_cols.iter().map(|&i| {
            let c = &right.columns[i];
            if overlapping.contains(c.as_str()) {
                format!("{c}_y")
            } else {
                c.clone()
            }
        }));

        let mut rows = Vec::new();
        for row in &self.rows {
            let Some(key) = row[left_key].join_key() else {
                continue;
            };
            let Some(hits) = matches.get(&key) else {
                continue;
            };
            for &hit in hits {
                let mut joined = row.clone();
                joined.extend(right_cols.iter().map(|&i| right.rows[hit][i].clone()));
                rows.push(joined);
            }
        }

        Ok(Table { columns, rows })
    }

    /// Stack tables vertically. Columns are unioned in order of first
    /// appearance and cells missing from a table are null.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for t in &tables {
            for c in &t.columns {
                if !index.contains_key(c) {
                    index.insert(c.clone(), columns.len());
                    columns.push(c.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(tables.iter().map(Table::len).sum());
        for t in tables {
            let positions: Vec<usize> = t.columns.iter().map(|c| index[c]).collect();
            for row in t.rows {
                let mut out = vec![Value::Null; columns.len()];
                for (pos, v) in positions.iter().zip(row) {
                    out[*pos] = v;
                }
                rows.push(out);
            }
        }

        Table { columns, rows }
    }
}
