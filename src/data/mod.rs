/// Data layer: cell and table types, file I/O, and row filtering.
///
/// Architecture:
/// ```text
///  .csv / .csv.gz / .parquet / .json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  Table    │  columns + rows of Value; join, concat, select
///   └──────────┘
///        │
///        ├──────────────┐
///        ▼              ▼
///   ┌──────────┐   ┌──────────┐
///   │  filter   │   │  writer   │  Table → file (parent dirs created)
///   └──────────┘   └──────────┘
///
///  store: serde objects ⇄ .json / .json.gz
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod store;
pub mod writer;

pub use loader::read_table;
pub use model::{Record, Table, Value};
pub use writer::write_table;
