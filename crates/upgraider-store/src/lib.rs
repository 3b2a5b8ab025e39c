//! Storage layer: the documentation corpus (DuckDB, Parquet) and per-run artifacts.

mod artifacts;
mod error;
mod parquet_io;
mod sections;

pub use artifacts::{ArtifactStore, REPORT_FILE, find_reports, read_report};
pub use error::StoreError;
pub use parquet_io::{load_sections_parquet, read_parquet};
pub use sections::sections_from_batches;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
