use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("parquet file not found: {0}")]
    ParquetNotFound(std::path::PathBuf),

    #[error("database not found: {0}")]
    DatabaseNotFound(std::path::PathBuf),

    #[error("table {0} does not exist")]
    MissingTable(&'static str),

    #[error("no results for query")]
    NoResults,

    #[error("missing or mistyped column: {0}")]
    Schema(String),

    #[error("invalid embedding for section {id}: {source}")]
    Embedding {
        id: i64,
        source: serde_json::Error,
    },

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
