//! Parquet corpus files.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::info;
use upgraider_core::DocSection;

use crate::StoreError;
use crate::sections::sections_from_batches;

/// Read a Parquet file into Arrow RecordBatches.
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    let file = std::fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches: Result<Vec<RecordBatch>, _> = reader.collect();
    Ok(batches?)
}

/// Load the embedded sections of a `doc_sections`-shaped Parquet file.
pub fn load_sections_parquet(path: &Path) -> Result<Vec<DocSection>, StoreError> {
    if !path.exists() {
        return Err(StoreError::ParquetNotFound(path.to_path_buf()));
    }
    let batches = read_parquet(path)?;
    let sections = sections_from_batches(&batches)?;
    info!(count = sections.len(), path = %path.display(), "loaded doc sections from parquet");
    Ok(sections)
}
