//! Decoding `doc_sections` record batches into [`DocSection`]s.
//!
//! Expected columns: `id` (any integer), `content` (string) and `embedding`.
//! The embedding column may be a JSON float array stored as text (the layout
//! of the original release-note database) or a native Arrow list of floats.
//! Rows whose embedding is null, empty or the literal `NULL` are skipped, as
//! are embeddings with null items or non-finite values.

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float32Type, Float64Type};
use arrow::record_batch::RecordBatch;
use tracing::{debug, warn};
use upgraider_core::DocSection;

use crate::StoreError;

/// Convert batches into sections, skipping rows without an embedding.
pub fn sections_from_batches(batches: &[RecordBatch]) -> Result<Vec<DocSection>, StoreError> {
    let mut sections = Vec::new();
    let mut skipped = 0usize;

    for batch in batches {
        let ids = column_as(batch, "id", &DataType::Int64)?;
        let ids = ids.as_primitive::<arrow::datatypes::Int64Type>();
        let contents = column_as(batch, "content", &DataType::Utf8)?;
        let contents = contents.as_string::<i32>();
        let embeddings = batch
            .column_by_name("embedding")
            .ok_or_else(|| StoreError::Schema("embedding".into()))?;

        for row in 0..batch.num_rows() {
            if ids.is_null(row) || contents.is_null(row) {
                skipped += 1;
                continue;
            }
            let id = ids.value(row);
            match embedding_at(embeddings, row, id)? {
                Some(embedding) => sections.push(DocSection {
                    id,
                    content: contents.value(row).to_string(),
                    embedding,
                }),
                None => skipped += 1,
            }
        }
    }

    debug!(count = sections.len(), skipped, "decoded doc sections");
    Ok(sections)
}

/// `(id, content)` pairs from batches with `id` and `content` columns.
pub(crate) fn id_content_pairs(batches: &[RecordBatch]) -> Result<Vec<(i64, String)>, StoreError> {
    let mut rows = Vec::new();
    for batch in batches {
        let ids = column_as(batch, "id", &DataType::Int64)?;
        let ids = ids.as_primitive::<arrow::datatypes::Int64Type>();
        let contents = column_as(batch, "content", &DataType::Utf8)?;
        let contents = contents.as_string::<i32>();
        for row in 0..batch.num_rows() {
            if ids.is_valid(row) && contents.is_valid(row) {
                rows.push((ids.value(row), contents.value(row).to_string()));
            }
        }
    }
    Ok(rows)
}

fn column_as(batch: &RecordBatch, name: &str, to: &DataType) -> Result<ArrayRef, StoreError> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::Schema(name.to_string()))?;
    if col.data_type() == to {
        return Ok(col.clone());
    }
    Ok(cast(col, to)?)
}

fn embedding_at(col: &ArrayRef, row: usize, id: i64) -> Result<Option<Vec<f32>>, StoreError> {
    if col.is_null(row) {
        return Ok(None);
    }
    let embedding = match col.data_type() {
        DataType::Utf8 => json_embedding(col.as_string::<i32>().value(row), id)?,
        DataType::LargeUtf8 => json_embedding(col.as_string::<i64>().value(row), id)?,
        DataType::List(_) => float_values(&col.as_list::<i32>().value(row), id)?,
        DataType::LargeList(_) => float_values(&col.as_list::<i64>().value(row), id)?,
        DataType::FixedSizeList(_, _) => float_values(&col.as_fixed_size_list().value(row), id)?,
        other => return Err(StoreError::Schema(format!("embedding has type {other}"))),
    };
    Ok(embedding.filter(|e| {
        let finite = e.iter().all(|v| v.is_finite());
        if !finite {
            warn!(id, "skipping embedding with non-finite values");
        }
        finite
    }))
}

fn json_embedding(text: &str, id: i64) -> Result<Option<Vec<f32>>, StoreError> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|source| StoreError::Embedding { id, source })
}

/// Items of one list embedding; `None` if any item is null.
fn float_values(values: &ArrayRef, id: i64) -> Result<Option<Vec<f32>>, StoreError> {
    if values.null_count() > 0 {
        warn!(id, nulls = values.null_count(), "skipping embedding with null items");
        return Ok(None);
    }
    match values.data_type() {
        DataType::Float32 => Ok(Some(values.as_primitive::<Float32Type>().values().to_vec())),
        DataType::Float64 => Ok(Some(
            values
                .as_primitive::<Float64Type>()
                .values()
                .iter()
                .map(|&v| v as f32)
                .collect(),
        )),
        other => Err(StoreError::Schema(format!("embedding items have type {other}"))),
    }
}
