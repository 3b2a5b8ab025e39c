//! DuckDB storage for the documentation corpus.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use tracing::info;
use upgraider_core::DocSection;

use crate::StoreError;
use crate::sections::{id_content_pairs, sections_from_batches};

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS doc_sections (
    id BIGINT PRIMARY KEY,
    library VARCHAR,
    version VARCHAR,
    content VARCHAR NOT NULL,
    embedding VARCHAR
)";

/// DuckDB store holding the `doc_sections` table.
///
/// Embeddings are kept as JSON float arrays in a VARCHAR column so the table
/// can be filled by external tooling before any embedding exists. Use
/// [`open`](Self::open) for in-memory and [`open_persistent`](Self::open_persistent)
/// for a file that survives across runs.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory DuckDB database with an empty `doc_sections` table.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open an existing database without modifying it.
    ///
    /// Fails if the file or its `doc_sections` table does not exist.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::DatabaseNotFound(path.to_path_buf()));
        }
        let config = duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(path, config)?;
        let store = Self { conn };
        let tables = store.count(
            "SELECT count(*)::BIGINT AS cnt FROM information_schema.tables
             WHERE table_name = 'doc_sections'",
        )?;
        if tables == 0 {
            return Err(StoreError::MissingTable("doc_sections"));
        }
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Replace the table contents with a `doc_sections`-shaped Parquet file.
    ///
    /// Native list embeddings are converted to their JSON text form.
    pub fn import_parquet(&self, path: &Path) -> Result<usize, StoreError> {
        if !path.exists() {
            return Err(StoreError::ParquetNotFound(path.to_path_buf()));
        }
        let sql = format!(
            "DELETE FROM doc_sections;
             INSERT INTO doc_sections
             SELECT id::BIGINT, library::VARCHAR, version::VARCHAR, content::VARCHAR,
                    CAST(embedding AS VARCHAR)
             FROM read_parquet('{}')",
            path.display()
        );
        self.conn.execute_batch(&sql)?;
        let count = self.section_count()?;
        info!(count, "imported doc_sections");
        Ok(count)
    }

    /// Insert one section without an embedding.
    pub fn insert_section(
        &self,
        id: i64,
        library: &str,
        version: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO doc_sections (id, library, version, content) VALUES (?, ?, ?, ?)",
            duckdb::params![id, library, version, content],
        )?;
        Ok(())
    }

    // ── Counts ──

    /// Number of rows in `doc_sections`.
    pub fn section_count(&self) -> Result<usize, StoreError> {
        self.count("SELECT count(*)::BIGINT AS cnt FROM doc_sections")
    }

    fn count(&self, sql: &str) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Schema("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    // ── Retrieval corpus ──

    /// All sections with an embedding, ordered by id, optionally for one library.
    pub fn doc_sections(&self, library: Option<&str>) -> Result<Vec<DocSection>, StoreError> {
        const BASE: &str = "SELECT id, content, embedding FROM doc_sections
             WHERE embedding IS NOT NULL AND embedding <> 'NULL'";
        let batches: Vec<RecordBatch> = match library {
            Some(name) => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{BASE} AND library = ? ORDER BY id"))?;
                stmt.query_arrow([name])?.collect()
            }
            None => {
                let mut stmt = self.conn.prepare(&format!("{BASE} ORDER BY id"))?;
                stmt.query_arrow([])?.collect()
            }
        };
        let sections = sections_from_batches(&batches)?;
        info!(count = sections.len(), library = ?library, "loaded doc sections");
        Ok(sections)
    }

    /// `(id, content)` of every section still lacking an embedding.
    pub fn sections_missing_embeddings(&self) -> Result<Vec<(i64, String)>, StoreError> {
        let batches = self.query_arrow(
            "SELECT id, content FROM doc_sections
             WHERE embedding IS NULL OR embedding = 'NULL'
             ORDER BY id",
        )?;
        id_content_pairs(&batches)
    }

    /// Store an embedding as a JSON array.
    pub fn set_embedding(&self, id: i64, embedding: &[f32]) -> Result<(), StoreError> {
        let json = serde_json::to_string(embedding)?;
        let updated = self.conn.execute(
            "UPDATE doc_sections SET embedding = ? WHERE id = ?",
            duckdb::params![json, id],
        )?;
        if updated == 0 {
            return Err(StoreError::NoResults);
        }
        Ok(())
    }

    // ── Escape hatch ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }
}
