//! Embedding pipeline: fills in missing `doc_sections` embeddings in DuckDB.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use tracing::warn;
use upgraider_ai::EmbeddingService;
use upgraider_store::DuckStore;

pub struct EmbedStats {
    pub imported: Option<usize>,
    pub embedded: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
}

/// Optionally replace the table from Parquet, then embed every section that
/// has no vector yet. A failed embedding leaves its row untouched so a rerun
/// picks it up again.
pub async fn run_embed_pipeline(
    store: &DuckStore,
    embedder: &dyn EmbeddingService,
    import: Option<&Path>,
) -> anyhow::Result<EmbedStats> {
    let start = Instant::now();

    let imported = match import {
        Some(path) => {
            let count = store
                .import_parquet(path)
                .with_context(|| format!("importing {}", path.display()))?;
            eprintln!("  Imported {count} sections from {}", path.display());
            Some(count)
        }
        None => None,
    };

    let pending = store
        .sections_missing_embeddings()
        .context("listing sections without embeddings")?;
    let total = pending.len();
    eprintln!("  {total} sections need embeddings");

    let mut embedded = 0usize;
    let mut failed = 0usize;
    for (i, (id, content)) in pending.iter().enumerate() {
        match embedder.embed(content).await {
            Ok(vector) => {
                store
                    .set_embedding(*id, &vector)
                    .with_context(|| format!("storing embedding for section {id}"))?;
                embedded += 1;
            }
            Err(e) => {
                warn!(id, error = %e, "embedding failed");
                failed += 1;
            }
        }
        eprint!(
            "\r  Embedded {}/{total} ({:.1}%)",
            i + 1,
            (i + 1) as f64 / total as f64 * 100.0
        );
    }
    if total > 0 {
        eprintln!();
    }

    Ok(EmbedStats {
        imported,
        embedded,
        failed,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use upgraider_ai::LlmError;

    /// Two-dimensional vectors from text length; refuses anything mentioning "fail".
    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingService for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            if text.contains("fail") {
                return Err(LlmError::Server {
                    status: 429,
                    body: "rate limited".into(),
                });
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[tokio::test]
    async fn embeds_only_missing_sections() {
        let store = DuckStore::open().unwrap();
        store
            .insert_section(1, "numpy", "1.25.0", "msort is deprecated")
            .unwrap();
        store
            .insert_section(2, "numpy", "1.25.0", "product is deprecated")
            .unwrap();
        store.set_embedding(2, &[9.0, 9.0]).unwrap();

        let stats = run_embed_pipeline(&store, &LengthEmbedder, None).await.unwrap();
        assert_eq!(stats.embedded, 1);
        assert_eq!(stats.failed, 0);
        assert!(stats.imported.is_none());

        let sections = store.doc_sections(None).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].embedding, vec![19.0, 1.0]);
        assert_eq!(sections[1].embedding, vec![9.0, 9.0]);
    }

    #[tokio::test]
    async fn failures_stay_pending() {
        let store = DuckStore::open().unwrap();
        store.insert_section(1, "pandas", "2.0.0", "append removed").unwrap();
        store.insert_section(2, "pandas", "2.0.0", "will fail").unwrap();

        let stats = run_embed_pipeline(&store, &LengthEmbedder, None).await.unwrap();
        assert_eq!(stats.embedded, 1);
        assert_eq!(stats.failed, 1);

        let pending = store.sections_missing_embeddings().unwrap();
        assert_eq!(pending, vec![(2, "will fail".to_string())]);
    }

    #[tokio::test]
    async fn missing_import_file_is_an_error() {
        let store = DuckStore::open().unwrap();
        let result =
            run_embed_pipeline(&store, &LengthEmbedder, Some(Path::new("/nonexistent.parquet")))
                .await;
        assert!(result.is_err());
    }
}
