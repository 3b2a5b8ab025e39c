//! Similarity retrieval of documentation sections under a word budget.
//!
//! The query is embedded once and scored against every section with a dot
//! product (corpus vectors are unit length, so this is cosine similarity).
//! Sections are then packed greedily, best first, until the budget is spent:
//!
//! - sections shorter than `min_words` are skipped;
//! - the section that would overflow is truncated to exactly the remaining
//!   budget and packing stops;
//! - each reference renders as `"\n<n>. <content>"` with newlines flattened.
//!
//! Word counts are whitespace-separated tokens.

use tracing::{debug, warn};
use upgraider_core::section::dot;
use upgraider_core::{DocSection, RankedSection};

use crate::service::EmbeddingService;

pub const DEFAULT_BUDGET_WORDS: usize = 500;
pub const DEFAULT_MIN_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    pub budget_words: usize,
    pub min_words: usize,
    /// Sections scoring at or below this are dropped.
    pub threshold: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            budget_words: DEFAULT_BUDGET_WORDS,
            min_words: DEFAULT_MIN_WORDS,
            threshold: None,
        }
    }
}

/// Score every section against `query`, best first.
///
/// The sort is stable, so equal scores keep corpus order. Sections whose
/// score is not finite are dropped.
pub fn rank_sections<'a>(
    query: &[f32],
    corpus: &'a [DocSection],
    threshold: Option<f32>,
) -> Vec<RankedSection<'a>> {
    let mut ranked: Vec<RankedSection<'a>> = corpus
        .iter()
        .map(|section| RankedSection {
            similarity: dot(query, &section.embedding),
            section,
        })
        .collect();
    let scored = ranked.len();
    ranked.retain(|r| r.similarity.is_finite());
    if ranked.len() < scored {
        warn!(dropped = scored - ranked.len(), "ignoring sections with non-finite scores");
    }
    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    if let Some(t) = threshold {
        ranked.retain(|r| r.similarity > t);
    }
    ranked
}

/// Greedily pack ranked sections into numbered references.
pub fn pack_references(ranked: &[RankedSection<'_>], config: &RetrievalConfig) -> Vec<String> {
    let mut references = Vec::new();
    let mut used = 0usize;

    for r in ranked {
        if used >= config.budget_words {
            break;
        }
        let word_count = r.section.word_count();
        if word_count < config.min_words {
            continue;
        }

        let remaining = config.budget_words - used;
        let n = references.len() + 1;
        if word_count > remaining {
            let words: Vec<&str> = r.section.content.split_whitespace().take(remaining).collect();
            references.push(format!("\n{n}. {}", words.join(" ")));
            used += remaining;
            break;
        }
        let flattened = r.section.content.replace(['\r', '\n'], " ");
        references.push(format!("\n{n}. {flattened}"));
        used += word_count;
    }

    debug!(count = references.len(), words = used, "packed references");
    references
}

/// Embed `query` and return the packed references for it.
///
/// An embedding failure degrades to an empty list.
pub async fn retrieve(
    query: &str,
    corpus: &[DocSection],
    embedder: &dyn EmbeddingService,
    config: &RetrievalConfig,
) -> Vec<String> {
    let query_embedding = match embedder.embed(query).await {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "query embedding failed, continuing without references");
            return Vec::new();
        }
    };
    let ranked = rank_sections(&query_embedding, corpus, config.threshold);
    pack_references(&ranked, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::LlmError;
    use async_trait::async_trait;

    struct FixedEmbedder(Option<Vec<f32>>);

    #[async_trait]
    impl EmbeddingService for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            self.0.clone().ok_or(LlmError::Empty("embedding"))
        }
    }

    fn section(id: i64, content: &str, embedding: [f32; 2]) -> DocSection {
        DocSection {
            id,
            content: content.into(),
            embedding: embedding.to_vec(),
        }
    }

    fn words(n: usize, tag: &str) -> String {
        (0..n).map(|i| format!("{tag}{i}")).collect::<Vec<_>>().join(" ")
    }

    fn config(budget: usize) -> RetrievalConfig {
        RetrievalConfig {
            budget_words: budget,
            ..RetrievalConfig::default()
        }
    }

    #[test]
    fn rank_orders_by_similarity() {
        let corpus = vec![
            section(1, "low", [0.1, 0.0]),
            section(2, "high", [0.9, 0.0]),
            section(3, "mid", [0.5, 0.0]),
        ];
        let ranked = rank_sections(&[1.0, 0.0], &corpus, None);
        let ids: Vec<i64> = ranked.iter().map(|r| r.section.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn rank_ties_keep_corpus_order() {
        let corpus = vec![
            section(5, "a", [0.5, 0.0]),
            section(4, "b", [0.5, 0.0]),
            section(6, "c", [0.5, 0.0]),
        ];
        let ids: Vec<i64> = rank_sections(&[1.0, 0.0], &corpus, None)
            .iter()
            .map(|r| r.section.id)
            .collect();
        assert_eq!(ids, vec![5, 4, 6]);
    }

    #[test]
    fn nan_scores_are_dropped_without_panicking() {
        let corpus: Vec<DocSection> = (0..64)
            .map(|i| DocSection {
                id: i,
                content: format!("section {i} text"),
                embedding: if i % 3 == 0 {
                    vec![f32::NAN]
                } else {
                    vec![i as f32 / 64.0]
                },
            })
            .collect();

        let ranked = rank_sections(&[1.0], &corpus, None);
        assert_eq!(ranked.len(), 42);
        assert!(ranked.iter().all(|r| r.section.id % 3 != 0));
        assert!(ranked.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert_eq!(ranked[0].section.id, 62);
    }

    #[test]
    fn threshold_drops_scores_at_or_below() {
        let corpus = vec![
            section(1, "x", [0.5, 0.0]),
            section(2, "y", [0.6, 0.0]),
            section(3, "z", [0.2, 0.0]),
        ];
        let ranked = rank_sections(&[1.0, 0.0], &corpus, Some(0.5));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].section.id, 2);
    }

    #[test]
    fn pack_renders_numbered_flattened_references() {
        let corpus = vec![
            section(1, "Series.append is\ndeprecated, use concat", [0.9, 0.0]),
            section(2, "msort has been removed", [0.8, 0.0]),
        ];
        let ranked = rank_sections(&[1.0, 0.0], &corpus, None);
        let refs = pack_references(&ranked, &config(500));
        assert_eq!(
            refs,
            vec![
                "\n1. Series.append is deprecated, use concat".to_string(),
                "\n2. msort has been removed".to_string(),
            ]
        );
    }

    #[test]
    fn pack_skips_short_sections_without_numbering_them() {
        let corpus = vec![
            section(1, "too short", [0.9, 0.0]),
            section(2, "long enough section", [0.8, 0.0]),
        ];
        let ranked = rank_sections(&[1.0, 0.0], &corpus, None);
        let refs = pack_references(&ranked, &config(500));
        assert_eq!(refs, vec!["\n1. long enough section".to_string()]);
    }

    #[test]
    fn pack_truncates_overflowing_section_and_stops() {
        let corpus = vec![
            section(1, &words(8, "a"), [0.9, 0.0]),
            section(2, &words(8, "b"), [0.8, 0.0]),
            section(3, &words(3, "c"), [0.7, 0.0]),
        ];
        let ranked = rank_sections(&[1.0, 0.0], &corpus, None);
        let refs = pack_references(&ranked, &config(10));
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1], "\n2. b0 b1");

        let total: usize = refs
            .iter()
            .map(|r| r.split_whitespace().count() - 1)
            .sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn pack_stops_when_budget_exactly_spent() {
        let corpus = vec![
            section(1, &words(5, "a"), [0.9, 0.0]),
            section(2, &words(5, "b"), [0.8, 0.0]),
        ];
        let ranked = rank_sections(&[1.0, 0.0], &corpus, None);
        assert_eq!(pack_references(&ranked, &config(5)).len(), 1);
    }

    #[test]
    fn budget_is_never_exceeded() {
        let corpus: Vec<DocSection> = (0..40)
            .map(|i| section(i, &words(3 + (i as usize * 7) % 60, "w"), [1.0 - i as f32 / 100.0, 0.0]))
            .collect();
        let ranked = rank_sections(&[1.0, 0.0], &corpus, None);
        for budget in [1, 3, 17, 100, 500] {
            let refs = pack_references(&ranked, &config(budget));
            let total: usize = refs
                .iter()
                .map(|r| r.split_whitespace().count() - 1)
                .sum();
            assert!(total <= budget, "budget {budget} exceeded: {total}");
        }
    }

    #[tokio::test]
    async fn retrieve_end_to_end() {
        let corpus = vec![
            section(1, "unrelated note about plotting", [0.0, 1.0]),
            section(2, "np.msort is deprecated, use np.sort", [1.0, 0.0]),
        ];
        let embedder = FixedEmbedder(Some(vec![1.0, 0.0]));
        let cfg = RetrievalConfig {
            threshold: Some(0.5),
            ..RetrievalConfig::default()
        };
        let refs = retrieve("np.msort(a)", &corpus, &embedder, &cfg).await;
        assert_eq!(refs, vec!["\n1. np.msort is deprecated, use np.sort".to_string()]);
    }

    #[tokio::test]
    async fn embedding_failure_yields_no_references() {
        let corpus = vec![section(1, "a b c d", [1.0, 0.0])];
        let embedder = FixedEmbedder(None);
        let refs = retrieve("code", &corpus, &embedder, &RetrievalConfig::default()).await;
        assert!(refs.is_empty());
    }
}
