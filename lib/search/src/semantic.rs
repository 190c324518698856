//! Semantic search executor
//!
//! Issues nearest-neighbour queries against one vector index and merges the
//! hits of a condition's phrase and synonyms into a scored candidate set.

use std::sync::Arc;
use tracing::{debug, warn};

use panelx_core::{
    CandidateSet, Embedder, Error, PanelId, PanelIdSet, Result, SemanticCondition, VectorHit, VectorIndex,
};

/// A condition whose phrases are already embedded
#[derive(Debug, Clone)]
pub struct PreparedCondition {
    pub phrase: String,
    pub importance: f32,
    pub vectors: Vec<Vec<f32>>,
}

#[derive(Clone)]
pub struct SemanticSearchExecutor {
    embedder: Arc<dyn Embedder>,
}

impl SemanticSearchExecutor {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embeds the original phrase and every synonym in one batch
    pub async fn embed_condition(&self, condition: &SemanticCondition) -> Result<PreparedCondition> {
        let phrases = condition.search_phrases();
        self.embed_phrases(&condition.original_phrase, condition.importance, &phrases)
            .await
    }

    pub async fn embed_phrases(&self, label: &str, importance: f32, phrases: &[String]) -> Result<PreparedCondition> {
        if phrases.is_empty() {
            return Err(Error::EmbeddingFailure(format!("'{label}' has nothing to embed")));
        }
        let vectors = self.embedder.embed_batch(phrases).await.map_err(|e| match e {
            Error::EmbeddingFailure(_) => e,
            other => Error::EmbeddingFailure(other.to_string()),
        })?;
        if vectors.len() != phrases.len() {
            return Err(Error::EmbeddingFailure(format!(
                "expected {} vectors for '{label}', got {}",
                phrases.len(),
                vectors.len()
            )));
        }
        Ok(PreparedCondition {
            phrase: label.to_string(),
            importance,
            vectors,
        })
    }

    /// One nearest-neighbour query. A pre-filter is pushed down to the index;
    /// an empty pre-filter matches nothing.
    pub async fn try_search(
        &self,
        vector: &[f32],
        index: &dyn VectorIndex,
        pre_filter: Option<&PanelIdSet>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<VectorHit>> {
        if vector.is_empty() || top_k == 0 || pre_filter.is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }
        let mut hits = index.search(vector, pre_filter, top_k, score_threshold).await?;
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.panel_id.cmp(&b.panel_id))
        });
        Ok(hits)
    }

    /// Like [`try_search`](Self::try_search) but any index error yields no hits
    pub async fn search(
        &self,
        vector: &[f32],
        index: &dyn VectorIndex,
        pre_filter: Option<&PanelIdSet>,
        top_k: usize,
        score_threshold: f32,
    ) -> Vec<VectorHit> {
        match self.try_search(vector, index, pre_filter, top_k, score_threshold).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(index = index.name(), error = %e, "Vector search failed");
                Vec::new()
            }
        }
    }

    /// Searches every vector of a prepared condition and keeps each panel's
    /// best score. Fails only when every search failed.
    pub async fn search_prepared(
        &self,
        prepared: &PreparedCondition,
        index: &dyn VectorIndex,
        pre_filter: Option<&PanelIdSet>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<CandidateSet> {
        let mut merged = CandidateSet::new();
        let mut last_error = None;
        let mut succeeded = 0usize;

        for vector in &prepared.vectors {
            match self.try_search(vector, index, pre_filter, top_k, score_threshold).await {
                Ok(hits) => {
                    succeeded += 1;
                    for hit in hits {
                        merged.insert(hit.panel_id, hit.score);
                    }
                }
                Err(e) => {
                    warn!(index = index.name(), phrase = %prepared.phrase, error = %e, "Vector search failed");
                    last_error = Some(e);
                }
            }
        }

        match (succeeded, last_error) {
            (0, Some(e)) => Err(e),
            _ => {
                debug!(index = index.name(), phrase = %prepared.phrase, hits = merged.len(), "Condition searched");
                Ok(merged)
            }
        }
    }

    pub async fn search_condition(
        &self,
        condition: &SemanticCondition,
        index: &dyn VectorIndex,
        pre_filter: Option<&PanelIdSet>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<CandidateSet> {
        let prepared = self.embed_condition(condition).await?;
        self.search_prepared(&prepared, index, pre_filter, top_k, score_threshold)
            .await
    }
}

/// Combines the candidate sets of several conditions routed to one index.
/// Only panels found by every condition survive; their score is the
/// importance-weighted mean of the per-condition scores.
pub fn combine_conditions(results: Vec<(CandidateSet, f32)>) -> CandidateSet {
    let mut iter = results.iter();
    let Some((first, _)) = iter.next() else {
        return CandidateSet::new();
    };
    let mut common: Vec<PanelId> = first.panel_ids.iter().cloned().collect();
    for (set, _) in iter {
        common.retain(|id| set.contains(id));
    }

    let total_importance: f32 = results.iter().map(|(_, w)| w.max(0.0)).sum();
    let mut combined = CandidateSet::new();
    for id in common {
        let score = if total_importance > 0.0 {
            results
                .iter()
                .map(|(set, w)| set.score(&id).unwrap_or(0.0) * w.max(0.0))
                .sum::<f32>()
                / total_importance
        } else {
            results.iter().map(|(set, _)| set.score(&id).unwrap_or(0.0)).sum::<f32>() / results.len() as f32
        };
        combined.insert(id, score);
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use panelx_storage::{HashEmbedder, MemoryVectorIndex};

    struct BrokenIndex;

    #[async_trait]
    impl VectorIndex for BrokenIndex {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search(&self, _: &[f32], _: Option<&PanelIdSet>, _: usize, _: f32) -> Result<Vec<VectorHit>> {
            Err(Error::unavailable("broken", "connection refused"))
        }
    }

    fn fixture() -> (SemanticSearchExecutor, MemoryVectorIndex, HashEmbedder) {
        let embedder = HashEmbedder::new(128).unwrap();
        let index = MemoryVectorIndex::new("free_text", 128);
        let answers = [
            ("p1", "넷플릭스 드라마를 자주 본다"),
            ("p2", "유튜브로 동영상을 본다"),
            ("p3", "주말마다 등산을 간다"),
            ("p1", "유튜브 프리미엄 구독 중"),
        ];
        for (id, text) in answers {
            index.insert(PanelId::new(id), text, embedder.embed_sync(text)).unwrap();
        }
        (SemanticSearchExecutor::new(Arc::new(embedder.clone())), index, embedder)
    }

    #[tokio::test]
    async fn test_search_sorted_and_thresholded() {
        let (executor, index, embedder) = fixture();
        let query = embedder.embed_sync("넷플릭스 드라마를 자주 본다");
        let hits = executor.search(&query, &index, None, 10, 0.99).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].panel_id, PanelId::new("p1"));

        let hits = executor.search(&query, &index, None, 10, -1.0).await;
        assert_eq!(hits.len(), 4);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_pre_filter_is_pushed_down() {
        let (executor, index, embedder) = fixture();
        let query = embedder.embed_sync("유튜브");
        let only_p3: PanelIdSet = [PanelId::new("p3")].into_iter().collect();
        let hits = executor.search(&query, &index, Some(&only_p3), 10, -1.0).await;
        assert!(hits.iter().all(|h| h.panel_id == PanelId::new("p3")));

        let empty = PanelIdSet::default();
        assert!(executor.search(&query, &index, Some(&empty), 10, -1.0).await.is_empty());
    }

    #[tokio::test]
    async fn test_index_failure_is_absorbed() {
        let (executor, _, embedder) = fixture();
        let query = embedder.embed_sync("anything");
        assert!(executor.search(&query, &BrokenIndex, None, 10, 0.0).await.is_empty());
        let condition = SemanticCondition::positive("anything");
        assert!(executor
            .search_condition(&condition, &BrokenIndex, None, 10, 0.0)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_condition_merges_synonyms_keeping_best_score() {
        let (executor, index, _) = fixture();
        let condition = SemanticCondition::positive("넷플릭스 드라마를 자주 본다").with_synonyms(["유튜브 프리미엄 구독 중"]);
        let set = executor.search_condition(&condition, &index, None, 10, 0.9).await.unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.score(&PanelId::new("p1")).unwrap() > 0.99);
    }

    #[test]
    fn test_combine_conditions_intersects_with_weighted_mean() {
        let mut a = CandidateSet::new();
        a.insert(PanelId::new("p1"), 0.8);
        a.insert(PanelId::new("p2"), 0.6);
        let mut b = CandidateSet::new();
        b.insert(PanelId::new("p1"), 0.4);
        b.insert(PanelId::new("p3"), 0.9);

        let combined = combine_conditions(vec![(a.clone(), 1.0), (b, 0.5)]);
        assert_eq!(combined.len(), 1);
        let score = combined.score(&PanelId::new("p1")).unwrap();
        assert!((score - (0.8 + 0.2) / 1.5).abs() < 1e-6);

        assert_eq!(combine_conditions(vec![(a.clone(), 1.0)]), a);
        assert!(combine_conditions(Vec::new()).is_empty());
    }
}
