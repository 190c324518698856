// Removes candidates whose answers match an excluded intent
use tracing::{debug, info, warn};

use panelx_core::{PanelIdSet, VectorIndex};

use crate::semantic::SemanticSearchExecutor;

#[derive(Clone)]
pub struct NegativeFilter {
    executor: SemanticSearchExecutor,
}

impl NegativeFilter {
    pub fn new(executor: SemanticSearchExecutor) -> Self {
        Self { executor }
    }

    /// Candidates minus every panel scoring at or above `threshold` against
    /// any of `synonyms`. Searches are constrained to the candidates; an
    /// embedding or index failure removes nothing.
    pub async fn exclude(
        &self,
        candidates: &PanelIdSet,
        synonyms: &[String],
        index: &dyn VectorIndex,
        threshold: f32,
    ) -> PanelIdSet {
        let excluded = self.matching(candidates, synonyms, index, threshold).await;
        candidates.iter().filter(|id| !excluded.contains(*id)).cloned().collect()
    }

    /// The candidates that [`exclude`](Self::exclude) would remove
    pub async fn matching(
        &self,
        candidates: &PanelIdSet,
        synonyms: &[String],
        index: &dyn VectorIndex,
        threshold: f32,
    ) -> PanelIdSet {
        let mut excluded = PanelIdSet::default();
        let phrases: Vec<String> = synonyms
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if candidates.is_empty() || phrases.is_empty() {
            return excluded;
        }

        let vectors = match self.executor.embedder().embed_batch(&phrases).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(index = index.name(), error = %e, "Negative phrases could not be embedded; nothing excluded");
                return excluded;
            }
        };

        // Hits are per answer, and a panel may own many answers, so the
        // constrained search is never capped.
        for (phrase, vector) in phrases.iter().zip(vectors) {
            match self
                .executor
                .try_search(&vector, index, Some(candidates), usize::MAX, threshold)
                .await
            {
                Ok(hits) => {
                    debug!(phrase = %phrase, matched = hits.len(), "Negative phrase searched");
                    excluded.extend(hits.into_iter().filter(|h| h.score >= threshold).map(|h| h.panel_id));
                }
                Err(e) => warn!(index = index.name(), phrase = %phrase, error = %e, "Negative search failed"),
            }
        }

        info!(
            index = index.name(),
            candidates = candidates.len(),
            excluded = excluded.len(),
            "Negative filter applied"
        );
        excluded
    }
}
