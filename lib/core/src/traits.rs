//! Collaborator traits
//!
//! The engine never talks to a concrete database or model. Attribute stores,
//! vector indices and embedders are injected behind these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::Condition;
use crate::panel::{PanelId, PanelIdSet, PanelRecord};

/// One scored answer returned by a vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub panel_id: PanelId,
    pub answer_text: String,
    pub score: f32,
}

/// Store of structured panel attributes
#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// Ids of every record matching the predicate
    async fn query_by_predicates(&self, predicate: &Condition) -> Result<PanelIdSet>;

    /// Records for the given ids, in the order requested; unknown ids are skipped
    async fn fetch_by_ids(&self, ids: &[PanelId]) -> Result<Vec<PanelRecord>>;

    /// Releases pooled resources. Later calls may fail with `SourceUnavailable`.
    fn close(&self) {}
}

/// Nearest-neighbour index over embedded answers
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Hits with `score >= score_threshold`, best first, at most `top_k`.
    /// When `filter_ids` is given only those panels are considered.
    async fn search(
        &self,
        vector: &[f32],
        filter_ids: Option<&PanelIdSet>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<VectorHit>>;

    fn close(&self) {}
}

/// Text embedding model
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
