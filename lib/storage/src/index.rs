// Brute-force vector index over embedded survey answers
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use panelx_core::{Embedding, Error, PanelId, PanelIdSet, Result, VectorHit, VectorIndex};

/// One embedded answer. A panel may own several entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub panel_id: PanelId,
    pub answer_text: String,
    pub vector: Embedding,
}

#[derive(Debug)]
pub struct MemoryVectorIndex {
    name: String,
    dimension: usize,
    entries: RwLock<Vec<IndexEntry>>,
}

impl MemoryVectorIndex {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Adds an answer; the vector is stored unit-normalized
    pub fn insert(&self, panel_id: PanelId, answer_text: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.entries.write().push(IndexEntry {
            panel_id,
            answer_text: answer_text.into(),
            vector: Embedding::new(vector).normalized(),
        });
        Ok(())
    }

    pub fn insert_batch(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.vector.dim() != self.dimension) {
            return Err(Error::InvalidDimension {
                expected: self.dimension,
                actual: bad.vector.dim(),
            });
        }
        self.entries
            .write()
            .extend(entries.into_iter().map(|mut e| {
                e.vector.normalize();
                e
            }));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        vector: &[f32],
        filter_ids: Option<&PanelIdSet>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<VectorHit>> {
        if vector.len() != self.dimension {
            return Err(Error::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let query = Embedding::new(vector.to_vec()).normalized();

        let entries = self.entries.read();
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .filter(|e| filter_ids.map_or(true, |ids| ids.contains(&e.panel_id)))
            .filter_map(|e| {
                let score = query.cosine_similarity(&e.vector);
                (score >= score_threshold).then(|| VectorHit {
                    panel_id: e.panel_id.clone(),
                    answer_text: e.answer_text.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.panel_id.cmp(&b.panel_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> MemoryVectorIndex {
        let index = MemoryVectorIndex::new("answers", 3);
        index.insert(PanelId::new("p1"), "넷플릭스 매일 봐요", vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(PanelId::new("p2"), "유튜브 프리미엄", vec![0.8, 0.6, 0.0]).unwrap();
        index.insert(PanelId::new("p3"), "운동", vec![0.0, 0.0, 1.0]).unwrap();
        index
    }

    #[tokio::test]
    async fn test_search_threshold_and_order() {
        let index = index();
        let hits = index.search(&[1.0, 0.0, 0.0], None, 10, 0.5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.panel_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert!((hits[1].score - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_prefilter_and_top_k() {
        let index = index();
        let allowed: PanelIdSet = [PanelId::new("p2"), PanelId::new("p3")].into_iter().collect();
        let hits = index.search(&[1.0, 0.0, 0.0], Some(&allowed), 10, 0.0).await.unwrap();
        assert_eq!(hits[0].panel_id, PanelId::new("p2"));
        assert!(hits.iter().all(|h| h.panel_id != PanelId::new("p1")));

        let hits = index.search(&[1.0, 0.0, 0.0], None, 1, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let index = index();
        assert!(matches!(
            index.search(&[1.0, 0.0], None, 10, 0.0).await,
            Err(Error::InvalidDimension { expected: 3, actual: 2 })
        ));
        assert!(index.insert(PanelId::new("p9"), "x", vec![1.0]).is_err());
    }
}
