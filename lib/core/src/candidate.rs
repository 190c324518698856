use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::panel::{PanelId, PanelIdSet};

pub type ScoreMap = HashMap<PanelId, f32, ahash::RandomState>;

/// Panel ids produced by one source, with an optional score per id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub panel_ids: PanelIdSet,
    #[serde(default)]
    pub scores: ScoreMap,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unscored set, as returned by the attribute store
    pub fn from_ids<I: IntoIterator<Item = PanelId>>(ids: I) -> Self {
        Self {
            panel_ids: ids.into_iter().collect(),
            scores: ScoreMap::default(),
        }
    }

    /// Inserts an id keeping the best score seen for it
    pub fn insert(&mut self, id: PanelId, score: f32) {
        let entry = self.scores.entry(id.clone()).or_insert(score);
        if score > *entry {
            *entry = score;
        }
        self.panel_ids.insert(id);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.panel_ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.panel_ids.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: &PanelId) -> bool {
        self.panel_ids.contains(id)
    }

    pub fn score(&self, id: &PanelId) -> Option<f32> {
        self.scores.get(id).copied()
    }

    /// Keeps only ids accepted by `keep`, dropping their scores too
    pub fn retain<F: FnMut(&PanelId) -> bool>(&mut self, mut keep: F) {
        self.panel_ids.retain(|id| keep(id));
        let ids = &self.panel_ids;
        self.scores.retain(|id, _| ids.contains(id));
    }

    /// Ids ordered by score descending, ties broken by ascending id.
    /// Unscored ids rank as 0.0.
    pub fn ranked(&self) -> Vec<(PanelId, f32)> {
        let mut ranked: Vec<(PanelId, f32)> = self
            .panel_ids
            .iter()
            .map(|id| (id.clone(), self.scores.get(id).copied().unwrap_or(0.0)))
            .collect();
        ranked.sort_by(rank_order);
        ranked
    }
}

/// Score descending, then id ascending
pub fn rank_order(a: &(PanelId, f32), b: &(PanelId, f32)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_best_score() {
        let mut set = CandidateSet::new();
        set.insert(PanelId::new("a"), 0.4);
        set.insert(PanelId::new("a"), 0.7);
        set.insert(PanelId::new("a"), 0.5);
        assert_eq!(set.len(), 1);
        assert_eq!(set.score(&PanelId::new("a")), Some(0.7));
    }

    #[test]
    fn test_ranked_tie_break() {
        let mut set = CandidateSet::new();
        set.insert(PanelId::new("c"), 0.5);
        set.insert(PanelId::new("a"), 0.5);
        set.insert(PanelId::new("b"), 0.9);
        let order: Vec<String> = set.ranked().into_iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_retain_drops_scores() {
        let mut set = CandidateSet::new();
        set.insert(PanelId::new("a"), 0.5);
        set.insert(PanelId::new("b"), 0.6);
        set.retain(|id| id.as_str() == "b");
        assert!(!set.contains(&PanelId::new("a")));
        assert_eq!(set.scores.len(), 1);
    }
}
