//! Fusion & quota engine
//!
//! Combines the per-source candidate sets into the three named sets
//! (intersection, union, weighted) and picks the final ordered ids, either
//! by quota fill or by returning one named set verbatim.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use panelx_core::{rank_order, CandidateSet, PanelId, PanelIdSet, ScoreMap, SearchMode};

use crate::config::SourceWeights;
use crate::orchestrator::{SourceOutcome, SourceStatus};
use crate::source::Source;

/// Pluggable source weighting; weights returned sum to 1 over `present`
pub trait WeightStrategy: Send + Sync {
    fn compute_weights(&self, present: &[Source]) -> BTreeMap<Source, f32>;
}

/// A source earns its base weight only when the query asked for it and it
/// answered.
#[derive(Debug, Clone, Default)]
pub struct KeywordPresenceWeights {
    base: SourceWeights,
}

impl KeywordPresenceWeights {
    pub fn new(base: SourceWeights) -> Self {
        Self { base }
    }
}

impl WeightStrategy for KeywordPresenceWeights {
    fn compute_weights(&self, present: &[Source]) -> BTreeMap<Source, f32> {
        let total: f32 = present.iter().map(|s| self.base.get(*s)).sum();
        present
            .iter()
            .map(|s| {
                let w = if total > 0.0 {
                    self.base.get(*s) / total
                } else {
                    1.0 / present.len() as f32
                };
                (*s, w)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionState {
    Fused,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FusedSets {
    pub intersection: CandidateSet,
    pub union: CandidateSet,
    pub weighted: CandidateSet,
    /// Normalized weight of each contributing source
    pub weights: BTreeMap<Source, f32>,
}

impl FusedSets {
    pub fn get(&self, mode: SearchMode) -> &CandidateSet {
        match mode {
            SearchMode::Intersection => &self.intersection,
            SearchMode::Union => &self.union,
            SearchMode::Weighted => &self.weighted,
        }
    }
}

/// Final ordered ids and their scores
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub ids: Vec<PanelId>,
    pub scores: ScoreMap,
    pub states: Vec<FusionState>,
}

pub struct FusionEngine {
    strategy: Box<dyn WeightStrategy>,
}

impl FusionEngine {
    pub fn new(strategy: Box<dyn WeightStrategy>) -> Self {
        Self { strategy }
    }

    pub fn with_weights(base: SourceWeights) -> Self {
        Self::new(Box::new(KeywordPresenceWeights::new(base)))
    }

    pub fn fuse(&self, outcomes: &[SourceOutcome]) -> FusedSets {
        let present: Vec<Source> = outcomes
            .iter()
            .filter(|o| o.status == SourceStatus::Completed)
            .map(|o| o.source)
            .collect();
        let weights = self.strategy.compute_weights(&present);

        let non_empty: Vec<&CandidateSet> = outcomes
            .iter()
            .map(|o| &o.candidates)
            .filter(|c| !c.is_empty())
            .collect();

        let mut union = CandidateSet::new();
        let mut weighted = CandidateSet::new();
        for outcome in outcomes {
            let weight = weights.get(&outcome.source).copied().unwrap_or(0.0);
            for id in &outcome.candidates.panel_ids {
                *union.scores.entry(id.clone()).or_insert(0.0) += 1.0;
                union.panel_ids.insert(id.clone());
                *weighted.scores.entry(id.clone()).or_insert(0.0) += weight;
                weighted.panel_ids.insert(id.clone());
            }
        }

        let mut intersection = CandidateSet::new();
        if let Some((first, rest)) = non_empty.split_first() {
            let score = non_empty.len() as f32;
            for id in &first.panel_ids {
                if rest.iter().all(|set| set.contains(id)) {
                    intersection.insert(id.clone(), score);
                }
            }
        }

        debug!(
            intersection = intersection.len(),
            union = union.len(),
            sources = non_empty.len(),
            "Candidate sets fused"
        );
        FusedSets {
            intersection,
            union,
            weighted,
            weights,
        }
    }

    /// With a limit, fills from the intersection then the union, both by
    /// weighted score. Without one, returns the `mode` set verbatim.
    pub fn select(&self, sets: &FusedSets, limit: Option<usize>, mode: SearchMode) -> Selection {
        let mut states = vec![FusionState::Fused];
        let selection = match limit {
            Some(limit) => quota_fill(sets, limit),
            None => {
                let chosen = sets.get(mode);
                let ids: Vec<PanelId> = chosen.ranked().into_iter().map(|(id, _)| id).collect();
                let scores = ids
                    .iter()
                    .map(|id| (id.clone(), chosen.score(id).unwrap_or(0.0)))
                    .collect();
                (ids, scores)
            }
        };
        states.push(FusionState::Done);
        info!(final_count = selection.0.len(), limit = ?limit, mode = ?mode, "Selection done");
        Selection {
            ids: selection.0,
            scores: selection.1,
            states,
        }
    }
}

fn by_weight(ids: &PanelIdSet, weighted: &CandidateSet) -> Vec<(PanelId, f32)> {
    let mut ranked: Vec<(PanelId, f32)> = ids
        .iter()
        .map(|id| (id.clone(), weighted.score(id).unwrap_or(0.0)))
        .collect();
    ranked.sort_by(rank_order);
    ranked
}

fn quota_fill(sets: &FusedSets, limit: usize) -> (Vec<PanelId>, ScoreMap) {
    let mut ids = Vec::with_capacity(limit.min(sets.union.len()));
    let mut scores = ScoreMap::default();

    for pool in [&sets.intersection.panel_ids, &sets.union.panel_ids] {
        for (id, score) in by_weight(pool, &sets.weighted) {
            if ids.len() >= limit {
                return (ids, scores);
            }
            if scores.contains_key(&id) {
                continue;
            }
            scores.insert(id.clone(), score);
            ids.push(id);
        }
    }
    (ids, scores)
}
