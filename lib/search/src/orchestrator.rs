//! Two-stage orchestrator
//!
//! Drives one query resolution through
//! `Init → StructuredDone → PreFilterStrategy | PostFilterStrategy →
//! SemanticDone → Negated`:
//!
//! 1. semantic conditions are routed to an index through the router
//! 2. structured evaluation runs concurrently with phrase embedding
//! 3. the adaptive threshold decides whether the structured ids are pushed
//!    into the vector searches (pre-filter) or intersected afterwards
//!    (post-filter)
//! 4. the per-index searches run concurrently
//! 5. the negative filter prunes every source once
//!
//! Every sub-search is fail-open: a failure or timeout only empties its
//! own source.

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use panelx_core::{CandidateSet, Error, PanelIdSet, SearchQuery, SemanticCondition, VectorIndex};
use panelx_router::SemanticRouter;

use crate::config::SearchConfig;
use crate::fanout::{Fanout, SubSearch, TaskOutcome};
use crate::negative::NegativeFilter;
use crate::semantic::{combine_conditions, PreparedCondition, SemanticSearchExecutor};
use crate::source::Source;
use crate::structured::StructuredFilterEvaluator;
use crate::threshold::adaptive_threshold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Init,
    StructuredDone,
    PreFilterStrategy,
    PostFilterStrategy,
    SemanticDone,
    Negated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Structured ids constrain the vector searches at the index
    PreFilter,
    /// Vector searches run unconstrained and are intersected afterwards
    PostFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Nothing in the query asked for this source
    Skipped,
    Completed,
    Failed,
}

/// Where a semantic condition was sent
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub phrase: String,
    pub negative: bool,
    pub source: Source,
    /// Canonical field the phrase resolved to, if any
    pub field: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: Source,
    pub status: SourceStatus,
    pub count: usize,
}

/// Trace of one run, returned alongside the candidates
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub states: Vec<StageState>,
    pub strategy: Strategy,
    pub adaptive_threshold: usize,
    pub keyword_count: usize,
    pub routes: Vec<Route>,
    pub sources: Vec<SourceReport>,
    pub excluded: usize,
    pub elapsed_ms: u64,
}

impl StageReport {
    pub fn status(&self, source: Source) -> SourceStatus {
        self.sources
            .iter()
            .find(|r| r.source == source)
            .map_or(SourceStatus::Skipped, |r| r.status)
    }
}

/// Candidates of one source after the negative filter
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: Source,
    pub status: SourceStatus,
    pub candidates: CandidateSet,
}

#[derive(Debug, Clone)]
pub struct StageOutput {
    /// One entry per source, in [`Source::ALL`] order
    pub sources: Vec<SourceOutcome>,
    pub report: StageReport,
}

impl StageOutput {
    pub fn get(&self, source: Source) -> Option<&SourceOutcome> {
        self.sources.iter().find(|o| o.source == source)
    }
}

struct RoutedCondition {
    condition: SemanticCondition,
    source: Source,
}

enum StageOne {
    Structured(CandidateSet),
    Embedded(usize, PreparedCondition),
}

pub struct TwoStageOrchestrator {
    evaluator: Arc<StructuredFilterEvaluator>,
    router: Arc<SemanticRouter>,
    executor: SemanticSearchExecutor,
    negative: NegativeFilter,
    free_text: Arc<dyn VectorIndex>,
    poll: Arc<dyn VectorIndex>,
    config: Arc<SearchConfig>,
}

impl TwoStageOrchestrator {
    pub fn new(
        evaluator: Arc<StructuredFilterEvaluator>,
        router: Arc<SemanticRouter>,
        executor: SemanticSearchExecutor,
        free_text: Arc<dyn VectorIndex>,
        poll: Arc<dyn VectorIndex>,
        config: Arc<SearchConfig>,
    ) -> Self {
        Self {
            negative: NegativeFilter::new(executor.clone()),
            evaluator,
            router,
            executor,
            free_text,
            poll,
            config,
        }
    }

    fn fanout(&self) -> Fanout {
        Fanout::new(self.config.task_timeout(), self.config.max_workers)
    }

    fn index(&self, source: Source) -> Option<&Arc<dyn VectorIndex>> {
        match source {
            Source::FreeText => Some(&self.free_text),
            Source::Poll => Some(&self.poll),
            Source::Structured => None,
        }
    }

    /// Sends survey-topic phrases to the poll index and everything else,
    /// unresolved phrases included, to the free-text index. The phrase is
    /// tried first, then its synonyms. Routing that outlives the task
    /// timeout leaves the phrase unresolved.
    pub async fn route(&self, condition: &SemanticCondition) -> Route {
        let resolve = async {
            for phrase in condition.search_phrases() {
                if let Some(resolution) = self.router.resolve(&phrase).await {
                    return Some(resolution.field);
                }
            }
            None
        };
        let field = match tokio::time::timeout(self.config.task_timeout(), resolve).await {
            Ok(field) => field,
            Err(_) => {
                warn!(
                    phrase = %condition.original_phrase,
                    timeout_ms = self.config.task_timeout_ms,
                    "Routing timed out; phrase left unresolved"
                );
                None
            }
        };
        let source = match &field {
            Some(f) if f.is_topic() => Source::Poll,
            _ => Source::FreeText,
        };
        if field.is_none() {
            debug!(phrase = %condition.original_phrase, "Phrase unresolved; searching free-text answers");
        }
        Route {
            phrase: condition.original_phrase.clone(),
            negative: condition.is_negative,
            source,
            field: field.map(|f| f.name),
        }
    }

    pub async fn run(&self, query: &SearchQuery) -> StageOutput {
        let started = Instant::now();
        let mut states = vec![StageState::Init];
        let keyword_count = query.structured_filters.len();
        let threshold = adaptive_threshold(keyword_count, &self.config.threshold_bands);

        let mut routes = Vec::with_capacity(query.semantic_conditions.len());
        let mut positives = Vec::new();
        let mut negatives = Vec::new();
        let resolved = join_all(query.semantic_conditions.iter().map(|c| self.route(c))).await;
        for (condition, route) in query.semantic_conditions.iter().zip(resolved) {
            let routed = RoutedCondition {
                condition: condition.clone(),
                source: route.source,
            };
            if condition.is_negative {
                negatives.push(routed);
            } else {
                positives.push(routed);
            }
            routes.push(route);
        }

        // Stage one: structured evaluation alongside phrase embedding
        let (structured_status, mut structured, prepared) = self.stage_one(query, &positives).await;
        states.push(StageState::StructuredDone);

        let strategy = if structured_status == SourceStatus::Completed
            && !structured.is_empty()
            && structured.len() >= threshold
        {
            states.push(StageState::PreFilterStrategy);
            Strategy::PreFilter
        } else {
            states.push(StageState::PostFilterStrategy);
            Strategy::PostFilter
        };
        info!(
            structured = structured.len(),
            threshold,
            keywords = keyword_count,
            strategy = ?strategy,
            "Structured stage finished"
        );

        // Stage two: one concurrent search per index
        let pre_filter = (strategy == Strategy::PreFilter).then(|| Arc::new(structured.panel_ids.clone()));
        let mut semantic = self.stage_two(&positives, prepared, pre_filter).await;
        if strategy == Strategy::PostFilter && !structured.is_empty() {
            for (_, _, set) in semantic.iter_mut() {
                set.retain(|id| structured.contains(id));
            }
        }
        states.push(StageState::SemanticDone);

        // Negative filter, once over every candidate
        let mut union: PanelIdSet = structured.panel_ids.clone();
        for (_, _, set) in &semantic {
            union.extend(set.panel_ids.iter().cloned());
        }
        let excluded = self.exclude(&negatives, union).await;
        if !excluded.is_empty() {
            structured.retain(|id| !excluded.contains(id));
            for (_, _, set) in semantic.iter_mut() {
                set.retain(|id| !excluded.contains(id));
            }
        }
        states.push(StageState::Negated);

        let mut sources = vec![SourceOutcome {
            source: Source::Structured,
            status: structured_status,
            candidates: structured,
        }];
        sources.extend(semantic.into_iter().map(|(source, status, candidates)| SourceOutcome {
            source,
            status,
            candidates,
        }));

        let report = StageReport {
            states,
            strategy,
            adaptive_threshold: threshold,
            keyword_count,
            routes,
            sources: sources
                .iter()
                .map(|o| SourceReport {
                    source: o.source,
                    status: o.status,
                    count: o.candidates.len(),
                })
                .collect(),
            excluded: excluded.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            elapsed_ms = report.elapsed_ms,
            excluded = report.excluded,
            "Stages finished"
        );
        StageOutput { sources, report }
    }

    async fn stage_one(
        &self,
        query: &SearchQuery,
        positives: &[RoutedCondition],
    ) -> (SourceStatus, CandidateSet, Vec<Option<PreparedCondition>>) {
        let mut tasks: Vec<SubSearch<StageOne>> = Vec::with_capacity(positives.len() + 1);
        let structured_requested = !query.structured_filters.is_empty();
        if structured_requested {
            let evaluator = Arc::clone(&self.evaluator);
            let filters = query.structured_filters.clone();
            tasks.push(SubSearch::new(
                Source::Structured.label(),
                async move { evaluator.try_evaluate(&filters).await.map(StageOne::Structured) }.boxed(),
            ));
        }
        for (i, routed) in positives.iter().enumerate() {
            let executor = self.executor.clone();
            let condition = routed.condition.clone();
            tasks.push(SubSearch::new(
                format!("embed:{}", condition.original_phrase),
                async move {
                    executor
                        .embed_condition(&condition)
                        .await
                        .map(|p| StageOne::Embedded(i, p))
                }
                .boxed(),
            ));
        }

        let mut status = if structured_requested {
            SourceStatus::Failed
        } else {
            SourceStatus::Skipped
        };
        let mut structured = CandidateSet::new();
        let mut prepared: Vec<Option<PreparedCondition>> = (0..positives.len()).map(|_| None).collect();

        for outcome in self.fanout().run(tasks).await {
            match outcome.ok() {
                Some(StageOne::Structured(set)) => {
                    status = SourceStatus::Completed;
                    structured = set;
                }
                Some(StageOne::Embedded(i, p)) => prepared[i] = Some(p),
                None => {}
            }
        }
        (status, structured, prepared)
    }

    async fn stage_two(
        &self,
        positives: &[RoutedCondition],
        mut prepared: Vec<Option<PreparedCondition>>,
        pre_filter: Option<Arc<PanelIdSet>>,
    ) -> Vec<(Source, SourceStatus, CandidateSet)> {
        let mut results = Vec::with_capacity(2);
        let mut tasks = Vec::with_capacity(2);
        let mut searched = Vec::with_capacity(2);

        for source in [Source::FreeText, Source::Poll] {
            let requested = positives.iter().any(|r| r.source == source);
            let conditions: Vec<PreparedCondition> = positives
                .iter()
                .zip(prepared.iter_mut())
                .filter(|(r, _)| r.source == source)
                .filter_map(|(_, p)| p.take())
                .collect();

            let Some(index) = self.index(source).cloned() else {
                continue;
            };
            if !requested {
                results.push((source, SourceStatus::Skipped, CandidateSet::new()));
                continue;
            }
            if conditions.is_empty() {
                warn!(source = %source, "No condition could be embedded; source contributes nothing");
                results.push((source, SourceStatus::Failed, CandidateSet::new()));
                continue;
            }

            let executor = self.executor.clone();
            let pre_filter = pre_filter.clone();
            let top_k = self.config.semantic_top_k;
            let score_threshold = self.config.score_threshold(source);
            searched.push(results.len());
            results.push((source, SourceStatus::Failed, CandidateSet::new()));
            tasks.push(SubSearch::new(
                source.label(),
                async move {
                    let mut per_condition = Vec::with_capacity(conditions.len());
                    let mut last_error = None;
                    for condition in &conditions {
                        match executor
                            .search_prepared(condition, index.as_ref(), pre_filter.as_deref(), top_k, score_threshold)
                            .await
                        {
                            Ok(set) => per_condition.push((set, condition.importance)),
                            Err(e) => {
                                warn!(phrase = %condition.phrase, error = %e, "Condition skipped");
                                last_error = Some(e);
                            }
                        }
                    }
                    if per_condition.is_empty() {
                        return Err(last_error.unwrap_or_else(|| Error::unavailable(index.name(), "no search succeeded")));
                    }
                    Ok(combine_conditions(per_condition))
                }
                .boxed(),
            ));
        }

        for (slot, outcome) in searched.into_iter().zip(self.fanout().run(tasks).await) {
            if let TaskOutcome::Completed(set) = outcome {
                debug!(source = %results[slot].0, hits = set.len(), "Semantic source finished");
                results[slot].1 = SourceStatus::Completed;
                results[slot].2 = set;
            }
        }
        results
    }

    /// Ids to drop: candidates matching any negative condition's synonyms
    /// in the index its phrase routes to.
    async fn exclude(&self, negatives: &[RoutedCondition], union: PanelIdSet) -> PanelIdSet {
        let mut excluded = PanelIdSet::default();
        if negatives.is_empty() || union.is_empty() {
            return excluded;
        }
        let union = Arc::new(union);
        let threshold = self.config.negative_threshold;

        let mut tasks = Vec::with_capacity(negatives.len());
        for routed in negatives {
            let synonyms: Vec<String> = routed.condition.expanded_synonyms.clone();
            if synonyms.iter().all(|s| s.trim().is_empty()) {
                warn!(phrase = %routed.condition.original_phrase, "Negative condition without synonyms; nothing to exclude");
                continue;
            }
            let Some(index) = self.index(routed.source).cloned() else {
                continue;
            };
            let negative = self.negative.clone();
            let union = Arc::clone(&union);
            tasks.push(SubSearch::new(
                format!("negative:{}", routed.condition.original_phrase),
                async move { Ok::<_, Error>(negative.matching(&union, &synonyms, index.as_ref(), threshold).await) }.boxed(),
            ));
        }

        for outcome in self.fanout().run(tasks).await {
            if let Some(ids) = outcome.ok() {
                excluded.extend(ids);
            }
        }
        excluded
    }
}
