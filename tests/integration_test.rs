// Integration tests for panelx
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use panelx::{
    AttributeStore, Backends, Condition, Embedder, Error, FieldCatalog, FilterOperator, HybridEngine,
    MemoryAttributeStore, MemoryVectorIndex, PanelId, PanelIdSet, PanelRecord, Resolution, Result,
    SearchConfig, SearchMode, SearchQuery, SemanticCondition, StructuredFilter, VectorHit, VectorIndex,
};
use panelx_search::{
    adaptive_threshold, FilterVocabulary, FusionEngine, Source, SourceOutcome, SourceStatus, SourceWeights,
    StageState, Strategy, StructuredFilterEvaluator, ThresholdBand,
};

const DIM: usize = 8;
const HIKING: usize = 0;
const OWNS_CAT: usize = 1;
const PET_CAT: usize = 2;
const OTHER: usize = 5;

/// Known phrases map onto one axis each; anything else, catalog
/// descriptions included, embeds to the zero vector and routes nowhere.
struct AxisEmbedder {
    axes: HashMap<&'static str, usize>,
}

impl AxisEmbedder {
    fn new() -> Self {
        let axes = [("hiking", HIKING), ("owns a cat", OWNS_CAT), ("has a pet cat", PET_CAT)]
            .into_iter()
            .collect();
        Self { axes }
    }
}

#[async_trait]
impl Embedder for AxisEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; DIM];
        if let Some(axis) = self.axes.get(text.trim().to_lowercase().as_str()) {
            vector[*axis] = 1.0;
        }
        Ok(vector)
    }
}

fn mix(parts: &[(usize, f32)]) -> Vec<f32> {
    let mut vector = vec![0.0; DIM];
    for (axis, weight) in parts {
        vector[*axis] = *weight;
    }
    vector
}

fn id_set<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> PanelIdSet {
    items.into_iter().map(|s| PanelId::new(s.as_ref())).collect()
}

fn final_set(resolution: &Resolution) -> PanelIdSet {
    resolution.final_ids.iter().cloned().collect()
}

fn index(name: &str, answers: &[(&str, Vec<f32>)]) -> Arc<MemoryVectorIndex> {
    let index = MemoryVectorIndex::new(name, DIM);
    for (id, vector) in answers {
        index.insert(PanelId::new(*id), format!("answer of {id}"), vector.clone()).unwrap();
    }
    Arc::new(index)
}

fn config() -> SearchConfig {
    SearchConfig {
        reference_year: Some(2025),
        ..Default::default()
    }
}

async fn open(
    records: Vec<PanelRecord>,
    free_text: Arc<dyn VectorIndex>,
    poll: Arc<dyn VectorIndex>,
    config: SearchConfig,
) -> HybridEngine {
    let backends = Backends {
        attributes: Arc::new(MemoryAttributeStore::with_records(records)),
        free_text,
        poll,
        embedder: Arc::new(AxisEmbedder::new()),
    };
    HybridEngine::open(backends, Arc::new(FieldCatalog::builtin()), config)
        .await
        .unwrap()
}

fn empty_index(name: &str) -> Arc<dyn VectorIndex> {
    Arc::new(MemoryVectorIndex::new(name, DIM))
}

fn assert_fused_invariants(resolution: &Resolution) {
    let sets = &resolution.candidates;
    assert!(sets.intersection.panel_ids.is_subset(&sets.union.panel_ids));
    assert_eq!(sets.weighted.panel_ids, sets.union.panel_ids);
}

/// Answers on the hiking axis for `n` panels named `{prefix}{i}`
fn hikers(prefix: &str, n: usize) -> Vec<(String, Vec<f32>)> {
    (0..n).map(|i| (format!("{prefix}{i:02}"), mix(&[(HIKING, 1.0)]))).collect()
}

fn borrowed(answers: &[(String, Vec<f32>)]) -> Vec<(&str, Vec<f32>)> {
    answers.iter().map(|(id, v)| (id.as_str(), v.clone())).collect()
}

/// Records the pre-filter of every search it forwards
struct RecordingIndex {
    inner: Arc<MemoryVectorIndex>,
    filtered: AtomicUsize,
    unfiltered: AtomicUsize,
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(
        &self,
        vector: &[f32],
        filter_ids: Option<&PanelIdSet>,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<VectorHit>> {
        let counter = if filter_ids.is_some() { &self.filtered } else { &self.unfiltered };
        counter.fetch_add(1, Ordering::SeqCst);
        self.inner.search(vector, filter_ids, top_k, score_threshold).await
    }
}

/// Never answers within any reasonable timeout
struct SlowIndex;

#[async_trait]
impl VectorIndex for SlowIndex {
    fn name(&self) -> &str {
        "slow"
    }

    async fn search(&self, _: &[f32], _: Option<&PanelIdSet>, _: usize, _: f32) -> Result<Vec<VectorHit>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

struct DownStore;

#[async_trait]
impl AttributeStore for DownStore {
    async fn query_by_predicates(&self, _: &Condition) -> Result<PanelIdSet> {
        Err(Error::unavailable("attributes", "connection refused"))
    }

    async fn fetch_by_ids(&self, _: &[PanelId]) -> Result<Vec<PanelRecord>> {
        Err(Error::unavailable("attributes", "connection refused"))
    }
}

fn seoul_twenties() -> Vec<StructuredFilter> {
    vec![
        StructuredFilter::new("region", FilterOperator::Eq, json!("서울")),
        StructuredFilter::new("age", FilterOperator::Between, json!([20, 29])),
    ]
}

fn panel_records() -> Vec<PanelRecord> {
    vec![
        PanelRecord::new("a1").with("region_major", "서울").with("birth_year", 1999.0).with("gender", "F"),
        PanelRecord::new("a2").with("region_major", "서울").with("birth_year", 2003.0).with("gender", "M"),
        PanelRecord::new("a3").with("region_major", "서울").with("birth_year", 1980.0).with("gender", "F"),
        PanelRecord::new("a4").with("region_major", "부산").with("birth_year", 2000.0).with("gender", "F"),
        PanelRecord::new("a5").with("region", "서울 마포구").with("birth_year", "1997년").with("gender", "M"),
    ]
}

#[tokio::test]
async fn test_structured_only_equals_evaluator() {
    let records = panel_records();
    let engine = open(records.clone(), empty_index("free_text"), empty_index("poll"), config()).await;
    let query = SearchQuery {
        structured_filters: seoul_twenties(),
        ..Default::default()
    };
    let resolution = engine.resolve(&query).await.unwrap();

    let evaluator = StructuredFilterEvaluator::new(
        Arc::new(MemoryAttributeStore::with_records(records)),
        Arc::new(FieldCatalog::builtin()),
        Arc::new(FilterVocabulary::builtin().unwrap()),
        Some(2025),
    );
    let expected = evaluator.evaluate(&seoul_twenties()).await;

    assert_eq!(final_set(&resolution), expected.panel_ids);
    assert_eq!(final_set(&resolution), id_set(["a1", "a2", "a5"]));
    assert!(resolution.scores.values().all(|s| (*s - 1.0).abs() < 1e-6));
    assert_eq!(resolution.report.status(Source::FreeText), SourceStatus::Skipped);
    assert_fused_invariants(&resolution);
}

#[tokio::test]
async fn test_semantic_only_equals_raw_hits() {
    let free_text = index(
        "free_text",
        &[
            ("s1", mix(&[(HIKING, 1.0)])),
            ("s2", mix(&[(HIKING, 0.6), (OTHER, 0.8)])),
            ("s3", mix(&[(HIKING, 0.3), (OTHER, 0.954)])),
            ("s4", mix(&[(HIKING, 0.36), (OTHER, 0.933)])),
            ("s5", mix(&[(OTHER, 1.0)])),
        ],
    );
    let mut config = config();
    config.free_text_threshold = 0.35;
    let engine = open(panel_records(), free_text.clone(), empty_index("poll"), config).await;

    let query = SearchQuery {
        semantic_conditions: vec![SemanticCondition::positive("hiking")],
        ..Default::default()
    };
    let resolution = engine.resolve(&query).await.unwrap();

    let raw = free_text.search(&mix(&[(HIKING, 1.0)]), None, 1000, 0.35).await.unwrap();
    let raw_ids: PanelIdSet = raw.into_iter().map(|h| h.panel_id).collect();
    assert_eq!(final_set(&resolution), raw_ids);
    assert_eq!(final_set(&resolution), id_set(["s1", "s2", "s4"]));
    assert_eq!(resolution.report.routes[0].source, Source::FreeText);
    assert_eq!(resolution.report.routes[0].field, None);
    assert_fused_invariants(&resolution);
}

#[tokio::test]
async fn test_small_structured_set_uses_post_filter() {
    // 50 women in Seoul, 10 men in Seoul
    let records: Vec<PanelRecord> = (0..60)
        .map(|i| {
            PanelRecord::new(format!("p{i:02}"))
                .with("gender", if i < 50 { "F" } else { "M" })
                .with("region_major", "서울")
        })
        .collect();
    // hikers: 10 inside the structured set, 5 outside
    let mut answers = hikers("p", 10);
    answers.extend((50..55).map(|i| (format!("p{i:02}"), mix(&[(HIKING, 1.0)]))));
    let recording = Arc::new(RecordingIndex {
        inner: index("free_text", &borrowed(&answers)),
        filtered: AtomicUsize::new(0),
        unfiltered: AtomicUsize::new(0),
    });
    let engine = open(records, recording.clone(), empty_index("poll"), config()).await;

    let query = SearchQuery {
        structured_filters: vec![
            StructuredFilter::new("gender", FilterOperator::Eq, json!("여성")),
            StructuredFilter::new("region", FilterOperator::Eq, json!("서울")),
        ],
        semantic_conditions: vec![SemanticCondition::positive("hiking")],
        ..Default::default()
    };
    let resolution = engine.resolve(&query).await.unwrap();

    assert_eq!(resolution.report.adaptive_threshold, 500);
    assert_eq!(resolution.report.strategy, Strategy::PostFilter);
    assert!(resolution.report.states.contains(&StageState::PostFilterStrategy));
    assert_eq!(recording.unfiltered.load(Ordering::SeqCst), 1);
    assert_eq!(recording.filtered.load(Ordering::SeqCst), 0);

    let expected: PanelIdSet = (0..10).map(|i| PanelId::new(format!("p{i:02}"))).collect();
    assert_eq!(resolution.candidates.intersection.panel_ids, expected);
    assert_eq!(resolution.candidates.union.len(), 50);
    assert_fused_invariants(&resolution);
}

#[tokio::test]
async fn test_large_structured_set_uses_pre_filter() {
    let records: Vec<PanelRecord> = (0..30)
        .map(|i| PanelRecord::new(format!("p{i:02}")).with("gender", "F"))
        .collect();
    let answers = hikers("p", 40);
    let recording = Arc::new(RecordingIndex {
        inner: index("free_text", &borrowed(&answers)),
        filtered: AtomicUsize::new(0),
        unfiltered: AtomicUsize::new(0),
    });
    let mut config = config();
    config.threshold_bands = vec![ThresholdBand::new(None, 20)];
    let engine = open(records, recording.clone(), empty_index("poll"), config).await;

    let query = SearchQuery {
        structured_filters: vec![StructuredFilter::new("gender", FilterOperator::Eq, json!("F"))],
        semantic_conditions: vec![SemanticCondition::positive("hiking")],
        ..Default::default()
    };
    let resolution = engine.resolve(&query).await.unwrap();

    assert_eq!(resolution.report.strategy, Strategy::PreFilter);
    assert_eq!(recording.filtered.load(Ordering::SeqCst), 1);
    assert_eq!(recording.unfiltered.load(Ordering::SeqCst), 0);
    // hikers outside the structured set never come back
    assert_eq!(resolution.candidates.union.len(), 30);
    assert_eq!(resolution.candidates.intersection.len(), 30);
}

#[tokio::test]
async fn test_negative_condition_removes_matching_candidates() {
    let free_text = index("free_text", &borrowed(&hikers("h", 4)));
    let poll = index(
        "poll",
        &[
            ("h00", mix(&[(OWNS_CAT, 1.0)])),
            ("h01", mix(&[(PET_CAT, 0.6), (OTHER, 0.8)])),
            ("h02", mix(&[(OWNS_CAT, 0.54), (OTHER, 0.8417)])),
            ("h03", mix(&[(OTHER, 1.0)])),
        ],
    );
    let engine = open(Vec::new(), free_text, poll, config()).await;

    let query = SearchQuery {
        semantic_conditions: vec![
            SemanticCondition::positive("hiking"),
            SemanticCondition::negative("does not own a cat").with_synonyms(["owns a cat", "has a pet cat"]),
        ],
        ..Default::default()
    };
    let resolution = engine.resolve(&query).await.unwrap();

    // h02 scores just below the cutoff and stays
    assert_eq!(final_set(&resolution), id_set(["h02", "h03"]));
    assert_eq!(resolution.report.excluded, 2);
    let negative_route = resolution.report.routes.iter().find(|r| r.negative).unwrap();
    assert_eq!(negative_route.source, Source::Poll);
    assert_eq!(negative_route.field.as_deref(), Some("pet_experience"));
    assert_eq!(resolution.report.states.last(), Some(&StageState::Negated));
}

#[test]
fn test_quota_fill_prefers_intersection() {
    let name = |i: usize| PanelId::new(format!("p{i:03}"));
    let mut structured = panelx::CandidateSet::new();
    for i in 0..100 {
        structured.insert(name(i), 1.0);
    }
    let mut free_text = panelx::CandidateSet::new();
    for i in (0..10).chain(100..200) {
        free_text.insert(name(i), 0.9);
    }
    let outcomes = vec![
        SourceOutcome {
            source: Source::Structured,
            status: SourceStatus::Completed,
            candidates: structured,
        },
        SourceOutcome {
            source: Source::FreeText,
            status: SourceStatus::Completed,
            candidates: free_text,
        },
    ];

    let engine = FusionEngine::with_weights(SourceWeights::default());
    let sets = engine.fuse(&outcomes);
    assert_eq!(sets.intersection.len(), 10);
    assert_eq!(sets.union.len(), 200);

    let selection = engine.select(&sets, Some(30), SearchMode::Weighted);
    assert_eq!(selection.ids.len(), 30);
    let unique: PanelIdSet = selection.ids.iter().cloned().collect();
    assert_eq!(unique.len(), 30);
    // the 10 shared ids first, then the best structured-only ids
    let expected: Vec<PanelId> = (0..30).map(name).collect();
    assert_eq!(selection.ids, expected);
    assert!((selection.scores[&name(0)] - 1.0).abs() < 1e-6);
    assert!((selection.scores[&name(10)] - 0.6).abs() < 1e-6);

    // a limit beyond the union returns the whole union
    let selection = engine.select(&sets, Some(500), SearchMode::Weighted);
    assert_eq!(selection.ids.len(), 200);
}

#[tokio::test]
async fn test_timed_out_source_is_as_if_absent() {
    let records = panel_records();
    let mut config = config();
    config.task_timeout_ms = 50;

    let slow = open(records.clone(), Arc::new(SlowIndex), empty_index("poll"), config.clone()).await;
    let with_semantic = SearchQuery {
        structured_filters: seoul_twenties(),
        semantic_conditions: vec![SemanticCondition::positive("hiking")],
        ..Default::default()
    };
    let degraded = slow.resolve(&with_semantic).await.unwrap();
    assert_eq!(degraded.report.status(Source::FreeText), SourceStatus::Failed);

    let healthy = open(records, empty_index("free_text"), empty_index("poll"), config).await;
    let without_semantic = SearchQuery {
        structured_filters: seoul_twenties(),
        ..Default::default()
    };
    let baseline = healthy.resolve(&without_semantic).await.unwrap();

    assert_eq!(degraded.final_ids, baseline.final_ids);
    assert_eq!(degraded.scores, baseline.scores);
    assert_eq!(degraded.candidates.weights, baseline.candidates.weights);
}

#[tokio::test]
async fn test_unavailable_store_degrades_to_semantic_only() {
    let free_text = index("free_text", &borrowed(&hikers("h", 3)));
    let backends = Backends {
        attributes: Arc::new(DownStore),
        free_text,
        poll: empty_index("poll"),
        embedder: Arc::new(AxisEmbedder::new()),
    };
    let engine = HybridEngine::open(backends, Arc::new(FieldCatalog::builtin()), config())
        .await
        .unwrap();

    let query = SearchQuery {
        structured_filters: seoul_twenties(),
        semantic_conditions: vec![SemanticCondition::positive("hiking")],
        limit: Some(10),
        ..Default::default()
    };
    let resolution = engine.resolve(&query).await.unwrap();
    assert_eq!(resolution.report.status(Source::Structured), SourceStatus::Failed);
    assert_eq!(final_set(&resolution), id_set(["h00", "h01", "h02"]));
    assert!(resolution.scores.values().all(|s| (*s - 1.0).abs() < 1e-6));
}

#[tokio::test]
async fn test_resolution_is_idempotent() {
    let mut answers = hikers("a", 3);
    answers.push(("a4".to_string(), mix(&[(HIKING, 0.7), (OTHER, 0.7)])));
    let engine = open(panel_records(), index("free_text", &borrowed(&answers)), empty_index("poll"), config()).await;

    let query = SearchQuery {
        structured_filters: vec![StructuredFilter::new("gender", FilterOperator::Eq, json!("F"))],
        semantic_conditions: vec![SemanticCondition::positive("hiking")],
        limit: Some(4),
        mode: SearchMode::Union,
        ..Default::default()
    };
    let first = engine.resolve(&query).await.unwrap();
    let second = engine.resolve(&query).await.unwrap();
    assert_eq!(first.final_ids, second.final_ids);
    assert_eq!(first.final_ids.len(), 4.min(first.candidates.union.len()));
    assert_fused_invariants(&first);

    // every shared id precedes every id found by one source only
    let last_shared = first
        .final_ids
        .iter()
        .rposition(|id| first.candidates.intersection.contains(id));
    let first_exclusive = first
        .final_ids
        .iter()
        .position(|id| !first.candidates.intersection.contains(id));
    if let (Some(shared), Some(exclusive)) = (last_shared, first_exclusive) {
        assert!(shared < exclusive);
    }
}

#[tokio::test]
async fn test_contract_violations_are_the_only_errors() {
    let engine = open(panel_records(), empty_index("free_text"), empty_index("poll"), config()).await;
    let bad = [
        SearchQuery {
            limit: Some(0),
            ..Default::default()
        },
        SearchQuery {
            semantic_conditions: vec![SemanticCondition::positive("hiking").with_importance(1.5)],
            ..Default::default()
        },
        SearchQuery {
            structured_filters: vec![StructuredFilter::new("", FilterOperator::Eq, json!("F"))],
            ..Default::default()
        },
    ];
    for query in &bad {
        assert!(matches!(engine.resolve(query).await, Err(Error::InvalidQuery(_))));
    }

    // unknown fields and values shrink the answer instead
    let query = SearchQuery {
        structured_filters: vec![StructuredFilter::new("shoe_size", FilterOperator::Eq, json!(270))],
        target_field: Some("something nobody asked about".into()),
        ..Default::default()
    };
    let resolution = engine.resolve(&query).await.unwrap();
    assert!(resolution.final_ids.is_empty());
    assert!(resolution.resolved_target_field.is_none());
    assert_eq!(resolution.report.status(Source::Structured), SourceStatus::Completed);
}

#[test]
fn test_adaptive_threshold_is_monotone() {
    let bands = SearchConfig::default().threshold_bands;
    let thresholds: Vec<usize> = (0..12).map(|n| adaptive_threshold(n, &bands)).collect();
    assert!(thresholds.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(&thresholds[..5], &[1000, 1000, 500, 500, 200]);
}
