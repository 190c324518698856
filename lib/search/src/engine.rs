//! Engine façade
//!
//! [`HybridEngine`] wires the collaborators, the router, the orchestrator
//! and the fusion engine together behind `open`/`resolve`/`close`.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use panelx_core::{
    AttributeStore, CanonicalField, Embedder, Error, FieldCatalog, PanelId, PanelRecord, Result, ScoreMap,
    SearchQuery, VectorIndex,
};
use panelx_router::{RuleTable, SemanticRouter};

use crate::config::SearchConfig;
use crate::fusion::{FusedSets, FusionEngine};
use crate::keywords::KeywordFilterBuilder;
use crate::orchestrator::{StageReport, TwoStageOrchestrator};
use crate::semantic::SemanticSearchExecutor;
use crate::structured::StructuredFilterEvaluator;
use crate::vocabulary::FilterVocabulary;

/// Injected collaborators
#[derive(Clone)]
pub struct Backends {
    pub attributes: Arc<dyn AttributeStore>,
    /// Index over free-text profile answers
    pub free_text: Arc<dyn VectorIndex>,
    /// Index over fixed-choice poll answers
    pub poll: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
}

/// Answer to one [`SearchQuery`]
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub final_ids: Vec<PanelId>,
    pub scores: ScoreMap,
    pub resolved_target_field: Option<CanonicalField>,
    /// Companion fields of the resolved target's group
    pub related_fields: Vec<CanonicalField>,
    pub candidates: FusedSets,
    pub report: StageReport,
}

pub struct HybridEngine {
    backends: Backends,
    catalog: Arc<FieldCatalog>,
    vocabulary: Arc<FilterVocabulary>,
    router: Arc<SemanticRouter>,
    orchestrator: TwoStageOrchestrator,
    fusion: FusionEngine,
    config: Arc<SearchConfig>,
    closed: AtomicBool,
}

impl HybridEngine {
    /// Validates the configuration and pre-embeds the catalog for routing
    pub async fn open(backends: Backends, catalog: Arc<FieldCatalog>, config: SearchConfig) -> Result<Self> {
        Self::open_with_rules(backends, catalog, RuleTable::builtin()?, config).await
    }

    pub async fn open_with_rules(
        backends: Backends,
        catalog: Arc<FieldCatalog>,
        rules: RuleTable,
        config: SearchConfig,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let vocabulary = Arc::new(FilterVocabulary::builtin()?);

        let router = Arc::new(
            SemanticRouter::build(
                Arc::clone(&catalog),
                rules,
                Arc::clone(&backends.embedder),
                &config.router,
            )
            .await,
        );
        let evaluator = Arc::new(StructuredFilterEvaluator::new(
            Arc::clone(&backends.attributes),
            Arc::clone(&catalog),
            Arc::clone(&vocabulary),
            config.reference_year,
        ));
        let orchestrator = TwoStageOrchestrator::new(
            evaluator,
            Arc::clone(&router),
            SemanticSearchExecutor::new(Arc::clone(&backends.embedder)),
            Arc::clone(&backends.free_text),
            Arc::clone(&backends.poll),
            Arc::clone(&config),
        );

        info!(
            fields = catalog.len(),
            embedding_fallback = router.has_fallback(),
            "Hybrid engine opened"
        );
        Ok(Self {
            fusion: FusionEngine::with_weights(config.weights),
            backends,
            catalog,
            vocabulary,
            router,
            orchestrator,
            config,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn router(&self) -> &SemanticRouter {
        &self.router
    }

    /// Builder for classifier output that carries objective keywords
    pub fn keyword_builder(&self) -> Result<KeywordFilterBuilder> {
        KeywordFilterBuilder::new(Arc::clone(&self.vocabulary))
    }

    /// Resolves a query. Only contract violations fail; collaborator
    /// failures shrink the answer instead.
    pub async fn resolve(&self, query: &SearchQuery) -> Result<Resolution> {
        query.validate()?;
        if self.is_closed() {
            warn!("Resolving on a closed engine; every source will be unavailable");
        }

        let target = async {
            match query.target_field.as_deref().map(str::trim) {
                Some(target) if !target.is_empty() => self.resolve_target(target).await,
                _ => None,
            }
        };
        let (resolved_target_field, stages) = tokio::join!(target, self.orchestrator.run(query));
        let related_fields = resolved_target_field
            .as_ref()
            .map(|f| self.catalog.related_fields(&f.name).into_iter().cloned().collect())
            .unwrap_or_default();

        let candidates = self.fusion.fuse(&stages.sources);
        let selection = self.fusion.select(&candidates, query.limit, query.mode);

        info!(
            final_count = selection.ids.len(),
            union = candidates.union.len(),
            intersection = candidates.intersection.len(),
            target = resolved_target_field.as_ref().map(|f| f.name.as_str()),
            "Query resolved"
        );
        Ok(Resolution {
            final_ids: selection.ids,
            scores: selection.scores,
            resolved_target_field,
            related_fields,
            candidates,
            report: stages.report,
        })
    }

    /// Canonical names are taken as-is; anything else goes through the
    /// router, bounded by the task timeout
    async fn resolve_target(&self, target: &str) -> Option<CanonicalField> {
        if let Some(field) = self.catalog.get(target) {
            return Some(field.clone());
        }
        let field = match tokio::time::timeout(self.config.task_timeout(), self.router.resolve_field(target)).await {
            Ok(field) => field,
            Err(_) => {
                warn!(phrase = %target, timeout_ms = self.config.task_timeout_ms, "Target field routing timed out");
                None
            }
        };
        if field.is_none() {
            let e = Error::UnresolvedField(target.to_string());
            warn!(error = %e, "Target field left unresolved");
        }
        field
    }

    /// Records for the given ids in the order requested
    pub async fn fetch_panels(&self, ids: &[PanelId]) -> Result<Vec<PanelRecord>> {
        self.backends.attributes.fetch_by_ids(ids).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Releases the collaborators' pooled resources. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.backends.attributes.close();
        self.backends.free_text.close();
        self.backends.poll.close();
        info!("Hybrid engine closed");
    }
}
