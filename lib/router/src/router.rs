use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use panelx_core::{CanonicalField, Embedder, Embedding, FieldCatalog, Result};

use crate::rules::{RuleMethod, RuleTable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum cosine similarity for an embedding fallback match
    pub threshold: f32,
    /// Maximum number of memoized phrases
    pub memo_capacity: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            memo_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Keyword,
    Semantic,
}

/// A phrase resolved onto a canonical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub field: CanonicalField,
    pub score: f32,
    pub method: ResolutionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_method: Option<RuleMethod>,
}

/// Maps free-form phrases onto canonical fields: ordered rules first,
/// then nearest catalog description by embedding similarity.
pub struct SemanticRouter {
    catalog: Arc<FieldCatalog>,
    rules: RuleTable,
    embedder: Arc<dyn Embedder>,
    /// Catalog index paired with the embedded description
    field_vectors: Vec<(usize, Embedding)>,
    threshold: f32,
    memo: Cache<String, Option<Resolution>>,
}

impl SemanticRouter {
    /// Pre-embeds every catalog description. If that fails the router
    /// still answers rule matches and leaves everything else unresolved.
    pub async fn build(
        catalog: Arc<FieldCatalog>,
        rules: RuleTable,
        embedder: Arc<dyn Embedder>,
        config: &RouterConfig,
    ) -> Self {
        let descriptions: Vec<String> = catalog
            .all_fields()
            .iter()
            .map(|f| f.description.clone())
            .collect();

        let field_vectors = match embedder.embed_batch(&descriptions).await {
            Ok(vectors) if vectors.len() == descriptions.len() => vectors
                .into_iter()
                .enumerate()
                .map(|(idx, v)| (idx, Embedding::new(v)))
                .collect(),
            Ok(vectors) => {
                warn!(
                    expected = descriptions.len(),
                    actual = vectors.len(),
                    "Embedder returned a short batch; router runs rule-only"
                );
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Could not embed field descriptions; router runs rule-only");
                Vec::new()
            }
        };

        info!(
            fields = catalog.len(),
            embedded = field_vectors.len(),
            rules = rules.len(),
            "Semantic router ready"
        );

        Self {
            catalog,
            rules,
            embedder,
            field_vectors,
            threshold: config.threshold,
            memo: Cache::new(config.memo_capacity),
        }
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// True when the embedding fallback is available
    pub fn has_fallback(&self) -> bool {
        !self.field_vectors.is_empty()
    }

    /// Resolve a phrase onto a canonical field. Never fails: embedding
    /// errors leave the phrase unresolved and are not memoized.
    pub async fn resolve(&self, phrase: &str) -> Option<Resolution> {
        let key = phrase.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        if let Some(cached) = self.memo.get(&key).await {
            return cached;
        }

        match self.resolve_uncached(&key).await {
            Ok(resolution) => {
                self.memo.insert(key, resolution.clone()).await;
                resolution
            }
            Err(e) => {
                warn!(phrase = %key, error = %e, "Embedding failed; phrase left unresolved");
                None
            }
        }
    }

    pub async fn resolve_field(&self, phrase: &str) -> Option<CanonicalField> {
        self.resolve(phrase).await.map(|r| r.field)
    }

    async fn resolve_uncached(&self, phrase: &str) -> Result<Option<Resolution>> {
        if let Some(rule) = self.rules.first_match(phrase) {
            match self.catalog.get(&rule.field) {
                Some(field) => {
                    debug!(phrase, field = %field.name, "Resolved by rule");
                    return Ok(Some(Resolution {
                        field: field.clone(),
                        score: 1.0,
                        method: ResolutionMethod::Keyword,
                        rule_method: Some(rule.method),
                    }));
                }
                None => warn!(phrase, field = %rule.field, "Rule targets a field missing from the catalog"),
            }
        }

        if self.field_vectors.is_empty() {
            return Ok(None);
        }

        let query = Embedding::new(self.embedder.embed(phrase).await?);
        let mut best: Option<(usize, f32)> = None;
        for (idx, vector) in &self.field_vectors {
            let score = query.cosine_similarity(vector);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((*idx, score));
            }
        }

        match best {
            Some((idx, score)) if score >= self.threshold => {
                let field = self.catalog.all_fields()[idx].clone();
                debug!(phrase, field = %field.name, score, "Resolved by similarity");
                Ok(Some(Resolution {
                    field,
                    score,
                    method: ResolutionMethod::Semantic,
                    rule_method: None,
                }))
            }
            Some((_, score)) => {
                debug!(phrase, score, threshold = self.threshold, "No field above threshold");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
