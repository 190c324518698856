// Classified query types handed to the engine
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Comparison applied by a structured filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    In,
    Between,
    Gte,
    Lte,
    Like,
    /// Present and not a negative answer, using the field's default pattern
    NotNull,
    /// Present and not matching the given negative-answer pattern
    NotNullExcluding(String),
}

/// A field/operator/value triple produced by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFilter {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
}

impl StructuredFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// A free-text intent that is searched by meaning rather than by field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCondition {
    #[serde(alias = "original_keyword")]
    pub original_phrase: String,
    #[serde(default)]
    pub is_negative: bool,
    #[serde(default = "default_importance")]
    pub importance: f32,
    #[serde(default, alias = "expanded_queries")]
    pub expanded_synonyms: Vec<String>,
}

fn default_importance() -> f32 {
    1.0
}

impl SemanticCondition {
    pub fn positive(phrase: impl Into<String>) -> Self {
        Self {
            original_phrase: phrase.into(),
            is_negative: false,
            importance: 1.0,
            expanded_synonyms: Vec::new(),
        }
    }

    pub fn negative(phrase: impl Into<String>) -> Self {
        Self {
            is_negative: true,
            ..Self::positive(phrase)
        }
    }

    #[must_use]
    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expanded_synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    /// Phrases to embed: the original phrase followed by its distinct
    /// non-blank synonyms.
    pub fn search_phrases(&self) -> Vec<String> {
        let mut phrases: Vec<String> = Vec::with_capacity(self.expanded_synonyms.len() + 1);
        for p in std::iter::once(&self.original_phrase).chain(self.expanded_synonyms.iter()) {
            let p = p.trim();
            if !p.is_empty() && !phrases.iter().any(|existing| existing == p) {
                phrases.push(p.to_string());
            }
        }
        phrases
    }
}

/// Which candidate set is returned when no limit is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Intersection,
    Union,
    #[default]
    Weighted,
}

impl std::str::FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "intersection" => Ok(SearchMode::Intersection),
            "union" => Ok(SearchMode::Union),
            "weighted" => Ok(SearchMode::Weighted),
            other => Err(Error::InvalidQuery(format!("unknown search mode: {other}"))),
        }
    }
}

/// Classified query: the single input of a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchQuery {
    #[serde(default)]
    pub structured_filters: Vec<StructuredFilter>,
    #[serde(default)]
    pub semantic_conditions: Vec<SemanticCondition>,
    #[serde(default)]
    pub target_field: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub mode: SearchMode,
}

impl SearchQuery {
    /// Rejects contract violations. Anything that passes here is resolved
    /// without error, degrading to empty sources where needed.
    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(Error::InvalidQuery("limit must be positive".into()));
        }
        for filter in &self.structured_filters {
            if filter.field.trim().is_empty() {
                return Err(Error::InvalidQuery("filter with empty field name".into()));
            }
        }
        for condition in &self.semantic_conditions {
            if !condition.importance.is_finite() || !(0.0..=1.0).contains(&condition.importance) {
                return Err(Error::InvalidQuery(format!(
                    "importance {} of '{}' outside [0, 1]",
                    condition.importance, condition.original_phrase
                )));
            }
            if condition.search_phrases().is_empty() {
                return Err(Error::InvalidQuery("semantic condition without any phrase".into()));
            }
        }
        Ok(())
    }
}
