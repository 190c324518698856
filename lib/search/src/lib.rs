//! # panelx Search
//!
//! Hybrid query resolution over a survey panel.
//!
//! A [`SearchQuery`](panelx_core::SearchQuery) is answered in two stages:
//!
//! 1. Structured filters are compiled into one predicate and evaluated
//!    against the attribute store.
//! 2. Semantic conditions are routed to the free-text or the poll index and
//!    searched concurrently, pre-filtered by the structured candidates when
//!    that set is small enough.
//!
//! Negative conditions then remove matching panels from every source, and
//! the [`FusionEngine`] combines the sources into intersection, union and
//! weighted sets before the final quota fill.
//!
//! Collaborator failures never fail a query: a source that times out or
//! errors contributes nothing and the answer shrinks instead.

pub mod config;
pub mod engine;
pub mod fanout;
pub mod fusion;
pub mod keywords;
pub mod negative;
pub mod orchestrator;
pub mod semantic;
pub mod source;
pub mod structured;
pub mod threshold;
pub mod vocabulary;

pub use config::{SearchConfig, SourceWeights};
pub use engine::{Backends, HybridEngine, Resolution};
pub use fanout::{Fanout, SubSearch, TaskOutcome};
pub use fusion::{FusedSets, FusionEngine, FusionState, KeywordPresenceWeights, Selection, WeightStrategy};
pub use keywords::{KeywordFilterBuilder, KeywordFilters, LegacyQuery};
pub use negative::NegativeFilter;
pub use orchestrator::{
    Route, SourceOutcome, SourceReport, SourceStatus, StageOutput, StageReport, StageState, Strategy,
    TwoStageOrchestrator,
};
pub use semantic::{combine_conditions, PreparedCondition, SemanticSearchExecutor};
pub use source::Source;
pub use structured::StructuredFilterEvaluator;
pub use threshold::{adaptive_threshold, ThresholdBand};
pub use vocabulary::FilterVocabulary;
