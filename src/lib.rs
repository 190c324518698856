//! # panelx
//!
//! Hybrid query resolution over survey panels.
//!
//! panelx answers a classified query ("women in Seoul in their 30s who
//! exercise regularly, but not smokers") with an ordered list of panel ids
//! by combining structured attribute filters with semantic searches over
//! free-text and survey-poll answers.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! panelx --data panels.json.gz --query query.json --limit 100
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use panelx::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<()> {
//! let embedder = HashEmbedder::new(256)?;
//! let loaded = PanelSnapshot::load("panels.json")?
//!     .into_collaborators(&embedder)
//!     .await?;
//!
//! let backends = Backends {
//!     attributes: loaded.attributes,
//!     free_text: loaded.free_text,
//!     poll: loaded.poll,
//!     embedder: Arc::new(embedder),
//! };
//! let engine = HybridEngine::open(backends, Arc::new(FieldCatalog::builtin()), SearchConfig::default()).await?;
//!
//! let query = SearchQuery {
//!     semantic_conditions: vec![SemanticCondition::positive("운동을 꾸준히 한다")],
//!     limit: Some(100),
//!     ..Default::default()
//! };
//! let resolution = engine.resolve(&query).await?;
//! println!("{:?}", resolution.final_ids);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`panelx-core`](panelx_core) - Panel records, queries, candidate sets, field catalog, collaborator traits
//! - [`panelx-router`](panelx_router) - Rule and embedding based phrase-to-field routing
//! - [`panelx-storage`](panelx_storage) - In-memory collaborators, connection pool, embedders, snapshots
//! - [`panelx-search`](panelx_search) - Structured evaluation, semantic search, orchestration and fusion

// Re-export core types
pub use panelx_core::{
    AttributeStore, CandidateSet, CanonicalField, Condition, Embedder, Error, FieldCatalog, FieldKind,
    FilterOperator, PanelId, PanelIdSet, PanelRecord, Result, SearchMode, SearchQuery, SemanticCondition,
    StructuredFilter, VectorHit, VectorIndex,
};

// Re-export routing
pub use panelx_router::{RuleTable, SemanticRouter};

// Re-export storage
pub use panelx_storage::{HashEmbedder, MemoryAttributeStore, MemoryVectorIndex, PanelSnapshot, Pooled, SerializedEmbedder};

// Re-export search
pub use panelx_search::{Backends, HybridEngine, LegacyQuery, Resolution, SearchConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Backends, CanonicalField, Error, FieldCatalog, FilterOperator, HashEmbedder, HybridEngine,
        LegacyQuery, PanelId, PanelRecord, PanelSnapshot, Resolution, Result, SearchConfig, SearchMode,
        SearchQuery, SemanticCondition, StructuredFilter,
    };
}
