//! # panelx Core
//!
//! Core library for the panelx hybrid query engine.
//!
//! This crate provides the fundamental data structures shared by every
//! other crate:
//!
//! - [`PanelRecord`] - A respondent with structured attributes
//! - [`SearchQuery`] - A classified query: filters, semantic conditions, target field
//! - [`CandidateSet`] - Panel ids produced by one source, with scores
//! - [`FieldCatalog`] - Canonical fields a phrase can be routed to
//! - [`Condition`] - Predicate language understood by attribute stores
//! - [`AttributeStore`], [`VectorIndex`], [`Embedder`] - Injected collaborators
//!
//! ## Example
//!
//! ```rust
//! use panelx_core::{Condition, Filter, PanelRecord};
//!
//! let record = PanelRecord::new("w1").with("gender", "F");
//! let condition = Condition::Equals { field: "gender".into(), value: "F".into() };
//! assert!(condition.matches(&record));
//! ```

pub mod candidate;
pub mod catalog;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod panel;
pub mod query;
pub mod traits;

pub use candidate::{rank_order, CandidateSet, ScoreMap};
pub use catalog::{CanonicalField, FieldCatalog, FieldKind};
pub use embedding::{cosine_similarity, Embedding};
pub use error::{Error, Result};
pub use filter::{Condition, Filter};
pub use panel::{FieldValue, PanelId, PanelIdSet, PanelRecord};
pub use query::{FilterOperator, SearchMode, SearchQuery, SemanticCondition, StructuredFilter};
pub use traits::{AttributeStore, Embedder, VectorHit, VectorIndex};
