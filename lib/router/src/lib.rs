//! # panelx Router
//!
//! Resolves free-form phrases ("people who order late-night snacks",
//! "30대", "OTT 이용") onto canonical fields of the [`FieldCatalog`].
//!
//! Resolution is two-tiered: an ordered [`RuleTable`] is consulted first
//! and scores 1.0; otherwise the phrase embedding is compared with the
//! pre-embedded catalog descriptions and the best field above the
//! configured threshold wins.
//!
//! [`FieldCatalog`]: panelx_core::FieldCatalog

pub mod router;
pub mod rules;

pub use router::{Resolution, ResolutionMethod, RouterConfig, SemanticRouter};
pub use rules::{MatchKind, Rule, RuleMatcher, RuleMethod, RuleSpec, RuleTable};
