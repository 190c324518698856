//! # panelx Storage
//!
//! In-memory collaborators for the panelx engine: an attribute store, a
//! brute-force vector index, a bounded connection pool wrapper, local
//! embedders and JSON/gzip snapshots of a panel dataset.

pub mod embedder;
pub mod index;
pub mod memory;
pub mod pool;
pub mod snapshot;

pub use embedder::{HashEmbedder, SerializedEmbedder};
pub use index::{IndexEntry, MemoryVectorIndex};
pub use memory::MemoryAttributeStore;
pub use pool::{PoolStats, Pooled};
pub use snapshot::{AnswerData, LoadedSnapshot, PanelSnapshot};
