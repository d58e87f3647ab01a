//! # Elefante Core
//!
//! Local second-brain memory engine for AI agents. One record of knowledge
//! lives in two coordinated stores:
//!
//! - **Vector store**: dense-embedding semantic index with flattened,
//!   filterable metadata and temporal-decay scoring
//! - **Graph store**: entities, typed relationships, sessions, and a
//!   `memory` node per record (same UUID in both stores)
//!
//! The [`MemoryOrchestrator`] coordinates everything: the ingestion pipeline
//! (classify → embed → dedup probe → fan-out writes → auto-link), hybrid
//! retrieval (parallel vector + graph + conversation collectors with
//! adaptive weighting and near-duplicate merging), the deterministic
//! refinery (canonical-key dedup, lifecycle repair), and the agent-driven
//! ETL loop. Writers coordinate across processes through a file-backed
//! transaction-scoped write lock; reads are lock-free.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use elefante_core::{AddMemoryInput, EngineConfig, MemoryOrchestrator, SearchParams};
//!
//! let orchestrator = MemoryOrchestrator::open(EngineConfig::from_env()?)?;
//!
//! let added = orchestrator
//!     .add_memory(AddMemoryInput {
//!         content: "I prefer Black formatter with line-length 100".to_string(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! let results = orchestrator
//!     .search(SearchParams {
//!         query: "my formatting preference".to_string(),
//!         ..Default::default()
//!     })
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): bundle the embedded storage engine
//! - `onnx`: fastembed-backed local ONNX embedder (the default embedder is
//!   a deterministic feature-hash model that needs no model download)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod classify;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod etl;
pub mod graph;
pub mod lock;
pub mod memory;
pub mod orchestrator;
pub mod refinery;
pub mod search;
pub mod vector;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Configuration
pub use config::{EngineConfig, TemporalDecayConfig, is_truthy};

// Errors
pub use error::{EngineError, Result};

// Memory model
pub use memory::{
    CandidateSource, Domain, Entity, EntityType, KnowledgeType, Layer, Memory, MemoryPatch,
    MemorySource, MemoryStatus, MemoryType, MetaMap, MetaValue, Namespace, ProcessingStatus,
    QueryMode, Relationship, RelationshipType, Ring, SearchCandidate, SearchFilters, SearchResult,
    SessionInfo, WeightPlan,
};

// Stores
pub use graph::{GraphStore, GraphStoreStats, Neighborhood};
pub use vector::{ScoredMemory, VectorStore, VectorStoreStats};

// Locking
pub use lock::{LockStatus, WriteLock, WriteLockManager};

// Embeddings
pub use embeddings::{cosine_similarity, CachingEmbedder, Embedder, HashEmbedder};

#[cfg(feature = "onnx")]
#[cfg_attr(docsrs, doc(cfg(feature = "onnx")))]
pub use embeddings::onnx::OnnxEmbedder;

// Classification
pub use classify::topology::{classify_topology, Topology, TopologyInput};
pub use classify::{classify_namespace, infer_canonical_key, is_first_person};

// Orchestrator
pub use orchestrator::{
    thresholds, AddMemoryInput, AddMemoryResult, ConnectEntity, ConnectRelationship,
    ContextBundle, EntityRef, IngestOutcome, MemoryOrchestrator, SearchParams, SystemStatus,
};

// Refinery
pub use refinery::{build_plan, Refinery, RefineryPlan, RefineryReport, RefineryStats};

// ETL loop
pub use etl::{EtlClassification, EtlHints, EtlItem, EtlLoop, EtlStatus};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        AddMemoryInput, AddMemoryResult, EngineConfig, EngineError, IngestOutcome, Memory,
        MemoryOrchestrator, QueryMode, Result, SearchFilters, SearchParams, SearchResult,
    };

    pub use crate::{Embedder, HashEmbedder};
    pub use crate::{EtlClassification, EtlStatus};
    pub use crate::{GraphStore, VectorStore, WriteLockManager};
}
