//! Memory Data Model
//!
//! The record types shared by both store adapters: memories, entities,
//! relationships, sessions, and the search query surface.

pub mod entity;
pub mod query;
pub mod record;

pub use entity::{Entity, EntityType, Relationship, RelationshipType, SessionInfo};
pub use query::{
    CandidateSource, QueryMode, SearchCandidate, SearchFilters, SearchResult, WeightPlan,
};
pub use record::{
    Domain, Layer, Memory, MemoryPatch, MemoryStatus, MemoryType, MetaMap, MetaValue, Namespace,
    ProcessingStatus, Ring, KnowledgeType, MemorySource,
};
