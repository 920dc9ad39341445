pub mod entity;
pub mod episode;
pub mod extraction;
pub mod fact_edge;
pub mod store;

pub use entity::{CompanyRole, Entity, EntityType, PersonRole};
pub use episode::{Episode, SourceChannel};
pub use extraction::{extract, ExtractedEntity, ExtractedFact, ExtractionResult};
pub use fact_edge::{
    base_confidence_for_channel, FactEdge, FactLabel, CONTRADICTION_DERIVED_CONFIDENCE,
};
pub use store::{Candidate, CandidateKind, KnowledgeGraphStore, TripleScore};
