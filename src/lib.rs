// event recommendations with conversational follow-up

pub mod api;
pub mod candidates;
pub mod config;
pub mod error;
pub mod geo;
pub mod models;
pub mod orchestrator;
pub mod reasoning;
pub mod store;

pub use candidates::{select_candidates, CandidateSelector};
pub use error::RecommendationError;
pub use geo::distance_km;
pub use orchestrator::RecommendationOrchestrator;
pub use reasoning::ReasoningService;
pub use store::EventStore;
