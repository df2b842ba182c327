// error taxonomy for recommendation sessions

use crate::reasoning::ReasoningError;
use crate::store::EventStoreError;

#[derive(Debug, thiserror::Error)]
pub enum RecommendationError {
    /// Join or leave requested before any query, or after a reset.
    #[error("No recommendation in this conversation yet - ask for events first")]
    NoActiveResult,

    #[error("Recommendation index {index} is out of bounds ({len} recommended events)")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
}
