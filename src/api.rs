// http routes over per-conversation orchestrators

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;

use crate::candidates::CandidateSelector;
use crate::error::RecommendationError;
use crate::models::{AiRecommendationResponse, QueryContext};
use crate::orchestrator::RecommendationOrchestrator;
use crate::reasoning::ReasoningService;
use crate::store::EventStore;

type SharedOrchestrator = Arc<Mutex<RecommendationOrchestrator>>;

pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

struct SessionEntry {
    orchestrator: SharedOrchestrator,
    last_used: u64,
}

// entries stamped from a counter that only grows, so recency never ties
#[derive(Default)]
struct SessionTable {
    entries: HashMap<String, SessionEntry>,
    clock: u64,
}

impl SessionTable {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, session_id: &str) -> Option<SharedOrchestrator> {
        let now = self.tick();
        let entry = self.entries.get_mut(session_id)?;
        entry.last_used = now;
        Some(entry.orchestrator.clone())
    }
}

/// One orchestrator per conversation id. Collaborators are shared; each
/// session's state sits behind its own lock so sessions never wait on each other.
///
/// At most `max_sessions` conversations are kept; starting one more evicts the
/// least recently used. A reset ends the conversation and drops its entry.
#[derive(Clone)]
pub struct SessionRegistry {
    event_store: Arc<dyn EventStore>,
    reasoning: Arc<dyn ReasoningService>,
    selector: CandidateSelector,
    max_sessions: usize,
    sessions: Arc<Mutex<SessionTable>>,
}

impl SessionRegistry {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        reasoning: Arc<dyn ReasoningService>,
        selector: CandidateSelector,
    ) -> Self {
        Self {
            event_store,
            reasoning,
            selector,
            max_sessions: DEFAULT_MAX_SESSIONS,
            sessions: Arc::new(Mutex::new(SessionTable::default())),
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    // existing session or a fresh idle one
    pub async fn session(&self, session_id: &str) -> SharedOrchestrator {
        let mut sessions = self.sessions.lock().await;
        if let Some(orchestrator) = sessions.touch(session_id) {
            return orchestrator;
        }

        while sessions.entries.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.entries.remove(&oldest);
            info!(session_id = %oldest, "Evicted least recently used conversation");
        }

        info!(session_id, "Starting conversation");
        let orchestrator = Arc::new(Mutex::new(RecommendationOrchestrator::new(
            self.event_store.clone(),
            self.reasoning.clone(),
            self.selector,
        )));
        let last_used = sessions.tick();
        sessions.entries.insert(
            session_id.to_string(),
            SessionEntry {
                orchestrator: orchestrator.clone(),
                last_used,
            },
        );
        orchestrator
    }

    pub async fn existing(&self, session_id: &str) -> Option<SharedOrchestrator> {
        self.sessions.lock().await.touch(session_id)
    }

    /// Resets and forgets a conversation. Unknown ids are a no-op.
    pub async fn end(&self, session_id: &str) {
        let removed = self.sessions.lock().await.entries.remove(session_id);
        if let Some(entry) = removed {
            entry.orchestrator.lock().await.reset_conversation();
            info!(session_id, "Conversation ended");
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub session_id: String,
    pub query: String,
    #[serde(flatten)]
    pub context: QueryContext,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpRequest {
    pub session_id: String,
    pub index: i64,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FollowUpResponse {
    pub event_id: String,
}

#[derive(Debug)]
pub struct ApiError(RecommendationError);

impl From<RecommendationError> for ApiError {
    fn from(err: RecommendationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RecommendationError::NoActiveResult => StatusCode::CONFLICT,
            RecommendationError::IndexOutOfBounds { .. } => StatusCode::BAD_REQUEST,
            RecommendationError::EventStore(_) | RecommendationError::Reasoning(_) => {
                tracing::error!("Upstream failure: {}", self.0);
                StatusCode::BAD_GATEWAY
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn recommend_handler(
    State(registry): State<SessionRegistry>,
    Json(payload): Json<RecommendRequest>,
) -> Result<Json<AiRecommendationResponse>, ApiError> {
    info!(session_id = %payload.session_id, "Received recommendation request");
    let session = registry.session(&payload.session_id).await;
    let mut orchestrator = session.lock().await;
    let response = orchestrator
        .process_query(&payload.query, payload.context)
        .await?;
    Ok(Json(response))
}

async fn join_handler(
    State(registry): State<SessionRegistry>,
    Json(payload): Json<FollowUpRequest>,
) -> Result<Json<FollowUpResponse>, ApiError> {
    follow_up(&registry, &payload, true).await.map(Json)
}

async fn leave_handler(
    State(registry): State<SessionRegistry>,
    Json(payload): Json<FollowUpRequest>,
) -> Result<Json<FollowUpResponse>, ApiError> {
    follow_up(&registry, &payload, false).await.map(Json)
}

async fn follow_up(
    registry: &SessionRegistry,
    payload: &FollowUpRequest,
    join: bool,
) -> Result<FollowUpResponse, ApiError> {
    let session = registry
        .existing(&payload.session_id)
        .await
        .ok_or(RecommendationError::NoActiveResult)?;
    let orchestrator = session.lock().await;

    let event_id = if join {
        orchestrator
            .join_recommended_event_by_index(payload.index, &payload.user_id)
            .await?
    } else {
        orchestrator
            .leave_recommended_event_by_index(payload.index, &payload.user_id)
            .await?
    };
    Ok(FollowUpResponse { event_id })
}

async fn reset_handler(
    State(registry): State<SessionRegistry>,
    Json(payload): Json<ResetRequest>,
) -> StatusCode {
    registry.end(&payload.session_id).await;
    StatusCode::NO_CONTENT
}

async fn last_result_handler(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<String>,
) -> Json<Option<AiRecommendationResponse>> {
    let last = match registry.existing(&session_id).await {
        Some(session) => session.lock().await.last_result().cloned(),
        None => None,
    };
    Json(last)
}

// setup http routes
pub fn build_router(registry: SessionRegistry) -> Router {
    Router::new()
        .route("/recommendations", post(recommend_handler))
        .route("/recommendations/join", post(join_handler))
        .route("/recommendations/leave", post(leave_handler))
        .route("/recommendations/reset", post(reset_handler))
        .route("/recommendations/{session_id}", get(last_result_handler))
        .with_state(registry)
}
