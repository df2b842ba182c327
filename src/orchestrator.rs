// one conversation's recommendation flow and follow-up actions

use std::sync::Arc;

use tracing::{debug, info};

use crate::candidates::CandidateSelector;
use crate::error::RecommendationError;
use crate::models::{AiRecommendationRequest, AiRecommendationResponse, AiUserContext, QueryContext};
use crate::reasoning::ReasoningService;
use crate::store::EventStore;

/// Coordinates a single session: query → events → candidates → reasoning,
/// remembering the last response so follow-ups can refer to it by position.
///
/// Operations take `&mut self`; share an instance across callers only behind
/// a lock.
pub struct RecommendationOrchestrator {
    event_store: Arc<dyn EventStore>,
    reasoning: Arc<dyn ReasoningService>,
    selector: CandidateSelector,
    last_result: Option<AiRecommendationResponse>,
}

impl RecommendationOrchestrator {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        reasoning: Arc<dyn ReasoningService>,
        selector: CandidateSelector,
    ) -> Self {
        Self {
            event_store,
            reasoning,
            selector,
            last_result: None,
        }
    }

    /// Runs a query end to end and stores the response as the session's last
    /// result. On any collaborator failure the previous result is kept.
    pub async fn process_query(
        &mut self,
        user_query: &str,
        context: QueryContext,
    ) -> Result<AiRecommendationResponse, RecommendationError> {
        info!(query = user_query, "Processing recommendation query");

        let events = self
            .event_store
            .get_filtered_events(&context.filters())
            .await?;

        let time_window = context.time_window();
        let candidates = self.selector.select(
            &events,
            context.user_location.as_ref(),
            time_window.as_ref(),
            context.max_distance_km,
        );
        debug!(
            fetched = events.len(),
            candidates = candidates.len(),
            "Candidates ready"
        );

        let request = AiRecommendationRequest {
            user_query: user_query.to_string(),
            user_context: AiUserContext {
                approx_location: context.user_location.and_then(|location| location.name),
                max_distance_km: context.max_distance_km,
                time_window_start: context.time_window_start,
                time_window_end: context.time_window_end,
            },
            events: candidates,
        };

        let response = self.reasoning.recommend_events(&request).await?;
        info!(
            recommended = response.recommended_events.len(),
            "Recommendation received"
        );

        self.last_result = Some(response.clone());
        Ok(response)
    }

    /// Joins the `index`-th event of the last response and returns its id.
    pub async fn join_recommended_event_by_index(
        &self,
        index: i64,
        user_id: &str,
    ) -> Result<String, RecommendationError> {
        self.edit_recommended_event(index, user_id, true).await
    }

    pub async fn leave_recommended_event_by_index(
        &self,
        index: i64,
        user_id: &str,
    ) -> Result<String, RecommendationError> {
        self.edit_recommended_event(index, user_id, false).await
    }

    async fn edit_recommended_event(
        &self,
        index: i64,
        user_id: &str,
        join: bool,
    ) -> Result<String, RecommendationError> {
        let event_id = self.recommended_event_id(index)?.to_string();
        self.event_store
            .edit_event_as_user(&event_id, user_id, join)
            .await?;
        info!(event_id = %event_id, user_id, join, "Applied follow-up on recommendation");
        Ok(event_id)
    }

    fn recommended_event_id(&self, index: i64) -> Result<&str, RecommendationError> {
        let last = self
            .last_result
            .as_ref()
            .ok_or(RecommendationError::NoActiveResult)?;
        let len = last.recommended_events.len();

        usize::try_from(index)
            .ok()
            .and_then(|i| last.recommended_events.get(i))
            .map(|recommended| recommended.id.as_str())
            .ok_or(RecommendationError::IndexOutOfBounds { index, len })
    }

    pub fn reset_conversation(&mut self) {
        if self.last_result.take().is_some() {
            debug!("Conversation reset");
        }
    }

    pub fn last_result(&self) -> Option<&AiRecommendationResponse> {
        self.last_result.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::candidates::tests::{event_at, origin};
    use crate::models::{AiRecommendedEvent, Event, Filters};
    use crate::reasoning::ReasoningError;
    use crate::store::EventStoreError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub events: Vec<Event>,
        pub fail_fetch: bool,
        pub fail_edit: bool,
        pub fetches: Mutex<Vec<Filters>>,
        pub edits: Mutex<Vec<(String, String, bool)>>,
    }

    #[async_trait]
    impl EventStore for FakeStore {
        async fn get_filtered_events(
            &self,
            filters: &Filters,
        ) -> Result<Vec<Event>, EventStoreError> {
            self.fetches.lock().unwrap().push(filters.clone());
            if self.fail_fetch {
                return Err(EventStoreError("store offline".to_string()));
            }
            Ok(self.events.clone())
        }

        async fn edit_event_as_user(
            &self,
            event_id: &str,
            user_id: &str,
            join: bool,
        ) -> Result<(), EventStoreError> {
            self.edits
                .lock()
                .unwrap()
                .push((event_id.to_string(), user_id.to_string(), join));
            if self.fail_edit {
                return Err(EventStoreError(format!("Event {} not found", event_id)));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeReasoning {
        pub recommend: Vec<&'static str>,
        pub fail: bool,
        pub requests: Mutex<Vec<AiRecommendationRequest>>,
    }

    #[async_trait]
    impl ReasoningService for FakeReasoning {
        async fn recommend_events(
            &self,
            request: &AiRecommendationRequest,
        ) -> Result<AiRecommendationResponse, ReasoningError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ReasoningError("model unavailable".to_string()));
            }
            Ok(AiRecommendationResponse {
                assistant_message: format!("{} picks", self.recommend.len()),
                recommended_events: self
                    .recommend
                    .iter()
                    .map(|id| AiRecommendedEvent {
                        id: id.to_string(),
                        reason: format!("{id} matches"),
                    })
                    .collect(),
                followup_questions: None,
            })
        }
    }

    fn setup(
        store: FakeStore,
        reasoning: FakeReasoning,
    ) -> (RecommendationOrchestrator, Arc<FakeStore>, Arc<FakeReasoning>) {
        let store = Arc::new(store);
        let reasoning = Arc::new(reasoning);
        let orchestrator = RecommendationOrchestrator::new(
            store.clone(),
            reasoning.clone(),
            CandidateSelector::default(),
        );
        (orchestrator, store, reasoning)
    }

    fn music_setup() -> (RecommendationOrchestrator, Arc<FakeStore>, Arc<FakeReasoning>) {
        setup(
            FakeStore {
                events: vec![event_at("concert", 4.0, 2)],
                ..FakeStore::default()
            },
            FakeReasoning {
                recommend: vec!["concert", "jam-session"],
                ..FakeReasoning::default()
            },
        )
    }

    #[tokio::test]
    async fn music_events_then_join_second() {
        let (mut orchestrator, store, _) = music_setup();

        let response = orchestrator
            .process_query("music events", QueryContext::default())
            .await
            .unwrap();
        assert_eq!(response.recommended_events.len(), 2);

        let joined = orchestrator
            .join_recommended_event_by_index(1, "user123")
            .await
            .unwrap();

        assert_eq!(joined, "jam-session");
        let edits = store.edits.lock().unwrap();
        assert_eq!(
            *edits,
            vec![("jam-session".to_string(), "user123".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn join_before_any_query_is_an_illegal_state() {
        let (orchestrator, store, _) = music_setup();
        let err = orchestrator
            .join_recommended_event_by_index(0, "user123")
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendationError::NoActiveResult));
        assert!(store.edits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_after_reset_is_an_illegal_state() {
        let (mut orchestrator, _, _) = music_setup();
        orchestrator
            .process_query("music events", QueryContext::default())
            .await
            .unwrap();
        orchestrator.reset_conversation();

        let err = orchestrator
            .join_recommended_event_by_index(0, "user123")
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendationError::NoActiveResult));
    }

    #[tokio::test]
    async fn join_index_must_be_in_bounds() {
        let (mut orchestrator, store, _) = setup(
            FakeStore::default(),
            FakeReasoning {
                recommend: vec!["a", "b", "c"],
                ..FakeReasoning::default()
            },
        );
        orchestrator
            .process_query("anything", QueryContext::default())
            .await
            .unwrap();

        for (index, expected) in [(0, "a"), (1, "b"), (2, "c")] {
            let id = orchestrator
                .join_recommended_event_by_index(index, "u")
                .await
                .unwrap();
            assert_eq!(id, expected);
        }
        for index in [3, -1, 13] {
            let err = orchestrator
                .join_recommended_event_by_index(index, "u")
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    RecommendationError::IndexOutOfBounds { index: i, len: 3 } if i == index
                ),
                "index {index}: {err}"
            );
        }
        assert_eq!(store.edits.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_recommendations_are_a_valid_result() {
        let (mut orchestrator, _, reasoning) =
            setup(FakeStore::default(), FakeReasoning::default());
        let response = orchestrator
            .process_query("", QueryContext::default())
            .await
            .unwrap();

        assert!(response.recommended_events.is_empty());
        assert!(orchestrator.last_result().is_some());
        assert!(reasoning.requests.lock().unwrap()[0].events.is_empty());
        let err = orchestrator
            .join_recommended_event_by_index(0, "u")
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendationError::IndexOutOfBounds { index: 0, len: 0 }));
    }

    #[tokio::test]
    async fn reset_clears_and_is_idempotent() {
        let (mut orchestrator, _, _) = music_setup();
        assert!(orchestrator.last_result().is_none());
        orchestrator.reset_conversation();

        orchestrator
            .process_query("music events", QueryContext::default())
            .await
            .unwrap();
        assert!(orchestrator.last_result().is_some());

        orchestrator.reset_conversation();
        assert!(orchestrator.last_result().is_none());
        orchestrator.reset_conversation();
        assert!(orchestrator.last_result().is_none());
    }

    #[tokio::test]
    async fn store_failure_keeps_previous_result() {
        let (mut orchestrator, _, _) = music_setup();
        orchestrator
            .process_query("music events", QueryContext::default())
            .await
            .unwrap();
        let before = orchestrator.last_result().cloned();

        let offline: Arc<dyn EventStore> = Arc::new(FakeStore {
            fail_fetch: true,
            ..FakeStore::default()
        });
        orchestrator.event_store = offline;
        let err = orchestrator
            .process_query("jazz", QueryContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendationError::EventStore(_)));
        assert_eq!(orchestrator.last_result().cloned(), before);
    }

    #[tokio::test]
    async fn reasoning_failure_keeps_previous_state() {
        let (mut orchestrator, _, _) = setup(
            FakeStore::default(),
            FakeReasoning {
                fail: true,
                ..FakeReasoning::default()
            },
        );
        let err = orchestrator
            .process_query("music events", QueryContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendationError::Reasoning(_)));
        assert!(orchestrator.last_result().is_none());
    }

    #[tokio::test]
    async fn request_carries_coarse_context_and_ranked_candidates() {
        let start = crate::candidates::tests::base_time();
        let end = start + chrono::Duration::hours(12);
        let (mut orchestrator, store, reasoning) = setup(
            FakeStore {
                events: vec![
                    event_at("far", 60.0, 1),
                    event_at("near", 3.0, 2),
                    event_at("too-far", 90.0, 3),
                    event_at("next-week", 1.0, 24 * 7),
                ],
                ..FakeStore::default()
            },
            FakeReasoning::default(),
        );

        orchestrator
            .process_query(
                "something tonight",
                QueryContext {
                    user_location: Some(origin()),
                    time_window_start: Some(start),
                    time_window_end: Some(end),
                    max_distance_km: Some(75.0),
                },
            )
            .await
            .unwrap();

        let fetches = store.fetches.lock().unwrap();
        assert_eq!(fetches[0].start_date, Some(start));
        assert_eq!(fetches[0].end_date, Some(end));
        assert_eq!(fetches[0].place, Some(origin()));
        assert_eq!(fetches[0].radius_km, Some(75.0));

        let requests = reasoning.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.user_query, "something tonight");
        assert_eq!(request.user_context.approx_location.as_deref(), Some("Station F"));
        assert_eq!(request.user_context.max_distance_km, Some(75.0));
        assert_eq!(request.user_context.time_window_start, Some(start));
        assert_eq!(request.user_context.time_window_end, Some(end));
        let ids: Vec<&str> = request.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
    }

    #[tokio::test]
    async fn leave_sends_a_removal() {
        let (mut orchestrator, store, _) = music_setup();
        orchestrator
            .process_query("music events", QueryContext::default())
            .await
            .unwrap();
        let left = orchestrator
            .leave_recommended_event_by_index(0, "user123")
            .await
            .unwrap();
        assert_eq!(left, "concert");
        assert_eq!(
            store.edits.lock().unwrap()[0],
            ("concert".to_string(), "user123".to_string(), false)
        );
    }

    #[tokio::test]
    async fn join_through_in_memory_store_records_participant() {
        let store = Arc::new(crate::store::InMemoryEventStore::new(vec![
            event_at("concert", 4.0, 2),
            event_at("jam-session", 8.0, 3),
        ]));
        let reasoning = Arc::new(FakeReasoning {
            recommend: vec!["jam-session"],
            ..FakeReasoning::default()
        });
        let mut orchestrator =
            RecommendationOrchestrator::new(store.clone(), reasoning, CandidateSelector::default());

        orchestrator
            .process_query(
                "music events",
                QueryContext {
                    user_location: Some(origin()),
                    max_distance_km: Some(5.0),
                    ..QueryContext::default()
                },
            )
            .await
            .unwrap();
        orchestrator
            .join_recommended_event_by_index(0, "user123")
            .await
            .unwrap();

        let joined = store.get("jam-session").await.unwrap();
        assert_eq!(joined.participant_ids, vec!["user123"]);
    }

    #[tokio::test]
    async fn participation_failure_propagates_and_keeps_result() {
        let (mut orchestrator, store, _) = setup(
            FakeStore {
                fail_edit: true,
                ..FakeStore::default()
            },
            FakeReasoning {
                recommend: vec!["concert"],
                ..FakeReasoning::default()
            },
        );
        orchestrator
            .process_query("music events", QueryContext::default())
            .await
            .unwrap();

        let err = orchestrator
            .join_recommended_event_by_index(0, "user123")
            .await
            .unwrap_err();

        assert!(matches!(err, RecommendationError::EventStore(_)));
        assert_eq!(err.to_string(), "Event store error: Event concert not found");
        assert_eq!(store.edits.lock().unwrap().len(), 1);
        assert!(orchestrator.last_result().is_some());
    }
}
