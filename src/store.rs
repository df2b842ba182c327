// event store collaborators

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::geo::distance_km;
use crate::models::{Event, Filters, TimeWindow};

#[derive(Debug, thiserror::Error)]
#[error("Event store error: {0}")]
pub struct EventStoreError(pub String);

/// Source of events and owner of their participant lists.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_filtered_events(&self, filters: &Filters) -> Result<Vec<Event>, EventStoreError>;

    /// Adds (`join = true`) or removes `user_id` from the event's participants.
    /// Fails if the event does not exist.
    async fn edit_event_as_user(
        &self,
        event_id: &str,
        user_id: &str,
        join: bool,
    ) -> Result<(), EventStoreError>;
}

// events api over http
pub struct HttpEventStore {
    client: Client,
    base_url: Url,
}

impl HttpEventStore {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, EventStoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| EventStoreError(format!("Failed to create HTTP client: {}", e)))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| EventStoreError(format!("Invalid events API URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(EventStoreError(format!(
                "Events API URL {} cannot be a base",
                base_url
            )));
        }

        Ok(Self { client, base_url })
    }

    // each segment is percent-encoded, so ids cannot escape their path segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url, EventStoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EventStoreError("Events API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post(
        &self,
        url: Url,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, EventStoreError> {
        let target = url.to_string();
        self.client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| EventStoreError(format!("HTTP request to {} failed: {}", target, e)))
    }
}

#[async_trait]
impl EventStore for HttpEventStore {
    async fn get_filtered_events(&self, filters: &Filters) -> Result<Vec<Event>, EventStoreError> {
        let body = serde_json::to_value(filters)
            .map_err(|e| EventStoreError(format!("Failed to encode filters: {}", e)))?;
        let url = self.endpoint(&["events", "search"])?;
        let response = self.post(url, &body).await?;

        if !response.status().is_success() {
            return Err(EventStoreError(format!(
                "Event search returned error status: {}",
                response.status()
            )));
        }

        let events = parse_json::<Vec<Event>>(response).await?;
        debug!(count = events.len(), "fetched events");
        Ok(events)
    }

    async fn edit_event_as_user(
        &self,
        event_id: &str,
        user_id: &str,
        join: bool,
    ) -> Result<(), EventStoreError> {
        let url = self.endpoint(&["events", event_id, "participants"])?;
        let response = self
            .post(url, &json!({ "user_id": user_id, "join": join }))
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(event_id, user_id, join, "participation updated");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                Err(EventStoreError(format!("Event {} not found", event_id)))
            }
            status => Err(EventStoreError(format!(
                "Participation update returned error status: {}",
                status
            ))),
        }
    }
}

async fn parse_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, EventStoreError> {
    response
        .json()
        .await
        .map_err(|e| EventStoreError(format!("Failed to parse JSON response: {}", e)))
}

/// Events held in process. Filtering mirrors candidate selection: an event
/// with no coordinates is never excluded by the place/radius filter.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl InMemoryEventStore {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub async fn insert(&self, event: Event) {
        self.events.write().await.push(event);
    }

    pub async fn get(&self, event_id: &str) -> Option<Event> {
        self.events
            .read()
            .await
            .iter()
            .find(|event| event.id == event_id)
            .cloned()
    }
}

fn matches_filters(event: &Event, filters: &Filters) -> bool {
    let window = TimeWindow::from_bounds(filters.start_date, filters.end_date);
    if !window.map_or(true, |window| window.contains(event.start_time)) {
        return false;
    }

    match (&filters.place, filters.radius_km) {
        (Some(place), Some(radius)) => {
            distance_km(place, &event.location).map_or(true, |d| d <= radius)
        }
        _ => true,
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_filtered_events(&self, filters: &Filters) -> Result<Vec<Event>, EventStoreError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|event| matches_filters(event, filters))
            .cloned()
            .collect())
    }

    async fn edit_event_as_user(
        &self,
        event_id: &str,
        user_id: &str,
        join: bool,
    ) -> Result<(), EventStoreError> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|event| event.id == event_id)
            .ok_or_else(|| EventStoreError(format!("Event {} not found", event_id)))?;

        let already_in = event.participant_ids.iter().any(|id| id == user_id);
        if join && !already_in {
            event.participant_ids.push(user_id.to_string());
        } else if !join {
            event.participant_ids.retain(|id| id != user_id);
        }
        Ok(())
    }
}
