// narrows the event universe down to what the reasoning service sees

use std::cmp::Ordering;

use tracing::debug;

use crate::geo::distance_km;
use crate::models::{AiEventSummary, Event, Location, TimeWindow};

pub const DEFAULT_MAX_DISTANCE_KM: f64 = 100.0;
pub const DEFAULT_MAX_CANDIDATES: usize = 20;

/// Candidate selection with configurable defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateSelector {
    pub max_distance_km: f64,
    pub max_candidates: usize,
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self {
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl CandidateSelector {
    pub fn new(max_distance_km: f64, max_candidates: usize) -> Self {
        Self {
            max_distance_km,
            max_candidates,
        }
    }

    /// Runs [`select_candidates`] with this selector's limits, letting the caller
    /// override the distance budget for a single query.
    pub fn select(
        &self,
        events: &[Event],
        user_location: Option<&Location>,
        time_window: Option<&TimeWindow>,
        max_distance_km: Option<f64>,
    ) -> Vec<AiEventSummary> {
        select_candidates(
            events,
            user_location,
            time_window,
            max_distance_km.unwrap_or(self.max_distance_km),
            self.max_candidates,
        )
    }
}

/// Filters, orders and truncates `events` into summaries.
///
/// Distance mode is active only when `user_location` has coordinates. In that
/// mode events are ordered by distance alone, and an event whose own location
/// is unknown is kept (with no distance) rather than treated as too far; such
/// events sort after every event with a known distance. Otherwise events are
/// ordered by start time.
pub fn select_candidates(
    events: &[Event],
    user_location: Option<&Location>,
    time_window: Option<&TimeWindow>,
    max_distance_km: f64,
    max_candidates: usize,
) -> Vec<AiEventSummary> {
    let origin = user_location.filter(|location| location.is_defined());

    let mut ranked: Vec<(&Event, Option<f64>)> = events
        .iter()
        .filter(|event| time_window.map_or(true, |window| window.contains(event.start_time)))
        .map(|event| (event, origin.and_then(|origin| distance_km(origin, &event.location))))
        .filter(|(_, distance)| distance.map_or(true, |d| d <= max_distance_km))
        .collect();

    if origin.is_some() {
        ranked.sort_by(|(_, a), (_, b)| compare_distances(*a, *b));
    } else {
        ranked.sort_by_key(|(event, _)| event.start_time);
    }
    ranked.truncate(max_candidates);

    debug!(
        total = events.len(),
        selected = ranked.len(),
        distance_mode = origin.is_some(),
        "selected candidates"
    );

    ranked
        .into_iter()
        .map(|(event, distance)| summarize(event, distance))
        .collect()
}

// known distances ascending, unknown last
fn compare_distances(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn summarize(event: &Event, distance_km: Option<f64>) -> AiEventSummary {
    AiEventSummary {
        id: event.id.clone(),
        title: event.title.clone(),
        start_time: Some(event.start_time),
        end_time: event.end_time,
        tags: event.tags.clone(),
        distance_km,
        location_description: event.location.name.clone(),
        capacity_remaining: event
            .capacity
            .map(|capacity| capacity - event.participant_ids.len() as i64),
        price: event.price,
    }
}
