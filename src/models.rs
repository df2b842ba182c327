// data models for events and ai recommendations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: Some(name.into()),
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }

    /// The "unknown place" sentinel.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Coordinates, if both are known. A missing name does not matter here.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    pub fn is_defined(&self) -> bool {
        self.coordinates().is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub participant_ids: Vec<String>,
    #[serde(default)]
    pub price: f64,
}

// structural filter understood by the event store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub place: Option<Location>,
    pub radius_km: Option<f64>,
}

/// Inclusive bounds on an event's start time. A missing bound is open-ended.
///
/// `Option<TimeWindow>::None` means "no time constraint at all", which is not
/// the same thing as a window whose start lies after its end (that one matches
/// nothing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    // None when neither bound was given
    pub fn from_bounds(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<Self> {
        if start.is_none() && end.is_none() {
            None
        } else {
            Some(Self { start, end })
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| instant >= start)
            && self.end.map_or(true, |end| instant <= end)
    }
}

// optional context accompanying a user query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryContext {
    #[serde(default)]
    pub user_location: Option<Location>,
    #[serde(default)]
    pub time_window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_window_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_distance_km: Option<f64>,
}

impl QueryContext {
    pub fn time_window(&self) -> Option<TimeWindow> {
        TimeWindow::from_bounds(self.time_window_start, self.time_window_end)
    }

    pub fn filters(&self) -> Filters {
        Filters {
            start_date: self.time_window_start,
            end_date: self.time_window_end,
            place: self.user_location.clone(),
            radius_km: self.max_distance_km,
        }
    }
}

// compact projection of an event sent to the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiEventSummary {
    pub id: String,
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    /// Absent means unknown, not zero.
    pub distance_km: Option<f64>,
    pub location_description: Option<String>,
    pub capacity_remaining: Option<i64>,
    pub price: f64,
}

// coarse user context, never raw coordinates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiUserContext {
    pub approx_location: Option<String>,
    pub max_distance_km: Option<f64>,
    pub time_window_start: Option<DateTime<Utc>>,
    pub time_window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRecommendationRequest {
    pub user_query: String,
    pub user_context: AiUserContext,
    // order is the ranking signal
    pub events: Vec<AiEventSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRecommendedEvent {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRecommendationResponse {
    pub assistant_message: String,
    #[serde(default)]
    pub recommended_events: Vec<AiRecommendedEvent>,
    #[serde(default)]
    pub followup_questions: Option<Vec<String>>,
}
