use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Physical location of a venue, copied onto identities and bookings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub place_id: String,
    pub geohash: String,
    pub lat: f64,
    pub lng: f64,
}

/// Per-source activity stamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub last_scrape_start: Option<DateTime<Utc>>,
    pub last_scrape_end: Option<DateTime<Utc>>,
}

/// One execution of the ingestion pipeline for a single source.
///
/// `end_time` and `error` are written exactly once, when the run completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub id: String,
    pub source_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ScrapeRun {
    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    /// Only completed runs without an error may seed the next cursor.
    pub fn is_successful(&self) -> bool {
        self.is_complete() && self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: String,
    pub source_id: String,
    pub source_url: String,
    pub is_music_event: bool,
    pub title: String,
    pub description: String,
    /// Extraction order, duplicates preserved
    pub artists: Vec<String>,
    pub ticket_price: Option<f64>,
    pub adv_ticket_price: Option<f64>,
    pub door_ticket_price: Option<f64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub flier_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformerInfo {
    pub genres: Vec<String>,
    pub label: String,
    pub rating: f64,
    pub review_count: u32,
}

impl Default for PerformerInfo {
    fn default() -> Self {
        Self {
            genres: vec!["edm".to_string()],
            label: "None".to_string(),
            rating: 5.0,
            review_count: 1,
        }
    }
}

/// A performer profile. Pipeline-created profiles are `unclaimed` until the
/// real performer takes them over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformerIdentity {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub bio: String,
    pub location: Location,
    pub unclaimed: bool,
    pub occupations: Vec<String>,
    pub profile_picture: Option<String>,
    pub performer_info: PerformerInfo,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRunRef {
    pub source_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub source_run_ref: SourceRunRef,
    pub service_id: Option<String>,
    pub requester_id: String,
    pub requestee_id: String,
    pub location: Location,
    pub title: String,
    pub note: String,
    pub status: String,
    pub rate: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub flier_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewRole {
    Performer,
    Booker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub booking_id: String,
    pub performer_id: String,
    pub booker_id: String,
    pub rating: u8,
    pub text: String,
    pub role: ReviewRole,
    pub created_at: DateTime<Utc>,
}
