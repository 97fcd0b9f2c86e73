pub mod factory;
pub mod sitemap;

use crate::error::Result;
use crate::pipeline::normalize::time::{TimeMention, TimeRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One candidate listing produced by a source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    /// Stable url of the listing
    pub source_url: String,
    /// When the source last changed the listing, if it says
    pub last_modified: Option<DateTime<Utc>>,
}

impl RawItem {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            last_modified: None,
        }
    }
}

/// Fields an adapter pulled out of a listing, before normalization
#[derive(Debug, Clone)]
pub struct ExtractedItem {
    pub title: Option<String>,
    pub description: String,
    /// Structured start/end in venue-local wall time
    pub anchor: Option<TimeRange>,
    /// Extra pre-tagged times; the description is scanned as well
    pub mentions: Vec<TimeMention>,
    pub raw_price_text: String,
    pub flier_url: Option<String>,
    /// False when the adapter already knows this is not a public event
    pub listed: bool,
}

impl ExtractedItem {
    pub fn listed(title: impl Into<String>, description: impl Into<String>, anchor: TimeRange) -> Self {
        Self {
            title: Some(title.into()),
            description: description.into(),
            anchor: Some(anchor),
            mentions: Vec::new(),
            raw_price_text: String::new(),
            flier_url: None,
            listed: true,
        }
    }

    pub fn unlisted() -> Self {
        Self {
            title: None,
            description: String::new(),
            anchor: None,
            mentions: Vec::new(),
            raw_price_text: String::new(),
            flier_url: None,
            listed: false,
        }
    }
}

/// Core trait that every listing source implements
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Id of the source this adapter reads
    fn source_id(&self) -> &str;

    /// Candidate items changed since `cursor`. Called once per run.
    async fn list(&self, cursor: Option<DateTime<Utc>>) -> Result<Vec<RawItem>>;

    /// Fetch and extract the fields of one item
    async fn extract(&self, item: &RawItem) -> Result<ExtractedItem>;
}
