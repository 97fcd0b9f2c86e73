//! Turns an adapter's extracted fields into a canonical event.

pub mod price;
pub mod time;

use crate::ai::ArtistExtractor;
use crate::apis::{ExtractedItem, RawItem};
use crate::config::SourceConfig;
use crate::error::{Result, ScraperError};
use crate::types::CanonicalEvent;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use price::parse_ticket_prices;
use regex::Regex;
use std::sync::Arc;
use time::{extract_mentions, reconcile};
use tracing::{debug, info};
use uuid::Uuid;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Drop markup and collapse whitespace so descriptions are plain single-spaced text
pub fn strip_html(input: &str) -> String {
    let without_tags = TAG_RE.replace_all(input, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    WHITESPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

/// Venue wall time to UTC. Ambiguous times take the earlier instant and
/// times inside a spring-forward gap move one hour later.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

pub struct EventNormalizer {
    extractor: Arc<dyn ArtistExtractor>,
    nlu_timeout: std::time::Duration,
}

impl EventNormalizer {
    pub fn new(extractor: Arc<dyn ArtistExtractor>, nlu_timeout: std::time::Duration) -> Self {
        Self {
            extractor,
            nlu_timeout,
        }
    }

    /// `Ok(None)` means the item is not a public music event with a usable
    /// time range. Errors are item failures.
    pub async fn normalize(
        &self,
        source: &SourceConfig,
        raw: &RawItem,
        extracted: ExtractedItem,
    ) -> Result<Option<CanonicalEvent>> {
        if !extracted.listed {
            info!("🚫 {} is not a public listing", raw.source_url);
            return Ok(None);
        }

        let Some(title) = extracted
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
        else {
            info!("🚫 {} has no title", raw.source_url);
            return Ok(None);
        };

        let Some(anchor) = extracted.anchor else {
            info!("🚫 '{}' has no start time", title);
            return Ok(None);
        };

        let description = strip_html(&extracted.description);
        let mut mentions = extracted.mentions;
        mentions.extend(extract_mentions(&description));

        let Some(range) = reconcile(anchor, &mentions) else {
            info!("🚫 '{}' has no forward time range ({} - {})", title, anchor.start, anchor.end);
            return Ok(None);
        };

        let (Some(start_time), Some(end_time)) = (
            local_to_utc(source.timezone, range.start),
            local_to_utc(source.timezone, range.end),
        ) else {
            info!("🚫 '{}' times do not exist in {}", title, source.timezone);
            return Ok(None);
        };
        if start_time >= end_time {
            info!("🚫 '{}' collapsed to an empty range in UTC", title);
            return Ok(None);
        }

        let price_text = if extracted.raw_price_text.trim().is_empty() {
            description.as_str()
        } else {
            extracted.raw_price_text.as_str()
        };
        let prices = parse_ticket_prices(price_text);

        let secs = self.nlu_timeout.as_secs();
        let extraction = tokio::time::timeout(
            self.nlu_timeout,
            self.extractor.extract_artists(&title, &description),
        )
        .await
        .map_err(|_| ScraperError::Timeout {
            operation: "artist extraction".to_string(),
            secs,
        })??;

        if !extraction.is_music_event {
            info!("🚫 '{}' is not a music event", title);
            return Ok(None);
        }
        debug!("'{}' artists: {:?}", title, extraction.names);

        Ok(Some(CanonicalEvent {
            id: Uuid::new_v4().to_string(),
            source_id: source.id.clone(),
            source_url: raw.source_url.clone(),
            is_music_event: true,
            title,
            description,
            artists: extraction.names,
            ticket_price: prices.ticket,
            adv_ticket_price: prices.advance,
            door_ticket_price: prices.door,
            start_time,
            end_time,
            flier_url: extracted.flier_url,
        }))
    }
}
