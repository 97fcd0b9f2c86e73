use super::{ExtractedItem, RawItem, SourceAdapter};
use crate::config::{SelectorConfig, SourceConfig};
use crate::constants::DEFAULT_EVENT_DURATION_MINUTES;
use crate::error::{Result, ScraperError};
use crate::pipeline::normalize::time::TimeRange;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use quick_xml::de::from_str;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Deserialize)]
struct UrlSet {
    #[serde(rename = "url", default)]
    urls: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize)]
struct UrlEntry {
    loc: String,
    lastmod: Option<String>,
}

const PAGE_TIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%B %d, %Y %I:%M %p",
    "%a, %b %d, %Y %I:%M %p",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

struct PageSelectors {
    title: Selector,
    description: Option<Selector>,
    price: Option<Selector>,
    flier: Option<Selector>,
    start: Option<Selector>,
    end: Option<Selector>,
}

impl PageSelectors {
    fn compile(config: &SelectorConfig) -> Result<Self> {
        let optional = |s: &Option<String>| s.as_deref().map(compile_selector).transpose();
        Ok(Self {
            title: compile_selector(&config.title)?,
            description: optional(&config.description)?,
            price: optional(&config.price)?,
            flier: optional(&config.flier)?,
            start: optional(&config.start)?,
            end: optional(&config.end)?,
        })
    }
}

fn compile_selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw)
        .map_err(|e| ScraperError::Config(format!("Invalid selector '{}': {:?}", raw, e)))
}

/// Reads a venue site that publishes its events through a sitemap.
///
/// Listing filters sitemap entries by `lastmod` against the run cursor and by
/// the configured event path pattern. Extraction fetches the event page and
/// reads fields with the source's CSS selectors.
pub struct SitemapAdapter {
    source: SourceConfig,
    client: reqwest::Client,
    event_path: Option<Regex>,
    selectors: PageSelectors,
}

impl SitemapAdapter {
    pub fn new(source: SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(source.request_timeout_secs))
            .user_agent(concat!("booking_scraper/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let event_path = source
            .event_path_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                ScraperError::Config(format!(
                    "Invalid event_path_pattern for source '{}': {}",
                    source.id, e
                ))
            })?;

        let selectors = PageSelectors::compile(&source.selectors)?;

        Ok(Self {
            source,
            client,
            event_path,
            selectors,
        })
    }

    fn sitemap_url(&self) -> Result<String> {
        if let Some(sitemap) = &self.source.sitemap {
            return Ok(sitemap.clone());
        }
        let base = Url::parse(&self.source.url)
            .map_err(|e| ScraperError::Config(format!("Invalid source url '{}': {}", self.source.url, e)))?;
        base.join("sitemap.xml")
            .map(|u| u.to_string())
            .map_err(|e| ScraperError::Config(format!("Cannot derive sitemap url: {}", e)))
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for SitemapAdapter {
    fn source_id(&self) -> &str {
        &self.source.id
    }

    #[instrument(skip(self), fields(source = %self.source.id))]
    async fn list(&self, cursor: Option<DateTime<Utc>>) -> Result<Vec<RawItem>> {
        let sitemap_url = self.sitemap_url()?;
        info!("Fetching sitemap {}", sitemap_url);

        let body = self.fetch_text(&sitemap_url).await?;
        let entries = parse_sitemap(&body)?;
        let total = entries.len();

        let items: Vec<RawItem> = select_entries(entries, cursor, self.event_path.as_ref())
            .into_iter()
            .map(|entry| RawItem {
                source_url: entry.loc,
                last_modified: entry.lastmod,
            })
            .collect();

        info!("Sitemap listed {} of {} urls", items.len(), total);
        Ok(items)
    }

    #[instrument(skip(self, item), fields(url = %item.source_url))]
    async fn extract(&self, item: &RawItem) -> Result<ExtractedItem> {
        if is_private_listing(&item.source_url) {
            debug!("Skipping private listing");
            return Ok(ExtractedItem::unlisted());
        }

        if let Some(changed) = item.last_modified {
            debug!("Listing last modified {}", changed.to_rfc3339());
        }
        let html = self.fetch_text(&item.source_url).await?;
        Ok(extract_from_html(
            &self.selectors,
            self.source.timezone,
            &item.source_url,
            &html,
        ))
    }
}

/// Pull every `<url>` entry out of a sitemap document.
pub fn parse_sitemap(xml: &str) -> Result<Vec<SitemapEntry>> {
    let set: UrlSet =
        from_str(xml).map_err(|e| ScraperError::Parse(format!("Invalid sitemap XML: {}", e)))?;
    Ok(set
        .urls
        .into_iter()
        .map(|entry| SitemapEntry {
            loc: entry.loc.trim().to_string(),
            lastmod: entry.lastmod.as_deref().and_then(|v| parse_lastmod(v.trim())),
        })
        .filter(|entry| !entry.loc.is_empty())
        .collect())
}

/// Keep entries changed at or after the cursor whose path looks like an event page.
/// Entries without a `lastmod` are always kept.
pub fn select_entries(
    entries: Vec<SitemapEntry>,
    cursor: Option<DateTime<Utc>>,
    event_path: Option<&Regex>,
) -> Vec<SitemapEntry> {
    entries
        .into_iter()
        .filter(|entry| match (cursor, entry.lastmod) {
            (Some(cursor), Some(lastmod)) => lastmod >= cursor,
            _ => true,
        })
        .filter(|entry| match event_path {
            Some(pattern) => Url::parse(&entry.loc)
                .map(|u| pattern.is_match(u.path()))
                .unwrap_or(false),
            None => true,
        })
        .collect()
}

fn parse_lastmod(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}

fn is_private_listing(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.path().to_lowercase().contains("private"))
        .unwrap_or(false)
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, selector: Option<&Selector>) -> Option<String> {
    let element = document.select(selector?).next()?;
    let text = element_text(element);
    (!text.is_empty()).then_some(text)
}

/// Attribute-first value of an element: machine-readable attributes win over text.
fn element_value(element: ElementRef, attrs: &[&str]) -> Option<String> {
    attrs
        .iter()
        .find_map(|a| element.value().attr(a))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            let text = element_text(element);
            (!text.is_empty()).then_some(text)
        })
}

fn page_time(document: &Html, selector: Option<&Selector>, tz: Tz) -> Option<NaiveDateTime> {
    let element = document.select(selector?).next()?;
    let value = element_value(element, &["datetime", "content"])?;
    let parsed = parse_page_time(&value, tz);
    if parsed.is_none() {
        warn!("Unrecognized page time '{}'", value);
    }
    parsed
}

/// Parse a page timestamp into venue-local wall time.
pub fn parse_page_time(value: &str, tz: Tz) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&tz).naive_local());
    }
    PAGE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Read the configured fields of one event page.
fn extract_from_html(
    selectors: &PageSelectors,
    tz: Tz,
    page_url: &str,
    html: &str,
) -> ExtractedItem {
    let document = Html::parse_document(html);

    let title = first_text(&document, Some(&selectors.title));
    let description = first_text(&document, selectors.description.as_ref()).unwrap_or_default();
    let raw_price_text = first_text(&document, selectors.price.as_ref()).unwrap_or_default();

    let anchor = page_time(&document, selectors.start.as_ref(), tz).map(|start| {
        let end = page_time(&document, selectors.end.as_ref(), tz)
            .unwrap_or_else(|| start + Duration::minutes(DEFAULT_EVENT_DURATION_MINUTES));
        TimeRange::new(start, end)
    });

    let flier_url = selectors
        .flier
        .as_ref()
        .and_then(|s| document.select(s).next())
        .and_then(|el| {
            ["src", "content", "href", "data-src"]
                .iter()
                .find_map(|a| el.value().attr(a))
                .map(str::to_string)
        })
        .and_then(|raw| {
            Url::parse(page_url)
                .and_then(|base| base.join(&raw))
                .map(|u| u.to_string())
                .ok()
        });

    ExtractedItem {
        title,
        description,
        anchor,
        mentions: Vec::new(),
        raw_price_text,
        flier_url,
        listed: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const SITEMAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://embermusichall.com/event/old-show/</loc>
    <lastmod>2024-01-02T10:00:00+00:00</lastmod>
  </url>
  <url>
    <loc>https://embermusichall.com/event/new-show/?a=1&amp;b=2</loc>
    <lastmod>2024-03-01T18:30:00-05:00</lastmod>
  </url>
  <url>
    <loc>https://embermusichall.com/about/</loc>
    <lastmod>2024-03-05</lastmod>
  </url>
  <url>
    <loc>https://embermusichall.com/event/undated/</loc>
  </url>
</urlset>"#;

    fn selectors() -> PageSelectors {
        PageSelectors::compile(&SelectorConfig {
            title: "h1.event-title".to_string(),
            description: Some(".event-description".to_string()),
            price: Some(".price".to_string()),
            flier: Some("img.flier".to_string()),
            start: Some("time.start".to_string()),
            end: Some("time.end".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn test_parse_sitemap_entries() {
        let entries = parse_sitemap(SITEMAP).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].loc, "https://embermusichall.com/event/new-show/?a=1&b=2");
        assert_eq!(
            entries[1].lastmod,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap())
        );
        assert_eq!(
            entries[2].lastmod,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(entries[3].lastmod, None);
    }

    #[test]
    fn test_select_entries_by_cursor_and_path() {
        let cursor = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let pattern = Regex::new("^/event/(.+)$").unwrap();
        let selected = select_entries(parse_sitemap(SITEMAP).unwrap(), Some(cursor), Some(&pattern));
        let locs: Vec<&str> = selected.iter().map(|e| e.loc.as_str()).collect();
        assert_eq!(
            locs,
            vec![
                "https://embermusichall.com/event/new-show/?a=1&b=2",
                "https://embermusichall.com/event/undated/",
            ]
        );
    }

    #[test]
    fn test_select_entries_without_cursor_keeps_all() {
        assert_eq!(select_entries(parse_sitemap(SITEMAP).unwrap(), None, None).len(), 4);
    }

    #[test]
    fn test_parse_sitemap_cdata_and_entities() {
        let xml = r#"<urlset>
  <url><loc><![CDATA[https://embermusichall.com/event/a/]]></loc></url>
  <url><loc>https://embermusichall.com/event/b/?x=1&#38;y=2</loc><lastmod> 2024-03-05 </lastmod></url>
</urlset>"#;
        let entries = parse_sitemap(xml).unwrap();
        assert_eq!(entries[0].loc, "https://embermusichall.com/event/a/");
        assert_eq!(entries[1].loc, "https://embermusichall.com/event/b/?x=1&y=2");
        assert_eq!(
            entries[1].lastmod,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );

        let pattern = Regex::new("^/event/(.+)$").unwrap();
        assert_eq!(select_entries(entries, None, Some(&pattern)).len(), 2);
    }

    #[test]
    fn test_empty_and_broken_sitemaps() {
        assert!(parse_sitemap("<urlset></urlset>").unwrap().is_empty());
        assert!(matches!(
            parse_sitemap("<urlset><url><loc>https://x.test/</url>"),
            Err(ScraperError::Parse(_))
        ));
    }

    #[test]
    fn test_extract_from_html() {
        let html = r#"<html><body>
            <h1 class="event-title">  Night Tapes w/ Friends </h1>
            <div class="event-description"><p>Doors 7pm.</p><p>Show 8pm - 11pm</p></div>
            <span class="price">$15 - $20</span>
            <time class="start" datetime="2024-03-08T19:00:00-05:00">Fri Mar 8</time>
            <time class="end" datetime="2024-03-08T23:00:00-05:00"></time>
            <img class="flier" src="/uploads/flier.jpg">
        </body></html>"#;

        let item = extract_from_html(
            &selectors(),
            chrono_tz::America::New_York,
            "https://embermusichall.com/event/night-tapes/",
            html,
        );

        assert!(item.listed);
        assert_eq!(item.title.as_deref(), Some("Night Tapes w/ Friends"));
        assert_eq!(item.description, "Doors 7pm. Show 8pm - 11pm");
        assert_eq!(item.raw_price_text, "$15 - $20");
        assert_eq!(
            item.flier_url.as_deref(),
            Some("https://embermusichall.com/uploads/flier.jpg")
        );
        let anchor = item.anchor.unwrap();
        assert_eq!(anchor.start.hour(), 19);
        assert_eq!(anchor.end.hour(), 23);
    }

    #[test]
    fn test_missing_end_defaults_to_an_hour() {
        let html = r#"<h1 class="event-title">Trivia</h1>
            <time class="start">2024-03-08 20:00</time>"#;
        let item = extract_from_html(&selectors(), chrono_tz::UTC, "https://x.test/event/a", html);
        let anchor = item.anchor.unwrap();
        assert_eq!(anchor.end - anchor.start, Duration::minutes(60));
        assert!(item.flier_url.is_none());
    }

    #[test]
    fn test_missing_start_leaves_no_anchor() {
        let item = extract_from_html(
            &selectors(),
            chrono_tz::UTC,
            "https://x.test/event/a",
            "<h1 class=\"event-title\">Show</h1>",
        );
        assert!(item.anchor.is_none());
        assert_eq!(item.title.as_deref(), Some("Show"));
    }

    #[test]
    fn test_private_listing_detection() {
        assert!(is_private_listing("https://x.test/event/private-party/"));
        assert!(!is_private_listing("https://x.test/event/open-mic/"));
    }

    #[test]
    fn test_parse_page_time_formats() {
        let tz = chrono_tz::America::Los_Angeles;
        let from_offset = parse_page_time("2024-07-04T02:00:00Z", tz).unwrap();
        assert_eq!(from_offset.hour(), 19);
        assert!(parse_page_time("March 08, 2024 08:00 PM", tz).is_some());
        assert!(parse_page_time("next friday", tz).is_none());
    }
}
