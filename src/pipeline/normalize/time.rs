//! Event time reconciliation.
//!
//! Sources give us an anchor range from a structured field (a calendar entry,
//! a page's `<time>` element) and a free-text description that often carries
//! more precise times ("doors 7pm, show 8pm-11pm"). Reconciliation trusts the
//! text where it widens the anchor, repairs empty or inverted ranges, and
//! rejects anything that still is not a forward range.

use crate::constants::DEFAULT_EVENT_DURATION_MINUTES;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn is_forward(&self) -> bool {
        self.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MentionKind {
    Start,
    End,
}

/// A time of day found in free text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeMention {
    pub time: NaiveTime,
    pub kind: MentionKind,
}

impl TimeMention {
    pub fn start(time: NaiveTime) -> Self {
        Self { time, kind: MentionKind::Start }
    }

    pub fn end(time: NaiveTime) -> Self {
        Self { time, kind: MentionKind::End }
    }
}

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s*(?:([ap])\.?\s?m\b\.?)?\s*(?:-|–|—|to\b|until\b|till\b|til\b)\s*(\d{1,2})(?::([0-5]\d))?\s*([ap])\.?\s?m\b\.?",
    )
    .expect("valid range regex")
});

static SINGLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:(\d{1,2})(?::([0-5]\d))?\s*([ap])\.?\s?m\b\.?|(noon))")
        .expect("valid time regex")
});

/// Convert a 12-hour clock reading to a time of day.
fn clock_time(hour: u32, minute: u32, pm: bool) -> Option<NaiveTime> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour_24 = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour_24, minute, 0)
}

fn capture_u32(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn is_pm(caps: &Captures<'_>, idx: usize) -> Option<bool> {
    caps.get(idx).map(|m| m.as_str().eq_ignore_ascii_case("p"))
}

/// Dollar amounts look like bare numbers to the time regexes
fn preceded_by_currency(text: &str, start: usize) -> bool {
    text[..start].trim_end().ends_with('$')
}

/// Parse a single time-of-day token such as `7pm`, `7:30 p.m.` or `noon`.
pub fn parse_time_of_day(token: &str) -> Option<NaiveTime> {
    let caps = SINGLE_RE.captures(token.trim())?;
    if caps.get(4).is_some() {
        return NaiveTime::from_hms_opt(12, 0, 0);
    }
    clock_time(capture_u32(&caps, 1)?, capture_u32(&caps, 2).unwrap_or(0), is_pm(&caps, 3)?)
}

/// Find times of day in free text, tagging each as a start or an end.
///
/// The second half of a range (`8-11pm`, `9pm to 1am`) is an end; every other
/// time is a start. A range's first half without am/pm borrows the second
/// half's, flipped when that would put it after the end on a 12-hour dial.
pub fn extract_mentions(text: &str) -> Vec<TimeMention> {
    let mut found: Vec<(usize, TimeMention)> = Vec::new();
    let mut covered: Vec<(usize, usize)> = Vec::new();

    for caps in RANGE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        covered.push((whole.start(), whole.end()));
        if preceded_by_currency(text, whole.start()) {
            continue;
        }
        let (Some(end_hour), Some(end_pm)) = (capture_u32(&caps, 4), is_pm(&caps, 6)) else {
            continue;
        };
        let end_minute = capture_u32(&caps, 5).unwrap_or(0);
        let Some(start_hour) = capture_u32(&caps, 1) else { continue };
        let start_minute = capture_u32(&caps, 2).unwrap_or(0);

        let start_pm = is_pm(&caps, 3).unwrap_or_else(|| {
            // 12 sits at the top of the dial
            if start_hour % 12 > end_hour % 12 {
                !end_pm
            } else {
                end_pm
            }
        });

        let (Some(start), Some(end)) = (
            clock_time(start_hour, start_minute, start_pm),
            clock_time(end_hour, end_minute, end_pm),
        ) else {
            continue;
        };

        found.push((whole.start(), TimeMention::start(start)));
        found.push((whole.start() + 1, TimeMention::end(end)));
    }

    for caps in SINGLE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if covered
            .iter()
            .any(|&(s, e)| whole.start() >= s && whole.start() < e)
        {
            continue;
        }
        if preceded_by_currency(text, whole.start()) {
            continue;
        }
        if let Some(time) = parse_time_of_day(whole.as_str()) {
            found.push((whole.start(), TimeMention::start(time)));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, m)| m).collect()
}

/// Move `candidate` forward by whole days until it is strictly after `floor`.
fn roll_past(candidate: NaiveDateTime, floor: NaiveDateTime) -> NaiveDateTime {
    if candidate > floor {
        return candidate;
    }
    let mut rolled = candidate + Duration::days((floor - candidate).num_days());
    while rolled <= floor {
        rolled += Duration::days(1);
    }
    rolled
}

/// Reconcile an authoritative anchor range with times mentioned in text.
///
/// Returns `None` when no forward range can be produced.
pub fn reconcile(anchor: TimeRange, mentions: &[TimeMention]) -> Option<TimeRange> {
    let starts: BTreeSet<NaiveTime> = mentions
        .iter()
        .filter(|m| m.kind == MentionKind::Start)
        .map(|m| m.time)
        .collect();
    let min_start = starts.iter().next().copied();
    let max_start = starts.iter().next_back().copied();
    let max_end = mentions
        .iter()
        .filter(|m| m.kind == MentionKind::End)
        .map(|m| m.time)
        .max();

    let mut start = anchor.start;
    if let Some(t) = min_start {
        if t < anchor.start.time() {
            start = anchor.start.date().and_time(t);
        }
    }

    let mut end = anchor.end;
    if let Some(t) = max_end {
        if t > anchor.end.time() {
            end = roll_past(anchor.end.date().and_time(t), start);
        }
    }

    // More than two distinct start times usually means several events share one listing
    let needs_repair = start >= end || !anchor.is_forward() || starts.len() > 2;
    if needs_repair {
        end = match (min_start, max_start) {
            (Some(min), Some(max)) if min != max => {
                let last_set = anchor.end.date().and_time(max)
                    + Duration::minutes(DEFAULT_EVENT_DURATION_MINUTES);
                roll_past(last_set, start)
            }
            _ => anchor.end,
        };
    }

    let reconciled = TimeRange::new(start, end);
    reconciled.is_forward().then_some(reconciled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn tod(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("7:00 pm"), Some(tod(19, 0)));
        assert_eq!(parse_time_of_day("7pm"), Some(tod(19, 0)));
        assert_eq!(parse_time_of_day("11:30 a.m."), Some(tod(11, 30)));
        assert_eq!(parse_time_of_day("12 am"), Some(tod(0, 0)));
        assert_eq!(parse_time_of_day("12 PM"), Some(tod(12, 0)));
        assert_eq!(parse_time_of_day("noon"), Some(tod(12, 0)));
        assert_eq!(parse_time_of_day("13pm"), None);
        assert_eq!(parse_time_of_day("soon"), None);
    }

    #[test]
    fn test_extract_mentions_tags_ranges() {
        let mentions = extract_mentions("Doors 7pm. Music 8-11pm, all ages");
        assert_eq!(
            mentions,
            vec![
                TimeMention::start(tod(19, 0)),
                TimeMention::start(tod(20, 0)),
                TimeMention::end(tod(23, 0)),
            ]
        );
    }

    #[test]
    fn test_extract_mentions_range_across_midnight() {
        let mentions = extract_mentions("Dance party 11 - 2am");
        assert_eq!(
            mentions,
            vec![TimeMention::start(tod(23, 0)), TimeMention::end(tod(2, 0))]
        );
    }

    #[test]
    fn test_extract_mentions_ignores_prices() {
        let mentions = extract_mentions("$10 - 12pm show? no: tickets $10-$15, doors 9 pm");
        assert_eq!(mentions, vec![TimeMention::start(tod(21, 0))]);
    }

    #[test]
    fn test_earlier_mentioned_start_overrides_anchor() {
        let anchor = TimeRange::new(at(20, 0), at(22, 0));
        let out = reconcile(anchor, &[TimeMention::start(tod(19, 0))]).unwrap();
        assert_eq!(out.start, at(19, 0));
        assert_eq!(out.end, at(22, 0));
    }

    #[test]
    fn test_later_mentioned_start_is_ignored() {
        let anchor = TimeRange::new(at(20, 0), at(22, 0));
        let out = reconcile(anchor, &[TimeMention::start(tod(21, 0))]).unwrap();
        assert_eq!(out, anchor);
    }

    #[test]
    fn test_degenerate_anchor_repaired_from_last_start() {
        let anchor = TimeRange::new(at(20, 0), at(20, 0));
        let mentions = [TimeMention::start(tod(19, 0)), TimeMention::start(tod(21, 0))];
        let out = reconcile(anchor, &mentions).unwrap();
        assert_eq!(out.start, at(19, 0));
        assert_eq!(out.end, at(22, 0));
    }

    #[test]
    fn test_later_mentioned_end_extends_anchor() {
        let anchor = TimeRange::new(at(20, 0), at(22, 0));
        let out = reconcile(anchor, &[TimeMention::end(tod(23, 30))]).unwrap();
        assert_eq!(out.end, at(23, 30));
    }

    #[test]
    fn test_many_starts_use_last_set_plus_an_hour() {
        let anchor = TimeRange::new(at(18, 0), at(23, 0));
        let mentions = [
            TimeMention::start(tod(18, 0)),
            TimeMention::start(tod(19, 0)),
            TimeMention::start(tod(20, 30)),
        ];
        let out = reconcile(anchor, &mentions).unwrap();
        assert_eq!(out.start, at(18, 0));
        assert_eq!(out.end, at(21, 30));
    }

    #[test]
    fn test_last_set_at_eleven_ends_next_day() {
        let anchor = TimeRange::new(at(22, 0), at(22, 0));
        let mentions = [TimeMention::start(tod(21, 0)), TimeMention::start(tod(23, 0))];
        let out = reconcile(anchor, &mentions).unwrap();
        assert_eq!(out.start, at(21, 0));
        assert_eq!(out.end, at(23, 0) + Duration::hours(1));
        assert_eq!(out.end.date(), NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
    }

    #[test]
    fn test_unrepairable_range_is_rejected() {
        let anchor = TimeRange::new(at(20, 0), at(20, 0));
        assert!(reconcile(anchor, &[]).is_none());
        assert!(reconcile(anchor, &[TimeMention::start(tod(21, 0))]).is_none());

        let inverted = TimeRange::new(at(22, 0), at(20, 0));
        assert!(reconcile(inverted, &[]).is_none());
    }
}
