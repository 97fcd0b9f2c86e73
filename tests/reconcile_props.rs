use booking_scraper::pipeline::normalize::time::{extract_mentions, reconcile, MentionKind, TimeMention, TimeRange};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use proptest::prelude::*;

fn anchor_start(day: u32, minute_of_day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(minute_of_day / 60, minute_of_day % 60, 0)
        .unwrap()
}

fn mention_strategy() -> impl Strategy<Value = TimeMention> {
    (0u32..1440, any::<bool>()).prop_map(|(minute, is_end)| {
        let time = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap();
        if is_end {
            TimeMention::end(time)
        } else {
            TimeMention::start(time)
        }
    })
}

proptest! {
    #[test]
    fn reconciled_ranges_run_forward(
        day in 1u32..28,
        minute_of_day in 0u32..1440,
        length_minutes in -600i64..900,
        mentions in prop::collection::vec(mention_strategy(), 0..6),
    ) {
        let start = anchor_start(day, minute_of_day);
        let anchor = TimeRange::new(start, start + Duration::minutes(length_minutes));

        if let Some(range) = reconcile(anchor, &mentions) {
            prop_assert!(range.start < range.end);
            // Text only ever moves the start earlier
            prop_assert!(range.start <= anchor.start);
        }
    }

    #[test]
    fn forward_anchor_without_mentions_is_kept(
        day in 1u32..28,
        minute_of_day in 0u32..1440,
        length_minutes in 1i64..900,
    ) {
        let start = anchor_start(day, minute_of_day);
        let anchor = TimeRange::new(start, start + Duration::minutes(length_minutes));
        prop_assert_eq!(reconcile(anchor, &[]), Some(anchor));
    }

    #[test]
    fn every_end_mention_has_a_start(text in "\\PC{0,80}") {
        let mentions = extract_mentions(&text);
        let ends = mentions.iter().filter(|m| m.kind == MentionKind::End).count();
        prop_assert!(ends * 2 <= mentions.len());
    }
}
