//! Integration tests for completion tracking
//!
//! Covers insert-or-reject recording, phase isolation, daily summaries and
//! cross-phase aggregation on both store backends.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use pretty_assertions::assert_eq;

use study_scheduler::completion::{CompletionRequest, CompletionTracker, RecordOutcome, SkipOutcome};
use study_scheduler::storage::{CompletionKey, MemoryStore, SqliteStore};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

async fn trackers() -> Vec<(&'static str, CompletionTracker)> {
    let sqlite = SqliteStore::new_in_memory()
        .await
        .expect("Failed to create in-memory storage");
    vec![
        ("memory", CompletionTracker::new(Arc::new(MemoryStore::new()))),
        ("sqlite", CompletionTracker::new(Arc::new(sqlite))),
    ]
}

// ============================================================================
// Recording
// ============================================================================

#[tokio::test]
async fn test_second_record_is_rejected() {
    for (name, tracker) in trackers().await {
        let request = || CompletionRequest::new("f", "dt", "screening", date(6));

        let first = tracker.record_completion(request().at(time(9, 15))).await.unwrap();
        assert!(first.success(), "{name}");

        let second = tracker.record_completion(request().at(time(9, 30))).await.unwrap();
        assert!(!second.success(), "{name}");
        match &second {
            RecordOutcome::Duplicate { existing } => {
                assert_eq!(existing.id, first.completion().id, "{name}");
                assert_eq!(existing.completion_time, time(9, 15), "{name}");
            }
            other => panic!("{name}: expected duplicate, got {other:?}"),
        }

        let stored = tracker.get_completions_for_date(date(6), None).await.unwrap();
        assert_eq!(stored.len(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_record_keeps_user_and_session() {
    for (name, tracker) in trackers().await {
        let outcome = tracker
            .record_completion(
                CompletionRequest::new("diary", "daily", "intervention", date(6))
                    .at(time(8, 0))
                    .by_user("participant-7")
                    .in_session("tablet-2"),
            )
            .await
            .unwrap();
        assert!(outcome.message().contains("recorded"), "{name}");

        let key = CompletionKey::new("diary", "daily", "intervention", date(6));
        let stored = tracker.get_completion(&key).await.unwrap().unwrap();
        assert_eq!(stored.user_id.as_deref(), Some("participant-7"), "{name}");
        assert_eq!(stored.session_id.as_deref(), Some("tablet-2"), "{name}");
    }
}

#[tokio::test]
async fn test_phase_isolation() {
    for (name, tracker) in trackers().await {
        tracker
            .record_completion(CompletionRequest::new("f", "dt", "screening", date(6)))
            .await
            .unwrap();

        let screening = CompletionKey::new("f", "dt", "screening", date(6));
        let intervention = CompletionKey::new("f", "dt", "intervention", date(6));
        assert!(tracker.is_complete(&screening).await.unwrap(), "{name}");
        assert!(!tracker.is_complete(&intervention).await.unwrap(), "{name}");

        let other_phase = tracker
            .get_completions_for_date(date(6), Some("intervention"))
            .await
            .unwrap();
        assert!(other_phase.is_empty(), "{name}");
    }
}

// ============================================================================
// Summaries
// ============================================================================

#[tokio::test]
async fn test_daily_summary_range() {
    for (name, tracker) in trackers().await {
        tracker
            .record_completion(CompletionRequest::new("qol", "dt", "intervention", date(6)).at(time(14, 0)))
            .await
            .unwrap();
        tracker
            .record_completion(CompletionRequest::new("diary", "dt", "intervention", date(6)).at(time(9, 15)))
            .await
            .unwrap();
        tracker
            .record_completion(CompletionRequest::new("diary", "dt", "intervention", date(7)).at(time(7, 0)))
            .await
            .unwrap();

        let summary = tracker.get_summary_for_date(date(6), None).await.unwrap();
        assert_eq!(summary.total_completions, 2, "{name}");
        assert_eq!(summary.earliest_time, Some(time(9, 15)), "{name}");
        assert_eq!(summary.latest_time, Some(time(14, 0)), "{name}");

        let forms: Vec<&str> = summary.completions.iter().map(|c| c.key.form_id.as_str()).collect();
        assert_eq!(forms, vec!["diary", "qol"], "{name}");
        assert_eq!(summary.by_phase().get("intervention"), Some(&2), "{name}");
    }
}

#[tokio::test]
async fn test_summary_with_phase_filter() {
    for (name, tracker) in trackers().await {
        tracker
            .record_completion(CompletionRequest::new("f", "dt", "screening", date(6)).at(time(8, 0)))
            .await
            .unwrap();
        tracker
            .record_completion(CompletionRequest::new("f", "dt", "intervention", date(6)).at(time(9, 0)))
            .await
            .unwrap();

        let all = tracker.get_summary_for_date(date(6), None).await.unwrap();
        assert_eq!(all.total_completions, 2, "{name}");

        let screening = tracker
            .get_summary_for_date(date(6), Some("screening"))
            .await
            .unwrap();
        assert_eq!(screening.total_completions, 1, "{name}");
        assert_eq!(screening.earliest_time, Some(time(8, 0)), "{name}");
        assert_eq!(screening.latest_time, Some(time(8, 0)), "{name}");
    }
}

#[tokio::test]
async fn test_cross_phase_summary_only_reads_listed_phases() {
    for (name, tracker) in trackers().await {
        for (phase, day) in [("screening", 2), ("screening", 3), ("intervention", 9), ("follow_up", 30)] {
            tracker
                .record_completion(CompletionRequest::new("f", "dt", phase, date(day)))
                .await
                .unwrap();
        }

        let summary = tracker
            .cross_phase_summary(&["screening", "intervention"])
            .await
            .unwrap();

        assert_eq!(summary.total_completions, 3, "{name}");
        assert_eq!(summary.latest_completion_date, Some(date(9)), "{name}");
        assert_eq!(summary.phases[0].phase, "screening", "{name}");
        assert_eq!(summary.phases[0].completions, 2, "{name}");
        assert_eq!(summary.phases[0].latest_completion_date, Some(date(3)), "{name}");
        assert_eq!(summary.phases[1].completions, 1, "{name}");

        let empty = tracker.cross_phase_summary(&[]).await.unwrap();
        assert_eq!(empty.total_completions, 0, "{name}");
        assert!(empty.latest_completion_date.is_none(), "{name}");
    }
}

// ============================================================================
// Skips
// ============================================================================

#[tokio::test]
async fn test_skip_and_unskip() {
    for (name, tracker) in trackers().await {
        let key = CompletionKey::new("mood", "dt", "intervention", date(6));

        let skipped = tracker.skip_form(key.clone(), "Travelling", false).await.unwrap();
        assert!(matches!(skipped, SkipOutcome::Skipped(_)), "{name}");
        assert!(tracker.is_skipped(&key).await.unwrap(), "{name}");

        let for_day = tracker.skips_for_day("dt", "intervention", date(6)).await.unwrap();
        assert_eq!(for_day.len(), 1, "{name}");
        assert!(tracker.skips_for_day("dt", "screening", date(6)).await.unwrap().is_empty(), "{name}");

        let unskipped = tracker.unskip_form(&key).await.unwrap();
        assert!(matches!(unskipped, SkipOutcome::Unskipped(_)), "{name}");
        assert!(unskipped.message().contains("pending"), "{name}");
        assert!(!tracker.is_skipped(&key).await.unwrap(), "{name}");
    }
}

#[tokio::test]
async fn test_required_form_cannot_be_skipped() {
    let tracker = CompletionTracker::in_memory();
    let key = CompletionKey::new("diary", "dt", "intervention", date(6));

    let outcome = tracker.skip_form(key.clone(), "Busy", true).await.unwrap();
    assert!(!outcome.success());
    assert!(outcome.message().contains("Cannot skip required forms"));
    assert!(!tracker.is_skipped(&key).await.unwrap());
}
