//! Storage layer for completion bookkeeping.
//!
//! Completions and skips are keyed by [`CompletionKey`]
//! `(form_id, day_type_id, phase, completion_date)`. The key always includes
//! the phase, so the same form on the same date in two phases are two
//! independent facts.
//!
//! Two backends implement [`CompletionStore`]:
//! - [`MemoryStore`]: per-study in-process maps
//! - [`SqliteStore`]: durable SQLite storage with embedded migrations

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// Composite key of a completion or skip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompletionKey {
    pub form_id: String,
    pub day_type_id: String,
    pub phase: String,
    pub completion_date: NaiveDate,
}

impl CompletionKey {
    /// Create a new key.
    pub fn new(
        form_id: impl Into<String>,
        day_type_id: impl Into<String>,
        phase: impl Into<String>,
        completion_date: NaiveDate,
    ) -> Self {
        Self {
            form_id: form_id.into(),
            day_type_id: day_type_id.into(),
            phase: phase.into(),
            completion_date,
        }
    }
}

impl std::fmt::Display for CompletionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.form_id, self.day_type_id, self.phase, self.completion_date
        )
    }
}

/// The record that a form was submitted for a day type, phase and date.
///
/// Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Unique record identifier.
    pub id: String,
    #[serde(flatten)]
    pub key: CompletionKey,
    /// Time of day the form was completed.
    pub completion_time: NaiveTime,
    /// Who completed the form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session the form was completed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}

impl Completion {
    /// Create a new completion record with a fresh id.
    pub fn new(key: CompletionKey, completion_time: NaiveTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key,
            completion_time,
            user_id: None,
            session_id: None,
            recorded_at: Utc::now(),
        }
    }

    /// Attach the submitting user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach the submitting session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Record that an optional form was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skip {
    #[serde(flatten)]
    pub key: CompletionKey,
    /// Why the form was skipped (never blank).
    pub reason: String,
    /// When the skip was recorded.
    pub skipped_at: DateTime<Utc>,
}

impl Skip {
    /// Create a new skip record.
    pub fn new(key: CompletionKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            reason: reason.into(),
            skipped_at: Utc::now(),
        }
    }
}

/// Filter for completion and skip lookups. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionQuery {
    pub date: Option<NaiveDate>,
    pub phase: Option<String>,
    pub day_type_id: Option<String>,
}

impl CompletionQuery {
    /// Match every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match records on `date`.
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    /// Match records of `phase`.
    pub fn for_phase(phase: impl Into<String>) -> Self {
        Self {
            phase: Some(phase.into()),
            ..Self::default()
        }
    }

    /// Narrow to a phase.
    pub fn in_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Narrow to an optional phase.
    pub fn in_optional_phase(mut self, phase: Option<&str>) -> Self {
        self.phase = phase.map(str::to_string);
        self
    }

    /// Narrow to a day type.
    pub fn with_day_type(mut self, day_type_id: impl Into<String>) -> Self {
        self.day_type_id = Some(day_type_id.into());
        self
    }

    /// Whether `key` passes the filter.
    pub fn matches(&self, key: &CompletionKey) -> bool {
        self.date.map_or(true, |d| d == key.completion_date)
            && self.phase.as_deref().map_or(true, |p| p == key.phase)
            && self
                .day_type_id
                .as_deref()
                .map_or(true, |dt| dt == key.day_type_id)
    }
}

/// Result of an insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written.
    Inserted,
    /// A record already existed for the key; it is returned unchanged.
    Duplicate(Completion),
}

/// Persistence operations for completions and skips.
///
/// `insert_completion` must be atomic: under concurrent attempts at most one
/// insert per key succeeds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionStore: Send + Sync {
    /// Insert unless a completion exists for the same key.
    async fn insert_completion(&self, completion: &Completion) -> StorageResult<InsertOutcome>;

    /// Look up a completion by key.
    async fn get_completion(&self, key: &CompletionKey) -> StorageResult<Option<Completion>>;

    /// Completions matching `query`, ordered by date then time of day.
    async fn find_completions(&self, query: &CompletionQuery) -> StorageResult<Vec<Completion>>;

    /// Insert a skip. Returns `false` if one already exists for the key.
    async fn insert_skip(&self, skip: &Skip) -> StorageResult<bool>;

    /// Remove a skip. Returns `false` if there was none.
    async fn delete_skip(&self, key: &CompletionKey) -> StorageResult<bool>;

    /// Look up a skip by key.
    async fn get_skip(&self, key: &CompletionKey) -> StorageResult<Option<Skip>>;

    /// Skips matching `query`, ordered by date then skip time.
    async fn find_skips(&self, query: &CompletionQuery) -> StorageResult<Vec<Skip>>;
}

/// Sort completions by date, time of day, then form id.
pub(crate) fn sort_completions(completions: &mut [Completion]) {
    completions.sort_by(|a, b| {
        a.key
            .completion_date
            .cmp(&b.key.completion_date)
            .then(a.completion_time.cmp(&b.completion_time))
            .then_with(|| a.key.cmp(&b.key))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, d).unwrap()
    }

    #[test]
    fn test_key_includes_phase() {
        let a = CompletionKey::new("diary", "daily", "screening", date(6));
        let b = CompletionKey::new("diary", "daily", "intervention", date(6));
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "diary/daily/screening/2024-11-06");
    }

    #[test]
    fn test_completion_serializes_flat() {
        let time = NaiveTime::from_hms_opt(9, 15, 0).unwrap();
        let completion = Completion::new(CompletionKey::new("diary", "daily", "screening", date(6)), time)
            .with_user("participant-1");
        let json = serde_json::to_value(&completion).unwrap();

        assert_eq!(json["form_id"], "diary");
        assert_eq!(json["phase"], "screening");
        assert_eq!(json["completion_date"], "2024-11-06");
        assert_eq!(json["user_id"], "participant-1");
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_query_matching() {
        let key = CompletionKey::new("diary", "daily", "screening", date(6));

        assert!(CompletionQuery::all().matches(&key));
        assert!(CompletionQuery::on(date(6)).matches(&key));
        assert!(!CompletionQuery::on(date(7)).matches(&key));
        assert!(CompletionQuery::on(date(6)).in_phase("screening").matches(&key));
        assert!(!CompletionQuery::on(date(6)).in_phase("intervention").matches(&key));
        assert!(CompletionQuery::for_phase("screening").with_day_type("daily").matches(&key));
        assert!(!CompletionQuery::all().with_day_type("weekly").matches(&key));
        assert!(CompletionQuery::on(date(6)).in_optional_phase(None).matches(&key));
    }

    #[test]
    fn test_sort_completions_by_time() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        let mut list = vec![
            Completion::new(CompletionKey::new("b", "x", "p", date(6)), t(14, 0)),
            Completion::new(CompletionKey::new("a", "x", "p", date(6)), t(9, 15)),
            Completion::new(CompletionKey::new("c", "x", "p", date(5)), t(20, 0)),
        ];
        sort_completions(&mut list);

        let forms: Vec<&str> = list.iter().map(|c| c.key.form_id.as_str()).collect();
        assert_eq!(forms, vec!["c", "a", "b"]);
    }
}
