//! Completion tracking.
//!
//! Records which forms were done for which day type, in which phase, on
//! which date. Recording is insert-or-reject: the first submission for a key
//! is kept and later attempts are reported as duplicates, never overwriting
//! the original completion time. Duplicates and rejected skips are ordinary
//! outcomes, not errors; only storage failures surface as `Err`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::StorageResult;
use crate::storage::{
    Completion, CompletionKey, CompletionQuery, CompletionStore, InsertOutcome, MemoryStore, Skip,
};

/// Input for [`CompletionTracker::record_completion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub key: CompletionKey,
    /// Defaults to the local time of the call
    pub completion_time: Option<NaiveTime>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl CompletionRequest {
    /// Create a request for a key.
    pub fn new(
        form_id: impl Into<String>,
        day_type_id: impl Into<String>,
        phase: impl Into<String>,
        completion_date: NaiveDate,
    ) -> Self {
        Self::for_key(CompletionKey::new(form_id, day_type_id, phase, completion_date))
    }

    /// Create a request for an existing key.
    pub fn for_key(key: CompletionKey) -> Self {
        Self {
            key,
            completion_time: None,
            user_id: None,
            session_id: None,
        }
    }

    /// Set the completion time.
    pub fn at(mut self, time: NaiveTime) -> Self {
        self.completion_time = Some(time);
        self
    }

    /// Set the submitting user.
    pub fn by_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the submitting session.
    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Result of recording a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The completion was stored.
    Recorded(Completion),
    /// A completion already existed for the key and was left untouched.
    Duplicate { existing: Completion },
}

impl RecordOutcome {
    /// `true` only when a new record was written.
    pub fn success(&self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }

    /// The stored record: the new one, or the one that blocked the insert.
    pub fn completion(&self) -> &Completion {
        match self {
            RecordOutcome::Recorded(c) => c,
            RecordOutcome::Duplicate { existing } => existing,
        }
    }

    /// User-facing description.
    pub fn message(&self) -> String {
        match self {
            RecordOutcome::Recorded(c) => format!(
                "Form '{}' recorded for {} in {} on {}",
                c.key.form_id, c.key.day_type_id, c.key.phase, c.key.completion_date
            ),
            RecordOutcome::Duplicate { existing } => format!(
                "Form '{}' was already completed for {} in {} on {} at {}",
                existing.key.form_id,
                existing.key.day_type_id,
                existing.key.phase,
                existing.key.completion_date,
                existing.completion_time.format("%H:%M")
            ),
        }
    }
}

/// Why a skip request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipRejection {
    RequiredForm,
    MissingReason,
    AlreadySkipped,
    AlreadyCompleted,
    NotSkipped,
}

impl std::fmt::Display for SkipRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipRejection::RequiredForm => write!(f, "Cannot skip required forms"),
            SkipRejection::MissingReason => write!(f, "Skip reason is required"),
            SkipRejection::AlreadySkipped => write!(f, "Form already skipped for this day"),
            SkipRejection::AlreadyCompleted => write!(f, "Form already completed for this day"),
            SkipRejection::NotSkipped => write!(f, "Form was not skipped"),
        }
    }
}

/// Result of a skip or unskip request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped(Skip),
    Unskipped(Skip),
    Rejected {
        key: CompletionKey,
        rejection: SkipRejection,
    },
}

impl SkipOutcome {
    /// Whether the request changed anything.
    pub fn success(&self) -> bool {
        !matches!(self, SkipOutcome::Rejected { .. })
    }

    /// User-facing description.
    pub fn message(&self) -> String {
        match self {
            SkipOutcome::Skipped(s) => format!("Form '{}' skipped successfully", s.key.form_id),
            SkipOutcome::Unskipped(s) => {
                format!("Skip removed - form '{}' is now pending", s.key.form_id)
            }
            SkipOutcome::Rejected { key, rejection } => {
                format!("{} ('{}')", rejection, key.form_id)
            }
        }
    }
}

/// Completions on one date.
///
/// "Nothing recorded" is an explicit empty state: zero total, empty list,
/// no times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub phase: Option<String>,
    pub total_completions: usize,
    pub completions: Vec<Completion>,
    pub earliest_time: Option<NaiveTime>,
    pub latest_time: Option<NaiveTime>,
}

impl DailySummary {
    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.total_completions == 0
    }

    /// Completions grouped by phase.
    pub fn by_phase(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for c in &self.completions {
            *counts.entry(c.key.phase.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Completion count for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCompletionCount {
    pub phase: String,
    pub completions: usize,
    pub latest_completion_date: Option<NaiveDate>,
}

/// Completions aggregated over an explicit list of phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossPhaseSummary {
    pub total_completions: usize,
    pub phases: Vec<PhaseCompletionCount>,
    pub latest_completion_date: Option<NaiveDate>,
}

/// Records and queries completions through a [`CompletionStore`].
#[derive(Clone)]
pub struct CompletionTracker {
    store: Arc<dyn CompletionStore>,
}

impl CompletionTracker {
    /// Track completions in `store`.
    pub fn new(store: Arc<dyn CompletionStore>) -> Self {
        Self { store }
    }

    /// Track completions in a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn CompletionStore> {
        &self.store
    }

    /// Record a completion unless one exists for the key.
    pub async fn record_completion(&self, request: CompletionRequest) -> StorageResult<RecordOutcome> {
        let time = request
            .completion_time
            .unwrap_or_else(|| Local::now().time());

        let mut completion = Completion::new(request.key, time);
        completion.user_id = request.user_id;
        completion.session_id = request.session_id;

        match self.store.insert_completion(&completion).await? {
            InsertOutcome::Inserted => {
                info!(key = %completion.key, time = %completion.completion_time, "Completion recorded");
                Ok(RecordOutcome::Recorded(completion))
            }
            InsertOutcome::Duplicate(existing) => {
                warn!(
                    key = %existing.key,
                    original_time = %existing.completion_time,
                    "Duplicate completion rejected"
                );
                Ok(RecordOutcome::Duplicate { existing })
            }
        }
    }

    /// Whether a completion exists for the key.
    pub async fn is_complete(&self, key: &CompletionKey) -> StorageResult<bool> {
        Ok(self.store.get_completion(key).await?.is_some())
    }

    /// The completion stored for the key.
    pub async fn get_completion(&self, key: &CompletionKey) -> StorageResult<Option<Completion>> {
        self.store.get_completion(key).await
    }

    /// Completions on `date`, optionally limited to one phase, earliest first.
    pub async fn get_completions_for_date(
        &self,
        date: NaiveDate,
        phase: Option<&str>,
    ) -> StorageResult<Vec<Completion>> {
        self.store
            .find_completions(&CompletionQuery::on(date).in_optional_phase(phase))
            .await
    }

    /// Every completion in `phase`, in date and time order.
    pub async fn get_completions_for_phase(&self, phase: &str) -> StorageResult<Vec<Completion>> {
        self.store
            .find_completions(&CompletionQuery::for_phase(phase))
            .await
    }

    /// Every stored completion across all phases, in date and time order.
    pub async fn all_completions(&self) -> StorageResult<Vec<Completion>> {
        self.store.find_completions(&CompletionQuery::all()).await
    }

    /// Count and time range of completions on `date`.
    pub async fn get_summary_for_date(
        &self,
        date: NaiveDate,
        phase: Option<&str>,
    ) -> StorageResult<DailySummary> {
        let completions = self.get_completions_for_date(date, phase).await?;

        Ok(DailySummary {
            date,
            phase: phase.map(str::to_string),
            total_completions: completions.len(),
            earliest_time: completions.iter().map(|c| c.completion_time).min(),
            latest_time: completions.iter().map(|c| c.completion_time).max(),
            completions,
        })
    }

    /// Completion counts for each of `phases`, in the order given.
    ///
    /// Only the listed phases are read; nothing is merged implicitly.
    pub async fn cross_phase_summary(&self, phases: &[&str]) -> StorageResult<CrossPhaseSummary> {
        let mut counts = Vec::with_capacity(phases.len());
        for phase in phases {
            let completions = self.get_completions_for_phase(phase).await?;
            counts.push(PhaseCompletionCount {
                phase: phase.to_string(),
                completions: completions.len(),
                latest_completion_date: completions.iter().map(|c| c.key.completion_date).max(),
            });
        }

        Ok(CrossPhaseSummary {
            total_completions: counts.iter().map(|c| c.completions).sum(),
            latest_completion_date: counts.iter().filter_map(|c| c.latest_completion_date).max(),
            phases: counts,
        })
    }

    /// Skip an optional form with a reason.
    pub async fn skip_form(
        &self,
        key: CompletionKey,
        reason: &str,
        required: bool,
    ) -> StorageResult<SkipOutcome> {
        let rejection = if required {
            Some(SkipRejection::RequiredForm)
        } else if reason.trim().is_empty() {
            Some(SkipRejection::MissingReason)
        } else if self.is_complete(&key).await? {
            Some(SkipRejection::AlreadyCompleted)
        } else {
            None
        };

        if let Some(rejection) = rejection {
            warn!(key = %key, %rejection, "Skip rejected");
            return Ok(SkipOutcome::Rejected { key, rejection });
        }

        let skip = Skip::new(key, reason.trim());
        if !self.store.insert_skip(&skip).await? {
            warn!(key = %skip.key, "Form already skipped");
            return Ok(SkipOutcome::Rejected {
                key: skip.key,
                rejection: SkipRejection::AlreadySkipped,
            });
        }

        info!(key = %skip.key, reason = %skip.reason, "Form skipped");
        Ok(SkipOutcome::Skipped(skip))
    }

    /// Remove a skip so the form is pending again.
    pub async fn unskip_form(&self, key: &CompletionKey) -> StorageResult<SkipOutcome> {
        let Some(skip) = self.store.get_skip(key).await? else {
            return Ok(SkipOutcome::Rejected {
                key: key.clone(),
                rejection: SkipRejection::NotSkipped,
            });
        };

        if !self.store.delete_skip(key).await? {
            return Ok(SkipOutcome::Rejected {
                key: key.clone(),
                rejection: SkipRejection::NotSkipped,
            });
        }

        info!(key = %key, "Skip removed");
        Ok(SkipOutcome::Unskipped(skip))
    }

    /// Whether the form is skipped for the key.
    pub async fn is_skipped(&self, key: &CompletionKey) -> StorageResult<bool> {
        Ok(self.store.get_skip(key).await?.is_some())
    }

    /// The skip stored for the key.
    pub async fn get_skip(&self, key: &CompletionKey) -> StorageResult<Option<Skip>> {
        self.store.get_skip(key).await
    }

    /// Skips for one day type, phase and date.
    pub async fn skips_for_day(
        &self,
        day_type_id: &str,
        phase: &str,
        date: NaiveDate,
    ) -> StorageResult<Vec<Skip>> {
        self.store
            .find_skips(&CompletionQuery::on(date).in_phase(phase).with_day_type(day_type_id))
            .await
    }
}
