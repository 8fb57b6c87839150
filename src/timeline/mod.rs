//! Phase timeline.
//!
//! Phases are laid out back to back from the study start date in the order
//! given: each phase ends `duration - 1` days after it starts and the next
//! phase starts the following day. Dates before the first phase or after the
//! last are legitimate "not started" / "completed" states, not errors.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ScheduleResult};

/// A phase as configured at study-design time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    /// Phase name (e.g. "screening")
    pub name: String,
    /// Length of the phase in days
    pub duration_days: u32,
    /// Forms active during the phase
    #[serde(default)]
    pub required_forms: Vec<String>,
}

impl PhaseDefinition {
    /// Create a phase with no forms.
    pub fn new(name: impl Into<String>, duration_days: u32) -> Self {
        Self {
            name: name.into(),
            duration_days,
            required_forms: Vec::new(),
        }
    }

    /// Set the phase's active forms.
    pub fn with_forms<I, S>(mut self, forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_forms = forms.into_iter().map(Into::into).collect();
        self
    }
}

/// A phase placed on the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpan {
    pub name: String,
    pub start: NaiveDate,
    /// Inclusive
    pub end: NaiveDate,
    pub duration_days: u32,
}

impl PhaseSpan {
    /// Whether `date` falls inside the span.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// 1-indexed day of the phase for a date inside the span.
    pub fn day_of(&self, date: NaiveDate) -> Option<u32> {
        if !self.contains(date) {
            return None;
        }
        u32::try_from((date - self.start).num_days() + 1).ok()
    }
}

/// Where the study stands on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl std::fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StudyStatus::NotStarted => write!(f, "not_started"),
            StudyStatus::InProgress => write!(f, "in_progress"),
            StudyStatus::Completed => write!(f, "completed"),
        }
    }
}

/// One phase as seen from a particular date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub duration_days: u32,
    pub is_current: bool,
    /// The phase ended strictly before the date
    pub is_completed: bool,
}

/// The whole timeline as seen from a particular date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    pub date: NaiveDate,
    pub phases: Vec<PhaseStatus>,
    pub current_phase: Option<String>,
    pub status: StudyStatus,
    /// Days elapsed since the study start, 0 before it starts
    pub days_since_start: i64,
    /// Days left including `date`, 0 once the study has ended
    pub days_until_end: i64,
}

/// Contiguous, ordered phases of a study.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTimeline {
    start_date: NaiveDate,
    spans: Vec<PhaseSpan>,
    total_days: u32,
}

impl PhaseTimeline {
    /// Lay out `phases` starting on `start_date`.
    ///
    /// Fails on an empty phase list, a zero duration, a repeated name, or a
    /// phase that would end past the last representable date.
    pub fn new(start_date: NaiveDate, phases: &[PhaseDefinition]) -> ScheduleResult<Self> {
        if phases.is_empty() {
            return Err(ConfigurationError::NoPhases);
        }

        let mut seen = BTreeSet::new();
        let mut spans = Vec::with_capacity(phases.len());
        let mut next_start = Some(start_date);
        let mut total_days: u32 = 0;

        for phase in phases {
            if phase.duration_days == 0 {
                return Err(ConfigurationError::InvalidPhaseDuration {
                    phase: phase.name.clone(),
                    duration: phase.duration_days,
                });
            }
            if !seen.insert(phase.name.as_str()) {
                return Err(ConfigurationError::DuplicatePhase {
                    phase: phase.name.clone(),
                });
            }

            let too_long = || ConfigurationError::StudyTooLong {
                phase: phase.name.clone(),
                duration: phase.duration_days,
            };
            let start = next_start.ok_or_else(too_long)?;
            let end = start
                .checked_add_signed(Duration::days(i64::from(phase.duration_days) - 1))
                .ok_or_else(too_long)?;
            total_days = total_days
                .checked_add(phase.duration_days)
                .ok_or_else(too_long)?;

            spans.push(PhaseSpan {
                name: phase.name.clone(),
                start,
                end,
                duration_days: phase.duration_days,
            });
            // None only matters if another phase follows
            next_start = end.succ_opt();
        }

        Ok(Self {
            start_date,
            spans,
            total_days,
        })
    }

    /// First day of the study.
    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Last day of the study (inclusive).
    pub fn end_date(&self) -> NaiveDate {
        // new() guarantees at least one span
        self.spans.last().map_or(self.start_date, |s| s.end)
    }

    /// Total length of the study in days.
    pub fn total_days(&self) -> u32 {
        self.total_days
    }

    /// Phases in order.
    pub fn spans(&self) -> &[PhaseSpan] {
        &self.spans
    }

    /// Span for a phase name.
    pub fn span(&self, phase_name: &str) -> Option<&PhaseSpan> {
        self.spans.iter().find(|s| s.name == phase_name)
    }

    /// Phase active on `date`, if the date is inside the study.
    pub fn phase_at(&self, date: NaiveDate) -> Option<&PhaseSpan> {
        self.spans.iter().find(|s| s.contains(date))
    }

    /// Phase active on `date` and the 1-indexed day within it.
    pub fn day_in_phase(&self, date: NaiveDate) -> Option<(&PhaseSpan, u32)> {
        let span = self.phase_at(date)?;
        span.day_of(date).map(|day| (span, day))
    }

    /// 1-indexed study day; zero or negative before the start.
    pub fn study_day(&self, date: NaiveDate) -> i64 {
        (date - self.start_date).num_days() + 1
    }

    /// Status of the study on `date`.
    pub fn status(&self, date: NaiveDate) -> StudyStatus {
        if date < self.start_date {
            StudyStatus::NotStarted
        } else if date > self.end_date() {
            StudyStatus::Completed
        } else {
            StudyStatus::InProgress
        }
    }

    /// The timeline as seen from `current_date`.
    pub fn timeline_for(&self, current_date: NaiveDate) -> TimelineSnapshot {
        let phases: Vec<PhaseStatus> = self
            .spans
            .iter()
            .map(|s| PhaseStatus {
                name: s.name.clone(),
                start: s.start,
                end: s.end,
                duration_days: s.duration_days,
                is_current: s.contains(current_date),
                is_completed: s.end < current_date,
            })
            .collect();

        let current_phase = phases.iter().find(|p| p.is_current).map(|p| p.name.clone());

        TimelineSnapshot {
            date: current_date,
            current_phase,
            status: self.status(current_date),
            days_since_start: (current_date - self.start_date).num_days().max(0),
            days_until_end: ((self.end_date() - current_date).num_days() + 1).max(0),
            phases,
        }
    }

    /// Days left in `phase_name` including `current_date`.
    ///
    /// `None` when the phase is unknown or not the one active on that date;
    /// that is distinct from "no days left".
    pub fn phase_days_remaining(&self, phase_name: &str, current_date: NaiveDate) -> Option<i64> {
        let span = self.phase_at(current_date)?;
        if span.name != phase_name {
            return None;
        }
        Some((span.end - current_date).num_days() + 1)
    }
}
