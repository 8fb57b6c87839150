//! # Study Scheduler
//!
//! Day-type scheduling for multi-phase clinical studies: which combination
//! of forms is due on each day, and whether it has been done.
//!
//! ## Features
//!
//! - **Anchor cycles**: the LCM of all form frequencies in a phase, bounded
//!   by a configurable ceiling
//! - **Day types**: canonical ids for each day's due-set, with explicit
//!   rules (baseline, end-of-phase) resolved by priority
//! - **Phase timeline**: contiguous phases from a start date, current phase
//!   and days remaining
//! - **Completions**: insert-or-reject records keyed by form, day type,
//!   phase and date, in memory or in SQLite
//! - **Progress**: per-day and per-study progress, skips, anomaly detection
//!
//! ## Architecture
//!
//! ```text
//! StudyConfig (JSON) → Study ─┬─ PhaseTimeline
//!                             └─ DayTypeClassifier (per phase) → CycleCalculator
//!
//! ProgressReporter → Study + CompletionTracker → CompletionStore (memory | SQLite)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use study_scheduler::completion::{CompletionRequest, CompletionTracker};
//! use study_scheduler::schedule::CycleCalculator;
//! use study_scheduler::study::{Study, StudyConfig};
//!
//! let config = StudyConfig::from_file("study.json")?;
//! let study = Study::from_config(config, &CycleCalculator::default())?;
//! let day = study.scheduled_day(today)?.expect("inside the study");
//!
//! let tracker = CompletionTracker::in_memory();
//! let day_type = day.day_type.expect("forms due");
//! tracker
//!     .record_completion(CompletionRequest::new("diary", &day_type.day_type_id, &day.phase, today))
//!     .await?;
//! ```

/// Command-line interface.
pub mod cli;
/// Completion tracking on top of a completion store.
pub mod completion;
/// Configuration loaded from environment variables.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Progress views and participant-facing messages.
pub mod progress;
/// Anchor cycles and day type classification.
pub mod schedule;
/// Completion and skip persistence.
pub mod storage;
/// Study configuration and date-aware schedule.
pub mod study;
/// Phase layout over the calendar.
pub mod timeline;

pub use completion::CompletionTracker;
pub use config::Config;
pub use error::{AppError, AppResult, ConfigurationError};
pub use study::{Study, StudyConfig};
