//! Progress reporting.
//!
//! Composes the study schedule with recorded completions into structured
//! progress values and the human-readable messages shown to participants.
//! Holds no state of its own.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::completion::{CompletionTracker, CrossPhaseSummary, DailySummary};
use crate::error::AppResult;
use crate::storage::{Completion, CompletionKey};
use crate::study::Study;
use crate::timeline::StudyStatus;

/// Status of one scheduled form on a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    Complete,
    Skipped,
    Pending,
}

impl std::fmt::Display for FormStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormStatus::Complete => write!(f, "complete"),
            FormStatus::Skipped => write!(f, "skipped"),
            FormStatus::Pending => write!(f, "pending"),
        }
    }
}

/// One form's progress on a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormProgress {
    pub form_id: String,
    pub required: bool,
    pub status: FormStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

/// Progress through the forms scheduled on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayProgress {
    pub date: NaiveDate,
    pub phase: String,
    pub day_in_phase: u32,
    /// `None` on a free day
    pub day_type_id: Option<String>,
    pub forms: Vec<FormProgress>,
    pub total_forms: usize,
    pub completed_forms: usize,
    pub skipped_forms: usize,
    pub pending_forms: usize,
    pub required_pending: usize,
    /// Completed plus skipped, rounded to one decimal
    pub percentage_complete: f64,
}

impl DayProgress {
    /// Whether the day is done.
    ///
    /// With `require_all` every form must be completed (skips do not count);
    /// otherwise no required form may be pending.
    pub fn is_complete(&self, require_all: bool) -> bool {
        if require_all {
            self.completed_forms == self.total_forms
        } else {
            self.required_pending == 0
        }
    }

    /// First required form still pending.
    pub fn next_required_form(&self) -> Option<&str> {
        self.forms
            .iter()
            .find(|f| f.required && f.status == FormStatus::Pending)
            .map(|f| f.form_id.as_str())
    }
}

/// Completions against expectations for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub phase: String,
    pub completions: usize,
    pub expected: u32,
    pub percentage: f64,
}

/// Big-picture progress through the study on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyProgress {
    pub study_name: String,
    pub date: NaiveDate,
    pub status: StudyStatus,
    /// 1-indexed; zero or negative before the start
    pub study_day: i64,
    pub total_days: u32,
    pub days_completed: u32,
    pub days_remaining: u32,
    pub current_phase: Option<String>,
    pub phase_day: Option<u32>,
    pub overall_percentage: f64,
    pub forms_completed: usize,
    pub forms_expected: u32,
    pub forms_percentage: f64,
    pub phases: Vec<PhaseProgress>,
    pub estimated_completion_date: NaiveDate,
}

/// What is inconsistent about a stored completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// The completion is filed under a phase the study does not define
    UnknownPhase,
    /// The completion date is before the start or after the end of the study
    OutsideStudy,
    /// The timeline assigns a different phase to the completion date
    PhaseMismatch,
    /// The schedule assigns a different day type to the completion date
    DayTypeMismatch,
    /// The form is not part of the day type scheduled on that date
    FormNotDue,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::UnknownPhase => write!(f, "unknown_phase"),
            AnomalyKind::OutsideStudy => write!(f, "outside_study"),
            AnomalyKind::PhaseMismatch => write!(f, "phase_mismatch"),
            AnomalyKind::DayTypeMismatch => write!(f, "day_type_mismatch"),
            AnomalyKind::FormNotDue => write!(f, "form_not_due"),
        }
    }
}

/// A stored completion that disagrees with the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub key: CompletionKey,
    pub kind: AnomalyKind,
    /// Phase, day type or forms the schedule expected, when there are any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

/// Builds progress views from a study and its completions.
#[derive(Clone)]
pub struct ProgressReporter {
    study: Arc<Study>,
    tracker: CompletionTracker,
}

impl ProgressReporter {
    pub fn new(study: Arc<Study>, tracker: CompletionTracker) -> Self {
        Self { study, tracker }
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    /// Per-form progress on `date`, or `None` outside the study.
    pub async fn day_progress(&self, date: NaiveDate) -> AppResult<Option<DayProgress>> {
        let Some(day) = self.study.scheduled_day(date)? else {
            return Ok(None);
        };
        let day_type_id = day.day_type.as_ref().map(|dt| dt.day_type_id.clone());

        let mut forms = Vec::new();
        if let Some(day_type_id) = &day_type_id {
            for form_id in day.forms() {
                let key = CompletionKey::new(form_id.clone(), day_type_id, &day.phase, date);
                let required = self.study.form_required(&form_id);

                let progress = if let Some(c) = self.tracker.get_completion(&key).await? {
                    FormProgress {
                        form_id,
                        required,
                        status: FormStatus::Complete,
                        completion_time: Some(c.completion_time),
                        skip_reason: None,
                    }
                } else if let Some(skip) = self.tracker.get_skip(&key).await? {
                    FormProgress {
                        form_id,
                        required,
                        status: FormStatus::Skipped,
                        completion_time: None,
                        skip_reason: Some(skip.reason),
                    }
                } else {
                    FormProgress {
                        form_id,
                        required,
                        status: FormStatus::Pending,
                        completion_time: None,
                        skip_reason: None,
                    }
                };
                forms.push(progress);
            }
        }

        let count = |status: FormStatus| forms.iter().filter(|f| f.status == status).count();
        let completed_forms = count(FormStatus::Complete);
        let skipped_forms = count(FormStatus::Skipped);
        let pending_forms = count(FormStatus::Pending);
        let required_pending = forms
            .iter()
            .filter(|f| f.required && f.status == FormStatus::Pending)
            .count();
        let total_forms = forms.len();

        Ok(Some(DayProgress {
            date,
            phase: day.phase,
            day_in_phase: day.day_in_phase,
            day_type_id,
            total_forms,
            completed_forms,
            skipped_forms,
            pending_forms,
            required_pending,
            percentage_complete: percentage(completed_forms + skipped_forms, total_forms),
            forms,
        }))
    }

    /// Whether `date` is done. Dates outside the study have nothing to do.
    pub async fn is_day_complete(&self, date: NaiveDate, require_all: bool) -> AppResult<bool> {
        Ok(self
            .day_progress(date)
            .await?
            .map_or(true, |p| p.is_complete(require_all)))
    }

    /// The required form to show next on `date`.
    pub async fn next_required_form(&self, date: NaiveDate) -> AppResult<Option<String>> {
        Ok(self
            .day_progress(date)
            .await?
            .and_then(|p| p.next_required_form().map(str::to_string)))
    }

    /// Study-wide progress as of `date`.
    pub async fn study_progress(&self, date: NaiveDate) -> AppResult<StudyProgress> {
        let timeline = self.study.timeline();
        let total_days = timeline.total_days();
        let study_day = timeline.study_day(date);

        let days_completed = (study_day - 1).clamp(0, i64::from(total_days)) as u32;
        let days_remaining = total_days - days_completed;
        let (current_phase, phase_day) = match timeline.day_in_phase(date) {
            Some((span, day)) => (Some(span.name.clone()), Some(day)),
            None => (None, None),
        };

        let names = self.study.phase_names();
        let summary = self.tracker.cross_phase_summary(&names).await?;

        let mut phases = Vec::with_capacity(summary.phases.len());
        for count in &summary.phases {
            let expected = self.study.expected_form_instances(&count.phase)?;
            phases.push(PhaseProgress {
                phase: count.phase.clone(),
                completions: count.completions,
                expected,
                percentage: percentage(count.completions, expected as usize),
            });
        }
        let forms_expected: u32 = phases.iter().map(|p| p.expected).sum();

        debug!(%date, study_day, forms_completed = summary.total_completions, "Computed study progress");

        Ok(StudyProgress {
            study_name: self.study.name().to_string(),
            date,
            status: timeline.status(date),
            study_day,
            total_days,
            days_completed,
            days_remaining,
            current_phase,
            phase_day,
            overall_percentage: percentage(days_completed as usize, total_days as usize),
            forms_completed: summary.total_completions,
            forms_expected,
            forms_percentage: percentage(summary.total_completions, forms_expected as usize),
            phases,
            estimated_completion_date: timeline.end_date(),
        })
    }

    /// Completions across an explicit list of phases.
    pub async fn cross_phase_summary(&self, phases: &[&str]) -> AppResult<CrossPhaseSummary> {
        Ok(self.tracker.cross_phase_summary(phases).await?)
    }

    /// Completions in `phases` that disagree with the schedule.
    ///
    /// The store does not validate keys against the timeline, so a
    /// completion filed under the wrong phase or day type is only visible
    /// here.
    pub async fn detect_anomalies(&self, phases: &[&str]) -> AppResult<Vec<Anomaly>> {
        let mut completions = Vec::new();
        for phase in phases {
            completions.extend(self.tracker.get_completions_for_phase(phase).await?);
        }
        self.check_all(&completions)
    }

    /// Anomalies across every stored completion, including completions
    /// filed under phases the study does not define.
    pub async fn detect_all_anomalies(&self) -> AppResult<Vec<Anomaly>> {
        let completions = self.tracker.all_completions().await?;
        self.check_all(&completions)
    }

    fn check_all(&self, completions: &[Completion]) -> AppResult<Vec<Anomaly>> {
        let mut anomalies = Vec::new();
        for completion in completions {
            if let Some(anomaly) = self.check_completion(completion)? {
                warn!(
                    key = %anomaly.key,
                    kind = %anomaly.kind,
                    expected = anomaly.expected.as_deref().unwrap_or("-"),
                    "Completion does not match the schedule"
                );
                anomalies.push(anomaly);
            }
        }
        Ok(anomalies)
    }

    fn check_completion(&self, completion: &Completion) -> AppResult<Option<Anomaly>> {
        let key = &completion.key;
        let anomaly = |kind: AnomalyKind, expected: Option<String>| -> AppResult<Option<Anomaly>> {
            Ok(Some(Anomaly {
                key: key.clone(),
                kind,
                expected,
            }))
        };

        let scheduled = self.study.scheduled_day(key.completion_date)?;

        if self.study.timeline().span(&key.phase).is_none() {
            return anomaly(AnomalyKind::UnknownPhase, scheduled.map(|day| day.phase));
        }

        let Some(day) = scheduled else {
            return anomaly(AnomalyKind::OutsideStudy, None);
        };

        if day.phase != key.phase {
            return anomaly(AnomalyKind::PhaseMismatch, Some(day.phase));
        }

        let Some(day_type) = day.day_type else {
            return anomaly(AnomalyKind::DayTypeMismatch, None);
        };
        if day_type.day_type_id != key.day_type_id {
            return anomaly(AnomalyKind::DayTypeMismatch, Some(day_type.day_type_id));
        }

        if !day_type.includes(&key.form_id) {
            let due: Vec<&str> = day_type.form_ids.iter().map(String::as_str).collect();
            return anomaly(AnomalyKind::FormNotDue, Some(due.join(", ")));
        }

        Ok(None)
    }
}

/// Percentage rounded to one decimal; zero when there is nothing to count.
fn percentage(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = done as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

fn clock(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

/// "You completed N forms today" message for a daily summary.
pub fn daily_summary_message(summary: &DailySummary) -> String {
    match (summary.total_completions, summary.earliest_time, summary.latest_time) {
        (0, _, _) | (_, None, _) | (_, _, None) => "📭 No forms completed today".to_string(),
        (1, Some(at), _) => format!("✅ You completed 1 form today at {}", clock(at)),
        (n, Some(first), Some(last)) => format!(
            "✅ You completed {} forms today between {} and {}",
            n,
            clock(first),
            clock(last)
        ),
    }
}

/// Progress line for a day.
pub fn day_progress_message(progress: &DayProgress) -> String {
    let done = progress.completed_forms + progress.skipped_forms;
    let total = progress.total_forms;

    if total == 0 {
        "📅 No forms scheduled today".to_string()
    } else if done == total {
        format!("✅ All {} forms complete! Great job! 🎉", total)
    } else if progress.required_pending == 0 {
        format!(
            "✅ All required forms complete! ({} optional remaining)",
            progress.pending_forms
        )
    } else {
        format!(
            "📝 Completed {}/{} forms ({}% done)",
            done, total, progress.percentage_complete
        )
    }
}

/// Multi-line study progress summary.
pub fn study_progress_message(progress: &StudyProgress) -> String {
    let position = match (&progress.current_phase, progress.phase_day) {
        (Some(phase), Some(day)) => format!(
            "📅 Day {} of {} ({}% complete). Currently in {} phase, day {}.",
            progress.study_day, progress.total_days, progress.overall_percentage, phase, day
        ),
        _ if progress.status == StudyStatus::NotStarted => {
            let starts_in = 1 - progress.study_day;
            format!("📅 Study starts in {} day(s).", starts_in)
        }
        _ => format!("📅 Study completed ({} days).", progress.total_days),
    };

    let forms = format!(
        "📝 You've completed {} of {} forms ({}%)",
        progress.forms_completed, progress.forms_expected, progress.forms_percentage
    );

    let remaining = format!(
        "⏰ {} days remaining. Estimated completion: {}",
        progress.days_remaining,
        progress.estimated_completion_date.format("%B %d, %Y")
    );

    [position, forms, remaining].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionRequest;
    use crate::schedule::{CycleCalculator, FormFrequency};
    use crate::study::StudyConfig;
    use crate::timeline::PhaseDefinition;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn reporter() -> ProgressReporter {
        let config = StudyConfig {
            name: "Pain Study".to_string(),
            start_date: date(1),
            forms: vec![
                FormFrequency::new("form_a", 1),
                FormFrequency::new("form_b", 1).optional(),
                FormFrequency::new("form_c", 1),
            ],
            phases: vec![PhaseDefinition::new("intervention", 14)],
            day_type_rules: Vec::new(),
        };
        let study = Study::from_config(config, &CycleCalculator::default()).unwrap();
        ProgressReporter::new(Arc::new(study), CompletionTracker::in_memory())
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn test_daily_summary_messages() {
        let mut summary = DailySummary {
            date: date(6),
            phase: None,
            total_completions: 0,
            completions: Vec::new(),
            earliest_time: None,
            latest_time: None,
        };
        assert_eq!(daily_summary_message(&summary), "📭 No forms completed today");

        summary.total_completions = 1;
        summary.earliest_time = Some(time(9, 15));
        summary.latest_time = Some(time(9, 15));
        assert_eq!(
            daily_summary_message(&summary),
            "✅ You completed 1 form today at 9:15 AM"
        );

        summary.total_completions = 2;
        summary.latest_time = Some(time(14, 0));
        assert_eq!(
            daily_summary_message(&summary),
            "✅ You completed 2 forms today between 9:15 AM and 2:00 PM"
        );
    }

    #[tokio::test]
    async fn test_day_progress_with_skip() {
        let reporter = reporter();
        let tracker = reporter.tracker();
        let day_type = "form_a+form_b+form_c";

        tracker
            .record_completion(
                CompletionRequest::new("form_a", day_type, "intervention", date(6)).at(time(9, 0)),
            )
            .await
            .unwrap();
        tracker
            .skip_form(
                CompletionKey::new("form_b", day_type, "intervention", date(6)),
                "Not feeling well",
                false,
            )
            .await
            .unwrap();

        let progress = reporter.day_progress(date(6)).await.unwrap().unwrap();
        assert_eq!(progress.total_forms, 3);
        assert_eq!(progress.completed_forms, 1);
        assert_eq!(progress.skipped_forms, 1);
        assert_eq!(progress.pending_forms, 1);
        assert_eq!(progress.required_pending, 1);
        assert_eq!(progress.percentage_complete, 66.7);
        assert_eq!(progress.next_required_form(), Some("form_c"));
        assert!(!progress.is_complete(false));
        assert_eq!(day_progress_message(&progress), "📝 Completed 2/3 forms (66.7% done)");

        tracker
            .record_completion(
                CompletionRequest::new("form_c", day_type, "intervention", date(6)).at(time(10, 0)),
            )
            .await
            .unwrap();

        assert!(reporter.is_day_complete(date(6), false).await.unwrap());
        assert!(!reporter.is_day_complete(date(6), true).await.unwrap());
        assert!(reporter.next_required_form(date(6)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_outside_study_has_no_day_progress() {
        let reporter = reporter();
        assert!(reporter.day_progress(date(20)).await.unwrap().is_none());
        assert!(reporter.is_day_complete(date(20), true).await.unwrap());
    }

    #[tokio::test]
    async fn test_anomalies() {
        let reporter = reporter();
        let tracker = reporter.tracker();
        let day_type = "form_a+form_b+form_c";

        tracker
            .record_completion(CompletionRequest::new("form_a", day_type, "intervention", date(6)))
            .await
            .unwrap();
        tracker
            .record_completion(CompletionRequest::new("form_a", "weekly", "intervention", date(7)))
            .await
            .unwrap();
        tracker
            .record_completion(CompletionRequest::new("form_a", day_type, "intervention", date(20)))
            .await
            .unwrap();

        tracker
            .record_completion(CompletionRequest::new("form_x", day_type, "intervention", date(8)))
            .await
            .unwrap();

        let anomalies = reporter.detect_all_anomalies().await.unwrap();
        let kinds: Vec<AnomalyKind> = anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnomalyKind::DayTypeMismatch,
                AnomalyKind::FormNotDue,
                AnomalyKind::OutsideStudy
            ]
        );
        assert_eq!(anomalies[0].expected.as_deref(), Some(day_type));
        assert_eq!(anomalies[1].expected.as_deref(), Some("form_a, form_b, form_c"));
    }
}
