//! Study configuration and the date-aware schedule built from it.
//!
//! A [`StudyConfig`] is plain data (usually JSON from the study designer).
//! [`Study::from_config`] validates all of it up front: frequencies, phase
//! layout, rule tables and each phase's cycle ceiling. After that every
//! date query is answered without further configuration errors except for
//! unknown phase names.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppResult, ConfigurationError, ScheduleResult};
use crate::schedule::{
    frequency_map, validate_form_id, CycleCalculator, CycleSchedule, DayType, DayTypeClassifier,
    DayTypeRule, FormFrequency,
};
use crate::timeline::{PhaseDefinition, PhaseTimeline};

/// Study setup as produced by the study designer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyConfig {
    pub name: String,
    pub start_date: NaiveDate,
    pub forms: Vec<FormFrequency>,
    pub phases: Vec<PhaseDefinition>,
    /// Explicit day types such as baseline or end-of-phase visits
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub day_type_rules: Vec<DayTypeRule>,
}

impl StudyConfig {
    /// Parse a JSON study definition.
    pub fn from_json_str(json: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON study definition from disk.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// What the schedule says about one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDay {
    pub date: NaiveDate,
    pub phase: String,
    /// 1-indexed day within the phase
    pub day_in_phase: u32,
    /// `None` on a free day
    pub day_type: Option<DayType>,
}

impl ScheduledDay {
    /// Forms due on this day; empty on a free day.
    pub fn forms(&self) -> BTreeSet<String> {
        self.day_type
            .as_ref()
            .map(|dt| dt.form_ids.clone())
            .unwrap_or_default()
    }
}

/// A validated study: timeline plus one classifier per phase.
#[derive(Debug, Clone)]
pub struct Study {
    name: String,
    forms: BTreeMap<String, FormFrequency>,
    frequencies: BTreeMap<String, u32>,
    timeline: PhaseTimeline,
    classifiers: BTreeMap<String, DayTypeClassifier>,
    calculator: CycleCalculator,
}

impl Study {
    /// Validate `config` and build the study.
    ///
    /// A phase's active forms are its `required_forms`; an empty list
    /// activates every study form. An active form without a frequency must be
    /// listed by an explicit rule of that phase, otherwise it could never be
    /// due and is rejected as [`ConfigurationError::UnknownForm`].
    pub fn from_config(config: StudyConfig, calculator: &CycleCalculator) -> ScheduleResult<Self> {
        let frequencies = frequency_map(&config.forms)?;
        let timeline = PhaseTimeline::new(config.start_date, &config.phases)?;

        for rule in &config.day_type_rules {
            if let Some(phase) = &rule.phase {
                if timeline.span(phase).is_none() {
                    return Err(ConfigurationError::UnknownPhase {
                        phase: phase.clone(),
                    });
                }
            }
        }

        let mut classifiers = BTreeMap::new();
        for phase in &config.phases {
            let active: Vec<String> = if phase.required_forms.is_empty() {
                frequencies.keys().cloned().collect()
            } else {
                phase.required_forms.clone()
            };

            for form_id in &active {
                validate_form_id(form_id)?;
                let listed_by_rule = config
                    .day_type_rules
                    .iter()
                    .filter(|r| r.applies_to_phase(&phase.name))
                    .any(|r| r.forms.contains(form_id));
                if !frequencies.contains_key(form_id) && !listed_by_rule {
                    return Err(ConfigurationError::UnknownForm {
                        phase: phase.name.clone(),
                        form_id: form_id.clone(),
                    });
                }
            }

            let phase_frequencies: BTreeMap<String, u32> = frequencies
                .iter()
                .filter(|(form, _)| active.contains(*form))
                .map(|(form, freq)| (form.clone(), *freq))
                .collect();

            let mut classifier =
                DayTypeClassifier::new(phase.name.clone(), phase_frequencies, calculator)?
                    .with_phase_duration(phase.duration_days)
                    .with_active_forms(active);

            for rule in config
                .day_type_rules
                .iter()
                .filter(|r| r.applies_to_phase(&phase.name))
            {
                classifier.register_rule(rule.clone())?;
            }
            classifier.validate()?;

            info!(
                study = %config.name,
                phase = %phase.name,
                cycle_length = classifier.cycle_length(),
                rules = classifier.rules().len(),
                "Phase schedule ready"
            );
            classifiers.insert(phase.name.clone(), classifier);
        }

        info!(
            study = %config.name,
            start = %timeline.start_date(),
            end = %timeline.end_date(),
            phases = classifiers.len(),
            "Study configured"
        );

        Ok(Self {
            name: config.name,
            forms: config
                .forms
                .into_iter()
                .map(|f| (f.form_id.clone(), f))
                .collect(),
            frequencies,
            timeline,
            classifiers,
            calculator: *calculator,
        })
    }

    /// Study name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Phase layout.
    pub fn timeline(&self) -> &PhaseTimeline {
        &self.timeline
    }

    /// Phase names in order.
    pub fn phase_names(&self) -> Vec<&str> {
        self.timeline.spans().iter().map(|s| s.name.as_str()).collect()
    }

    /// Classifier of a phase.
    pub fn classifier(&self, phase: &str) -> ScheduleResult<&DayTypeClassifier> {
        self.classifiers
            .get(phase)
            .ok_or_else(|| ConfigurationError::UnknownPhase {
                phase: phase.to_string(),
            })
    }

    /// Configured form.
    pub fn form(&self, form_id: &str) -> Option<&FormFrequency> {
        self.forms.get(form_id)
    }

    /// Whether a form is required. Forms without a frequency entry are
    /// event-only and count as required.
    pub fn form_required(&self, form_id: &str) -> bool {
        self.forms.get(form_id).map_or(true, |f| f.required)
    }

    /// Schedule for `date`, or `None` outside the study.
    pub fn scheduled_day(&self, date: NaiveDate) -> ScheduleResult<Option<ScheduledDay>> {
        let Some((span, day_in_phase)) = self.timeline.day_in_phase(date) else {
            return Ok(None);
        };

        let day_type = self.classifier(&span.name)?.classify(day_in_phase)?;
        Ok(Some(ScheduledDay {
            date,
            phase: span.name.clone(),
            day_in_phase,
            day_type,
        }))
    }

    /// Forms due on `date`; empty on free days and outside the study.
    pub fn forms_due_on(&self, date: NaiveDate) -> ScheduleResult<BTreeSet<String>> {
        Ok(self
            .scheduled_day(date)?
            .map(|day| day.forms())
            .unwrap_or_default())
    }

    /// Whether `form_id` is due on `date`.
    pub fn is_form_due(&self, form_id: &str, date: NaiveDate) -> ScheduleResult<bool> {
        Ok(self.forms_due_on(date)?.contains(form_id))
    }

    /// Every day of a phase with its day type.
    pub fn phase_days(&self, phase: &str) -> ScheduleResult<Vec<ScheduledDay>> {
        let span = self
            .timeline
            .span(phase)
            .ok_or_else(|| ConfigurationError::UnknownPhase {
                phase: phase.to_string(),
            })?;
        let classifier = self.classifier(phase)?;

        span.start
            .iter_days()
            .take(span.duration_days as usize)
            .zip(1..)
            .map(|(date, day_in_phase)| -> ScheduleResult<ScheduledDay> {
                Ok(ScheduledDay {
                    date,
                    phase: phase.to_string(),
                    day_in_phase,
                    day_type: classifier.classify(day_in_phase)?,
                })
            })
            .collect()
    }

    /// Number of form instances scheduled over a whole phase.
    pub fn expected_form_instances(&self, phase: &str) -> ScheduleResult<u32> {
        Ok(self
            .phase_days(phase)?
            .iter()
            .filter_map(|day| day.day_type.as_ref())
            .map(|dt| dt.form_ids.len() as u32)
            .sum())
    }

    /// Frequency schedule over `duration_days` (the whole study by default)
    /// using every configured form.
    pub fn cycle_schedule(&self, duration_days: Option<u32>) -> ScheduleResult<CycleSchedule> {
        CycleSchedule::build(
            &self.frequencies,
            duration_days.unwrap_or_else(|| self.timeline.total_days()),
            &self.calculator,
        )
    }
}
