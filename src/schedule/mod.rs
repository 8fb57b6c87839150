//! Form scheduling: anchor cycles and day type classification.
//!
//! Forms recur at fixed-day frequencies. The LCM of those frequencies is the
//! anchor cycle, and every day of the cycle is assigned the exact
//! combination of forms due that day.

pub mod cycle;
pub mod day_type;

pub use cycle::{cycle_offset, forms_due_on, is_due, CycleCalculator};
pub use day_type::{
    combination_id, validate_form_id, DayType, DayTypeClassifier, DayTypeRule, DayTypeSource,
    RuleMatcher,
};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ScheduleResult};

/// A form and how often it recurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFrequency {
    /// Form identifier
    pub form_id: String,
    /// Due every N days, starting on day 1
    pub frequency_days: u32,
    /// Human-readable label (e.g. "Weekly")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    /// Required forms cannot be skipped
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FormFrequency {
    /// Create a required form.
    pub fn new(form_id: impl Into<String>, frequency_days: u32) -> Self {
        Self {
            form_id: form_id.into(),
            frequency_days,
            label: String::new(),
            required: true,
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Mark the form optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Convert a form list into a frequency map, rejecting malformed ids,
/// duplicates and zero frequencies.
pub fn frequency_map(forms: &[FormFrequency]) -> ScheduleResult<BTreeMap<String, u32>> {
    let mut map = BTreeMap::new();
    for form in forms {
        validate_form_id(&form.form_id)?;
        if form.frequency_days == 0 {
            return Err(ConfigurationError::InvalidFrequency {
                form_id: form.form_id.clone(),
                frequency: form.frequency_days,
            });
        }
        if map.insert(form.form_id.clone(), form.frequency_days).is_some() {
            return Err(ConfigurationError::DuplicateForm {
                form_id: form.form_id.clone(),
            });
        }
    }
    Ok(map)
}

/// Summary figures for a materialized schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStatistics {
    pub anchor_cycle_days: u32,
    pub total_days: u32,
    pub days_with_forms: u32,
    pub days_without_forms: u32,
    pub total_form_instances: u32,
    pub avg_forms_per_day: f64,
    pub coverage_percentage: f64,
}

/// Day-by-day schedule over a fixed duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSchedule {
    /// Anchor cycle of the frequencies
    pub anchor_cycle_days: u32,
    /// Forms due on each day, keyed by 1-indexed day; free days are absent
    pub days: BTreeMap<u32, BTreeSet<String>>,
    pub statistics: ScheduleStatistics,
}

impl CycleSchedule {
    /// Materialize `duration_days` days of the schedule.
    pub fn build(
        frequencies: &BTreeMap<String, u32>,
        duration_days: u32,
        calculator: &CycleCalculator,
    ) -> ScheduleResult<Self> {
        let anchor_cycle_days = calculator.compute_cycle_for(frequencies)?;

        let days: BTreeMap<u32, BTreeSet<String>> = (1..=duration_days)
            .map(|day| (day, forms_due_on(day, frequencies)))
            .filter(|(_, forms)| !forms.is_empty())
            .collect();

        let total_form_instances: u32 = days.values().map(|f| f.len() as u32).sum();
        let days_with_forms = days.len() as u32;
        let (avg_forms_per_day, coverage_percentage) = if duration_days > 0 {
            (
                f64::from(total_form_instances) / f64::from(duration_days),
                f64::from(days_with_forms) / f64::from(duration_days) * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        Ok(Self {
            anchor_cycle_days,
            days,
            statistics: ScheduleStatistics {
                anchor_cycle_days,
                total_days: duration_days,
                days_with_forms,
                days_without_forms: duration_days - days_with_forms,
                total_form_instances,
                avg_forms_per_day,
                coverage_percentage,
            },
        })
    }

    /// Forms due on `day`; empty for free days.
    pub fn forms_on(&self, day: u32) -> BTreeSet<String> {
        self.days.get(&day).cloned().unwrap_or_default()
    }
}
