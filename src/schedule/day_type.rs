//! Day type classification.
//!
//! A day type names the combination of forms due on a day. Frequency-driven
//! day types are derived from the due-set alone; explicit rules (baseline,
//! end-of-phase, ...) are registered separately and always outrank them.
//!
//! # Resolution
//!
//! 1. Collect every explicit rule that matches the day.
//! 2. If any match, the highest `priority` wins. Two matching rules sharing
//!    the winning priority is an ambiguous schedule and is reported as
//!    [`ConfigurationError::AmbiguousPriority`].
//! 3. Otherwise the due-set decides: a non-empty set becomes a frequency day
//!    type, an empty set is a free day (`None`).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cycle::{cycle_offset, forms_due_on, CycleCalculator};
use crate::error::{ConfigurationError, ScheduleResult};

/// Priority contributed by each due form on a frequency-driven day.
pub const FREQUENCY_PRIORITY_STEP: i32 = 10;

/// Separator used when joining form ids into a day type id.
pub const DAY_TYPE_SEPARATOR: &str = "+";

/// Where a day type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayTypeSource {
    /// Derived from the due-set of form frequencies
    Frequency,
    /// An explicitly registered rule
    Rule,
}

impl std::fmt::Display for DayTypeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayTypeSource::Frequency => write!(f, "frequency"),
            DayTypeSource::Rule => write!(f, "rule"),
        }
    }
}

/// Which days an explicit rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleMatcher {
    /// One-off: the n-th day of the phase (e.g. baseline on day 1)
    PhaseDay { day: u32 },
    /// The n-th day of every cycle
    CycleDay { day: u32 },
    /// The final day of the phase
    LastPhaseDay,
    /// Any day on which all of these forms are due
    DueSetIncludes { forms: Vec<String> },
}

/// An explicitly registered day type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayTypeRule {
    /// Day type id assigned on matching days
    pub id: String,
    /// Forms due on matching days
    pub forms: Vec<String>,
    /// Higher wins among matching rules
    pub priority: i32,
    /// When the rule applies
    pub matcher: RuleMatcher,
    /// Restrict the rule to one phase; `None` applies it to every phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl DayTypeRule {
    /// Create a rule that applies to every phase.
    pub fn new(
        id: impl Into<String>,
        forms: impl IntoIterator<Item = impl Into<String>>,
        priority: i32,
        matcher: RuleMatcher,
    ) -> Self {
        Self {
            id: id.into(),
            forms: forms.into_iter().map(Into::into).collect(),
            priority,
            matcher,
            phase: None,
        }
    }

    /// Restrict the rule to a single phase.
    pub fn for_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Whether the rule is registered for `phase`.
    pub fn applies_to_phase(&self, phase: &str) -> bool {
        self.phase.as_deref().map_or(true, |p| p == phase)
    }

    fn matches(
        &self,
        day_offset: u32,
        cycle_day: u32,
        phase_duration: Option<u32>,
        due: &BTreeSet<String>,
    ) -> bool {
        match &self.matcher {
            RuleMatcher::PhaseDay { day } => day_offset == *day,
            RuleMatcher::CycleDay { day } => cycle_day == *day,
            RuleMatcher::LastPhaseDay => phase_duration == Some(day_offset),
            RuleMatcher::DueSetIncludes { forms } => forms.iter().all(|f| due.contains(f)),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigurationError {
        ConfigurationError::InvalidRule {
            rule_id: self.id.clone(),
            reason: reason.into(),
        }
    }
}

/// The classified combination of forms due on one day of a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayType {
    /// Canonical id; identical due-sets always produce the same id
    pub day_type_id: String,
    /// 1-indexed position in the anchor cycle
    pub cycle_offset: u32,
    /// 1-indexed day within the phase
    pub day_offset: u32,
    /// Forms due (never empty)
    pub form_ids: BTreeSet<String>,
    /// Phase the day belongs to
    pub phase: String,
    /// Resolved priority
    pub priority: i32,
    /// Frequency-driven or explicit rule
    pub source: DayTypeSource,
}

impl DayType {
    /// Whether `form_id` is part of this day type.
    pub fn includes(&self, form_id: &str) -> bool {
        self.form_ids.contains(form_id)
    }

    /// Whether this day type came from an explicit rule.
    pub fn is_event(&self) -> bool {
        self.source == DayTypeSource::Rule
    }
}

/// Check that a form id can take part in a combination id.
///
/// Ids must be non-empty and must not contain [`DAY_TYPE_SEPARATOR`], so
/// distinct due-sets never join to the same day type id.
pub fn validate_form_id(form_id: &str) -> ScheduleResult<()> {
    let reason = if form_id.trim().is_empty() {
        "form id must not be empty".to_string()
    } else if form_id.contains(DAY_TYPE_SEPARATOR) {
        format!("form id must not contain '{}'", DAY_TYPE_SEPARATOR)
    } else {
        return Ok(());
    };
    Err(ConfigurationError::InvalidFormId {
        form_id: form_id.to_string(),
        reason,
    })
}

/// Canonical id for a set of due forms: sorted ids joined with `+`.
pub fn combination_id<'a, I>(form_ids: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let sorted: BTreeSet<&String> = form_ids.into_iter().collect();
    sorted
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(DAY_TYPE_SEPARATOR)
}

/// Classifies the days of one phase.
#[derive(Debug, Clone)]
pub struct DayTypeClassifier {
    phase: String,
    frequencies: BTreeMap<String, u32>,
    active_forms: BTreeSet<String>,
    cycle_length: u32,
    phase_duration: Option<u32>,
    rules: Vec<DayTypeRule>,
}

impl DayTypeClassifier {
    /// Build a classifier for `phase` from its form frequencies.
    ///
    /// Fails if a form id is malformed, any frequency is zero, or the anchor
    /// cycle exceeds the calculator's ceiling.
    pub fn new(
        phase: impl Into<String>,
        frequencies: BTreeMap<String, u32>,
        calculator: &CycleCalculator,
    ) -> ScheduleResult<Self> {
        for form_id in frequencies.keys() {
            validate_form_id(form_id)?;
        }
        let cycle_length = calculator.compute_cycle_for(&frequencies)?;
        let active_forms = frequencies.keys().cloned().collect();

        Ok(Self {
            phase: phase.into(),
            frequencies,
            active_forms,
            cycle_length,
            phase_duration: None,
            rules: Vec::new(),
        })
    }

    /// Set the phase length, enabling `LastPhaseDay` rules and bounding
    /// validation to days that actually occur.
    pub fn with_phase_duration(mut self, duration_days: u32) -> Self {
        self.phase_duration = Some(duration_days);
        self
    }

    /// Allow rules to reference forms that have no frequency (event-only forms).
    pub fn with_active_forms<I, S>(mut self, forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_forms.extend(forms.into_iter().map(Into::into));
        self
    }

    /// Phase name.
    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Anchor cycle length in days.
    pub fn cycle_length(&self) -> u32 {
        self.cycle_length
    }

    /// Form frequencies of the phase.
    pub fn frequencies(&self) -> &BTreeMap<String, u32> {
        &self.frequencies
    }

    /// Forms that may appear in this phase's day types.
    pub fn active_forms(&self) -> &BTreeSet<String> {
        &self.active_forms
    }

    /// Registered explicit rules, in registration order.
    pub fn rules(&self) -> &[DayTypeRule] {
        &self.rules
    }

    /// Register an explicit rule.
    pub fn register_rule(&mut self, rule: DayTypeRule) -> ScheduleResult<()> {
        if rule.id.trim().is_empty() {
            return Err(rule.invalid("rule id must not be empty"));
        }
        if rule.id.contains(DAY_TYPE_SEPARATOR) {
            return Err(rule.invalid(format!("rule id must not contain '{}'", DAY_TYPE_SEPARATOR)));
        }
        if self.active_forms.contains(&rule.id) {
            return Err(rule.invalid("rule id collides with a form id of the phase"));
        }
        if self.rules.iter().any(|r| r.id == rule.id) {
            return Err(ConfigurationError::DuplicateRule { rule_id: rule.id });
        }
        if !rule.applies_to_phase(&self.phase) {
            return Err(rule.invalid(format!("rule is scoped to another phase, not '{}'", self.phase)));
        }
        if rule.forms.is_empty() {
            return Err(rule.invalid("rule must list at least one form"));
        }
        for form_id in &rule.forms {
            validate_form_id(form_id)?;
        }
        if let Some(unknown) = rule.forms.iter().find(|f| !self.active_forms.contains(*f)) {
            return Err(rule.invalid(format!(
                "form '{}' is not active in phase '{}'",
                unknown, self.phase
            )));
        }

        match &rule.matcher {
            RuleMatcher::PhaseDay { day: 0 } | RuleMatcher::CycleDay { day: 0 } => {
                return Err(rule.invalid("days are numbered from 1"));
            }
            RuleMatcher::PhaseDay { day } => {
                if let Some(duration) = self.phase_duration.filter(|d| day > d) {
                    return Err(rule.invalid(format!(
                        "day {} is beyond the {}-day phase",
                        day, duration
                    )));
                }
            }
            RuleMatcher::CycleDay { day } if *day > self.cycle_length => {
                return Err(rule.invalid(format!(
                    "day {} is beyond the {}-day cycle",
                    day, self.cycle_length
                )));
            }
            RuleMatcher::LastPhaseDay if self.phase_duration.is_none() => {
                return Err(rule.invalid("phase duration is unknown"));
            }
            RuleMatcher::DueSetIncludes { forms } => {
                if forms.is_empty() {
                    return Err(rule.invalid("due-set matcher must list at least one form"));
                }
                if let Some(unknown) = forms.iter().find(|f| !self.frequencies.contains_key(*f)) {
                    return Err(rule.invalid(format!("form '{}' has no frequency", unknown)));
                }
            }
            _ => {}
        }

        debug!(phase = %self.phase, rule_id = %rule.id, priority = rule.priority, "Registered day type rule");
        self.rules.push(rule);
        Ok(())
    }

    /// Forms due by frequency on `day_offset`.
    pub fn forms_due_on(&self, day_offset: u32) -> BTreeSet<String> {
        forms_due_on(day_offset, &self.frequencies)
    }

    /// Classify the 1-indexed `day_offset` of the phase.
    ///
    /// Returns `Ok(None)` for a free day. The same offset always yields the
    /// same day type.
    pub fn classify(&self, day_offset: u32) -> ScheduleResult<Option<DayType>> {
        if day_offset == 0 {
            return Err(ConfigurationError::InvalidDayOffset { day_offset });
        }

        let cycle_day = cycle_offset(day_offset, self.cycle_length);
        let due = self.forms_due_on(day_offset);

        let matching: Vec<&DayTypeRule> = self
            .rules
            .iter()
            .filter(|r| r.matches(day_offset, cycle_day, self.phase_duration, &due))
            .collect();

        if let Some(top) = matching.iter().map(|r| r.priority).max() {
            let winners: Vec<&DayTypeRule> =
                matching.into_iter().filter(|r| r.priority == top).collect();

            if winners.len() > 1 {
                return Err(ConfigurationError::AmbiguousPriority {
                    phase: self.phase.clone(),
                    day_offset,
                    priority: top,
                    rules: winners.iter().map(|r| r.id.clone()).collect(),
                });
            }

            let rule = winners[0];
            debug!(phase = %self.phase, day_offset, rule_id = %rule.id, "Explicit rule applies");
            return Ok(Some(DayType {
                day_type_id: rule.id.clone(),
                cycle_offset: cycle_day,
                day_offset,
                form_ids: rule.forms.iter().cloned().collect(),
                phase: self.phase.clone(),
                priority: rule.priority,
                source: DayTypeSource::Rule,
            }));
        }

        if due.is_empty() {
            return Ok(None);
        }

        let priority = FREQUENCY_PRIORITY_STEP.saturating_mul(due.len() as i32);
        Ok(Some(DayType {
            day_type_id: combination_id(&due),
            cycle_offset: cycle_day,
            day_offset,
            form_ids: due,
            phase: self.phase.clone(),
            priority,
            source: DayTypeSource::Frequency,
        }))
    }

    /// Day type for every offset of one anchor cycle, free days included.
    pub fn cycle_calendar(&self) -> ScheduleResult<Vec<(u32, Option<DayType>)>> {
        (1..=self.cycle_length)
            .map(|day| self.classify(day).map(|dt| (day, dt)))
            .collect()
    }

    /// Classify every distinguishable day so ambiguous rule tables fail at
    /// setup time rather than on the day they collide.
    pub fn validate(&self) -> ScheduleResult<()> {
        let mut days: BTreeSet<u32> = (1..=self.cycle_length).collect();
        for rule in &self.rules {
            match rule.matcher {
                RuleMatcher::PhaseDay { day } => {
                    days.insert(day);
                }
                RuleMatcher::LastPhaseDay => {
                    if let Some(duration) = self.phase_duration {
                        days.insert(duration);
                    }
                }
                _ => {}
            }
        }

        for day in days {
            if self.phase_duration.map_or(false, |d| day > d) {
                continue;
            }
            self.classify(day)?;
        }
        Ok(())
    }
}
