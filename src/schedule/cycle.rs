//! Anchor cycle arithmetic.
//!
//! A form with frequency `N` is due on day 1, N+1, 2N+1, ... of its phase.
//! The anchor cycle is the least common multiple of all active frequencies:
//! after that many days the pattern of due forms repeats exactly.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::{SchedulingConfig, DEFAULT_MAX_CYCLE_DAYS};
use crate::error::{ConfigurationError, ScheduleResult};

/// Computes anchor cycles under a safety ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleCalculator {
    max_cycle_days: u32,
}

impl Default for CycleCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CYCLE_DAYS)
    }
}

impl CycleCalculator {
    /// Create a calculator that rejects cycles longer than `max_cycle_days`.
    pub fn new(max_cycle_days: u32) -> Self {
        Self { max_cycle_days }
    }

    /// Create a calculator from scheduling configuration.
    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self::new(config.max_cycle_days)
    }

    /// The configured ceiling.
    pub fn max_cycle_days(&self) -> u32 {
        self.max_cycle_days
    }

    /// Least common multiple of `frequencies`.
    ///
    /// An empty input is a trivial one-day cycle. A zero frequency is
    /// rejected, and an LCM above the ceiling fails with
    /// [`ConfigurationError::CycleTooLong`] instead of being truncated.
    pub fn compute_cycle<I>(&self, frequencies: I) -> ScheduleResult<u32>
    where
        I: IntoIterator<Item = u32>,
    {
        let frequencies: BTreeSet<u32> = frequencies.into_iter().collect();

        if frequencies.contains(&0) {
            return Err(ConfigurationError::InvalidFrequency {
                form_id: "(unnamed)".to_string(),
                frequency: 0,
            });
        }

        let cycle = frequencies.iter().fold(1u64, |acc, &f| lcm(acc, u64::from(f)));

        if cycle > u64::from(self.max_cycle_days) {
            return Err(ConfigurationError::CycleTooLong {
                frequencies: frequencies.into_iter().collect(),
                cycle,
                ceiling: self.max_cycle_days,
            });
        }

        debug!(?frequencies, cycle, "Computed anchor cycle");
        // cycle <= max_cycle_days, which is a u32
        Ok(cycle as u32)
    }

    /// Cycle for a form map, reporting the offending form on a zero frequency.
    pub fn compute_cycle_for(&self, frequencies: &BTreeMap<String, u32>) -> ScheduleResult<u32> {
        if let Some((form_id, &frequency)) = frequencies.iter().find(|(_, &f)| f == 0) {
            return Err(ConfigurationError::InvalidFrequency {
                form_id: form_id.clone(),
                frequency,
            });
        }
        self.compute_cycle(frequencies.values().copied())
    }
}

/// Whether a form with `frequency_days` is due on the 1-indexed `day_offset`.
///
/// Day 0 and frequency 0 are never due.
pub fn is_due(day_offset: u32, frequency_days: u32) -> bool {
    day_offset >= 1 && frequency_days >= 1 && (day_offset - 1) % frequency_days == 0
}

/// Forms due on `day_offset`.
///
/// Works for any offset without materializing the cycle, so callers can
/// translate an absolute date into a phase-relative offset and ask directly.
pub fn forms_due_on(day_offset: u32, frequencies: &BTreeMap<String, u32>) -> BTreeSet<String> {
    frequencies
        .iter()
        .filter(|(_, &frequency)| is_due(day_offset, frequency))
        .map(|(form_id, _)| form_id.clone())
        .collect()
}

/// Position of `day_offset` inside a cycle of `cycle_length` days (1-indexed).
pub fn cycle_offset(day_offset: u32, cycle_length: u32) -> u32 {
    if day_offset == 0 || cycle_length == 0 {
        return day_offset;
    }
    (day_offset - 1) % cycle_length + 1
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        return 0;
    }
    (a / gcd(a, b)).saturating_mul(b)
}
