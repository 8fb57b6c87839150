//! Command-line interface.
//!
//! Every command loads a study definition from JSON. Commands that read or
//! write completions go through the [`CompletionTracker`] handed in by the
//! binary, which is backed by the SQLite store at `DATABASE_PATH`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};

use crate::completion::{CompletionRequest, CompletionTracker};
use crate::error::AppResult;
use crate::progress::{
    daily_summary_message, day_progress_message, study_progress_message, ProgressReporter,
};
use crate::schedule::CycleCalculator;
use crate::storage::CompletionKey;
use crate::study::{ScheduledDay, Study, StudyConfig};

const RULE: &str = "═══════════════════════════════════════════════════════════════\n";

/// Day-type scheduling for multi-phase studies.
#[derive(Parser, Debug)]
#[command(name = "study-scheduler", version)]
#[command(about = "Compute form schedules and track completions for a study")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Study definition shared by all commands.
#[derive(Args, Debug, Clone)]
pub struct StudyArgs {
    /// Path to the study definition (JSON)
    #[arg(short, long, value_name = "PATH")]
    pub study: PathBuf,
}

/// Study scheduler subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show each phase's anchor cycle and schedule statistics
    Schedule {
        #[command(flatten)]
        study: StudyArgs,

        /// Number of days to materialize (defaults to the whole study)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Show the phase timeline as of a date
    Timeline {
        #[command(flatten)]
        study: StudyArgs,

        /// Reference date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },

    /// Show the forms due on a date
    Due {
        #[command(flatten)]
        study: StudyArgs,

        #[arg(long)]
        date: NaiveDate,
    },

    /// Record a completed form
    Record {
        #[command(flatten)]
        study: StudyArgs,

        /// Form identifier
        #[arg(long)]
        form: String,

        #[arg(long)]
        date: NaiveDate,

        /// Completion time (HH:MM or HH:MM:SS); defaults to now
        #[arg(long, value_parser = parse_time)]
        time: Option<NaiveTime>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        session: Option<String>,
    },

    /// Skip an optional form
    Skip {
        #[command(flatten)]
        study: StudyArgs,

        #[arg(long)]
        form: String,

        #[arg(long)]
        date: NaiveDate,

        /// Why the form is skipped
        #[arg(long)]
        reason: String,
    },

    /// Summarize completions on a date
    Summary {
        #[command(flatten)]
        study: StudyArgs,

        #[arg(long)]
        date: NaiveDate,

        /// Restrict to one phase
        #[arg(long)]
        phase: Option<String>,
    },

    /// Show day and study progress as of a date
    Progress {
        #[command(flatten)]
        study: StudyArgs,

        #[arg(long)]
        date: NaiveDate,
    },

    /// List completions that disagree with the schedule
    Anomalies {
        #[command(flatten)]
        study: StudyArgs,
    },
}

impl Commands {
    /// Study definition path of the command.
    pub fn study_path(&self) -> &Path {
        match self {
            Commands::Schedule { study, .. }
            | Commands::Timeline { study, .. }
            | Commands::Due { study, .. }
            | Commands::Record { study, .. }
            | Commands::Skip { study, .. }
            | Commands::Summary { study, .. }
            | Commands::Progress { study, .. }
            | Commands::Anomalies { study } => &study.study,
        }
    }
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| format!("invalid time '{}': expected HH:MM or HH:MM:SS", raw))
}

fn load_study(path: &Path, calculator: &CycleCalculator) -> AppResult<Study> {
    let config = StudyConfig::from_file(path)?;
    Ok(Study::from_config(config, calculator)?)
}

/// Execute a CLI command.
pub async fn execute_command(
    command: Commands,
    calculator: &CycleCalculator,
    tracker: &CompletionTracker,
) -> CliResult {
    let study = match load_study(command.study_path(), calculator) {
        Ok(study) => Arc::new(study),
        Err(e) => return CliResult::error(format!("Failed to load study: {}", e)),
    };

    let result = match command {
        Commands::Schedule { days, .. } => execute_schedule(&study, days),
        Commands::Timeline { date, .. } => Ok(execute_timeline(&study, date)),
        Commands::Due { date, .. } => execute_due(&study, date),
        Commands::Record {
            form,
            date,
            time,
            user,
            session,
            ..
        } => execute_record(&study, tracker, &form, date, time, user, session).await,
        Commands::Skip {
            form, date, reason, ..
        } => execute_skip(&study, tracker, &form, date, &reason).await,
        Commands::Summary { date, phase, .. } => {
            execute_summary(tracker, date, phase.as_deref()).await
        }
        Commands::Progress { date, .. } => {
            let reporter = ProgressReporter::new(study, tracker.clone());
            execute_progress(&reporter, date).await
        }
        Commands::Anomalies { .. } => {
            let reporter = ProgressReporter::new(study, tracker.clone());
            execute_anomalies(&reporter).await
        }
    };

    result.unwrap_or_else(|e| CliResult::error(format!("Error: {}", e)))
}

fn execute_schedule(study: &Study, days: Option<u32>) -> AppResult<CliResult> {
    let mut output = String::new();
    output.push_str(&format!("\nSchedule: {}\n", study.name()));
    output.push_str(RULE);

    for name in study.phase_names() {
        let classifier = study.classifier(name)?;
        let plural = if classifier.cycle_length() == 1 { "" } else { "s" };
        output.push_str(&format!(
            "\n{} (cycle: {} day{})\n",
            name,
            classifier.cycle_length(),
            plural
        ));
        for (day, day_type) in classifier.cycle_calendar()? {
            match day_type {
                Some(dt) => output.push_str(&format!(
                    "  day {:>3}: {} [{}]\n",
                    day, dt.day_type_id, dt.source
                )),
                None => output.push_str(&format!("  day {:>3}: (free)\n", day)),
            }
        }
    }

    let stats = study.cycle_schedule(days)?.statistics;
    output.push('\n');
    output.push_str(&format!("Days:              {}\n", stats.total_days));
    output.push_str(&format!("Days with forms:   {}\n", stats.days_with_forms));
    output.push_str(&format!("Form instances:    {}\n", stats.total_form_instances));
    output.push_str(&format!("Avg forms per day: {:.2}\n", stats.avg_forms_per_day));
    output.push_str(&format!("Coverage:          {:.1}%\n", stats.coverage_percentage));

    Ok(CliResult::success(output))
}

fn execute_timeline(study: &Study, date: NaiveDate) -> CliResult {
    let snapshot = study.timeline().timeline_for(date);

    let mut output = String::new();
    output.push_str(&format!("\nTimeline as of {} ({})\n", date, snapshot.status));
    output.push_str(RULE);

    for phase in &snapshot.phases {
        let marker = if phase.is_current {
            "▶"
        } else if phase.is_completed {
            "✓"
        } else {
            " "
        };
        output.push_str(&format!(
            "{} {:<16} {} → {} ({} days)\n",
            marker, phase.name, phase.start, phase.end, phase.duration_days
        ));
    }

    output.push('\n');
    if let Some(current) = &snapshot.current_phase {
        if let Some(left) = study.timeline().phase_days_remaining(current, date) {
            output.push_str(&format!("Current phase: {} ({} days left)\n", current, left));
        }
    }
    output.push_str(&format!("Days since start: {}\n", snapshot.days_since_start));
    output.push_str(&format!("Days until end:   {}\n", snapshot.days_until_end));

    CliResult::success(output)
}

fn describe_day(study: &Study, day: &ScheduledDay) -> String {
    let mut output = format!("{} {} day {}: ", day.date, day.phase, day.day_in_phase);
    match &day.day_type {
        Some(dt) => {
            output.push_str(&format!("{} ({})\n", dt.day_type_id, dt.source));
            for form in &dt.form_ids {
                let kind = if study.form_required(form) {
                    "required"
                } else {
                    "optional"
                };
                output.push_str(&format!("  - {} ({})\n", form, kind));
            }
        }
        None => output.push_str("no forms due\n"),
    }
    output
}

fn execute_due(study: &Study, date: NaiveDate) -> AppResult<CliResult> {
    Ok(match study.scheduled_day(date)? {
        Some(day) => CliResult::success(describe_day(study, &day)),
        None => CliResult::success(format!("{} is outside the study\n", date)),
    })
}

/// Resolve the completion key of `form_id` on `date`, or explain why the
/// form cannot be filed for that date.
fn resolve_key(
    study: &Study,
    form_id: &str,
    date: NaiveDate,
) -> AppResult<Result<CompletionKey, String>> {
    let Some(day) = study.scheduled_day(date)? else {
        return Ok(Err(format!("{} is outside the study", date)));
    };
    let Some(day_type) = day.day_type else {
        return Ok(Err(format!("No forms are due on {}", date)));
    };
    if !day_type.includes(form_id) {
        return Ok(Err(format!(
            "Form '{}' is not due on {} (day type {})",
            form_id, date, day_type.day_type_id
        )));
    }
    Ok(Ok(CompletionKey::new(form_id, day_type.day_type_id, day.phase, date)))
}

async fn execute_record(
    study: &Study,
    tracker: &CompletionTracker,
    form_id: &str,
    date: NaiveDate,
    time: Option<NaiveTime>,
    user: Option<String>,
    session: Option<String>,
) -> AppResult<CliResult> {
    let key = match resolve_key(study, form_id, date)? {
        Ok(key) => key,
        Err(reason) => return Ok(CliResult::error(reason)),
    };

    let mut request = CompletionRequest::for_key(key);
    request.completion_time = time;
    request.user_id = user;
    request.session_id = session;

    let outcome = tracker.record_completion(request).await?;
    Ok(if outcome.success() {
        CliResult::success(outcome.message())
    } else {
        CliResult::error(outcome.message())
    })
}

async fn execute_skip(
    study: &Study,
    tracker: &CompletionTracker,
    form_id: &str,
    date: NaiveDate,
    reason: &str,
) -> AppResult<CliResult> {
    let key = match resolve_key(study, form_id, date)? {
        Ok(key) => key,
        Err(reason) => return Ok(CliResult::error(reason)),
    };

    let outcome = tracker
        .skip_form(key, reason, study.form_required(form_id))
        .await?;
    Ok(if outcome.success() {
        CliResult::success(outcome.message())
    } else {
        CliResult::error(outcome.message())
    })
}

async fn execute_summary(
    tracker: &CompletionTracker,
    date: NaiveDate,
    phase: Option<&str>,
) -> AppResult<CliResult> {
    let summary = tracker.get_summary_for_date(date, phase).await?;

    let mut output = daily_summary_message(&summary);
    output.push('\n');
    for c in &summary.completions {
        output.push_str(&format!(
            "  {} {} [{} / {}]\n",
            c.completion_time.format("%H:%M"),
            c.key.form_id,
            c.key.phase,
            c.key.day_type_id
        ));
    }

    Ok(CliResult::success(output))
}

async fn execute_progress(reporter: &ProgressReporter, date: NaiveDate) -> AppResult<CliResult> {
    let mut output = String::new();

    if let Some(day) = reporter.day_progress(date).await? {
        output.push_str(&day_progress_message(&day));
        output.push('\n');
        if let Some(next) = day.next_required_form() {
            output.push_str(&format!("Next: {}\n", next));
        }
        output.push('\n');
    }

    let study = reporter.study_progress(date).await?;
    output.push_str(&study_progress_message(&study));
    output.push('\n');

    Ok(CliResult::success(output))
}

async fn execute_anomalies(reporter: &ProgressReporter) -> AppResult<CliResult> {
    let anomalies = reporter.detect_all_anomalies().await?;

    if anomalies.is_empty() {
        return Ok(CliResult::success("No anomalies found.\n"));
    }

    let noun = if anomalies.len() == 1 { "anomaly" } else { "anomalies" };
    let mut output = format!("Found {} {}:\n", anomalies.len(), noun);
    for anomaly in &anomalies {
        output.push_str(&format!(
            "  [{}] {} (expected: {})\n",
            anomaly.kind,
            anomaly.key,
            anomaly.expected.as_deref().unwrap_or("-")
        ));
    }

    Ok(CliResult {
        exit_code: 2,
        message: output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("09:15").unwrap(), NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(parse_time("14:00:30").unwrap(), NaiveTime::from_hms_opt(14, 0, 30).unwrap());
        assert!(parse_time("9am").is_err());
    }

    #[test]
    fn test_cli_parses_record() {
        let cli = Cli::try_parse_from([
            "study-scheduler",
            "record",
            "--study",
            "study.json",
            "--form",
            "diary",
            "--date",
            "2024-11-06",
            "--time",
            "09:15",
        ])
        .unwrap();

        match cli.command {
            Commands::Record { form, date, time, .. } => {
                assert_eq!(form, "diary");
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 11, 6).unwrap());
                assert_eq!(time, NaiveTime::from_hms_opt(9, 15, 0));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_study() {
        assert!(Cli::try_parse_from(["study-scheduler", "due", "--date", "2024-11-06"]).is_err());
    }
}
