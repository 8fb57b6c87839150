use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Schedule configuration error: {0}")]
    Schedule(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Study setup errors.
///
/// These abort study setup and are meant for the study designer, so each
/// variant carries the values needed to fix the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Invalid frequency for form '{form_id}': {frequency} (must be a positive number of days)")]
    InvalidFrequency { form_id: String, frequency: u32 },

    #[error("Form '{form_id}' is configured more than once")]
    DuplicateForm { form_id: String },

    #[error("Invalid form id '{form_id}': {reason}")]
    InvalidFormId { form_id: String, reason: String },

    #[error("Form '{form_id}' in phase '{phase}' has no frequency and no day type rule")]
    UnknownForm { phase: String, form_id: String },

    #[error("Anchor cycle too long for frequencies {frequencies:?}: {cycle} days (maximum allowed: {ceiling} days)")]
    CycleTooLong {
        frequencies: Vec<u32>,
        cycle: u64,
        ceiling: u32,
    },

    #[error("Ambiguous schedule in phase '{phase}' on day {day_offset}: rules {rules:?} share priority {priority}")]
    AmbiguousPriority {
        phase: String,
        day_offset: u32,
        priority: i32,
        rules: Vec<String>,
    },

    #[error("Invalid day type rule '{rule_id}': {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("Day type rule '{rule_id}' is registered more than once")]
    DuplicateRule { rule_id: String },

    #[error("Study has no phases")]
    NoPhases,

    #[error("Invalid duration for phase '{phase}': {duration} days")]
    InvalidPhaseDuration { phase: String, duration: u32 },

    #[error("Phase '{phase}' ({duration} days) runs past the last representable date")]
    StudyTooLong { phase: String, duration: u32 },

    #[error("Phase '{phase}' is configured more than once")]
    DuplicatePhase { phase: String },

    #[error("Unknown phase: {phase}")]
    UnknownPhase { phase: String },

    #[error("Invalid day offset: {day_offset} (days are numbered from 1)")]
    InvalidDayOffset { day_offset: u32 },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for schedule setup
pub type ScheduleResult<T> = Result<T, ConfigurationError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
