use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{
    sort_completions, Completion, CompletionKey, CompletionQuery, CompletionStore, InsertOutcome,
    Skip,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// SQLite-backed completion store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the database file if needed
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create a private in-memory database (one connection, kept open)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CompletionStore for SqliteStore {
    async fn insert_completion(&self, completion: &Completion) -> StorageResult<InsertOutcome> {
        // Single statement: the primary key decides, no check-then-insert race
        let result = sqlx::query(
            r#"
            INSERT INTO completions (id, form_id, day_type_id, phase, completion_date, completion_time, user_id, session_id, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (form_id, day_type_id, phase, completion_date) DO NOTHING
            "#,
        )
        .bind(&completion.id)
        .bind(&completion.key.form_id)
        .bind(&completion.key.day_type_id)
        .bind(&completion.key.phase)
        .bind(completion.key.completion_date.format(DATE_FORMAT).to_string())
        .bind(completion.completion_time.format(TIME_FORMAT).to_string())
        .bind(&completion.user_id)
        .bind(&completion.session_id)
        .bind(completion.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted);
        }

        match self.get_completion(&completion.key).await? {
            Some(existing) => Ok(InsertOutcome::Duplicate(existing)),
            None => Err(StorageError::Query {
                message: format!("Insert for {} was ignored but no row exists", completion.key),
            }),
        }
    }

    async fn get_completion(&self, key: &CompletionKey) -> StorageResult<Option<Completion>> {
        let row: Option<CompletionRow> = sqlx::query_as(
            r#"
            SELECT id, form_id, day_type_id, phase, completion_date, completion_time, user_id, session_id, recorded_at
            FROM completions
            WHERE form_id = ? AND day_type_id = ? AND phase = ? AND completion_date = ?
            "#,
        )
        .bind(&key.form_id)
        .bind(&key.day_type_id)
        .bind(&key.phase)
        .bind(key.completion_date.format(DATE_FORMAT).to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Completion::try_from).transpose()
    }

    async fn find_completions(&self, query: &CompletionQuery) -> StorageResult<Vec<Completion>> {
        let date = query.date.map(|d| d.format(DATE_FORMAT).to_string());

        let rows: Vec<CompletionRow> = sqlx::query_as(
            r#"
            SELECT id, form_id, day_type_id, phase, completion_date, completion_time, user_id, session_id, recorded_at
            FROM completions
            WHERE (? IS NULL OR completion_date = ?)
              AND (? IS NULL OR phase = ?)
              AND (? IS NULL OR day_type_id = ?)
            ORDER BY completion_date ASC, completion_time ASC
            "#,
        )
        .bind(&date)
        .bind(&date)
        .bind(&query.phase)
        .bind(&query.phase)
        .bind(&query.day_type_id)
        .bind(&query.day_type_id)
        .fetch_all(&self.pool)
        .await?;

        let mut completions = rows
            .into_iter()
            .map(Completion::try_from)
            .collect::<StorageResult<Vec<_>>>()?;
        sort_completions(&mut completions);
        Ok(completions)
    }

    async fn insert_skip(&self, skip: &Skip) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO skips (form_id, day_type_id, phase, completion_date, reason, skipped_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (form_id, day_type_id, phase, completion_date) DO NOTHING
            "#,
        )
        .bind(&skip.key.form_id)
        .bind(&skip.key.day_type_id)
        .bind(&skip.key.phase)
        .bind(skip.key.completion_date.format(DATE_FORMAT).to_string())
        .bind(&skip.reason)
        .bind(skip.skipped_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_skip(&self, key: &CompletionKey) -> StorageResult<bool> {
        let result = sqlx::query(
            "DELETE FROM skips WHERE form_id = ? AND day_type_id = ? AND phase = ? AND completion_date = ?",
        )
        .bind(&key.form_id)
        .bind(&key.day_type_id)
        .bind(&key.phase)
        .bind(key.completion_date.format(DATE_FORMAT).to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_skip(&self, key: &CompletionKey) -> StorageResult<Option<Skip>> {
        let row: Option<SkipRow> = sqlx::query_as(
            r#"
            SELECT form_id, day_type_id, phase, completion_date, reason, skipped_at
            FROM skips
            WHERE form_id = ? AND day_type_id = ? AND phase = ? AND completion_date = ?
            "#,
        )
        .bind(&key.form_id)
        .bind(&key.day_type_id)
        .bind(&key.phase)
        .bind(key.completion_date.format(DATE_FORMAT).to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Skip::try_from).transpose()
    }

    async fn find_skips(&self, query: &CompletionQuery) -> StorageResult<Vec<Skip>> {
        let date = query.date.map(|d| d.format(DATE_FORMAT).to_string());

        let rows: Vec<SkipRow> = sqlx::query_as(
            r#"
            SELECT form_id, day_type_id, phase, completion_date, reason, skipped_at
            FROM skips
            WHERE (? IS NULL OR completion_date = ?)
              AND (? IS NULL OR phase = ?)
              AND (? IS NULL OR day_type_id = ?)
            ORDER BY completion_date ASC, skipped_at ASC, form_id ASC
            "#,
        )
        .bind(&date)
        .bind(&date)
        .bind(&query.phase)
        .bind(&query.phase)
        .bind(&query.day_type_id)
        .bind(&query.day_type_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Skip::try_from).collect()
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct CompletionRow {
    id: String,
    form_id: String,
    day_type_id: String,
    phase: String,
    completion_date: String,
    completion_time: String,
    user_id: Option<String>,
    session_id: Option<String>,
    recorded_at: String,
}

impl TryFrom<CompletionRow> for Completion {
    type Error = StorageError;

    fn try_from(row: CompletionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            key: CompletionKey {
                form_id: row.form_id,
                day_type_id: row.day_type_id,
                phase: row.phase,
                completion_date: parse_date(&row.completion_date)?,
            },
            completion_time: NaiveTime::parse_from_str(&row.completion_time, "%H:%M:%S%.f")
                .map_err(|e| StorageError::Query {
                    message: format!("Invalid completion_time '{}': {}", row.completion_time, e),
                })?,
            user_id: row.user_id,
            session_id: row.session_id,
            recorded_at: parse_timestamp(&row.recorded_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SkipRow {
    form_id: String,
    day_type_id: String,
    phase: String,
    completion_date: String,
    reason: String,
    skipped_at: String,
}

impl TryFrom<SkipRow> for Skip {
    type Error = StorageError;

    fn try_from(row: SkipRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key: CompletionKey {
                form_id: row.form_id,
                day_type_id: row.day_type_id,
                phase: row.phase,
                completion_date: parse_date(&row.completion_date)?,
            },
            reason: row.reason,
            skipped_at: parse_timestamp(&row.skipped_at)?,
        })
    }
}

fn parse_date(raw: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| StorageError::Query {
        message: format!("Invalid date '{}': {}", raw, e),
    })
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Query {
            message: format!("Invalid timestamp '{}': {}", raw, e),
        })
}
