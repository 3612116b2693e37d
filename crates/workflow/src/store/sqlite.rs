//! SQLite-backed step store.
//!
//! Survives process restarts: an instance interrupted mid-run finds its
//! completed steps here when it is resumed.

use super::{RunRecord, RunStatus, StepRecord, StepStore};
use crate::event::Event;
use chrono::{DateTime, SecondsFormat, Utc};
use ragstep_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqliteStepStore {
    conn: Mutex<Connection>,
}

impl SqliteStepStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Workflow(format!("Failed to create step store directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Workflow(format!("Failed to open step store: {}", e)))?;

        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Workflow(format!("Failed to open step store: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS runs (
                instance_id TEXT PRIMARY KEY,
                function_id TEXT NOT NULL,
                event TEXT NOT NULL,
                status TEXT NOT NULL,
                output TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS steps (
                instance_id TEXT NOT NULL,
                step TEXT NOT NULL,
                output TEXT NOT NULL,
                input_hash TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (instance_id, step)
            );
            "#,
        )
        .map_err(|e| AppError::Workflow(format!("Failed to create step store tables: {}", e)))?;

        tracing::debug!("Initialized SQLite step store");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Workflow("Step store lock poisoned".to_string()))
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Serialization(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn db_err(context: &str, e: rusqlite::Error) -> AppError {
    AppError::Workflow(format!("{}: {}", context, e))
}

/// Raw column values of a `steps` row.
type StepRow = (String, String, String, String, u32, String);

fn read_step_row(row: &Row<'_>) -> rusqlite::Result<StepRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn step_from_row(raw: StepRow) -> AppResult<StepRecord> {
    let (instance_id, step, output, input_hash, attempts, recorded_at) = raw;
    Ok(StepRecord {
        instance_id,
        step,
        output: serde_json::from_str(&output)?,
        input_hash,
        attempts,
        recorded_at: parse_ts(&recorded_at)?,
    })
}

/// Raw column values of a `runs` row.
struct RunRow {
    instance_id: String,
    function_id: String,
    event: String,
    status: String,
    output: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_run_row(row: &Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        instance_id: row.get(0)?,
        function_id: row.get(1)?,
        event: row.get(2)?,
        status: row.get(3)?,
        output: row.get(4)?,
        error: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn run_from_row(raw: RunRow) -> AppResult<RunRecord> {
    let status = match raw.status.as_str() {
        "running" => RunStatus::Running,
        "completed" => RunStatus::Completed {
            output: match raw.output {
                Some(ref output) => serde_json::from_str(output)?,
                None => serde_json::Value::Null,
            },
        },
        "failed" => RunStatus::Failed {
            error: raw.error.unwrap_or_default(),
        },
        other => {
            return Err(AppError::Serialization(format!(
                "Unknown run status '{}'",
                other
            )))
        }
    };

    let event: Event = serde_json::from_str(&raw.event)?;

    Ok(RunRecord {
        instance_id: raw.instance_id,
        function_id: raw.function_id,
        event,
        status,
        created_at: parse_ts(&raw.created_at)?,
        updated_at: parse_ts(&raw.updated_at)?,
    })
}

const STEP_COLUMNS: &str = "instance_id, step, output, input_hash, attempts, recorded_at";
const RUN_COLUMNS: &str =
    "instance_id, function_id, event, status, output, error, created_at, updated_at";

#[async_trait::async_trait]
impl StepStore for SqliteStepStore {
    async fn load_step(&self, instance_id: &str, step: &str) -> AppResult<Option<StepRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM steps WHERE instance_id = ?1 AND step = ?2",
                    STEP_COLUMNS
                ),
                params![instance_id, step],
                read_step_row,
            )
            .optional()
            .map_err(|e| db_err("Failed to load step", e))?;

        raw.map(step_from_row).transpose()
    }

    async fn save_step(&self, record: &StepRecord) -> AppResult<()> {
        let output = serde_json::to_string(&record.output)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO steps (instance_id, step, output, input_hash, attempts, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.instance_id,
                record.step,
                output,
                record.input_hash,
                record.attempts,
                format_ts(&record.recorded_at),
            ],
        )
        .map_err(|e| db_err("Failed to record step", e))?;
        Ok(())
    }

    async fn list_steps(&self, instance_id: &str) -> AppResult<Vec<StepRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM steps WHERE instance_id = ?1 ORDER BY rowid",
                STEP_COLUMNS
            ))
            .map_err(|e| db_err("Failed to prepare step listing", e))?;

        let rows = stmt
            .query_map(params![instance_id], read_step_row)
            .map_err(|e| db_err("Failed to list steps", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("Failed to read step row", e))?;

        rows.into_iter().map(step_from_row).collect()
    }

    async fn load_run(&self, instance_id: &str) -> AppResult<Option<RunRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE instance_id = ?1", RUN_COLUMNS),
                params![instance_id],
                read_run_row,
            )
            .optional()
            .map_err(|e| db_err("Failed to load run", e))?;

        raw.map(run_from_row).transpose()
    }

    async fn save_run(&self, record: &RunRecord) -> AppResult<()> {
        let event = serde_json::to_string(&record.event)?;
        let (output, error) = match record.status {
            RunStatus::Running => (None, None),
            RunStatus::Completed { ref output } => (Some(serde_json::to_string(output)?), None),
            RunStatus::Failed { ref error } => (None, Some(error.clone())),
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO runs (instance_id, function_id, event, status, output, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.instance_id,
                record.function_id,
                event,
                record.status.label(),
                output,
                error,
                format_ts(&record.created_at),
                format_ts(&record.updated_at),
            ],
        )
        .map_err(|e| db_err("Failed to save run", e))?;
        Ok(())
    }

    async fn list_runs(&self) -> AppResult<Vec<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM runs ORDER BY created_at DESC",
                RUN_COLUMNS
            ))
            .map_err(|e| db_err("Failed to prepare run listing", e))?;

        let rows = stmt
            .query_map([], read_run_row)
            .map_err(|e| db_err("Failed to list runs", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("Failed to read run row", e))?;

        rows.into_iter().map(run_from_row).collect()
    }
}
