//! SQLite ledger.
//!
//! Uses [`sqlx`] with the `sqlite` feature and runtime-checked queries, so no
//! `DATABASE_URL` is needed at compile time. Every value is bound as a
//! parameter; only the table name is spliced into the statement text, and it
//! is validated as a plain identifier first.
//!
//! Writes run inside their own transaction: a failed statement drops the
//! transaction (rolling it back) and the connection returns to the pool on
//! every exit path. The database runs in WAL mode so readers do not block
//! the writer.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{error, info, warn};

use crate::config::{is_sql_identifier, ServiceConfig};
use crate::core::{DispatchError, ResultRecord, StatusRecord, TaskStatus, NO_OUTPUT};

use super::{PendingTask, TaskLedger};

/// Statement text for one table.
#[derive(Debug, Clone)]
struct Statements {
    create: String,
    drop: String,
    upsert: String,
    update_outcome: String,
    read_status: String,
    read_result: String,
    scan_pending: String,
    count: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 task_id TEXT PRIMARY KEY, \
                 submitted_at INTEGER NOT NULL, \
                 payload TEXT NOT NULL, \
                 status TEXT NOT NULL, \
                 status_message TEXT NOT NULL, \
                 output REAL)"
            ),
            drop: format!("DROP TABLE IF EXISTS {table}"),
            upsert: format!(
                "INSERT INTO {table} (task_id, submitted_at, payload, status, status_message) \
                 VALUES (?1, ?2, ?3, ?4, ?4) \
                 ON CONFLICT(task_id) DO UPDATE SET \
                 payload = excluded.payload, \
                 status = excluded.status, \
                 status_message = excluded.status_message"
            ),
            update_outcome: format!(
                "UPDATE {table} SET status = ?1, status_message = ?2, output = ?3 \
                 WHERE task_id = ?4"
            ),
            read_status: format!("SELECT status, status_message FROM {table} WHERE task_id = ?1"),
            read_result: format!(
                "SELECT status, output, status_message FROM {table} WHERE task_id = ?1"
            ),
            scan_pending: format!(
                "SELECT task_id, payload FROM {table} WHERE submitted_at <= ?1 AND status = ?2"
            ),
            count: format!("SELECT COUNT(*) FROM {table}"),
        }
    }
}

/// SQLite-backed task ledger.
#[derive(Clone, Debug)]
pub struct SqliteLedger {
    pool: SqlitePool,
    table: String,
    sql: Statements,
}

impl SqliteLedger {
    /// Open (or create) the database file at `path` and bind to `table`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad table name; `Persistence` if the database
    /// cannot be opened.
    pub async fn connect(
        path: &Path,
        table: &str,
        max_connections: u32,
    ) -> Result<Self, DispatchError> {
        if !is_sql_identifier(table) {
            return Err(DispatchError::InvalidConfig(format!(
                "table name `{table}` is not a plain identifier"
            )));
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| fault("connect", e))?;
        info!(path = %path.display(), table = table, "Ledger opened");
        Ok(Self {
            pool,
            table: table.to_string(),
            sql: Statements::for_table(table),
        })
    }

    /// Open the ledger described by `config`, creating its directory.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect); also fails if the directory cannot be
    /// created.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, DispatchError> {
        std::fs::create_dir_all(&config.db_path).map_err(|e| {
            DispatchError::InvalidConfig(format!(
                "cannot create ledger directory {}: {e}",
                config.db_path.display()
            ))
        })?;
        let connections = u32::try_from(config.parallelism + 2).unwrap_or(u32::MAX);
        Self::connect(&config.ledger_file(), &config.table_name, connections).await
    }

    /// Table this ledger writes to.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    async fn execute_in_tx(&self, op: &'static str, statement: &str) -> Result<(), DispatchError> {
        let mut tx = self.pool.begin().await.map_err(|e| fault(op, e))?;
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| fault(op, e))?;
        tx.commit().await.map_err(|e| fault(op, e))
    }
}

fn fault(op: &str, source: sqlx::Error) -> DispatchError {
    error!(operation = op, error = %source, "Ledger operation failed");
    DispatchError::persistence(op, source)
}

#[async_trait]
impl TaskLedger for SqliteLedger {
    async fn create(&self) -> Result<(), DispatchError> {
        self.execute_in_tx("create", &self.sql.create).await
    }

    async fn drop_schema(&self) -> Result<(), DispatchError> {
        self.execute_in_tx("drop", &self.sql.drop).await
    }

    async fn upsert_at(
        &self,
        task_id: &str,
        payload: &str,
        submitted_at: i64,
    ) -> Result<(), DispatchError> {
        let mut tx = self.pool.begin().await.map_err(|e| fault("upsert", e))?;
        sqlx::query(&self.sql.upsert)
            .bind(task_id)
            .bind(submitted_at)
            .bind(payload)
            .bind(TaskStatus::Processing.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| fault("upsert", e))?;
        tx.commit().await.map_err(|e| fault("upsert", e))
    }

    async fn update_outcome(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: &str,
        output: f64,
    ) -> Result<bool, DispatchError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| fault("update_outcome", e))?;
        let result = sqlx::query(&self.sql.update_outcome)
            .bind(status.as_str())
            .bind(message)
            .bind(output)
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| fault("update_outcome", e))?;
        tx.commit().await.map_err(|e| fault("update_outcome", e))?;

        if result.rows_affected() == 0 {
            warn!(task_id = task_id, "Outcome for unknown task dropped");
            return Ok(false);
        }
        Ok(true)
    }

    async fn read_status(&self, task_id: &str) -> Result<StatusRecord, DispatchError> {
        let row: Option<(String, String)> = sqlx::query_as(&self.sql.read_status)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| fault("read_status", e))?;
        match row {
            Some((status, message)) => Ok(StatusRecord {
                status: TaskStatus::from_str(&status)?,
                message,
            }),
            None => Ok(StatusRecord::not_found()),
        }
    }

    async fn read_result(&self, task_id: &str) -> Result<ResultRecord, DispatchError> {
        let row: Option<(String, Option<f64>, String)> = sqlx::query_as(&self.sql.read_result)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| fault("read_result", e))?;
        match row {
            Some((status, output, message)) => Ok(ResultRecord {
                status: TaskStatus::from_str(&status)?,
                output: output.unwrap_or(NO_OUTPUT),
                message,
            }),
            None => Ok(ResultRecord::not_found()),
        }
    }

    async fn scan_pending(&self, before: i64) -> Result<Vec<PendingTask>, DispatchError> {
        let rows: Vec<(String, String)> = sqlx::query_as(&self.sql.scan_pending)
            .bind(before)
            .bind(TaskStatus::Processing.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| fault("scan_pending", e))?;
        Ok(rows
            .into_iter()
            .map(|(task_id, payload)| PendingTask { task_id, payload })
            .collect())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn count(&self) -> Result<u64, DispatchError> {
        let n: i64 = sqlx::query_scalar(&self.sql.count)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| fault("count", e))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
