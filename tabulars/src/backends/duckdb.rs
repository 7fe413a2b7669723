//! DuckDB query runner.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::config::DuckDbConfig;
use crate::error::{Result, TabulaError};
use crate::executor::{duck_value_to_json, json_to_duck_value, QueryRunner, Row};

/// Runs compiled reports against a DuckDB database file.
#[derive(Clone)]
pub struct DuckDbRunner {
    database_path: PathBuf,
    limiter: Arc<Semaphore>,
    pool: Arc<Mutex<Vec<duckdb::Connection>>>,
}

impl DuckDbRunner {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!(path = %path.display(), max_concurrency = 16, "creating DuckDB runner");
        Self {
            database_path: path,
            limiter: Arc::new(Semaphore::new(16)),
            pool: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config(config: &DuckDbConfig) -> Self {
        Self::new(&config.path).with_max_concurrency(config.max_concurrency)
    }

    /// Configure maximum concurrent executions.
    pub fn with_max_concurrency(mut self, max_in_flight: usize) -> Self {
        tracing::debug!(max_concurrency = max_in_flight, "configuring DuckDB concurrency");
        self.limiter = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    async fn acquire_slot(&self) -> Result<SemaphorePermit<'_>> {
        if self.limiter.available_permits() == 0 {
            tracing::debug!("all DuckDB slots in use, waiting for permit");
        }
        self.limiter
            .acquire()
            .await
            .map_err(|e| TabulaError::Execution(format!("limiter closed: {e}")))
    }

    async fn checkout_connection(&self) -> Result<duckdb::Connection> {
        let mut guard = self.pool.lock().await;
        if let Some(conn) = guard.pop() {
            let pool_size = guard.len();
            drop(guard);
            tracing::trace!(pool_remaining = pool_size, "reusing pooled DuckDB connection");
            return Ok(conn);
        }
        drop(guard);
        tracing::debug!(path = %self.database_path.display(), "opening new DuckDB connection");
        duckdb::Connection::open(self.database_path.clone())
            .map_err(|e| TabulaError::Execution(format!("open duckdb: {e}")))
    }
}

#[async_trait]
impl QueryRunner for DuckDbRunner {
    async fn run(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        let _permit = self.acquire_slot().await?;
        let conn = self.checkout_connection().await?;
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<(Vec<Row>, duckdb::Connection)> {
            let start = Instant::now();
            let rows = {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows_iter =
                    stmt.query(duckdb::params_from_iter(params.iter().map(json_to_duck_value)))?;
                let stmt_ref = rows_iter
                    .as_ref()
                    .ok_or_else(|| TabulaError::Execution("statement missing".to_string()))?;
                let mut column_names = Vec::new();
                for idx in 0..stmt_ref.column_count() {
                    let name = stmt_ref
                        .column_name(idx)
                        .map_err(|e| TabulaError::Execution(e.to_string()))?;
                    column_names.push(name.to_string());
                }
                let mut rows = Vec::new();
                while let Some(row) = rows_iter.next()? {
                    let mut map = Row::new();
                    for (idx, name) in column_names.iter().enumerate() {
                        map.insert(name.clone(), duck_value_to_json(row.get_ref(idx)?.to_owned()));
                    }
                    rows.push(map);
                }
                rows
            };
            tracing::debug!(
                rows = rows.len(),
                params = params.len(),
                ms = start.elapsed().as_millis(),
                "duckdb run"
            );
            Ok((rows, conn))
        })
        .await
        .map_err(|e| TabulaError::Execution(format!("task join error: {e}")))?;

        let (rows, conn) = result?;
        pool.lock().await.push(conn);
        Ok(rows)
    }
}
