use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(feature = "duckdb")]
use duckdb::types::Value as DuckValue;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};

use crate::cache::{cache_key, ReportCache};
use crate::compiler::ReportCompiler;
use crate::error::{Result, TabulaError};
use crate::reports::{CompiledQuery, PreviewRequest, ReportConfig, StoredReport};

/// One result row keyed by column name.
pub type Row = Map<String, Value>;

/// The data layer's query capability. Connection handling, timeouts and
/// retries belong to the implementation.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;
}

/// Where saved report definitions live.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn load(&self, report_id: &str) -> Result<Option<StoredReport>>;
}

/// Report store backed by a map; for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<String, StoredReport>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, report: StoredReport) {
        self.reports.write().await.insert(report.id.clone(), report);
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn load(&self, report_id: &str) -> Result<Option<StoredReport>> {
        Ok(self.reports.read().await.get(report_id).cloned())
    }
}

/// Compiles reports and hands them to a [`QueryRunner`].
pub struct ReportExecutor {
    compiler: ReportCompiler,
    runner: Arc<dyn QueryRunner>,
    store: Option<Arc<dyn ReportStore>>,
}

impl ReportExecutor {
    pub fn new(compiler: ReportCompiler, runner: Arc<dyn QueryRunner>) -> Self {
        Self {
            compiler,
            runner,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn compiler(&self) -> &ReportCompiler {
        &self.compiler
    }

    /// Compile without running; what a preview UI shows as "generated SQL".
    pub fn compile_only(&self, table: &str, config: &ReportConfig) -> Result<CompiledQuery> {
        self.compiler.compile(table, config).map_err(|err| {
            tracing::warn!(table, error = %err, "rejected report config");
            TabulaError::from(err)
        })
    }

    /// Rows come back exactly as the runner produced them; runner errors
    /// are passed through untouched.
    pub async fn execute(&self, table: &str, config: &ReportConfig) -> Result<Vec<Row>> {
        let compiled = self.compile_only(table, config)?;
        self.runner.run(&compiled.sql, &compiled.params).await
    }

    pub async fn preview(&self, request: &PreviewRequest) -> Result<Vec<Row>> {
        self.execute(&request.source_table, &request.config).await
    }

    pub async fn execute_stored(&self, report_id: &str) -> Result<Vec<Row>> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| TabulaError::Config("no report store configured".to_string()))?;
        let report = store
            .load(report_id)
            .await?
            .ok_or_else(|| TabulaError::ReportNotFound(report_id.to_string()))?;
        tracing::debug!(report = report_id, name = %report.name, "running stored report");
        self.execute(&report.source_table, &report.config).await
    }

    /// Like [`execute`](Self::execute) but served from a cache the caller owns.
    pub async fn execute_cached(
        &self,
        cache: &Mutex<ReportCache>,
        table: &str,
        config: &ReportConfig,
    ) -> Result<Vec<Row>> {
        let key = cache_key(table, config)?;
        if let Some(rows) = cache.lock().await.get(&key) {
            tracing::trace!(table, "report cache hit");
            return Ok(rows.to_vec());
        }
        let rows = self.execute(table, config).await?;
        cache.lock().await.insert(key, rows.clone());
        Ok(rows)
    }
}

#[cfg(feature = "duckdb")]
pub(crate) fn duck_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::from(i),
        DuckValue::SmallInt(i) => Value::from(i),
        DuckValue::Int(i) => Value::from(i),
        DuckValue::BigInt(i) => Value::from(i),
        DuckValue::HugeInt(i) => i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string())),
        DuckValue::UTinyInt(i) => Value::from(i),
        DuckValue::USmallInt(i) => Value::from(i),
        DuckValue::UInt(i) => Value::from(i),
        DuckValue::UBigInt(i) => Value::from(i),
        DuckValue::Float(f) => Value::from(f),
        DuckValue::Double(f) => Value::from(f),
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Timestamp(unit, t) => Value::String(format!("{t} ({unit:?})")),
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Blob(bytes) => Value::String(hex::encode(bytes)),
        DuckValue::Date32(d) => Value::from(d),
        DuckValue::Time64(unit, t) => Value::String(format!("{t} ({unit:?})")),
        DuckValue::Interval {
            months,
            days,
            nanos,
        } => Value::String(format!("{months} months {days} days {nanos} nanos")),
        DuckValue::List(items) => {
            let values = items.into_iter().map(duck_value_to_json).collect();
            Value::Array(values)
        }
        DuckValue::Enum(s) => Value::String(s),
        DuckValue::Struct(fields) => {
            let mut map = Map::new();
            for (key, val) in fields.iter() {
                map.insert(key.clone(), duck_value_to_json(val.clone()));
            }
            Value::Object(map)
        }
        DuckValue::Array(items) => {
            let values = items.into_iter().map(duck_value_to_json).collect();
            Value::Array(values)
        }
        DuckValue::Map(entries) => {
            let pairs: Vec<Value> = entries
                .iter()
                .map(|(k, v)| {
                    Value::Array(vec![
                        duck_value_to_json(k.clone()),
                        duck_value_to_json(v.clone()),
                    ])
                })
                .collect();
            Value::Array(pairs)
        }
        DuckValue::Union(inner) => duck_value_to_json(*inner),
    }
}

/// JSON parameter to a DuckDB bind value.
#[cfg(feature = "duckdb")]
pub(crate) fn json_to_duck_value(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => DuckValue::BigInt(i),
            (None, Some(u)) => DuckValue::UBigInt(u),
            (None, None) => DuckValue::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => DuckValue::Text(s.clone()),
        other => DuckValue::Text(other.to_string()),
    }
}

#[cfg(all(test, feature = "duckdb"))]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_bind_without_losing_precision() {
        assert!(matches!(
            json_to_duck_value(&json!(u64::MAX)),
            DuckValue::UBigInt(u64::MAX)
        ));
        assert!(matches!(
            json_to_duck_value(&json!(-5)),
            DuckValue::BigInt(-5)
        ));
        assert!(matches!(
            json_to_duck_value(&json!(1.5)),
            DuckValue::Double(d) if d == 1.5
        ));
    }
}
