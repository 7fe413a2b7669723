use thiserror::Error;

pub type Result<T> = std::result::Result<T, TabulaError>;

/// A report configuration the compiler refused to turn into SQL.
///
/// Every variant names the offending field or rule; no SQL is produced when
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("report must select at least one dimension or metric")]
    EmptyReport,
    #[error("metrics require at least one dimension to group by")]
    MissingGroupingForAggregate,
    #[error("unknown table {table}")]
    UnknownTable { table: String },
    #[error("unknown field {field} on table {table}")]
    UnknownField { table: String, field: String },
    #[error("unknown relationship {relationship} on table {table}")]
    UnknownRelationship { table: String, relationship: String },
    #[error("relationship {relationship} on table {table} has a cyclic requires chain")]
    RelationshipCycle { table: String, relationship: String },
    #[error("cannot SUM non-numeric field {field}")]
    NonNumericAggregation { field: String },
    #[error("unsupported operation {operation} on metric {field}")]
    UnsupportedOperation { field: String, operation: String },
    #[error("sort field {field} is not one of the report's dimensions or metrics")]
    InvalidSortField { field: String },
    #[error("sorting by metric {field} requires a positive limit")]
    MissingLimitForAggregateSort { field: String },
    #[error("limit {limit} is outside the allowed range [0, 10000]")]
    InvalidLimitRange { limit: i64 },
    #[error("invalid identifier {identifier:?}")]
    InvalidIdentifier { identifier: String },
    #[error("output column {name} appears more than once")]
    DuplicateOutputName { name: String },
    #[error("invalid value for filter on {field}: {reason}")]
    InvalidFilterValue { field: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TabulaError {
    #[error("rejected report: {0}")]
    Compile(#[from] CompileError),
    #[error("report {0} not found")]
    ReportNotFound(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TabulaError {
    /// True when the caller sent something we refuse to run, as opposed to
    /// a storage or connectivity failure.
    pub fn is_rejected_config(&self) -> bool {
        matches!(
            self,
            TabulaError::Compile(_) | TabulaError::ReportNotFound(_)
        )
    }

    pub fn as_compile_error(&self) -> Option<&CompileError> {
        match self {
            TabulaError::Compile(err) => Some(err),
            _ => None,
        }
    }
}
