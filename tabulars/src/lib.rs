pub mod backends;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod reports;
pub mod schema;
pub mod sql_ast;
pub mod validation;

#[cfg(feature = "duckdb")]
pub use backends::DuckDbRunner;
pub use cache::{cache_key, Clock, ReportCache, SystemClock};
pub use compiler::{JoinResolver, ReportCompiler};
pub use config::TabulaConfig;
pub use dialect::{AnsiDialect, Dialect, DialectKind, PostgresDialect};
pub use error::{CompileError, Result, TabulaError};
pub use executor::{InMemoryReportStore, QueryRunner, ReportExecutor, ReportStore, Row};
pub use reports::{
    CompiledQuery, Dimension, Filter, FilterOperator, Metric, MetricOperation, PreviewRequest,
    ReportConfig, SortDirection, SortSpec, StoredReport,
};
pub use schema::{JoinKind, Relationship, SchemaRegistry, TableDef};
pub use validation::ConfigValidator;
