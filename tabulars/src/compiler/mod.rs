use std::sync::Arc;

use crate::config::CompilerConfig;
use crate::dialect::{AnsiDialect, Dialect};
use crate::error::CompileError;
use crate::reports::{CompiledQuery, ReportConfig};
use crate::schema::SchemaRegistry;
use crate::sql_ast::{SelectQuery, SqlRenderer};
use crate::validation::ConfigValidator;

pub mod clauses;
pub mod joins;
pub mod resolve;

pub use clauses::{escape_alias, escape_identifier, is_valid_identifier};
pub use joins::{JoinResolver, ResolvedJoin};
pub use resolve::{resolve_field, ResolvedField};

use clauses::{
    build_from, build_group_by, build_limit, build_order_by, build_select, build_where,
    project_dimension, project_metric, ColumnScope, OrderContext,
};

/// Turns report configs into SQL for one schema registry.
///
/// Holds only read-only state, so one compiler can serve any number of
/// concurrent compilations.
pub struct ReportCompiler {
    registry: Arc<SchemaRegistry>,
    dialect: Box<dyn Dialect>,
    ordinal_order_by: bool,
}

impl ReportCompiler {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            dialect: Box::new(AnsiDialect),
            ordinal_order_by: true,
        }
    }

    pub fn from_config(registry: Arc<SchemaRegistry>, config: &CompilerConfig) -> Self {
        Self::new(registry)
            .with_dialect(config.dialect.dialect())
            .with_ordinal_order_by(config.ordinal_order_by)
    }

    pub fn with_dialect(mut self, dialect: Box<dyn Dialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// When off (or when the dialect lacks ordinal support) every selected
    /// column gets an alias and ORDER BY refers to aliases only.
    pub fn with_ordinal_order_by(mut self, enabled: bool) -> Self {
        self.ordinal_order_by = enabled;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Validate, resolve joins, build every clause and render. Identical
    /// inputs always produce byte-identical output.
    pub fn compile(
        &self,
        table: &str,
        config: &ReportConfig,
    ) -> Result<CompiledQuery, CompileError> {
        let (query, params) = self.build_query(table, config)?;
        let sql = SqlRenderer::new(self.dialect.as_ref()).render_select(&query);
        tracing::debug!(
            table,
            joins = query.joins.len(),
            params = params.len(),
            "compiled report"
        );
        Ok(CompiledQuery { sql, params })
    }

    /// Clause AST plus bound parameters, before rendering.
    pub fn build_query(
        &self,
        table: &str,
        config: &ReportConfig,
    ) -> Result<(SelectQuery, Vec<serde_json::Value>), CompileError> {
        let registry = self.registry.as_ref();
        ConfigValidator::new(registry).validate(table, config)?;

        let main_table = registry
            .table(table)
            .ok_or_else(|| CompileError::UnknownTable {
                table: table.to_string(),
            })?;
        let joins = JoinResolver::new(registry).resolve(table, config.referenced_fields())?;
        let scope = ColumnScope::new(table, &joins);
        let use_ordinals = self.ordinal_order_by && self.dialect.supports_ordinal_order_by();

        let mut columns = Vec::with_capacity(config.dimensions.len() + config.metrics.len());
        for dimension in &config.dimensions {
            let field = resolve_field(registry, table, &dimension.field)?;
            columns.push(project_dimension(dimension, &field, scope, !use_ordinals)?);
        }
        for metric in &config.metrics {
            let field = resolve_field(registry, table, &metric.field)?;
            columns.push(project_metric(metric, &field, scope)?);
        }

        let filters = config
            .filters
            .iter()
            .map(|f| Ok((f, resolve_field(registry, table, &f.field)?)))
            .collect::<Result<Vec<_>, CompileError>>()?;

        let mut params = Vec::new();
        let select = build_select(&columns)?;
        let (from, join_clauses) = build_from(table, &joins)?;
        let where_exprs = build_where(&filters, scope, &mut params)?;
        let group_by = build_group_by(&columns[..config.dimensions.len()]);
        let order_by = build_order_by(&OrderContext {
            config,
            columns: &columns,
            main_table,
            scope,
            use_ordinals,
        })?;
        let limit = build_limit(config.limit, &mut params);

        let query = SelectQuery {
            select,
            from,
            joins: join_clauses,
            filters: where_exprs,
            group_by,
            order_by,
            limit,
        };
        Ok((query, params))
    }
}
