//! Clause builders. Each one turns already-resolved report pieces into
//! clause AST, checking every identifier it emits and binding every value.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::CompileError;
use crate::reports::{
    Dimension, Filter, FilterOperator, Metric, MetricOperation, ReportConfig, SortTarget,
    FIELD_SEPARATOR, MAX_LIMIT,
};
use crate::schema::TableDef;
use crate::sql_ast::{
    AggregateFunc, Join, OrderItem, SelectItem, SqlBinaryOperator, SqlExpr, TableRef,
};

use super::joins::ResolvedJoin;
use super::resolve::{parse_qualified, ResolvedField};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.]+$").expect("identifier pattern is a valid regex")
});

/// Output names are single unqualified words that cannot be read as a number.
static OUTPUT_ALIAS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("alias pattern is a valid regex")
});

pub fn is_valid_identifier(ident: &str) -> bool {
    IDENTIFIER.is_match(ident)
}

/// Pass an identifier through unchanged if it is safe to splice into SQL.
pub fn escape_identifier(ident: &str) -> Result<String, CompileError> {
    if is_valid_identifier(ident) {
        Ok(ident.to_string())
    } else {
        Err(CompileError::InvalidIdentifier {
            identifier: ident.to_string(),
        })
    }
}

/// Check a select-list alias: the identifier rule plus a leading letter or
/// underscore and no `.` separator.
pub fn escape_alias(alias: &str) -> Result<String, CompileError> {
    if OUTPUT_ALIAS.is_match(alias) {
        Ok(alias.to_string())
    } else {
        Err(CompileError::InvalidIdentifier {
            identifier: alias.to_string(),
        })
    }
}

/// How main-table columns are written. Once a join is present they are
/// qualified with the table name so same-named joined columns never clash.
#[derive(Debug, Clone, Copy)]
pub struct ColumnScope<'a> {
    pub main_qualifier: Option<&'a str>,
}

impl<'a> ColumnScope<'a> {
    pub fn new(main_table: &'a str, joins: &[ResolvedJoin<'_>]) -> Self {
        Self {
            main_qualifier: (!joins.is_empty()).then_some(main_table),
        }
    }

    pub fn column(&self, field: &ResolvedField) -> Result<SqlExpr, CompileError> {
        let table = match field.qualifier.as_deref().or(self.main_qualifier) {
            Some(qualifier) => Some(escape_identifier(qualifier)?),
            None => None,
        };
        Ok(SqlExpr::Column {
            table,
            name: escape_identifier(&field.column)?,
        })
    }
}

/// A dimension or metric as it appears in the select list.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    pub expr: SqlExpr,
    /// Alias written in the select list, if any.
    pub select_alias: Option<String>,
    /// Alias the report author gave explicitly.
    pub explicit_alias: Option<String>,
}

pub fn project_dimension(
    dimension: &Dimension,
    field: &ResolvedField,
    scope: ColumnScope<'_>,
    force_alias: bool,
) -> Result<ProjectedColumn, CompileError> {
    let explicit_alias = dimension
        .alias
        .as_deref()
        .map(escape_alias)
        .transpose()?;
    let select_alias = match &explicit_alias {
        Some(alias) => Some(alias.clone()),
        None if force_alias => Some(escape_alias(
            &dimension.field.replace(FIELD_SEPARATOR, "_"),
        )?),
        None => None,
    };
    Ok(ProjectedColumn {
        expr: scope.column(field)?,
        select_alias,
        explicit_alias,
    })
}

pub fn project_metric(
    metric: &Metric,
    field: &ResolvedField,
    scope: ColumnScope<'_>,
) -> Result<ProjectedColumn, CompileError> {
    let func = match &metric.operation {
        MetricOperation::Sum => AggregateFunc::Sum,
        MetricOperation::Count => AggregateFunc::Count,
        MetricOperation::Unsupported(op) => {
            return Err(CompileError::UnsupportedOperation {
                field: metric.field.clone(),
                operation: op.clone(),
            })
        }
    };
    let explicit_alias = metric
        .alias
        .as_deref()
        .map(escape_alias)
        .transpose()?;
    Ok(ProjectedColumn {
        expr: SqlExpr::Aggregate {
            func,
            expr: Box::new(scope.column(field)?),
        },
        select_alias: Some(escape_alias(&metric.output_alias())?),
        explicit_alias,
    })
}

impl ProjectedColumn {
    /// Name the column carries in the result rows.
    pub fn output_name(&self) -> Option<&str> {
        match (&self.select_alias, &self.expr) {
            (Some(alias), _) => Some(alias.as_str()),
            (None, SqlExpr::Column { name, .. }) => Some(name.as_str()),
            (None, _) => None,
        }
    }
}

/// Every result column must have its own name, or rows and ORDER BY
/// aliases become ambiguous.
pub fn build_select(columns: &[ProjectedColumn]) -> Result<Vec<SelectItem>, CompileError> {
    if columns.is_empty() {
        return Err(CompileError::EmptyReport);
    }
    let mut seen = HashSet::new();
    for name in columns.iter().filter_map(ProjectedColumn::output_name) {
        if !seen.insert(name) {
            return Err(CompileError::DuplicateOutputName {
                name: name.to_string(),
            });
        }
    }
    Ok(columns
        .iter()
        .map(|c| SelectItem {
            expr: c.expr.clone(),
            alias: c.select_alias.clone(),
        })
        .collect())
}

pub fn build_from(
    main_table: &str,
    joins: &[ResolvedJoin<'_>],
) -> Result<(TableRef, Vec<Join>), CompileError> {
    let from = TableRef {
        name: escape_identifier(main_table)?,
        alias: None,
    };
    let joins = joins
        .iter()
        .map(|join| {
            let rel = join.relationship;
            Ok(Join {
                kind: rel.kind,
                table: TableRef {
                    name: escape_identifier(&rel.table)?,
                    alias: Some(escape_identifier(&rel.alias)?),
                },
                on: rel.on.clone(),
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok((from, joins))
}

/// Filters become AND-ed predicates; values are appended to `params`.
pub fn build_where(
    filters: &[(&Filter, ResolvedField)],
    scope: ColumnScope<'_>,
    params: &mut Vec<Value>,
) -> Result<Vec<SqlExpr>, CompileError> {
    filters
        .iter()
        .map(|(filter, field)| build_predicate(filter, scope.column(field)?, params))
        .collect()
}

fn build_predicate(
    filter: &Filter,
    column: SqlExpr,
    params: &mut Vec<Value>,
) -> Result<SqlExpr, CompileError> {
    let invalid = |reason: &str| CompileError::InvalidFilterValue {
        field: filter.field.clone(),
        reason: reason.to_string(),
    };

    match filter.operator {
        FilterOperator::IsNull | FilterOperator::IsNotNull => Ok(SqlExpr::IsNull {
            expr: Box::new(column),
            negated: filter.operator == FilterOperator::IsNotNull,
        }),
        FilterOperator::In | FilterOperator::NotIn => {
            let items = match &filter.value {
                Some(Value::Array(items)) if !items.is_empty() => items,
                Some(Value::Array(_)) => return Err(invalid("IN list must not be empty")),
                _ => return Err(invalid("IN and NOT IN take an array of values")),
            };
            if !items.iter().all(is_bindable_scalar) {
                return Err(invalid("IN list entries must be non-null scalars"));
            }
            let list = items.iter().map(|item| bind(params, item)).collect();
            Ok(SqlExpr::InList {
                expr: Box::new(column),
                list,
                negated: filter.operator == FilterOperator::NotIn,
            })
        }
        FilterOperator::Eq => compare(filter, SqlBinaryOperator::Eq, column, params),
        FilterOperator::Neq => compare(filter, SqlBinaryOperator::Neq, column, params),
        FilterOperator::Gt => compare(filter, SqlBinaryOperator::Gt, column, params),
        FilterOperator::Gte => compare(filter, SqlBinaryOperator::Gte, column, params),
        FilterOperator::Lt => compare(filter, SqlBinaryOperator::Lt, column, params),
        FilterOperator::Lte => compare(filter, SqlBinaryOperator::Lte, column, params),
        FilterOperator::Like => compare(filter, SqlBinaryOperator::Like, column, params),
    }
}

fn compare(
    filter: &Filter,
    op: SqlBinaryOperator,
    column: SqlExpr,
    params: &mut Vec<Value>,
) -> Result<SqlExpr, CompileError> {
    let invalid = |reason: String| CompileError::InvalidFilterValue {
        field: filter.field.clone(),
        reason,
    };
    let value = match &filter.value {
        Some(value) if is_bindable_scalar(value) => value,
        Some(Value::Array(_)) => {
            return Err(invalid(format!(
                "{} takes a single value",
                filter.operator.as_sql()
            )))
        }
        _ => {
            return Err(invalid(format!(
                "{} needs a non-null scalar",
                filter.operator.as_sql()
            )))
        }
    };
    Ok(SqlExpr::BinaryOp {
        op,
        left: Box::new(column),
        right: Box::new(bind(params, value)),
    })
}

fn is_bindable_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn bind(params: &mut Vec<Value>, value: &Value) -> SqlExpr {
    params.push(value.clone());
    SqlExpr::Param(params.len() - 1)
}

/// Dimensions only; rendered exactly like their select expression.
pub fn build_group_by(dimensions: &[ProjectedColumn]) -> Vec<SqlExpr> {
    dimensions.iter().map(|c| c.expr.clone()).collect()
}

/// Inputs the ORDER BY builder needs besides the sort list itself.
pub struct OrderContext<'a> {
    pub config: &'a ReportConfig,
    /// Dimensions then metrics, in select-list order.
    pub columns: &'a [ProjectedColumn],
    pub main_table: &'a TableDef,
    pub scope: ColumnScope<'a>,
    pub use_ordinals: bool,
}

/// Grouped reports may only sort by their own dimensions and metrics: by
/// explicit alias when there is one, otherwise by select-list position (or
/// by the compiler-assigned alias when ordinals are off). Ungrouped reports
/// may sort by any allow-listed main-table column.
pub fn build_order_by(ctx: &OrderContext<'_>) -> Result<Vec<OrderItem>, CompileError> {
    let grouped = ctx.config.is_grouped();
    ctx.config
        .sort
        .iter()
        .map(|spec| {
            let expr = if grouped {
                let target = ctx.config.sort_target(&spec.field).ok_or_else(|| {
                    CompileError::InvalidSortField {
                        field: spec.field.clone(),
                    }
                })?;
                grouped_sort_expr(ctx, target, &spec.field)?
            } else {
                ungrouped_sort_expr(ctx, &spec.field)?
            };
            Ok(OrderItem {
                expr,
                direction: spec.direction,
            })
        })
        .collect()
}

fn grouped_sort_expr(
    ctx: &OrderContext<'_>,
    target: SortTarget,
    field: &str,
) -> Result<SqlExpr, CompileError> {
    let position = ctx.config.select_position(target);
    let column = ctx
        .columns
        .get(position - 1)
        .ok_or_else(|| CompileError::InvalidSortField {
            field: field.to_string(),
        })?;
    if let Some(alias) = &column.explicit_alias {
        return Ok(SqlExpr::Alias(alias.clone()));
    }
    if ctx.use_ordinals {
        return Ok(SqlExpr::Ordinal(position));
    }
    match &column.select_alias {
        Some(alias) => Ok(SqlExpr::Alias(alias.clone())),
        None => Err(CompileError::InvalidSortField {
            field: field.to_string(),
        }),
    }
}

fn ungrouped_sort_expr(ctx: &OrderContext<'_>, field: &str) -> Result<SqlExpr, CompileError> {
    let invalid = || CompileError::InvalidSortField {
        field: field.to_string(),
    };
    if parse_qualified(field).is_some() || !ctx.main_table.has_field(field) {
        return Err(invalid());
    }
    ctx.scope.column(&ResolvedField {
        reference: field.to_string(),
        relationship: None,
        qualifier: None,
        column: field.to_string(),
        numeric: ctx.main_table.is_numeric(field),
    })
}

/// Absent or non-positive limits are dropped; anything else is clamped to
/// [`MAX_LIMIT`] and bound as a parameter.
pub fn build_limit(limit: Option<i64>, params: &mut Vec<Value>) -> Option<SqlExpr> {
    match limit {
        Some(limit) if limit > 0 => Some(bind(params, &Value::from(limit.min(MAX_LIMIT)))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::reports::SortSpec;
    use crate::schema::SchemaRegistry;

    fn main_field(column: &str) -> ResolvedField {
        ResolvedField {
            reference: column.to_string(),
            relationship: None,
            qualifier: None,
            column: column.to_string(),
            numeric: false,
        }
    }

    const BARE: ColumnScope<'static> = ColumnScope {
        main_qualifier: None,
    };

    #[test]
    fn identifiers_outside_the_safe_charset_are_rejected() {
        assert_eq!(escape_identifier("agency.name").unwrap(), "agency.name");
        assert_eq!(escape_identifier("sum_points_2").unwrap(), "sum_points_2");
        for bad in ["", "name; DROP TABLE orders", "a b", "x'--", "\"quoted\"", "SUM(x)"] {
            assert_eq!(
                escape_identifier(bad),
                Err(CompileError::InvalidIdentifier {
                    identifier: bad.to_string()
                })
            );
        }
    }

    #[test]
    fn in_filter_binds_one_param_per_element() {
        let filter = Filter::new("status", FilterOperator::In, json!(["PENDING", "CONFIRMED"]));
        let mut params = vec![json!("earlier")];
        let exprs = build_where(&[(&filter, main_field("status"))], BARE, &mut params).unwrap();
        assert_eq!(params, vec![json!("earlier"), json!("PENDING"), json!("CONFIRMED")]);
        assert_eq!(
            exprs[0],
            SqlExpr::InList {
                expr: Box::new(SqlExpr::Column {
                    table: None,
                    name: "status".to_string()
                }),
                list: vec![SqlExpr::Param(1), SqlExpr::Param(2)],
                negated: false,
            }
        );
    }

    #[test]
    fn null_checks_bind_nothing() {
        let filter = Filter::unary("updated_at", FilterOperator::IsNotNull);
        let mut params = Vec::new();
        build_where(&[(&filter, main_field("updated_at"))], BARE, &mut params).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn filter_value_shapes_are_enforced() {
        let cases = [
            Filter::new("status", FilterOperator::In, json!("PENDING")),
            Filter::new("status", FilterOperator::NotIn, json!([])),
            Filter::new("status", FilterOperator::In, json!([["nested"]])),
            Filter::new("status", FilterOperator::Eq, json!(["a", "b"])),
            Filter::new("status", FilterOperator::Eq, Value::Null),
            Filter::unary("status", FilterOperator::Like),
        ];
        for filter in &cases {
            let mut params = Vec::new();
            let err = build_where(&[(filter, main_field("status"))], BARE, &mut params)
                .unwrap_err();
            assert!(
                matches!(err, CompileError::InvalidFilterValue { .. }),
                "{filter:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn limit_is_clamped_and_bound() {
        let mut params = Vec::new();
        assert_eq!(build_limit(None, &mut params), None);
        assert_eq!(build_limit(Some(0), &mut params), None);
        assert_eq!(build_limit(Some(-3), &mut params), None);
        assert_eq!(build_limit(Some(50_000), &mut params), Some(SqlExpr::Param(0)));
        assert_eq!(params, vec![json!(10_000)]);
    }

    #[test]
    fn empty_select_is_rejected() {
        assert_eq!(build_select(&[]), Err(CompileError::EmptyReport));
    }

    #[test]
    fn aliases_must_be_plain_words() {
        assert_eq!(escape_alias("sum_points_2").unwrap(), "sum_points_2");
        assert_eq!(escape_alias("_total").unwrap(), "_total");
        for bad in ["2", "9lives", "agency.name", "", "a-b"] {
            assert_eq!(
                escape_alias(bad),
                Err(CompileError::InvalidIdentifier {
                    identifier: bad.to_string()
                })
            );
        }
    }

    #[test]
    fn select_rejects_repeated_output_names() {
        let status =
            project_dimension(&Dimension::new("status"), &main_field("status"), BARE, false)
                .unwrap();
        let counted = project_metric(
            &Metric::count("id").with_alias("status"),
            &main_field("id"),
            BARE,
        )
        .unwrap();
        assert_eq!(
            build_select(&[status, counted]),
            Err(CompileError::DuplicateOutputName {
                name: "status".to_string()
            })
        );
    }

    #[test]
    fn ungrouped_sort_uses_main_table_columns() {
        let registry = SchemaRegistry::business().unwrap();
        let orders = registry.table("orders").unwrap();
        let config = ReportConfig {
            sort: vec![SortSpec::desc("created_at")],
            ..Default::default()
        };
        let ctx = OrderContext {
            config: &config,
            columns: &[],
            main_table: orders,
            scope: BARE,
            use_ordinals: true,
        };
        let items = build_order_by(&ctx).unwrap();
        assert_eq!(
            items[0].expr,
            SqlExpr::Column {
                table: None,
                name: "created_at".to_string()
            }
        );

        let config = ReportConfig {
            sort: vec![SortSpec::asc("agency.name")],
            ..Default::default()
        };
        let ctx = OrderContext {
            config: &config,
            ..ctx
        };
        assert!(matches!(
            build_order_by(&ctx),
            Err(CompileError::InvalidSortField { .. })
        ));
    }

    #[test]
    fn grouped_sort_prefers_alias_then_ordinal() {
        let config = ReportConfig {
            dimensions: vec![Dimension::new("status")],
            metrics: vec![
                Metric::sum("total_points").with_alias("sum_points"),
                Metric::count("id"),
            ],
            sort: vec![SortSpec::desc("sum_points"), SortSpec::asc("id"), SortSpec::asc("status")],
            ..Default::default()
        };
        let registry = SchemaRegistry::business().unwrap();
        let orders = registry.table("orders").unwrap();
        let columns = vec![
            project_dimension(&config.dimensions[0], &main_field("status"), BARE, false).unwrap(),
            project_metric(&config.metrics[0], &main_field("total_points"), BARE).unwrap(),
            project_metric(&config.metrics[1], &main_field("id"), BARE).unwrap(),
        ];
        let ctx = OrderContext {
            config: &config,
            columns: &columns,
            main_table: orders,
            scope: BARE,
            use_ordinals: true,
        };
        let exprs: Vec<_> = build_order_by(&ctx)
            .unwrap()
            .into_iter()
            .map(|o| o.expr)
            .collect();
        assert_eq!(
            exprs,
            vec![
                SqlExpr::Alias("sum_points".to_string()),
                SqlExpr::Ordinal(3),
                SqlExpr::Ordinal(1),
            ]
        );

        // Without ordinals every column carries an alias to order by.
        let aliased = vec![
            project_dimension(&config.dimensions[0], &main_field("status"), BARE, true).unwrap(),
            columns[1].clone(),
            columns[2].clone(),
        ];
        let ctx = OrderContext {
            columns: &aliased,
            use_ordinals: false,
            ..ctx
        };
        let exprs: Vec<_> = build_order_by(&ctx)
            .unwrap()
            .into_iter()
            .map(|o| o.expr)
            .collect();
        assert_eq!(
            exprs,
            vec![
                SqlExpr::Alias("sum_points".to_string()),
                SqlExpr::Alias("count_id".to_string()),
                SqlExpr::Alias("status".to_string()),
            ]
        );
    }
}
