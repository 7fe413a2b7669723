use crate::compiler::{resolve_field, JoinResolver};
use crate::error::CompileError;
use crate::reports::{MetricOperation, ReportConfig, MAX_LIMIT};
use crate::schema::SchemaRegistry;

/// Report-level business rules, checked before any SQL is built.
///
/// Rules run in a fixed order and the first violation is returned:
/// 1. at least one dimension or metric
/// 2. metrics need dimensions to group by
/// 3. every referenced field resolves (main table or declared relationship)
/// 4. metric operations are SUM or COUNT, and SUM only on numeric fields
/// 5. sort fields name the report's own dimensions or metrics
/// 6. sorting by a metric needs a positive limit
/// 7. the limit lies in `[0, MAX_LIMIT]`
pub struct ConfigValidator<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> ConfigValidator<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn validate(&self, table: &str, config: &ReportConfig) -> Result<(), CompileError> {
        if config.dimensions.is_empty() && config.metrics.is_empty() {
            return Err(CompileError::EmptyReport);
        }
        if !config.metrics.is_empty() && config.dimensions.is_empty() {
            return Err(CompileError::MissingGroupingForAggregate);
        }

        self.check_fields(table, config)?;
        self.check_metrics(table, config)?;

        let mut metric_sort = None;
        for spec in &config.sort {
            let target = config.sort_target(&spec.field).ok_or_else(|| {
                CompileError::InvalidSortField {
                    field: spec.field.clone(),
                }
            })?;
            if target.is_metric() && metric_sort.is_none() {
                metric_sort = Some(spec.field.as_str());
            }
        }
        if let Some(field) = metric_sort {
            if !config.limit.is_some_and(|limit| limit > 0) {
                return Err(CompileError::MissingLimitForAggregateSort {
                    field: field.to_string(),
                });
            }
        }

        if let Some(limit) = config.limit {
            if !(0..=MAX_LIMIT).contains(&limit) {
                return Err(CompileError::InvalidLimitRange { limit });
            }
        }
        Ok(())
    }

    fn check_fields(&self, table: &str, config: &ReportConfig) -> Result<(), CompileError> {
        if self.registry.table(table).is_none() {
            return Err(CompileError::UnknownTable {
                table: table.to_string(),
            });
        }
        let fields = config
            .dimensions
            .iter()
            .map(|d| d.field.as_str())
            .chain(config.filters.iter().map(|f| f.field.as_str()))
            .chain(config.metrics.iter().map(|m| m.field.as_str()));
        for field in fields {
            resolve_field(self.registry, table, field)?;
        }
        // Walks `requires` chains too, so a broken chain is caught here.
        JoinResolver::new(self.registry).resolve(table, config.referenced_fields())?;
        Ok(())
    }

    fn check_metrics(&self, table: &str, config: &ReportConfig) -> Result<(), CompileError> {
        for metric in &config.metrics {
            match &metric.operation {
                MetricOperation::Unsupported(op) => {
                    return Err(CompileError::UnsupportedOperation {
                        field: metric.field.clone(),
                        operation: op.clone(),
                    })
                }
                MetricOperation::Sum => {
                    let field = resolve_field(self.registry, table, &metric.field)?;
                    if !field.numeric {
                        return Err(CompileError::NonNumericAggregation {
                            field: metric.field.clone(),
                        });
                    }
                }
                MetricOperation::Count => {}
            }
        }
        Ok(())
    }
}
