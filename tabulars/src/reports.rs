use std::fmt;

use serde::{de, Deserializer, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard ceiling on the number of rows a report may return.
pub const MAX_LIMIT: i64 = 10_000;

/// Separator between a relationship key and a column in a field reference.
pub const FIELD_SEPARATOR: char = '.';

/// A grouped output column. `field` is either a main-table column or
/// `relationship.column`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimension {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Dimension {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            alias: None,
        }
    }

    pub fn aliased(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            alias: Some(alias.into()),
        }
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(field) => Ok(Dimension { field, alias: None }),
            other => {
                #[derive(Deserialize)]
                #[serde(deny_unknown_fields)]
                struct Full {
                    field: String,
                    #[serde(default)]
                    alias: Option<String>,
                }
                let full = Full::deserialize(other).map_err(de::Error::custom)?;
                Ok(Dimension {
                    field: full.field,
                    alias: full.alias,
                })
            }
        }
    }
}

/// Aggregate applied to a metric field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricOperation {
    Sum,
    Count,
    /// Anything else a stored report may carry; rejected at validation.
    Unsupported(String),
}

impl MetricOperation {
    pub fn as_str(&self) -> &str {
        match self {
            MetricOperation::Sum => "SUM",
            MetricOperation::Count => "COUNT",
            MetricOperation::Unsupported(other) => other.as_str(),
        }
    }

    fn alias_prefix(&self) -> &'static str {
        match self {
            MetricOperation::Sum => "total",
            MetricOperation::Count => "count",
            MetricOperation::Unsupported(_) => "agg",
        }
    }
}

impl fmt::Display for MetricOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MetricOperation {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUM" => MetricOperation::Sum,
            "COUNT" => MetricOperation::Count,
            _ => MetricOperation::Unsupported(raw.to_string()),
        }
    }
}

impl Serialize for MetricOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetricOperation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(MetricOperation::from(raw.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metric {
    pub field: String,
    pub operation: MetricOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Metric {
    pub fn sum(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operation: MetricOperation::Sum,
            alias: None,
        }
    }

    pub fn count(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operation: MetricOperation::Count,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Output name: the explicit alias, or `total_<field>` / `count_<field>`.
    pub fn output_alias(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => format!(
                "{}_{}",
                self.operation.alias_prefix(),
                self.field.replace(FIELD_SEPARATOR, "_")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=", alias = "<>")]
    Neq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "LIKE", alias = "like")]
    Like,
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "NOT IN", alias = "not in")]
    NotIn,
    #[serde(rename = "IS NULL", alias = "is null")]
    IsNull,
    #[serde(rename = "IS NOT NULL", alias = "is not null")]
    IsNotNull,
}

impl FilterOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Neq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Gte => ">=",
            FilterOperator::Lte => "<=",
            FilterOperator::Like => "LIKE",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
            FilterOperator::IsNull => "IS NULL",
            FilterOperator::IsNotNull => "IS NOT NULL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: Some(value.into()),
        }
    }

    pub fn unary(field: impl Into<String>, operator: FilterOperator) -> Self {
        Self {
            field: field.into(),
            operator,
            value: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Declarative report definition, either stored or sent inline for preview.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl ReportConfig {
    /// Every field string the report references, in declaration order:
    /// filters, then dimensions, then metrics.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.filters
            .iter()
            .map(|f| f.field.as_str())
            .chain(self.dimensions.iter().map(|d| d.field.as_str()))
            .chain(self.metrics.iter().map(|m| m.field.as_str()))
    }

    pub fn is_grouped(&self) -> bool {
        !self.dimensions.is_empty()
    }
}

/// Inline report sent for preview before it is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub source_table: String,
    pub config: ReportConfig,
}

/// Report definition as loaded from the external report store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub id: String,
    pub name: String,
    pub source_table: String,
    pub config: ReportConfig,
}

/// Final SQL text plus positional parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Which selected column a sort entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortTarget {
    Dimension(usize),
    Metric(usize),
}

impl SortTarget {
    pub fn is_metric(&self) -> bool {
        matches!(self, SortTarget::Metric(_))
    }
}

impl ReportConfig {
    /// Find the dimension or metric a sort field names. Dimensions win over
    /// metrics. A metric matches on its output name first; a bare field
    /// only resolves when exactly one metric aggregates it.
    pub fn sort_target(&self, field: &str) -> Option<SortTarget> {
        if let Some(idx) = self
            .dimensions
            .iter()
            .position(|d| d.field == field || d.alias.as_deref() == Some(field))
        {
            return Some(SortTarget::Dimension(idx));
        }
        if let Some(idx) = self.metrics.iter().position(|m| m.output_alias() == field) {
            return Some(SortTarget::Metric(idx));
        }
        let mut by_field = self
            .metrics
            .iter()
            .enumerate()
            .filter(|(_, m)| m.field == field);
        match (by_field.next(), by_field.next()) {
            (Some((idx, _)), None) => Some(SortTarget::Metric(idx)),
            _ => None,
        }
    }

    /// One-based position of the target in the select list.
    pub fn select_position(&self, target: SortTarget) -> usize {
        match target {
            SortTarget::Dimension(idx) => idx + 1,
            SortTarget::Metric(idx) => self.dimensions.len() + idx + 1,
        }
    }
}
