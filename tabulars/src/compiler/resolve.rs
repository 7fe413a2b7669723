use crate::error::CompileError;
use crate::reports::FIELD_SEPARATOR;
use crate::schema::SchemaRegistry;

/// A field reference checked against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    /// The reference as written in the report.
    pub reference: String,
    /// Relationship key for `relationship.column` references.
    pub relationship: Option<String>,
    /// Join alias for related columns; `None` for main-table columns.
    pub qualifier: Option<String>,
    pub column: String,
    pub numeric: bool,
}

pub fn parse_qualified(name: &str) -> Option<(&str, &str)> {
    let (relationship, field) = name.split_once(FIELD_SEPARATOR)?;

    if relationship.is_empty() || field.is_empty() {
        return None;
    }
    Some((relationship, field))
}

/// Resolve `field` against `main_table`, following a relationship when the
/// reference is qualified. Related columns are checked against the far
/// side's allow-list.
pub fn resolve_field(
    registry: &SchemaRegistry,
    main_table: &str,
    field: &str,
) -> Result<ResolvedField, CompileError> {
    let table = registry
        .table(main_table)
        .ok_or_else(|| CompileError::UnknownTable {
            table: main_table.to_string(),
        })?;

    if let Some((key, column)) = parse_qualified(field) {
        let rel = registry
            .relationship(main_table, key)
            .ok_or_else(|| CompileError::UnknownRelationship {
                table: main_table.to_string(),
                relationship: key.to_string(),
            })?;
        let allowed = registry.fields_of(&rel.alias).unwrap_or_default();
        if !allowed.iter().any(|f| f == column) {
            return Err(CompileError::UnknownField {
                table: rel.table.clone(),
                field: column.to_string(),
            });
        }
        return Ok(ResolvedField {
            reference: field.to_string(),
            relationship: Some(key.to_string()),
            qualifier: Some(rel.alias.clone()),
            column: column.to_string(),
            numeric: registry.is_numeric(&rel.table, column),
        });
    }

    if !table.has_field(field) {
        return Err(CompileError::UnknownField {
            table: main_table.to_string(),
            field: field.to_string(),
        });
    }
    Ok(ResolvedField {
        reference: field.to_string(),
        relationship: None,
        qualifier: None,
        column: field.to_string(),
        numeric: table.is_numeric(field),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_names_need_both_halves() {
        assert_eq!(parse_qualified("agency.name"), Some(("agency", "name")));
        assert_eq!(parse_qualified("status"), None);
        assert_eq!(parse_qualified(".name"), None);
        assert_eq!(parse_qualified("agency."), None);
    }

    #[test]
    fn related_field_checked_against_target_table() {
        let registry = SchemaRegistry::business().unwrap();
        let resolved = resolve_field(&registry, "orders", "agency.name").unwrap();
        assert_eq!(resolved.qualifier.as_deref(), Some("agency"));
        assert_eq!(resolved.relationship.as_deref(), Some("agency"));

        // `status` exists on agencies too, `total_points` only on orders.
        let err = resolve_field(&registry, "orders", "agency.total_points").unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownField {
                table: "agencies".to_string(),
                field: "total_points".to_string(),
            }
        );
    }

    #[test]
    fn main_table_prefix_is_not_a_relationship() {
        let registry = SchemaRegistry::business().unwrap();
        let err = resolve_field(&registry, "orders", "orders.status").unwrap_err();
        assert!(matches!(err, CompileError::UnknownRelationship { .. }));
    }
}
