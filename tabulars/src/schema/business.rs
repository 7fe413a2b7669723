//! Built-in schema for the business tables admins can report on.

use std::collections::BTreeMap;

use crate::error::Result;

use super::{JoinKind, Relationship, SchemaRegistry, TableDef};

impl SchemaRegistry {
    /// Registry for agencies, users, orders, ledger entries and imports.
    pub fn business() -> Result<Self> {
        SchemaRegistry::from_tables(vec![
            agencies(),
            users(),
            orders(),
            ledger_entries(),
            imports(),
        ])
    }
}

fn agencies() -> TableDef {
    table(
        "agencies",
        &[
            "id",
            "name",
            "code",
            "region",
            "status",
            "owner_id",
            "credit_limit",
            "created_at",
            "updated_at",
        ],
        &["credit_limit"],
        vec![(
            "owner",
            join("users", "owner", "agencies.owner_id = owner.id", JoinKind::Left, None),
        )],
        "Partner agencies placing orders",
    )
}

fn users() -> TableDef {
    table(
        "users",
        &["id", "name", "email", "role", "created_at"],
        &[],
        vec![],
        "Back-office users",
    )
}

fn orders() -> TableDef {
    table(
        "orders",
        &[
            "id",
            "agency_id",
            "import_id",
            "customer_name",
            "status",
            "total_points",
            "total_amount",
            "item_count",
            "created_at",
            "updated_at",
        ],
        &["total_points", "total_amount", "item_count"],
        vec![
            (
                "agency",
                join(
                    "agencies",
                    "agency",
                    "orders.agency_id = agency.id",
                    JoinKind::Left,
                    None,
                ),
            ),
            (
                "agency_owner",
                join(
                    "users",
                    "agency_owner",
                    "agency.owner_id = agency_owner.id",
                    JoinKind::Left,
                    Some("agency"),
                ),
            ),
            (
                "import",
                join(
                    "imports",
                    "order_import",
                    "orders.import_id = order_import.id",
                    JoinKind::Left,
                    None,
                ),
            ),
        ],
        "Orders placed by agencies",
    )
}

fn ledger_entries() -> TableDef {
    table(
        "ledger_entries",
        &[
            "id",
            "agency_id",
            "order_id",
            "entry_type",
            "points",
            "amount",
            "balance_after",
            "created_at",
        ],
        &["points", "amount", "balance_after"],
        vec![
            (
                "agency",
                join(
                    "agencies",
                    "agency",
                    "ledger_entries.agency_id = agency.id",
                    JoinKind::Left,
                    None,
                ),
            ),
            (
                "order",
                join(
                    "orders",
                    "ledger_order",
                    "ledger_entries.order_id = ledger_order.id",
                    JoinKind::Inner,
                    None,
                ),
            ),
            (
                "order_agency",
                join(
                    "agencies",
                    "order_agency",
                    "ledger_order.agency_id = order_agency.id",
                    JoinKind::Left,
                    Some("order"),
                ),
            ),
        ],
        "Point movements per agency",
    )
}

fn imports() -> TableDef {
    table(
        "imports",
        &[
            "id",
            "agency_id",
            "file_name",
            "status",
            "row_count",
            "error_count",
            "created_at",
        ],
        &["row_count", "error_count"],
        vec![(
            "agency",
            join(
                "agencies",
                "agency",
                "imports.agency_id = agency.id",
                JoinKind::Left,
                None,
            ),
        )],
        "Bulk order imports",
    )
}

fn table(
    name: &str,
    fields: &[&str],
    numeric: &[&str],
    relationships: Vec<(&str, Relationship)>,
    description: &str,
) -> TableDef {
    TableDef {
        name: name.to_string(),
        fields: fields.iter().map(|f| f.to_string()).collect(),
        numeric: numeric.iter().map(|f| f.to_string()).collect(),
        relationships: relationships
            .into_iter()
            .map(|(key, rel)| (key.to_string(), rel))
            .collect::<BTreeMap<_, _>>(),
        description: Some(description.to_string()),
    }
}

fn join(table: &str, alias: &str, on: &str, kind: JoinKind, requires: Option<&str>) -> Relationship {
    Relationship {
        table: table.to_string(),
        alias: alias.to_string(),
        on: on.to_string(),
        kind,
        requires: requires.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_schema_is_well_formed() {
        let registry = SchemaRegistry::business().unwrap();
        let names: Vec<_> = registry.table_names().collect();
        assert_eq!(
            names,
            vec!["agencies", "imports", "ledger_entries", "orders", "users"]
        );
        assert!(registry.is_numeric("orders", "total_points"));
        assert!(!registry.is_numeric("orders", "id"));
        let rel = registry.relationship("orders", "agency_owner").unwrap();
        assert_eq!(rel.requires.as_deref(), Some("agency"));
        assert!(registry
            .fields_of("agency")
            .unwrap()
            .contains(&"name".to_string()));
    }
}
