//! Hand-curated description of every reportable table.
//!
//! The registry is load-once configuration: it is built from code
//! ([`SchemaRegistry::business`]) or a directory of YAML table files, checked
//! for authoring errors up front, and only read afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use serde::{Deserialize, Serialize};

use crate::compiler::is_valid_identifier;
use crate::error::{Result, TabulaError};

pub mod business;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    Left,
    Inner,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT",
            JoinKind::Inner => "INNER",
        }
    }
}

/// Outbound join from a source table, keyed by relationship name on that table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relationship {
    /// Target table name.
    pub table: String,
    /// Alias the target table is joined under.
    pub alias: String,
    /// Raw join predicate. Authored here, never user input.
    pub on: String,
    #[serde(default)]
    pub kind: JoinKind,
    /// Relationship key on the same source table that must be joined first.
    #[serde(default)]
    pub requires: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDef {
    pub name: String,
    /// Allow-listed columns, in declaration order.
    pub fields: Vec<String>,
    /// Subset of `fields` that can be summed.
    #[serde(default)]
    pub numeric: Vec<String>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Relationship>,
    pub description: Option<String>,
}

impl TableDef {
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn is_numeric(&self, field: &str) -> bool {
        self.numeric.iter().any(|f| f == field)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, TableDef>,
    /// Join alias -> target table, across every source table.
    alias_targets: HashMap<String, String>,
}

impl SchemaRegistry {
    /// Build a registry, rejecting any authoring error.
    pub fn from_tables(tables: Vec<TableDef>) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for table in tables {
            if by_name.contains_key(&table.name) {
                return Err(schema_error(format!("table {} declared twice", table.name)));
            }
            by_name.insert(table.name.clone(), table);
        }

        let mut registry = SchemaRegistry {
            tables: by_name,
            alias_targets: HashMap::new(),
        };
        registry.validate()?;
        registry.alias_targets = registry.build_alias_index()?;
        tracing::debug!(tables = registry.tables.len(), "schema registry ready");
        Ok(registry)
    }

    /// Load one table definition per `*.yml` / `*.yaml` file in `dir`.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(schema_error(format!(
                "schema directory not found: {}",
                dir.display()
            )));
        }
        let mut paths: Vec<PathBuf> = Vec::new();
        for pattern in ["yml", "yaml"] {
            for entry in glob(&format!("{}/*.{pattern}", dir.display()))
                .map_err(|e| TabulaError::Other(e.into()))?
                .flatten()
            {
                paths.push(entry);
            }
        }
        paths.sort();

        let mut tables = Vec::with_capacity(paths.len());
        for path in &paths {
            let contents = fs::read_to_string(path)?;
            let table: TableDef = serde_yaml::from_str(&contents)?;
            tables.push(table);
        }
        tracing::info!(dir = %dir.display(), files = paths.len(), "loaded schema definitions");
        Self::from_tables(tables)
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn allowed_fields(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(|t| t.fields.as_slice())
    }

    pub fn is_numeric(&self, table: &str, field: &str) -> bool {
        self.tables
            .get(table)
            .map(|t| t.is_numeric(field))
            .unwrap_or(false)
    }

    pub fn relationship(&self, table: &str, key: &str) -> Option<&Relationship> {
        self.tables.get(table)?.relationships.get(key)
    }

    pub fn relationships(&self, table: &str) -> Option<&BTreeMap<String, Relationship>> {
        self.tables.get(table).map(|t| &t.relationships)
    }

    /// Allow-list of the table joined under `alias`.
    pub fn fields_of(&self, alias: &str) -> Option<&[String]> {
        let target = self.alias_targets.get(alias)?;
        self.allowed_fields(target)
    }

    fn validate(&self) -> Result<()> {
        for table in self.tables.values() {
            check_identifier(&table.name, &table.name)?;
            let mut seen = HashSet::new();
            for field in &table.fields {
                check_identifier(&table.name, field)?;
                if !seen.insert(field.as_str()) {
                    return Err(schema_error(format!(
                        "table {} lists field {field} twice",
                        table.name
                    )));
                }
            }
            for field in &table.numeric {
                if !table.has_field(field) {
                    return Err(schema_error(format!(
                        "table {} marks {field} numeric but does not allow it",
                        table.name
                    )));
                }
            }

            let mut aliases = HashSet::new();
            for (key, rel) in &table.relationships {
                check_identifier(&table.name, key)?;
                check_identifier(&table.name, &rel.alias)?;
                if !self.tables.contains_key(&rel.table) {
                    return Err(schema_error(format!(
                        "relationship {}.{key} targets unknown table {}",
                        table.name, rel.table
                    )));
                }
                if rel.alias == table.name || !aliases.insert(rel.alias.as_str()) {
                    return Err(schema_error(format!(
                        "relationship {}.{key} reuses alias {}",
                        table.name, rel.alias
                    )));
                }
                if let Some(required) = &rel.requires {
                    if !table.relationships.contains_key(required) {
                        return Err(schema_error(format!(
                            "relationship {}.{key} requires undeclared relationship {required}",
                            table.name
                        )));
                    }
                }
            }
            check_acyclic(table)?;
        }
        Ok(())
    }

    fn build_alias_index(&self) -> Result<HashMap<String, String>> {
        let mut index: HashMap<String, String> = HashMap::new();
        for table in self.tables.values() {
            for (key, rel) in &table.relationships {
                match index.get(&rel.alias) {
                    Some(existing) if *existing != rel.table => {
                        return Err(schema_error(format!(
                            "alias {} of {}.{key} points at {} but is already bound to {existing}",
                            rel.alias, table.name, rel.table
                        )));
                    }
                    _ => {
                        index.insert(rel.alias.clone(), rel.table.clone());
                    }
                }
            }
        }
        Ok(index)
    }
}

fn check_acyclic(table: &TableDef) -> Result<()> {
    for start in table.relationships.keys() {
        let mut chain = HashSet::new();
        let mut current = Some(start.as_str());
        while let Some(key) = current {
            if !chain.insert(key) {
                return Err(schema_error(format!(
                    "relationship {}.{start} has a cyclic requires chain",
                    table.name
                )));
            }
            current = table
                .relationships
                .get(key)
                .and_then(|rel| rel.requires.as_deref());
        }
    }
    Ok(())
}

fn check_identifier(table: &str, ident: &str) -> Result<()> {
    if is_valid_identifier(ident) {
        Ok(())
    } else {
        Err(schema_error(format!(
            "table {table} declares invalid identifier {ident:?}"
        )))
    }
}

fn schema_error(message: String) -> TabulaError {
    TabulaError::Schema(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(table: &str, alias: &str, requires: Option<&str>) -> Relationship {
        Relationship {
            table: table.to_string(),
            alias: alias.to_string(),
            on: format!("x.id = {alias}.id"),
            kind: JoinKind::Left,
            requires: requires.map(str::to_string),
        }
    }

    fn table(name: &str, rels: Vec<(&str, Relationship)>) -> TableDef {
        TableDef {
            name: name.to_string(),
            fields: vec!["id".to_string(), "amount".to_string()],
            numeric: vec!["amount".to_string()],
            relationships: rels
                .into_iter()
                .map(|(k, r)| (k.to_string(), r))
                .collect(),
            description: None,
        }
    }

    #[test]
    fn rejects_requires_cycle() {
        let err = SchemaRegistry::from_tables(vec![
            table("b", vec![]),
            table(
                "a",
                vec![("x", rel("b", "bx", Some("y"))), ("y", rel("b", "by", Some("x")))],
            ),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("cyclic"), "{err}");
    }

    #[test]
    fn rejects_numeric_outside_allow_list() {
        let mut t = table("a", vec![]);
        t.numeric.push("ghost".to_string());
        assert!(matches!(
            SchemaRegistry::from_tables(vec![t]),
            Err(TabulaError::Schema(_))
        ));
    }

    #[test]
    fn rejects_alias_bound_to_two_targets() {
        let err = SchemaRegistry::from_tables(vec![
            table("b", vec![]),
            table("c", vec![]),
            table("a", vec![("to_b", rel("b", "shared", None))]),
            table("d", vec![("to_c", rel("c", "shared", None))]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("already bound"), "{err}");
    }

    #[test]
    fn fields_of_follows_alias() {
        let registry = SchemaRegistry::from_tables(vec![
            table("b", vec![]),
            table("a", vec![("to_b", rel("b", "bee", None))]),
        ])
        .unwrap();
        assert_eq!(
            registry.fields_of("bee").unwrap(),
            &["id".to_string(), "amount".to_string()]
        );
        assert!(registry.fields_of("to_b").is_none());
        assert!(registry.relationship("a", "missing").is_none());
        assert!(!registry.is_numeric("nope", "amount"));
    }
}
