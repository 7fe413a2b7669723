use std::collections::{BTreeSet, HashSet};

use crate::error::CompileError;
use crate::schema::{Relationship, SchemaRegistry};

use super::resolve::{parse_qualified, resolve_field};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedJoin<'a> {
    pub key: String,
    pub relationship: &'a Relationship,
}

/// Computes the joins a set of field references needs, ordered so every
/// `requires` dependency is joined before its dependents.
pub struct JoinResolver<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> JoinResolver<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve<'f, I>(
        &self,
        main_table: &str,
        fields: I,
    ) -> Result<Vec<ResolvedJoin<'a>>, CompileError>
    where
        I: IntoIterator<Item = &'f str>,
    {
        // Sorted so the output depends on which relationships are referenced,
        // not on the order the report lists its fields.
        let mut keys: BTreeSet<String> = BTreeSet::new();
        for field in fields {
            if parse_qualified(field).is_none() {
                continue;
            }
            let resolved = resolve_field(self.registry, main_table, field)?;
            if let Some(key) = resolved.relationship {
                keys.insert(key);
            }
        }

        let mut walk = JoinWalk {
            registry: self.registry,
            main_table,
            visited: HashSet::new(),
            in_progress: HashSet::new(),
            ordered: Vec::new(),
        };
        for key in &keys {
            walk.visit(key)?;
        }
        tracing::trace!(
            table = main_table,
            joins = walk.ordered.len(),
            "resolved join chain"
        );
        Ok(walk.ordered)
    }
}

struct JoinWalk<'a, 't> {
    registry: &'a SchemaRegistry,
    main_table: &'t str,
    visited: HashSet<String>,
    in_progress: HashSet<String>,
    ordered: Vec<ResolvedJoin<'a>>,
}

impl<'a, 't> JoinWalk<'a, 't> {
    fn visit(&mut self, key: &str) -> Result<(), CompileError> {
        if self.visited.contains(key) {
            return Ok(());
        }
        if !self.in_progress.insert(key.to_string()) {
            return Err(CompileError::RelationshipCycle {
                table: self.main_table.to_string(),
                relationship: key.to_string(),
            });
        }
        let registry = self.registry;
        let relationship = registry
            .relationship(self.main_table, key)
            .ok_or_else(|| CompileError::UnknownRelationship {
                table: self.main_table.to_string(),
                relationship: key.to_string(),
            })?;
        if let Some(required) = &relationship.requires {
            self.visit(required)?;
        }
        self.in_progress.remove(key);
        self.visited.insert(key.to_string());
        self.ordered.push(ResolvedJoin {
            key: key.to_string(),
            relationship,
        });
        Ok(())
    }
}
