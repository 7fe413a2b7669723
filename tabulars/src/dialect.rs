//! SQL dialect differences the compiler cares about.
//!
//! Identifiers are never quoted: they are allow-listed and checked against
//! the identifier rule before rendering. Dialects only decide how bound
//! parameters are spelled and whether ORDER BY may use select-list ordinals.

use serde::{Deserialize, Serialize};

pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Placeholder for the zero-based parameter `idx`.
    fn placeholder(&self, _idx: usize) -> String {
        "?".to_string()
    }

    /// Whether `ORDER BY 2` refers to the second select-list expression.
    fn supports_ordinal_order_by(&self) -> bool {
        true
    }
}

/// `?` placeholders: DuckDB, SQLite, MySQL.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnsiDialect;

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ansi"
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, idx: usize) -> String {
        format!("${}", idx + 1) // PostgreSQL uses $1, $2, ...
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    #[default]
    Ansi,
    Postgres,
}

impl DialectKind {
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Ansi => Box::new(AnsiDialect),
            DialectKind::Postgres => Box::new(PostgresDialect),
        }
    }
}
