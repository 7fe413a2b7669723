use crate::dialect::Dialect;
use crate::reports::SortDirection;
use crate::schema::JoinKind;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column {
        table: Option<String>,
        name: String,
    },
    Aggregate {
        func: AggregateFunc,
        expr: Box<SqlExpr>,
    },
    /// Zero-based index into the compiled parameter list.
    Param(usize),
    /// One-based position in the select list.
    Ordinal(usize),
    /// Reference to a select-list alias.
    Alias(String),
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Sum,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    /// Pre-vetted predicate from the schema registry.
    pub on: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filters: Vec<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<SqlExpr>,
}

/// Renders a [`SelectQuery`] one clause at a time. Every clause renderer
/// returns an empty string when the clause is absent.
pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn render_select(&self, query: &SelectQuery) -> String {
        [
            self.select_clause(query),
            self.from_clause(query),
            self.where_clause(query),
            self.group_by_clause(query),
            self.order_by_clause(query),
            self.limit_clause(query),
        ]
        .into_iter()
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn select_clause(&self, query: &SelectQuery) -> String {
        if query.select.is_empty() {
            return String::new();
        }
        let items: Vec<String> = query
            .select
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr);
                match &item.alias {
                    Some(alias) => format!("{expr_sql} AS {alias}"),
                    None => expr_sql,
                }
            })
            .collect();
        format!("SELECT {}", items.join(", "))
    }

    pub fn from_clause(&self, query: &SelectQuery) -> String {
        let mut sql = format!("FROM {}", render_table_ref(&query.from));
        for join in &query.joins {
            sql.push_str(&format!(
                " {} JOIN {} ON {}",
                join.kind.as_sql(),
                render_table_ref(&join.table),
                join.on
            ));
        }
        sql
    }

    pub fn where_clause(&self, query: &SelectQuery) -> String {
        if query.filters.is_empty() {
            return String::new();
        }
        let filters: Vec<String> = query.filters.iter().map(|f| self.render_expr(f)).collect();
        format!("WHERE {}", filters.join(" AND "))
    }

    pub fn group_by_clause(&self, query: &SelectQuery) -> String {
        if query.group_by.is_empty() {
            return String::new();
        }
        let groups: Vec<String> = query.group_by.iter().map(|g| self.render_expr(g)).collect();
        format!("GROUP BY {}", groups.join(", "))
    }

    pub fn order_by_clause(&self, query: &SelectQuery) -> String {
        if query.order_by.is_empty() {
            return String::new();
        }
        let orders: Vec<String> = query
            .order_by
            .iter()
            .map(|o| format!("{} {}", self.render_expr(&o.expr), o.direction.as_sql()))
            .collect();
        format!("ORDER BY {}", orders.join(", "))
    }

    pub fn limit_clause(&self, query: &SelectQuery) -> String {
        match &query.limit {
            Some(limit) => format!("LIMIT {}", self.render_expr(limit)),
            None => String::new(),
        }
    }

    pub fn render_expr(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Column { table, name } => match table {
                Some(t) => format!("{t}.{name}"),
                None => name.clone(),
            },
            SqlExpr::Aggregate { func, expr } => {
                let inner = self.render_expr(expr);
                match func {
                    AggregateFunc::Sum => format!("SUM({inner})"),
                    AggregateFunc::Count => format!("COUNT({inner})"),
                }
            }
            SqlExpr::Param(idx) => self.dialect.placeholder(*idx),
            SqlExpr::Ordinal(position) => position.to_string(),
            SqlExpr::Alias(alias) => alias.clone(),
            SqlExpr::BinaryOp { op, left, right } => {
                let op_sql = match op {
                    SqlBinaryOperator::Eq => "=",
                    SqlBinaryOperator::Neq => "!=",
                    SqlBinaryOperator::Gt => ">",
                    SqlBinaryOperator::Gte => ">=",
                    SqlBinaryOperator::Lt => "<",
                    SqlBinaryOperator::Lte => "<=",
                    SqlBinaryOperator::Like => "LIKE",
                };
                format!(
                    "{} {} {}",
                    self.render_expr(left),
                    op_sql,
                    self.render_expr(right)
                )
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let rendered_values: Vec<String> =
                    list.iter().map(|v| self.render_expr(v)).collect();
                let not_kw = if *negated { "NOT " } else { "" };
                format!(
                    "{} {}IN ({})",
                    self.render_expr(expr),
                    not_kw,
                    rendered_values.join(", ")
                )
            }
            SqlExpr::IsNull { expr, negated } => {
                let not_kw = if *negated { "NOT " } else { "" };
                format!("{} IS {}NULL", self.render_expr(expr), not_kw)
            }
        }
    }
}

fn render_table_ref(table: &TableRef) -> String {
    match &table.alias {
        Some(alias) => format!("{} {}", table.name, alias),
        None => table.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{AnsiDialect, PostgresDialect};

    fn column(name: &str) -> SqlExpr {
        SqlExpr::Column {
            table: None,
            name: name.to_string(),
        }
    }

    #[test]
    fn absent_clauses_are_skipped() {
        let query = SelectQuery {
            select: vec![SelectItem {
                expr: column("status"),
                alias: None,
            }],
            from: TableRef {
                name: "orders".to_string(),
                alias: None,
            },
            ..Default::default()
        };
        let renderer = SqlRenderer::new(&AnsiDialect);
        assert_eq!(renderer.render_select(&query), "SELECT status FROM orders");
        assert_eq!(renderer.where_clause(&query), "");
    }

    #[test]
    fn placeholders_follow_dialect() {
        let expr = SqlExpr::InList {
            expr: Box::new(column("status")),
            list: vec![SqlExpr::Param(0), SqlExpr::Param(1)],
            negated: true,
        };
        assert_eq!(
            SqlRenderer::new(&AnsiDialect).render_expr(&expr),
            "status NOT IN (?, ?)"
        );
        assert_eq!(
            SqlRenderer::new(&PostgresDialect).render_expr(&expr),
            "status NOT IN ($1, $2)"
        );
    }
}
