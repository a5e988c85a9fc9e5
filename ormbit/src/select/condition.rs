use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::value::{DbExpr, Row, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Like,
    NotLike,
    ILike,
    NotILike,
    Between,
    NotBetween,
}

impl Operator {
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Value(Value),
    List(Vec<Value>),
    Range(Value, Value),
    /// Another column, e.g. `"Parent.id"`.
    Column(String),
}

/// Structured filter. Column references are plain names (`name`) or relation paths (`Parent.name`).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare { column: String, op: Operator, operand: Operand },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Raw(DbExpr),
}

impl Default for Condition {
    fn default() -> Self {
        Condition::all()
    }
}

impl Condition {
    /// Matches every row.
    pub fn all() -> Self {
        Condition::And(vec![])
    }

    fn compare(column: &str, op: Operator, operand: Operand) -> Self {
        Condition::Compare { column: column.to_string(), op, operand }
    }

    /// `column = value`, or `IS NULL` for a null value.
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => Self::is_null(column),
            value => Self::compare(column, Operator::Eq, Operand::Value(value)),
        }
    }

    pub fn not_eq(column: &str, value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => Self::is_not_null(column),
            value => Self::compare(column, Operator::NotEq, Operand::Value(value)),
        }
    }

    pub fn lt(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Lt, Operand::Value(value.into()))
    }

    pub fn lte(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Lte, Operand::Value(value.into()))
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Gt, Operand::Value(value.into()))
    }

    pub fn gte(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Gte, Operand::Value(value.into()))
    }

    pub fn is_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::compare(column, Operator::In, Operand::List(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::compare(column, Operator::NotIn, Operand::List(values.into_iter().map(Into::into).collect()))
    }

    pub fn is_null(column: &str) -> Self {
        Self::compare(column, Operator::IsNull, Operand::None)
    }

    pub fn is_not_null(column: &str) -> Self {
        Self::compare(column, Operator::IsNotNull, Operand::None)
    }

    pub fn like(column: &str, pattern: &str) -> Self {
        Self::compare(column, Operator::Like, Operand::Value(Value::from(pattern)))
    }

    pub fn not_like(column: &str, pattern: &str) -> Self {
        Self::compare(column, Operator::NotLike, Operand::Value(Value::from(pattern)))
    }

    pub fn ilike(column: &str, pattern: &str) -> Self {
        Self::compare(column, Operator::ILike, Operand::Value(Value::from(pattern)))
    }

    pub fn not_ilike(column: &str, pattern: &str) -> Self {
        Self::compare(column, Operator::NotILike, Operand::Value(Value::from(pattern)))
    }

    pub fn between(column: &str, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Between, Operand::Range(from.into(), to.into()))
    }

    pub fn not_between(column: &str, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self::compare(column, Operator::NotBetween, Operand::Range(from.into(), to.into()))
    }

    /// Compares two columns, as in join conditions.
    pub fn columns_eq(column: &str, other: &str) -> Self {
        Self::compare(column, Operator::Eq, Operand::Column(other.to_string()))
    }

    pub fn raw(sql: &str) -> Self {
        Condition::Raw(DbExpr::new(sql))
    }

    pub fn and_all(conditions: Vec<Condition>) -> Self {
        Condition::And(conditions)
    }

    pub fn or_any(conditions: Vec<Condition>) -> Self {
        Condition::Or(conditions)
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Equality on every key of `row`.
    pub fn from_row(row: &Row) -> Self {
        Condition::And(row.iter().map(|(column, value)| Condition::eq(column, value.clone())).collect())
    }

    /// Conjunction, flattening nested `AND`s and dropping empty ones.
    pub fn and(self, other: Condition) -> Self {
        let mut parts = vec![];
        for condition in [self, other] {
            match condition {
                Condition::And(items) => parts.extend(items),
                other => parts.push(other),
            }
        }
        if parts.len() == 1 {
            return parts.remove(0);
        }
        Condition::And(parts)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Condition::And(items) | Condition::Or(items) => items.iter().all(|c| c.is_empty()),
            Condition::Not(inner) => inner.is_empty(),
            _ => false,
        }
    }

    /// Every column reference, including column operands.
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut out = vec![];
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Compare { column, operand, .. } => {
                out.push(column.as_str());
                if let Operand::Column(other) = operand {
                    out.push(other.as_str());
                }
            }
            Condition::And(items) | Condition::Or(items) => items.iter().for_each(|c| c.collect_columns(out)),
            Condition::Not(inner) => inner.collect_columns(out),
            Condition::Raw(_) => {}
        }
    }

    /// Rewrites column references, e.g. to qualify them with a relation path.
    pub fn map_columns<F: Fn(&str) -> String>(&self, f: &F) -> Condition {
        match self {
            Condition::Compare { column, op, operand } => Condition::Compare {
                column: f(column),
                op: *op,
                operand: match operand {
                    Operand::Column(other) => Operand::Column(f(other)),
                    other => other.clone(),
                },
            },
            Condition::And(items) => Condition::And(items.iter().map(|c| c.map_columns(f)).collect()),
            Condition::Or(items) => Condition::Or(items.iter().map(|c| c.map_columns(f)).collect()),
            Condition::Not(inner) => Condition::Not(Box::new(inner.map_columns(f))),
            Condition::Raw(expr) => Condition::Raw(expr.clone()),
        }
    }

    /// Renders the condition. `resolve` turns a column reference into a quoted SQL identifier.
    /// Empty conditions render as an empty string.
    pub fn to_sql<F>(&self, connection: &dyn Connection, resolve: &F) -> OrmResult<String>
    where
        F: Fn(&str) -> OrmResult<String>,
    {
        match self {
            Condition::Raw(expr) => Ok(expr.sql().to_string()),
            Condition::Not(inner) => {
                let sql = inner.to_sql(connection, resolve)?;
                Ok(if sql.is_empty() { sql } else { format!("NOT ({})", sql) })
            }
            Condition::And(items) | Condition::Or(items) => {
                let glue = if matches!(self, Condition::And(_)) { " AND " } else { " OR " };
                let mut parts = vec![];
                for item in items {
                    let sql = item.to_sql(connection, resolve)?;
                    if !sql.is_empty() {
                        parts.push(if matches!(item, Condition::And(_) | Condition::Or(_)) { format!("({})", sql) } else { sql });
                    }
                }
                Ok(parts.join(glue))
            }
            Condition::Compare { column, op, operand } => {
                let left = resolve(column)?;
                let quote = |value: &Value| connection.quote_value(value, None);
                match (op, operand) {
                    (Operator::IsNull | Operator::IsNotNull, _) => Ok(format!("{} {}", left, op.sql())),
                    (Operator::Eq, Operand::Value(Value::Null)) => Ok(format!("{} IS NULL", left)),
                    (Operator::NotEq, Operand::Value(Value::Null)) => Ok(format!("{} IS NOT NULL", left)),
                    (Operator::In, Operand::List(values)) if values.is_empty() => Ok("1 = 0".to_string()),
                    (Operator::NotIn, Operand::List(values)) if values.is_empty() => Ok("1 = 1".to_string()),
                    (Operator::In | Operator::NotIn, Operand::List(values)) => {
                        let quoted = values.iter().map(quote).collect::<OrmResult<Vec<_>>>()?;
                        Ok(format!("{} {} ({})", left, op.sql(), quoted.join(", ")))
                    }
                    (Operator::Between | Operator::NotBetween, Operand::Range(from, to)) => {
                        Ok(format!("{} {} {} AND {}", left, op.sql(), quote(from)?, quote(to)?))
                    }
                    (_, Operand::Column(other)) => Ok(format!("{} {} {}", left, op.sql(), resolve(other)?)),
                    (_, Operand::Value(value)) => Ok(format!("{} {} {}", left, op.sql(), quote(value)?)),
                    (op, operand) => Err(OrmError::InvalidArgument(format!("Operator {} cannot be used with operand {:?}", op, operand))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryConnection;

    fn render(condition: &Condition) -> String {
        let connection = MemoryConnection::new("test");
        condition.to_sql(&connection, &|c: &str| Ok(connection.quote_identifier(c))).unwrap()
    }

    #[test]
    fn renders_comparisons() {
        assert_eq!(render(&Condition::eq("name", "Ann")), r#""name" = 'Ann'"#);
        assert_eq!(render(&Condition::eq("name", Value::Null)), r#""name" IS NULL"#);
        assert_eq!(render(&Condition::is_in("id", [1, 2])), r#""id" IN (1, 2)"#);
        assert_eq!(render(&Condition::is_in("id", Vec::<i64>::new())), "1 = 0");
        assert_eq!(render(&Condition::between("age", 18, 30)), r#""age" BETWEEN 18 AND 30"#);
    }

    #[test]
    fn renders_groups() {
        let condition = Condition::eq("a", 1).and(Condition::or_any(vec![Condition::eq("b", 2), Condition::is_null("c")]));
        assert_eq!(render(&condition), r#""a" = 1 AND ("b" = 2 OR "c" IS NULL)"#);
        assert_eq!(render(&Condition::all()), "");
        assert!(Condition::all().and(Condition::all()).is_empty());
        assert_eq!(render(&Condition::eq("a", 1).negate()), r#"NOT ("a" = 1)"#);
    }

    #[test]
    fn lists_referenced_columns() {
        let condition = Condition::eq("Parent.name", "x").and(Condition::columns_eq("id", "Parent.child_id"));
        assert_eq!(condition.referenced_columns(), vec!["Parent.name", "id", "Parent.child_id"]);
    }
}
