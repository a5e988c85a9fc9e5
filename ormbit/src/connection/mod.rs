pub mod memory;

pub use memory::{MemoryConnection, Statement};

use crate::column::ColumnType;
use crate::error::{OrmError, OrmResult};
use crate::select::condition::Condition;
use crate::value::{DbExpr, Row, Value};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

static CONNECTIONS: Lazy<RwLock<HashMap<String, Arc<dyn Connection>>>> = Lazy::new(|| RwLock::new(HashMap::new()));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    pub affected: usize,
    /// Rows listed by the `returning` columns, empty when nothing was requested.
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub db_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<Value>,
}

impl ColumnDescription {
    pub fn new(name: &str, db_type: &str) -> Self {
        ColumnDescription { name: name.to_string(), db_type: db_type.to_string(), nullable: true, primary_key: false, unique: false, default: None }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableDescription {
    pub name: String,
    pub schema: Option<String>,
    pub columns: Vec<ColumnDescription>,
}

/// Storage collaborator. Table names passed to the write methods are schema-qualified when needed
/// (`schema.table`); `returning` lists columns to send back, `"*"` meaning all of them.
pub trait Connection: Send + Sync {
    fn name(&self) -> &str;

    fn query(&self, sql: &str) -> OrmResult<Vec<Row>>;

    fn insert(&self, table: &str, data: &Row, returning: &[String]) -> OrmResult<WriteResult>;

    fn insert_many(&self, table: &str, rows: &[Row], returning: &[String]) -> OrmResult<WriteResult> {
        let mut result = WriteResult::default();
        for row in rows {
            let inserted = self.insert(table, row, returning)?;
            result.affected += inserted.affected;
            result.rows.extend(inserted.rows);
        }
        Ok(result)
    }

    fn update(&self, table: &str, data: &Row, conditions: &Condition, returning: &[String]) -> OrmResult<WriteResult>;

    fn delete(&self, table: &str, conditions: &Condition, returning: &[String]) -> OrmResult<WriteResult>;

    fn begin(&self) -> OrmResult<()>;

    fn commit(&self) -> OrmResult<()>;

    fn rollback(&self) -> OrmResult<()>;

    fn in_transaction(&self) -> bool;

    fn quote_identifier(&self, name: &str) -> String {
        name.split('.')
            .map(|part| if part == "*" { part.to_string() } else { format!("\"{}\"", part.replace('"', "\"\"")) })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_value(&self, value: &Value, kind: Option<ColumnType>) -> OrmResult<String> {
        let quote_text = |s: &str| format!("'{}'", s.replace('\'', "''"));
        Ok(match value {
            Value::Null => "NULL".to_string(),
            Value::Expr(expr) => expr.sql().to_string(),
            Value::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            Value::Int(i) if kind.is_some_and(|k| k.is_textual()) => quote_text(&i.to_string()),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Float(f) => return Err(OrmError::InvalidArgument(format!("Cannot quote non-finite number {}", f))),
            Value::Text(s) => quote_text(s),
            Value::Json(_) | Value::Row(_) | Value::Rows(_) => quote_text(&value.to_json().to_string()),
        })
    }

    fn describe_table(&self, schema: Option<&str>, table: &str) -> OrmResult<TableDescription>;

    fn default_value_expression(&self) -> DbExpr {
        DbExpr::default_value()
    }
}

/// Registers (or replaces) a named connection.
pub fn register_connection(name: &str, connection: Arc<dyn Connection>) -> OrmResult<()> {
    let mut connections = CONNECTIONS.write()?;
    connections.insert(name.to_string(), connection);
    Ok(())
}

pub fn connection(name: &str) -> OrmResult<Arc<dyn Connection>> {
    let connections = CONNECTIONS.read()?;
    connections
        .get(name)
        .cloned()
        .ok_or_else(|| OrmError::Connection(format!("Connection '{}' is not registered", name)))
}

pub fn has_connection(name: &str) -> bool {
    CONNECTIONS.read().map(|c| c.contains_key(name)).unwrap_or(false)
}
