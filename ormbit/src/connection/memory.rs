use crate::connection::{Connection, TableDescription, WriteResult};
use crate::error::{OrmError, OrmResult};
use crate::select::condition::{Condition, Operand, Operator};
use crate::value::{Row, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub type QueryResponder = Arc<dyn Fn(&str) -> OrmResult<Vec<Row>> + Send + Sync>;

/// Every call that reached the connection, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(String),
    Insert { table: String, data: Row },
    Update { table: String, data: Row, conditions: Condition },
    Delete { table: String, conditions: Condition },
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    pub fn is_write(&self) -> bool {
        matches!(self, Statement::Insert { .. } | Statement::Update { .. } | Statement::Delete { .. })
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    rows: Vec<Row>,
    sequence: i64,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    snapshot: Option<HashMap<String, MemoryTable>>,
    statements: Vec<Statement>,
    results: VecDeque<Vec<Row>>,
    responder: Option<QueryResponder>,
    descriptions: HashMap<String, TableDescription>,
    fail_next_write: Option<String>,
}

/// In-memory storage. Writes are evaluated against per-table row lists; SQL passed to `query`
/// is not interpreted but answered from queued results or a responder closure.
/// `DEFAULT` placeholders in inserted rows receive the next value of the table sequence.
pub struct MemoryConnection {
    name: String,
    state: Mutex<MemoryState>,
}

impl MemoryConnection {
    pub fn new(name: &str) -> Self {
        MemoryConnection { name: name.to_string(), state: Mutex::new(MemoryState::default()) }
    }

    /// Seeds a table. The sequence continues after the largest integer `id`.
    pub fn with_rows(self, table: &str, rows: Vec<Row>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            let sequence = rows.iter().filter_map(|r| r.get("id").and_then(|v| v.as_i64())).max().unwrap_or(0);
            state.tables.insert(table.to_string(), MemoryTable { rows, sequence });
        }
        self
    }

    pub fn with_description(self, description: TableDescription) -> Self {
        if let Ok(mut state) = self.state.lock() {
            let key = qualified(description.schema.as_deref(), &description.name);
            state.descriptions.insert(key, description);
        }
        self
    }

    pub fn rows(&self, table: &str) -> OrmResult<Vec<Row>> {
        let state = self.state.lock()?;
        Ok(state.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default())
    }

    pub fn statements(&self) -> OrmResult<Vec<Statement>> {
        Ok(self.state.lock()?.statements.clone())
    }

    pub fn writes(&self) -> OrmResult<Vec<Statement>> {
        Ok(self.statements()?.into_iter().filter(|s| s.is_write()).collect())
    }

    pub fn queries(&self) -> OrmResult<Vec<String>> {
        Ok(self
            .statements()?
            .into_iter()
            .filter_map(|s| match s {
                Statement::Query(sql) => Some(sql),
                _ => None,
            })
            .collect())
    }

    pub fn clear_statements(&self) -> OrmResult<()> {
        self.state.lock()?.statements.clear();
        Ok(())
    }

    /// Queues the answer to the next `query` call.
    pub fn push_query_result(&self, rows: Vec<Row>) -> OrmResult<()> {
        self.state.lock()?.results.push_back(rows);
        Ok(())
    }

    /// Answers every `query` call; takes precedence over queued results.
    pub fn set_responder<F>(&self, responder: F) -> OrmResult<()>
    where
        F: Fn(&str) -> OrmResult<Vec<Row>> + Send + Sync + 'static,
    {
        self.state.lock()?.responder = Some(Arc::new(responder));
        Ok(())
    }

    /// Makes the next insert, update or delete fail with a connection error.
    pub fn fail_next_write(&self, message: &str) -> OrmResult<()> {
        self.state.lock()?.fail_next_write = Some(message.to_string());
        Ok(())
    }

    fn write<F>(&self, statement: Statement, apply: F) -> OrmResult<WriteResult>
    where
        F: FnOnce(&mut MemoryState) -> OrmResult<WriteResult>,
    {
        let mut state = self.state.lock()?;
        if let Some(message) = state.fail_next_write.take() {
            return Err(OrmError::Connection(message));
        }
        log::debug!("{}: {:?}", self.name, statement);
        state.statements.push(statement);
        apply(&mut *state)
    }
}

fn qualified(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", schema, table),
        None => table.to_string(),
    }
}

fn project(row: &Row, returning: &[String]) -> Option<Row> {
    if returning.is_empty() {
        return None;
    }
    if returning.iter().any(|c| c == "*") {
        return Some(row.clone());
    }
    Some(returning.iter().map(|c| (c.clone(), row.get(c).cloned().unwrap_or_default())).collect())
}

fn evaluate_expression(value: Value, sequence: &mut i64) -> Value {
    match value {
        Value::Expr(expr) if expr.is_default_placeholder() => {
            *sequence += 1;
            Value::Int(*sequence)
        }
        Value::Expr(expr) => {
            let sql = expr.sql().trim().to_uppercase();
            if sql == "NOW()" || sql == "CURRENT_TIMESTAMP" {
                Value::Text(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
            } else {
                Value::Text(expr.sql().to_string())
            }
        }
        other => other,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Int(_) | Value::Float(_), _) | (_, Value::Int(_) | Value::Float(_)) => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
        _ => Some(left.key_string().cmp(&right.key_string())),
    }
}

fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let mut matches = vec![vec![false; text.len() + 1]; pattern.len() + 1];
    matches[0][0] = true;
    for p in 1..=pattern.len() {
        if pattern[p - 1] == '%' {
            matches[p][0] = matches[p - 1][0];
        }
        for t in 1..=text.len() {
            matches[p][t] = match pattern[p - 1] {
                '%' => matches[p - 1][t] || matches[p][t - 1],
                '_' => matches[p - 1][t - 1],
                c => matches[p - 1][t - 1] && c == text[t - 1],
            };
        }
    }
    matches[pattern.len()][text.len()]
}

/// Evaluates a condition against one stored row. Raw expressions are only understood as
/// literal truth values (`1 = 0`, `FALSE` are false, anything else true).
pub fn row_matches(condition: &Condition, row: &Row) -> bool {
    match condition {
        Condition::And(items) => items.iter().all(|c| row_matches(c, row)),
        Condition::Or(items) => items.is_empty() || items.iter().any(|c| row_matches(c, row)),
        Condition::Not(inner) => !row_matches(inner, row),
        Condition::Raw(expr) => {
            let sql = expr.sql().trim().to_uppercase();
            !(sql == "1 = 0" || sql == "FALSE")
        }
        Condition::Compare { column, op, operand } => {
            let null = Value::Null;
            let left = row.get(column).unwrap_or(&null);
            let right = match operand {
                Operand::Column(other) => row.get(other).cloned().unwrap_or_default(),
                Operand::Value(value) => value.clone(),
                _ => Value::Null,
            };
            match (op, operand) {
                (Operator::IsNull, _) => left.is_null(),
                (Operator::IsNotNull, _) => !left.is_null(),
                (Operator::In, Operand::List(values)) => values.iter().any(|v| v.same_key(left)),
                (Operator::NotIn, Operand::List(values)) => !left.is_null() && !values.iter().any(|v| v.same_key(left)),
                (Operator::Between, Operand::Range(from, to)) => {
                    matches!(compare_values(left, from), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(compare_values(left, to), Some(Ordering::Less | Ordering::Equal))
                }
                (Operator::NotBetween, Operand::Range(from, to)) => {
                    matches!(compare_values(left, from), Some(Ordering::Less)) || matches!(compare_values(left, to), Some(Ordering::Greater))
                }
                (Operator::Eq, _) => right.is_null() && left.is_null() || left.same_key(&right),
                (Operator::NotEq, _) => !left.is_null() && !right.is_null() && !left.same_key(&right),
                (Operator::Lt, _) => compare_values(left, &right) == Some(Ordering::Less),
                (Operator::Lte, _) => matches!(compare_values(left, &right), Some(Ordering::Less | Ordering::Equal)),
                (Operator::Gt, _) => compare_values(left, &right) == Some(Ordering::Greater),
                (Operator::Gte, _) => matches!(compare_values(left, &right), Some(Ordering::Greater | Ordering::Equal)),
                (Operator::Like, _) => !left.is_null() && like_match(&left.key_string(), &right.key_string()),
                (Operator::NotLike, _) => !left.is_null() && !like_match(&left.key_string(), &right.key_string()),
                (Operator::ILike, _) => !left.is_null() && like_match(&left.key_string().to_lowercase(), &right.key_string().to_lowercase()),
                (Operator::NotILike, _) => {
                    !left.is_null() && !like_match(&left.key_string().to_lowercase(), &right.key_string().to_lowercase())
                }
                _ => false,
            }
        }
    }
}

impl Connection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, sql: &str) -> OrmResult<Vec<Row>> {
        let responder = {
            let mut state = self.state.lock()?;
            log::debug!("{}: {}", self.name, sql);
            state.statements.push(Statement::Query(sql.to_string()));
            let responder = state.responder.clone();
            if responder.is_none() {
                return Ok(state.results.pop_front().unwrap_or_default());
            }
            responder
        };
        match responder {
            Some(responder) => responder(sql),
            None => Ok(vec![]),
        }
    }

    fn insert(&self, table: &str, data: &Row, returning: &[String]) -> OrmResult<WriteResult> {
        let statement = Statement::Insert { table: table.to_string(), data: data.clone() };
        self.write(statement, |state| {
            let stored = state.tables.entry(table.to_string()).or_default();
            let mut row = Row::new();
            for (column, value) in data {
                let value = evaluate_expression(value.clone(), &mut stored.sequence);
                row.insert(column.clone(), value);
            }
            stored.rows.push(row.clone());
            Ok(WriteResult { affected: 1, rows: project(&row, returning).into_iter().collect() })
        })
    }

    fn update(&self, table: &str, data: &Row, conditions: &Condition, returning: &[String]) -> OrmResult<WriteResult> {
        let statement = Statement::Update { table: table.to_string(), data: data.clone(), conditions: conditions.clone() };
        self.write(statement, |state| {
            let stored = state.tables.entry(table.to_string()).or_default();
            let mut result = WriteResult::default();
            let mut sequence = stored.sequence;
            for row in stored.rows.iter_mut().filter(|row| row_matches(conditions, row)) {
                for (column, value) in data {
                    row.insert(column.clone(), evaluate_expression(value.clone(), &mut sequence));
                }
                result.affected += 1;
                result.rows.extend(project(row, returning));
            }
            stored.sequence = sequence;
            Ok(result)
        })
    }

    fn delete(&self, table: &str, conditions: &Condition, returning: &[String]) -> OrmResult<WriteResult> {
        let statement = Statement::Delete { table: table.to_string(), conditions: conditions.clone() };
        self.write(statement, |state| {
            let stored = state.tables.entry(table.to_string()).or_default();
            let (deleted, kept): (Vec<Row>, Vec<Row>) = stored.rows.drain(..).partition(|row| row_matches(conditions, row));
            stored.rows = kept;
            Ok(WriteResult { affected: deleted.len(), rows: deleted.iter().filter_map(|row| project(row, returning)).collect() })
        })
    }

    fn begin(&self) -> OrmResult<()> {
        let mut state = self.state.lock()?;
        if state.snapshot.is_some() {
            return Err(OrmError::Connection("Transaction already started".to_string()));
        }
        state.snapshot = Some(state.tables.clone());
        state.statements.push(Statement::Begin);
        Ok(())
    }

    fn commit(&self) -> OrmResult<()> {
        let mut state = self.state.lock()?;
        if state.snapshot.take().is_none() {
            return Err(OrmError::Connection("No transaction to commit".to_string()));
        }
        state.statements.push(Statement::Commit);
        Ok(())
    }

    fn rollback(&self) -> OrmResult<()> {
        let mut state = self.state.lock()?;
        match state.snapshot.take() {
            Some(snapshot) => {
                state.tables = snapshot;
                state.statements.push(Statement::Rollback);
                Ok(())
            }
            None => Err(OrmError::Connection("No transaction to roll back".to_string())),
        }
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().map(|s| s.snapshot.is_some()).unwrap_or(false)
    }

    fn describe_table(&self, schema: Option<&str>, table: &str) -> OrmResult<TableDescription> {
        let state = self.state.lock()?;
        state
            .descriptions
            .get(&qualified(schema, table))
            .cloned()
            .ok_or_else(|| OrmError::Connection(format!("Table '{}' does not exist", qualified(schema, table))))
    }
}
