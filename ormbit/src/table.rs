use crate::connection::{Connection, WriteResult};
use crate::error::{OrmError, OrmResult, ValidationErrors};
use crate::record::Record;
use crate::records::RecordsSet;
use crate::registry;
use crate::select::condition::Condition;
use crate::select::orm_select::OrmSelect;
use crate::structure::TableStructure;
use crate::value::{DbExpr, Row, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A table structure bound to a connection. Row level reads and writes live here,
/// per-record state lives in [`Record`].
pub struct Table {
    structure: Arc<TableStructure>,
    connection: Arc<dyn Connection>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.structure.name())
            .field("connection", &self.connection.name())
            .finish()
    }
}

impl Table {
    /// Process-wide instance of a registered table.
    pub fn get(name: &str) -> OrmResult<Arc<Table>> {
        registry::default_table(name)
    }

    /// Registered table bound to another connection.
    pub fn with_connection(name: &str, connection: Arc<dyn Connection>) -> OrmResult<Arc<Table>> {
        Ok(Arc::new(Table::from_structure(registry::table_structure(name)?, connection)))
    }

    pub fn from_structure(structure: Arc<TableStructure>, connection: Arc<dyn Connection>) -> Self {
        Table { structure, connection }
    }

    /// Another registered table on the same connection.
    pub fn sibling(&self, name: &str) -> OrmResult<Arc<Table>> {
        Table::with_connection(name, self.connection.clone())
    }

    pub fn name(&self) -> &str {
        self.structure.name()
    }

    pub fn structure(&self) -> &Arc<TableStructure> {
        &self.structure
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn new_record(self: &Arc<Self>) -> Record {
        Record::new(self.clone())
    }

    pub fn query(self: &Arc<Self>) -> OrmSelect {
        OrmSelect::new(self.clone())
    }

    fn filtered(self: &Arc<Self>, conditions: Condition) -> OrmResult<OrmSelect> {
        let mut select = self.query();
        select.where_(conditions)?;
        Ok(select)
    }

    /// Lazy record set; nothing is fetched until rows or counts are requested.
    pub fn select(self: &Arc<Self>, conditions: Condition) -> OrmResult<RecordsSet> {
        Ok(RecordsSet::new(self.filtered(conditions)?))
    }

    pub fn select_one(self: &Arc<Self>, conditions: Condition) -> OrmResult<Option<Row>> {
        self.filtered(conditions)?.fetch_one()
    }

    pub fn select_column(self: &Arc<Self>, column: &str, conditions: Condition) -> OrmResult<Vec<Value>> {
        let mut select = self.filtered(conditions)?;
        select.columns(&[column])?;
        select.fetch_column()
    }

    pub fn select_assoc(self: &Arc<Self>, key_column: &str, conditions: Condition) -> OrmResult<IndexMap<String, Row>> {
        self.filtered(conditions)?.fetch_assoc(key_column)
    }

    pub fn select_value(self: &Arc<Self>, expr: DbExpr, conditions: Condition) -> OrmResult<Value> {
        self.filtered(conditions)?.fetch_value(expr)
    }

    pub fn has_matching_record(self: &Arc<Self>, conditions: Condition) -> OrmResult<bool> {
        let mut select = self.filtered(conditions)?;
        select.limit(1);
        Ok(!select.fetch_value(DbExpr::new("1"))?.is_null())
    }

    pub fn count(self: &Arc<Self>, conditions: Condition) -> OrmResult<usize> {
        self.filtered(conditions)?.fetch_count(false)
    }

    /// Checks a write payload: every key must be a stored column and every value must validate.
    fn validate_payload(&self, data: &Row) -> OrmResult<()> {
        let mut errors = ValidationErrors::new();
        for (name, value) in data {
            let column = self.structure.column(name)?;
            if !column.is_exists_in_db() {
                return Err(OrmError::InvalidArgument(format!("Column '{}' is not stored in table '{}'", name, self.name())));
            }
            if value.is_expr() {
                continue;
            }
            let found = column.validate_value(value, false, false);
            if !found.is_empty() {
                errors.extend(name, found);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(OrmError::InvalidData(errors))
        }
    }

    fn normalize_payload(&self, data: &Row) -> OrmResult<Row> {
        self.validate_payload(data)?;
        let mut normalized = Row::new();
        for (name, value) in data {
            let column = self.structure.column(name)?;
            let prepared = column.preprocess_value(value.clone(), false);
            normalized.insert(name.clone(), column.normalize_value(prepared, false));
        }
        Ok(normalized)
    }

    pub fn insert(&self, data: &Row, returning: &[String]) -> OrmResult<WriteResult> {
        let data = self.normalize_payload(data)?;
        self.connection.insert(&self.structure.qualified_name(), &data, returning)
    }

    pub fn insert_many(&self, rows: &[Row], returning: &[String]) -> OrmResult<WriteResult> {
        let rows = rows.iter().map(|row| self.normalize_payload(row)).collect::<OrmResult<Vec<_>>>()?;
        self.connection.insert_many(&self.structure.qualified_name(), &rows, returning)
    }

    pub fn update(&self, data: &Row, conditions: &Condition, returning: &[String]) -> OrmResult<WriteResult> {
        let data = self.normalize_payload(data)?;
        self.connection.update(&self.structure.qualified_name(), &data, conditions, returning)
    }

    pub fn delete(&self, conditions: &Condition, returning: &[String]) -> OrmResult<WriteResult> {
        self.connection.delete(&self.structure.qualified_name(), conditions, returning)
    }

    /// Updates the row matching `data[unique_column]` or inserts a new one.
    pub fn upsert(self: &Arc<Self>, data: &Row, unique_column: &str, returning: &[String]) -> OrmResult<WriteResult> {
        let column = self.structure.column(unique_column)?;
        if !column.is_unique() && !column.is_primary_key() {
            return Err(OrmError::InvalidArgument(format!("Column '{}' is neither unique nor a primary key", unique_column)));
        }
        let key = data
            .get(unique_column)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| OrmError::InvalidArgument(format!("Upsert data has no value for '{}'", unique_column)))?;
        let conditions = Condition::eq(unique_column, key);
        let owns_transaction = !self.in_transaction();
        if owns_transaction {
            self.begin_transaction()?;
        }
        let outcome = self.has_matching_record(conditions.clone()).and_then(|exists| {
            if exists {
                let changes: Row = data.iter().filter(|(k, _)| *k != unique_column).map(|(k, v)| (k.clone(), v.clone())).collect();
                self.update(&changes, &conditions, returning)
            } else {
                self.insert(data, returning)
            }
        });
        if owns_transaction {
            match &outcome {
                Ok(_) => self.commit_transaction()?,
                Err(_) => self.rollback_transaction()?,
            }
        }
        outcome
    }

    pub fn begin_transaction(&self) -> OrmResult<()> {
        self.connection.begin()
    }

    pub fn commit_transaction(&self) -> OrmResult<()> {
        self.connection.commit()
    }

    pub fn rollback_transaction(&self) -> OrmResult<()> {
        self.connection.rollback()
    }

    pub fn in_transaction(&self) -> bool {
        self.connection.in_transaction()
    }
}
