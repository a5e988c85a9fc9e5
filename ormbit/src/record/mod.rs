pub mod export;
pub mod persist;
pub mod related;

pub use export::Projection;
pub use related::Related;

use crate::config::settings;
use crate::error::{OrmError, OrmResult, ValidationErrors};
use crate::record_value::RecordValue;
use crate::select::condition::Condition;
use crate::structure::TableStructure;
use crate::table::Table;
use crate::value::{FromValue, Row, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One row of a table with per-column value state.
///
/// Values marked as coming from the database are considered persisted; everything else is a
/// pending change collected by [`Record::save`]. `begin`/`commit`/`rollback` capture changes
/// on the record itself and are unrelated to storage transactions.
#[derive(Clone)]
pub struct Record {
    table: Arc<Table>,
    values: IndexMap<String, RecordValue>,
    related: HashMap<String, Related>,
    backup: Option<IndexMap<String, RecordValue>>,
    trust_data: bool,
    read_only: bool,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table.name())
            .field("values", &self.values)
            .field("related", &self.related.keys().collect::<Vec<_>>())
            .field("collecting_updates", &self.backup.is_some())
            .finish()
    }
}

impl Record {
    pub fn new(table: Arc<Table>) -> Self {
        let values = table
            .structure()
            .columns()
            .map(|column| (column.name().to_string(), RecordValue::new(column.clone())))
            .collect();
        Record { table, values, related: HashMap::new(), backup: None, trust_data: false, read_only: false }
    }

    pub fn from_data(table: Arc<Table>, data: Row, is_from_db: bool) -> OrmResult<Self> {
        let mut record = Record::new(table);
        record.fill(data, is_from_db)?;
        Ok(record)
    }

    /// Resets the record and loads `data` the way [`Record::from_data`] does.
    pub(crate) fn fill(&mut self, data: Row, is_from_db: bool) -> OrmResult<&mut Self> {
        self.reset();
        self.trust_data = is_from_db && settings().trust_db_data;
        self.update_values(data, is_from_db)
    }

    pub fn from_db(table: Arc<Table>, data: Row) -> OrmResult<Self> {
        Record::from_data(table, data, true)
    }

    pub fn from_primary_key(table: Arc<Table>, primary_key: impl Into<Value>) -> OrmResult<Self> {
        let primary_key = primary_key.into();
        let row = Record::fetch_row(&table, &primary_key, None)?;
        Record::from_db(table, row)
    }

    fn fetch_row(table: &Arc<Table>, primary_key: &Value, columns: Option<&[&str]>) -> OrmResult<Row> {
        let pk_name = table.structure().primary_key_name().to_string();
        let mut select = table.query();
        if let Some(columns) = columns {
            let mut with_pk: Vec<&str> = vec![pk_name.as_str()];
            with_pk.extend(columns.iter().filter(|c| **c != pk_name));
            select.columns(&with_pk)?;
        }
        select.where_(Condition::eq(&pk_name, primary_key.clone()))?;
        select.fetch_one()?.ok_or_else(|| {
            OrmError::RecordNotFound(format!("{} with {} = {}", table.name(), pk_name, primary_key))
        })
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn structure(&self) -> &Arc<TableStructure> {
        self.table.structure()
    }

    fn primary_key_name(&self) -> &str {
        self.table.structure().primary_key_name()
    }

    fn record_value(&self, column: &str) -> OrmResult<&RecordValue> {
        self.values
            .get(column)
            .ok_or_else(|| OrmError::InvalidArgument(format!("Table '{}' has no column '{}'", self.table.name(), column)))
    }

    pub fn value_container(&self, column: &str) -> OrmResult<&RecordValue> {
        self.record_value(column)
    }

    fn ensure_writable(&self) -> OrmResult<()> {
        if self.read_only {
            return Err(OrmError::BadMethodCall(format!("Record of '{}' is in read only mode", self.table.name())));
        }
        Ok(())
    }

    pub fn enable_read_only_mode(&mut self) -> &mut Self {
        self.read_only = true;
        self
    }

    pub fn disable_read_only_mode(&mut self) -> &mut Self {
        self.read_only = false;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Values received from the database skip validation while trust mode is on.
    pub fn enable_trust_mode(&mut self) -> &mut Self {
        self.trust_data = true;
        self
    }

    pub fn disable_trust_mode(&mut self) -> &mut Self {
        self.trust_data = false;
        self
    }

    pub fn is_trusting_db_data(&self) -> bool {
        self.trust_data
    }

    pub fn has_primary_key_value(&self) -> bool {
        self.values.get(self.primary_key_name()).is_some_and(|v| v.has_value())
    }

    pub fn primary_key_value(&self) -> Option<Value> {
        self.values.get(self.primary_key_name()).and_then(|v| v.value().ok().cloned())
    }

    /// Persisted means the primary key value came from the database.
    /// With `check_storage` the row is also looked up.
    pub fn exists_in_db(&self, check_storage: bool) -> OrmResult<bool> {
        if !self.is_persisted() {
            return Ok(false);
        }
        if !check_storage {
            return Ok(true);
        }
        let pk = self.primary_key_value().unwrap_or_default();
        self.table.has_matching_record(Condition::eq(self.primary_key_name(), pk))
    }

    pub(crate) fn is_persisted(&self) -> bool {
        self.values.get(self.primary_key_name()).is_some_and(|v| v.has_value() && v.is_from_db())
    }

    /// Sets many values; the primary key goes first so that database values have an identity.
    /// Keys naming relations attach related data. Validation errors of all columns are collected.
    pub fn update_values(&mut self, data: Row, is_from_db: bool) -> OrmResult<&mut Self> {
        self.ensure_writable()?;
        let pk_name = self.primary_key_name().to_string();
        let mut data = data;
        if is_from_db && !self.has_primary_key_value() && !data.get(&pk_name).is_some_and(|v| !v.is_null()) {
            return Err(OrmError::InvalidArgument(format!(
                "Values from the database for '{}' need a primary key value",
                self.table.name()
            )));
        }
        if let Some(unknown) = data.keys().find(|key| !self.values.contains_key(*key) && !self.table.structure().has_relation(key)) {
            return Err(OrmError::InvalidArgument(format!("Table '{}' has no column or relation '{}'", self.table.name(), unknown)));
        }
        let mut errors = ValidationErrors::new();
        if let Some(pk) = data.shift_remove(&pk_name) {
            collect_invalid(self.update_value(&pk_name, pk, is_from_db).map(|_| ()), &mut errors)?;
        }
        for (key, value) in data {
            if self.values.contains_key(&key) {
                collect_invalid(self.update_value(&key, value, is_from_db).map(|_| ()), &mut errors)?;
            } else {
                self.update_related(&key, value, is_from_db)?;
            }
        }
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(OrmError::InvalidData(errors))
        }
    }

    /// Runs the column setter pipeline. Invalid values are rejected and never stored.
    pub fn update_value(&mut self, column: &str, value: impl Into<Value>, is_from_db: bool) -> OrmResult<&mut Self> {
        self.ensure_writable()?;
        let value = value.into();
        let definition = self.table.structure().column(column)?.clone();
        if is_from_db && self.backup.is_some() {
            return Err(OrmError::BadMethodCall(format!(
                "Value of '{}' cannot come from the database while updates are being collected",
                column
            )));
        }
        if !is_from_db && !definition.is_value_can_be_set_or_changed() {
            return Err(OrmError::BadMethodCall(format!("Value of column '{}' cannot be set or changed", column)));
        }
        if definition.is_primary_key() {
            if value.is_null() {
                return self.unset_primary_key_value();
            }
            if !is_from_db {
                return Err(OrmError::BadMethodCall(format!(
                    "Primary key '{}' can only receive values from the database",
                    column
                )));
            }
        } else if is_from_db && !self.has_primary_key_value() {
            return Err(OrmError::BadMethodCall(format!(
                "Value of '{}' cannot come from the database while the record has no primary key value",
                column
            )));
        }

        let current = self.record_value(column)?;
        let previous_pk = if definition.is_primary_key() && current.is_from_db() { current.value().ok().cloned() } else { None };
        let next = definition.set_value(value, is_from_db, current, self.trust_data && is_from_db)?;
        if next.is_validated() && !next.is_valid() {
            return Err(OrmError::invalid_data(column, next.validation_errors().to_vec()));
        }
        self.backup_value(column);
        let changed_pk = match (&previous_pk, next.value().ok()) {
            (Some(before), Some(after)) => !before.same_key(after),
            _ => false,
        };
        self.values.insert(column.to_string(), next);
        if changed_pk {
            self.forget_identity();
        }
        Ok(self)
    }

    fn backup_value(&mut self, column: &str) {
        if let Some(backup) = self.backup.as_mut() {
            if !backup.contains_key(column) {
                if let Some(current) = self.values.get(column) {
                    backup.insert(column.to_string(), current.clone());
                }
            }
        }
    }

    /// Other values belonged to the previous identity: they stop counting as stored and
    /// related records are dropped.
    fn forget_identity(&mut self) {
        let pk_name = self.primary_key_name().to_string();
        self.related.clear();
        for (name, value) in self.values.iter_mut() {
            if *name != pk_name {
                value.set_is_from_db(false);
            }
        }
    }

    pub fn unset_value(&mut self, column: &str) -> OrmResult<&mut Self> {
        self.ensure_writable()?;
        let definition = self.table.structure().column(column)?.clone();
        if definition.is_primary_key() {
            return self.unset_primary_key_value();
        }
        self.backup_value(column);
        let emptied = self.record_value(column)?.successor();
        self.values.insert(column.to_string(), emptied);
        Ok(self)
    }

    pub fn unset_primary_key_value(&mut self) -> OrmResult<&mut Self> {
        self.ensure_writable()?;
        let pk_name = self.primary_key_name().to_string();
        let had_value = self.has_primary_key_value();
        self.backup_value(&pk_name);
        let emptied = self.record_value(&pk_name)?.successor();
        self.values.insert(pk_name, emptied);
        if had_value {
            self.forget_identity();
        }
        Ok(self)
    }

    /// Clears all values, related records and collected updates.
    pub fn reset(&mut self) -> &mut Self {
        for value in self.values.values_mut() {
            *value = RecordValue::new(value.column().clone());
        }
        self.related.clear();
        self.backup = None;
        self
    }

    /// Re-reads every stored column of this record.
    pub fn reload(&mut self) -> OrmResult<&mut Self> {
        self.read_columns(None)
    }

    /// Re-reads the given stored columns, all of them when `None`.
    pub fn read_columns(&mut self, columns: Option<&[&str]>) -> OrmResult<&mut Self> {
        let pk = self
            .primary_key_value()
            .ok_or_else(|| OrmError::BadMethodCall(format!("Record of '{}' has no primary key value to read by", self.table.name())))?;
        let row = Record::fetch_row(&self.table, &pk, columns)?;
        self.update_values(row, true)
    }

    pub fn get_value(&self, column: &str, format: Option<&str>) -> OrmResult<Value> {
        let container = self.record_value(column)?;
        container.column().get_value(container, format, self.is_persisted())
    }

    /// Column value converted to `T`; an unset value reads as `Value::Null`.
    pub fn get_as<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        T::from_value(self.value_or_null(column)?)
    }

    /// Current value or usable default, `Value::Null` when neither exists.
    pub fn value_or_null(&self, column: &str) -> OrmResult<Value> {
        match self.get_value(column, None) {
            Err(OrmError::ValueNotSet { .. }) => Ok(Value::Null),
            other => other,
        }
    }

    /// Dynamic read by column name, `<column>_as_<format>` or relation name.
    pub fn get(&mut self, key: &str) -> OrmResult<Value> {
        if self.values.contains_key(key) {
            return self.get_value(key, None);
        }
        if let Some((column, format)) = self.split_format_key(key) {
            return self.get_value(&column, Some(&format));
        }
        if self.table.structure().has_relation(key) {
            return self.related(key)?.to_value();
        }
        Err(OrmError::InvalidArgument(format!("Table '{}' has no column or relation '{}'", self.table.name(), key)))
    }

    /// Dynamic write by column or relation name.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> OrmResult<&mut Self> {
        let value = value.into();
        if self.values.contains_key(key) {
            return self.update_value(key, value, false);
        }
        if self.table.structure().has_relation(key) {
            self.update_related(key, value, false)?;
            return Ok(self);
        }
        Err(OrmError::InvalidArgument(format!("Table '{}' has no column or relation '{}'", self.table.name(), key)))
    }

    pub(crate) fn split_format_key(&self, key: &str) -> Option<(String, String)> {
        let (column, format) = key.rsplit_once("_as_")?;
        let container = self.values.get(column)?;
        container
            .column()
            .value_formats()
            .contains(&format)
            .then(|| (column.to_string(), format.to_string()))
    }

    pub fn has_value(&self, column: &str) -> bool {
        self.values.get(column).is_some_and(|v| v.has_value())
    }

    pub fn has_value_or_default(&self, column: &str) -> bool {
        let persisted = self.is_persisted();
        self.values.get(column).is_some_and(|v| v.has_value_or_default(persisted))
    }

    pub fn is_value_from_db(&self, column: &str) -> bool {
        self.values.get(column).is_some_and(|v| v.is_from_db())
    }

    pub fn old_value(&self, column: &str) -> Option<Value> {
        self.values.get(column).and_then(|v| v.old_value().cloned())
    }

    pub fn is_old_value_from_db(&self, column: &str) -> bool {
        self.values.get(column).is_some_and(|v| v.is_old_value_from_db())
    }

    /// Set values keyed by column name, without defaults or formatting.
    pub fn values_row(&self) -> Row {
        self.values
            .iter()
            .filter_map(|(name, value)| value.value().ok().map(|v| (name.clone(), v.clone())))
            .collect()
    }

    pub fn is_collecting_updates(&self) -> bool {
        self.backup.is_some()
    }

    /// Starts collecting updates of a persisted record.
    pub fn begin(&mut self) -> OrmResult<&mut Self> {
        if self.backup.is_some() {
            return Err(OrmError::BadMethodCall("Record is already collecting updates".to_string()));
        }
        if !self.is_persisted() {
            return Err(OrmError::BadMethodCall("Only records stored in the database can collect updates".to_string()));
        }
        self.backup = Some(IndexMap::new());
        Ok(self)
    }

    /// Saves the columns changed since `begin`, then the listed relations.
    pub fn commit(&mut self, relations: &[&str]) -> OrmResult<&mut Self> {
        let backup = self
            .backup
            .take()
            .ok_or_else(|| OrmError::BadMethodCall("commit() called without begin()".to_string()))?;
        let changed: Vec<String> = backup.keys().cloned().collect();
        self.save_columns(Some(&changed))?;
        self.save_relations(relations)?;
        Ok(self)
    }

    /// Restores every value changed since `begin`.
    pub fn rollback(&mut self) -> OrmResult<&mut Self> {
        let backup = self
            .backup
            .take()
            .ok_or_else(|| OrmError::BadMethodCall("rollback() called without begin()".to_string()))?;
        for (name, value) in backup {
            self.values.insert(name, value);
        }
        Ok(self)
    }
}

fn collect_invalid(result: OrmResult<()>, errors: &mut ValidationErrors) -> OrmResult<()> {
    match result {
        Err(OrmError::InvalidData(found)) => {
            errors.merge(found);
            Ok(())
        }
        other => other,
    }
}
