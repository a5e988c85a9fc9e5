use crate::column::Column;
use crate::error::{NotSetReason, OrmError, OrmResult, ValidationError};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// State of one field inside one record: current, raw and previous value plus validation state.
///
/// Containers are replaced rather than mutated when a new value arrives, see [`RecordValue::successor`].
#[derive(Clone)]
pub struct RecordValue {
    column: Arc<Column>,
    value: Option<Value>,
    raw_value: Option<Value>,
    old_value: Option<Value>,
    old_value_is_from_db: bool,
    is_from_db: bool,
    is_validated: bool,
    validation_errors: Vec<ValidationError>,
    custom_info: RefCell<HashMap<String, Value>>,
}

impl fmt::Debug for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordValue")
            .field("column", &self.column.name())
            .field("value", &self.value)
            .field("raw_value", &self.raw_value)
            .field("old_value", &self.old_value)
            .field("is_from_db", &self.is_from_db)
            .field("is_validated", &self.is_validated)
            .field("validation_errors", &self.validation_errors)
            .finish()
    }
}

impl RecordValue {
    pub fn new(column: Arc<Column>) -> Self {
        RecordValue {
            column,
            value: None,
            raw_value: None,
            old_value: None,
            old_value_is_from_db: false,
            is_from_db: false,
            is_validated: false,
            validation_errors: vec![],
            custom_info: RefCell::new(HashMap::new()),
        }
    }

    /// Empty container that remembers this one's value as its old value.
    pub fn successor(&self) -> RecordValue {
        let mut next = RecordValue::new(self.column.clone());
        if let Some(value) = &self.value {
            next.old_value = Some(value.clone());
            next.old_value_is_from_db = self.is_from_db;
        } else if let Some(old) = &self.old_value {
            next.old_value = Some(old.clone());
            next.old_value_is_from_db = self.old_value_is_from_db;
        }
        next
    }

    pub fn column(&self) -> &Arc<Column> {
        &self.column
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> OrmResult<&Value> {
        self.value
            .as_ref()
            .ok_or_else(|| OrmError::BadMethodCall(format!("Value of column '{}' is not set", self.column.name())))
    }

    pub fn raw_value(&self) -> Option<&Value> {
        self.raw_value.as_ref()
    }

    pub fn has_old_value(&self) -> bool {
        self.old_value.is_some()
    }

    pub fn old_value(&self) -> Option<&Value> {
        self.old_value.as_ref()
    }

    pub fn is_old_value_from_db(&self) -> bool {
        self.old_value_is_from_db
    }

    pub fn is_from_db(&self) -> bool {
        self.is_from_db
    }

    pub fn set_is_from_db(&mut self, is_from_db: bool) {
        self.is_from_db = is_from_db;
    }

    /// Stores a new raw and preprocessed value, snapshotting the current one as old.
    pub fn set_raw_value(&mut self, raw: Value, preprocessed: Value, is_from_db: bool) {
        if let Some(current) = self.value.take() {
            self.old_value = Some(current);
            self.old_value_is_from_db = self.is_from_db;
        }
        self.raw_value = Some(raw);
        self.value = Some(preprocessed);
        self.is_from_db = is_from_db;
        self.is_validated = false;
        self.validation_errors.clear();
        self.custom_info.borrow_mut().clear();
    }

    /// Replaces the value with its validated form. `raw` must be the raw value the result was computed from.
    pub fn set_valid_value(&mut self, value: Value, raw: &Value) -> OrmResult<()> {
        if self.raw_value.as_ref() != Some(raw) {
            return Err(OrmError::InvalidArgument(format!(
                "Raw value of column '{}' changed before its valid value was stored",
                self.column.name()
            )));
        }
        self.value = Some(value);
        self.is_validated = true;
        self.validation_errors.clear();
        Ok(())
    }

    pub fn set_validation_errors(&mut self, errors: Vec<ValidationError>) {
        self.is_validated = true;
        self.validation_errors = errors;
    }

    pub fn is_validated(&self) -> bool {
        self.is_validated
    }

    pub fn is_valid(&self) -> bool {
        self.is_validated && self.validation_errors.is_empty()
    }

    pub fn validation_errors(&self) -> &[ValidationError] {
        &self.validation_errors
    }

    /// Runs the column validator against the stored value.
    pub fn validate(&mut self) -> bool {
        let errors = match &self.value {
            Some(value) => self.column.validate_value(value, self.is_from_db, false),
            None => vec![],
        };
        self.set_validation_errors(errors);
        self.validation_errors.is_empty()
    }

    pub fn custom_info(&self, key: &str) -> Option<Value> {
        self.custom_info.borrow().get(key).cloned()
    }

    pub fn set_custom_info(&self, key: &str, value: Value) {
        self.custom_info.borrow_mut().insert(key.to_string(), value);
    }

    pub fn remove_custom_info(&self, key: &str) {
        self.custom_info.borrow_mut().remove(key);
    }

    /// Default usability: a primary key only takes a database-expression default and only
    /// while it has no value; other columns take their default only before the record is stored.
    pub fn is_default_value_can_be_used(&self, record_exists_in_db: bool) -> OrmResult<bool> {
        if !self.column.has_default_value() {
            return Ok(false);
        }
        if self.column.is_primary_key() {
            if self.has_value() {
                return Ok(false);
            }
            return Ok(self.column.get_valid_default_value(None)?.is_expr());
        }
        Ok(!record_exists_in_db)
    }

    pub fn has_value_or_default(&self, record_exists_in_db: bool) -> bool {
        self.has_value() || self.is_default_value_can_be_used(record_exists_in_db).unwrap_or(false)
    }

    pub fn value_or_default(&self, record_exists_in_db: bool) -> OrmResult<Value> {
        if let Some(value) = &self.value {
            return Ok(value.clone());
        }
        let column = self.column.name().to_string();
        if !self.column.has_default_value() {
            return Err(OrmError::ValueNotSet { column, reason: NotSetReason::NoDefault });
        }
        if !self.is_default_value_can_be_used(record_exists_in_db)? {
            return Err(OrmError::ValueNotSet { column, reason: NotSetReason::DefaultNotUsable });
        }
        self.column.get_valid_default_value(None)
    }
}
