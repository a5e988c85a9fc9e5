use crate::column::validation::{check_allowed_values, check_type};
use crate::column::Column;
use crate::error::{OrmError, OrmResult, ValidationError};
use crate::record::Record;
use crate::record_value::RecordValue;
use crate::value::Value;
use std::sync::Arc;

/// `(value container, requested format, record exists in db) -> value`
pub type ValueGetter = Arc<dyn Fn(&RecordValue, Option<&str>, bool) -> OrmResult<Value> + Send + Sync>;
/// `(new value, is from db, current container, trust mode) -> replacement container`
pub type ValueSetter = Arc<dyn Fn(Value, bool, &RecordValue, bool) -> OrmResult<RecordValue> + Send + Sync>;
pub type ValuePreprocessor = Arc<dyn Fn(Value, bool, &Column) -> Value + Send + Sync>;
/// `(value, is from db, is for condition, column) -> errors`
pub type ValueValidator = Arc<dyn Fn(&Value, bool, bool, &Column) -> Vec<ValidationError> + Send + Sync>;
pub type ValidatorExtender = Arc<dyn Fn(&Value, bool, &Column) -> Vec<ValidationError> + Send + Sync>;
pub type AllowedValuesValidator = Arc<dyn Fn(&Value, &[Value], &Column) -> Vec<ValidationError> + Send + Sync>;
pub type ValueNormalizer = Arc<dyn Fn(Value, bool, &Column) -> Value + Send + Sync>;
pub type ValueFormatter = Arc<dyn Fn(&Value, &str, &Column) -> OrmResult<Value> + Send + Sync>;
/// `(saved value, is update, record) -> ()`, runs after a successful write.
pub type SavingExtender = Arc<dyn Fn(&RecordValue, bool, &Record) -> OrmResult<()> + Send + Sync>;
/// `(deleted value, delete files) -> ()`
pub type DeleteExtender = Arc<dyn Fn(&RecordValue, bool) -> OrmResult<()> + Send + Sync>;
pub type AutoUpdater = Arc<dyn Fn(&Record) -> Value + Send + Sync>;
/// `(fallback, column) -> default`
pub type DefaultValueGetter = Arc<dyn Fn(Value, &Column) -> Value + Send + Sync>;
pub type AllowedValuesProvider = Arc<dyn Fn() -> Vec<Value> + Send + Sync>;

pub fn default_value_preprocessor(value: Value, _is_from_db: bool, column: &Column) -> Value {
    match value {
        Value::Text(text) => {
            let text = if column.is_value_trimming_required() { text.trim().to_string() } else { text };
            if text.is_empty() && column.is_empty_string_must_be_converted_to_null() {
                return Value::Null;
            }
            if column.is_value_lowercasing_required() {
                Value::Text(text.to_lowercase())
            } else {
                Value::Text(text)
            }
        }
        other => other,
    }
}

/// Null check, type fitness, allowed values and the validator extender, stopping at the first failing stage.
pub fn default_value_validator(value: &Value, is_from_db: bool, is_for_condition: bool, column: &Column) -> Vec<ValidationError> {
    if value.is_null() {
        return if column.is_value_can_be_null() || is_for_condition { vec![] } else { vec![ValidationError::ValueCannotBeNull] };
    }
    let type_errors = match value {
        Value::Json(serde_json::Value::Array(items)) if is_for_condition && !column.kind().is_json() => items
            .iter()
            .flat_map(|item| check_type(column.kind(), &Value::from(item.clone()), true))
            .take(1)
            .collect(),
        _ => check_type(column.kind(), value, is_for_condition),
    };
    if !type_errors.is_empty() {
        return type_errors;
    }
    if let Some(allowed) = column.get_allowed_values() {
        let errors = column.validate_allowed_values(value, &allowed);
        if !errors.is_empty() {
            return errors;
        }
    }
    if is_for_condition {
        return vec![];
    }
    column.extend_validation(value, is_from_db)
}

pub fn default_allowed_values_validator(value: &Value, allowed: &[Value], _column: &Column) -> Vec<ValidationError> {
    check_allowed_values(value, allowed)
}

/// Reads the current value, or the usable default, optionally reshaped into `format`.
/// Formatted values are memoised on the container until its raw value changes.
pub fn default_value_getter(value: &RecordValue, format: Option<&str>, record_exists_in_db: bool) -> OrmResult<Value> {
    let column = value.column();
    let Some(format) = format else {
        return value.value_or_default(record_exists_in_db);
    };
    if !column.value_formats().iter().any(|f| *f == format) {
        return Err(OrmError::InvalidArgument(format!(
            "Value format '{}' is not supported for column '{}'. Supported formats: {}",
            format,
            column.name(),
            column.value_formats().join(", ")
        )));
    }
    let key = format!("format:{}", format);
    if let Some(cached) = value.custom_info(&key) {
        return Ok(cached);
    }
    let base = value.value_or_default(record_exists_in_db)?;
    if base.is_expr() {
        return Ok(base);
    }
    let formatted = column.format_value(&base, format)?;
    value.set_custom_info(&key, formatted.clone());
    Ok(formatted)
}

/// preprocess -> compare with current -> validate -> normalize -> store in a fresh container.
pub fn default_value_setter(new_value: Value, is_from_db: bool, current: &RecordValue, trust_data: bool) -> OrmResult<RecordValue> {
    let column = current.column().clone();
    if !is_from_db && !column.is_value_can_be_set_or_changed() {
        return Err(OrmError::BadMethodCall(format!("Column '{}' is read only", column.name())));
    }
    let preprocessed = column.preprocess_value(new_value.clone(), is_from_db);
    if current.has_value() && (current.is_from_db() || !is_from_db) {
        let unchanged = current.value().map(|v| v == &preprocessed).unwrap_or(false)
            || current.raw_value().map(|raw| raw == &new_value).unwrap_or(false);
        if unchanged {
            return Ok(current.clone());
        }
    }
    let mut next = current.successor();
    next.set_raw_value(new_value.clone(), preprocessed.clone(), is_from_db);
    if is_from_db && trust_data {
        next.set_valid_value(preprocessed, &new_value)?;
        return Ok(next);
    }
    let errors = column.validate_value(&preprocessed, is_from_db, false);
    if !errors.is_empty() {
        next.set_validation_errors(errors);
        return Ok(next);
    }
    let normalized = column.normalize_value(preprocessed, is_from_db);
    next.set_valid_value(normalized, &new_value)?;
    Ok(next)
}
