use indexmap::IndexMap;
use std::fmt;
use std::sync::PoisonError;
use thiserror::Error;

pub type OrmResult<T> = Result<T, OrmError>;

#[derive(Debug, Error)]
pub enum OrmError {

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid data: {0}")]
    InvalidData(ValidationErrors),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Bad method call: {0}")]
    BadMethodCall(String),

    #[error("Value of column '{column}' is not set: {reason}")]
    ValueNotSet { column: String, reason: NotSetReason },

    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl OrmError {
    pub fn invalid_data(column: &str, errors: Vec<ValidationError>) -> Self {
        let mut all = ValidationErrors::default();
        all.extend(column, errors);
        OrmError::InvalidData(all)
    }

    /// Validation errors carried by an `InvalidData` failure, if any.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            OrmError::InvalidData(errors) => Some(errors),
            _ => None,
        }
    }
}

impl<T> From<PoisonError<T>> for OrmError {
    fn from(e: PoisonError<T>) -> Self {
        OrmError::Custom(format!("Poison error: {:?}", e.to_string()))
    }
}

/// Why a value could not be produced for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotSetReason {
    NoDefault,
    DefaultNotUsable,
}

impl fmt::Display for NotSetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotSetReason::NoDefault => write!(f, "no value and no default value configured"),
            NotSetReason::DefaultNotUsable => write!(f, "default value cannot be used for a record that already exists in db"),
        }
    }
}

/// Closed set of per-value validation failures. `Custom` carries codes produced by validator extenders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidationError {
    ValueCannotBeNull,
    ValueMustBeBoolean,
    ValueMustBeInteger,
    ValueMustBeFloat,
    ValueMustBeString,
    ValueMustBeJson,
    ValueMustBeEmail,
    ValueMustBeIpv4Address,
    ValueMustBeTimestamp,
    ValueMustBeTimestampWithTz,
    ValueMustBeDate,
    ValueMustBeTime,
    ValueMustBeTimezoneOffset,
    ValueMustBeFile,
    ValueMustBeImage,
    ValueIsNotAllowed,
    OneOfValuesIsNotAllowed,
    Custom(String),
}

impl ValidationError {
    pub fn code(&self) -> &str {
        match self {
            ValidationError::ValueCannotBeNull => "value_cannot_be_null",
            ValidationError::ValueMustBeBoolean => "value_must_be_boolean",
            ValidationError::ValueMustBeInteger => "value_must_be_integer",
            ValidationError::ValueMustBeFloat => "value_must_be_float",
            ValidationError::ValueMustBeString => "value_must_be_string",
            ValidationError::ValueMustBeJson => "value_must_be_json",
            ValidationError::ValueMustBeEmail => "value_must_be_email",
            ValidationError::ValueMustBeIpv4Address => "value_must_be_ipv4_address",
            ValidationError::ValueMustBeTimestamp => "value_must_be_timestamp",
            ValidationError::ValueMustBeTimestampWithTz => "value_must_be_timestamp_with_tz",
            ValidationError::ValueMustBeDate => "value_must_be_date",
            ValidationError::ValueMustBeTime => "value_must_be_time",
            ValidationError::ValueMustBeTimezoneOffset => "value_must_be_timezone_offset",
            ValidationError::ValueMustBeFile => "value_must_be_file",
            ValidationError::ValueMustBeImage => "value_must_be_image",
            ValidationError::ValueIsNotAllowed => "value_is_not_allowed",
            ValidationError::OneOfValuesIsNotAllowed => "one_of_values_is_not_allowed",
            ValidationError::Custom(code) => code.as_str(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ValidationError::ValueCannotBeNull => "Null value is not allowed.".to_string(),
            ValidationError::ValueMustBeBoolean => "Value must be of a boolean data type.".to_string(),
            ValidationError::ValueMustBeInteger => "Value must be of an integer data type.".to_string(),
            ValidationError::ValueMustBeFloat => "Value must be of a numeric data type.".to_string(),
            ValidationError::ValueMustBeString => "Value must be a string.".to_string(),
            ValidationError::ValueMustBeJson => "Value must be of a json data type.".to_string(),
            ValidationError::ValueMustBeEmail => "Value must be an email.".to_string(),
            ValidationError::ValueMustBeIpv4Address => "Value must be an IPv4 address.".to_string(),
            ValidationError::ValueMustBeTimestamp => "Value must be a valid timestamp.".to_string(),
            ValidationError::ValueMustBeTimestampWithTz => "Value must be a valid timestamp with time zone.".to_string(),
            ValidationError::ValueMustBeDate => "Value must be a valid date.".to_string(),
            ValidationError::ValueMustBeTime => "Value must be a valid time.".to_string(),
            ValidationError::ValueMustBeTimezoneOffset => "Value must be a valid time zone offset.".to_string(),
            ValidationError::ValueMustBeFile => "Value must be a file.".to_string(),
            ValidationError::ValueMustBeImage => "Value must be an image.".to_string(),
            ValidationError::ValueIsNotAllowed => "Value is not allowed.".to_string(),
            ValidationError::OneOfValuesIsNotAllowed => "One of values is not allowed.".to_string(),
            ValidationError::Custom(code) => code.clone(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Validation failures grouped by column name, in the order columns were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(IndexMap<String, Vec<ValidationError>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn extend(&mut self, column: &str, errors: Vec<ValidationError>) {
        if errors.is_empty() {
            return;
        }
        self.0.entry(column.to_string()).or_default().extend(errors);
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (column, errors) in other.0 {
            self.extend(&column, errors);
        }
    }

    pub fn get(&self, column: &str) -> Option<&[ValidationError]> {
        self.0.get(column).map(|v| v.as_slice())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ValidationError])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(column, errors)| {
                let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
                format!("{}: [{}]", column, codes.join(", "))
            })
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_group_by_column() {
        let mut errors = ValidationErrors::new();
        errors.extend("name", vec![ValidationError::ValueCannotBeNull]);
        errors.extend("age", vec![]);
        errors.extend("name", vec![ValidationError::Custom("too_short".into())]);
        assert_eq!(errors.len(), 1);
        assert!(!errors.contains("age"));
        assert_eq!(errors.get("name").unwrap().len(), 2);
        assert_eq!(errors.to_string(), "name: [value_cannot_be_null, too_short]");
    }

    #[test]
    fn invalid_data_exposes_errors() {
        let err = OrmError::invalid_data("email", vec![ValidationError::ValueMustBeEmail]);
        let errors = err.validation_errors().expect("invalid data");
        assert_eq!(errors.get("email").unwrap()[0].code(), "value_must_be_email");
        assert!(err.to_string().contains("email: [value_must_be_email]"));
    }
}
