pub mod format;
pub mod hooks;
pub mod kind;
pub mod normalize;
pub mod validation;

pub use hooks::*;
pub use kind::ColumnType;

use crate::error::{NotSetReason, OrmError, OrmResult, ValidationError};
use crate::record::Record;
use crate::record_value::RecordValue;
use crate::value::Value;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

static COLUMN_NAME_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").ok());

pub fn is_valid_column_name(name: &str) -> bool {
    COLUMN_NAME_PATTERN.as_ref().is_some_and(|re| re.is_match(name))
}

#[derive(Clone, Default)]
pub enum DefaultValue {
    #[default]
    NotSet,
    Value(Value),
    Deferred(Arc<dyn Fn() -> Value + Send + Sync>),
}

#[derive(Clone, Default)]
enum AllowedValues {
    #[default]
    Any,
    Fixed(Vec<Value>),
    Lazy(AllowedValuesProvider, Arc<OnceCell<Vec<Value>>>),
}

#[derive(Clone, Default)]
struct ColumnHooks {
    getter: Option<ValueGetter>,
    setter: Option<ValueSetter>,
    preprocessor: Option<ValuePreprocessor>,
    validator: Option<ValueValidator>,
    validator_extender: Option<ValidatorExtender>,
    allowed_values_validator: Option<AllowedValuesValidator>,
    normalizer: Option<ValueNormalizer>,
    formatter: Option<(ValueFormatter, Vec<String>)>,
    saving_extender: Option<SavingExtender>,
    delete_extender: Option<DeleteExtender>,
    auto_updater: Option<AutoUpdater>,
    default_value_getter: Option<DefaultValueGetter>,
}

/// Metadata and value-processing behaviour of one table field.
///
/// Configured with builder calls, then bound to exactly one table structure. After binding
/// only the guarded `set_name` may change it, and only when no name was given before.
#[derive(Clone)]
pub struct Column {
    name: Option<String>,
    kind: ColumnType,
    table_name: OnceCell<String>,
    nullable: bool,
    trim_value: bool,
    lowercase_value: bool,
    empty_string_to_null: bool,
    default: DefaultValue,
    primary_key: bool,
    unique: bool,
    private: bool,
    exists_in_db: bool,
    can_be_set_or_changed: bool,
    allowed: AllowedValues,
    hooks: ColumnHooks,
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("table", &self.table_name.get())
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .field("exists_in_db", &self.exists_in_db)
            .finish()
    }
}

impl Column {
    pub fn new(name: &str, kind: ColumnType) -> Self {
        let mut column = Self::unnamed(kind);
        column.name = Some(name.to_string());
        column
    }

    /// Factory with optional name; the name is checked immediately.
    pub fn create(kind: ColumnType, name: Option<&str>) -> OrmResult<Self> {
        let mut column = Self::unnamed(kind);
        if let Some(name) = name {
            column.set_name(name)?;
        }
        Ok(column)
    }

    fn unnamed(kind: ColumnType) -> Self {
        Column {
            name: None,
            kind,
            table_name: OnceCell::new(),
            nullable: true,
            trim_value: false,
            lowercase_value: false,
            empty_string_to_null: false,
            default: DefaultValue::NotSet,
            primary_key: false,
            unique: false,
            private: false,
            exists_in_db: true,
            can_be_set_or_changed: true,
            allowed: AllowedValues::Any,
            hooks: ColumnHooks::default(),
        }
    }

    pub fn set_name(&mut self, name: &str) -> OrmResult<()> {
        if let Some(existing) = &self.name {
            return Err(OrmError::BadMethodCall(format!("Column name is already set to '{}'", existing)));
        }
        if !is_valid_column_name(name) {
            return Err(OrmError::InvalidArgument(format!("Column name '{}' must match [a-z][a-z0-9_]*", name)));
        }
        self.name = Some(name.to_string());
        Ok(())
    }

    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn kind(&self) -> ColumnType {
        self.kind
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table_name.get().map(|s| s.as_str())
    }

    /// Checks the definition and attaches the column to its table.
    pub(crate) fn bind(&self, table: &str) -> OrmResult<()> {
        let name = self.name.as_deref().ok_or_else(|| OrmError::Schema(format!("Column without a name in table '{}'", table)))?;
        if !is_valid_column_name(name) {
            return Err(OrmError::Schema(format!("Column name '{}' in table '{}' must match [a-z][a-z0-9_]*", name, table)));
        }
        if self.kind == ColumnType::Enum && !self.has_allowed_values() {
            return Err(OrmError::Schema(format!("Enum column '{}.{}' requires allowed values", table, name)));
        }
        if let AllowedValues::Fixed(values) = &self.allowed {
            if values.is_empty() {
                return Err(OrmError::Schema(format!("Column '{}.{}' has an empty list of allowed values", table, name)));
            }
        }
        self.table_name
            .set(table.to_string())
            .map_err(|_| OrmError::BadMethodCall(format!("Column '{}' is already bound to table '{}'", name, self.table_name().unwrap_or(""))))
    }

    // builder

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn disallows_null_values(self) -> Self {
        self.nullable(false)
    }

    pub fn trims_value(mut self) -> Self {
        self.trim_value = true;
        self
    }

    pub fn lowercases_value(mut self) -> Self {
        self.lowercase_value = true;
        self
    }

    pub fn converts_empty_string_to_null(mut self) -> Self {
        self.empty_string_to_null = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = DefaultValue::Value(value.into());
        self
    }

    /// Default computed every time it is resolved.
    pub fn default_value_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = DefaultValue::Deferred(Arc::new(f));
        self
    }

    pub fn default_value_getter<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &Column) -> Value + Send + Sync + 'static,
    {
        self.hooks.default_value_getter = Some(Arc::new(f));
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

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Virtual column, computed locally and never sent to storage.
    pub fn not_in_db(mut self) -> Self {
        self.exists_in_db = false;
        self
    }

    pub fn read_only_value(mut self) -> Self {
        self.can_be_set_or_changed = false;
        self
    }

    pub fn allowed_values<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.allowed = AllowedValues::Fixed(values.into_iter().map(Into::into).collect());
        self
    }

    /// Allowed values resolved on first use and cached.
    pub fn allowed_values_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Vec<Value> + Send + Sync + 'static,
    {
        self.allowed = AllowedValues::Lazy(Arc::new(f), Arc::new(OnceCell::new()));
        self
    }

    pub fn value_getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecordValue, Option<&str>, bool) -> OrmResult<Value> + Send + Sync + 'static,
    {
        self.hooks.getter = Some(Arc::new(f));
        self
    }

    pub fn value_setter<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, bool, &RecordValue, bool) -> OrmResult<RecordValue> + Send + Sync + 'static,
    {
        self.hooks.setter = Some(Arc::new(f));
        self
    }

    pub fn value_preprocessor<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, bool, &Column) -> Value + Send + Sync + 'static,
    {
        self.hooks.preprocessor = Some(Arc::new(f));
        self
    }

    pub fn value_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, bool, bool, &Column) -> Vec<ValidationError> + Send + Sync + 'static,
    {
        self.hooks.validator = Some(Arc::new(f));
        self
    }

    pub fn validator_extender<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, bool, &Column) -> Vec<ValidationError> + Send + Sync + 'static,
    {
        self.hooks.validator_extender = Some(Arc::new(f));
        self
    }

    pub fn allowed_values_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &[Value], &Column) -> Vec<ValidationError> + Send + Sync + 'static,
    {
        self.hooks.allowed_values_validator = Some(Arc::new(f));
        self
    }

    pub fn value_normalizer<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, bool, &Column) -> Value + Send + Sync + 'static,
    {
        self.hooks.normalizer = Some(Arc::new(f));
        self
    }

    /// Replaces the formatter together with the list of format names it understands.
    pub fn value_formatter<F>(mut self, f: F, formats: &[&str]) -> Self
    where
        F: Fn(&Value, &str, &Column) -> OrmResult<Value> + Send + Sync + 'static,
    {
        self.hooks.formatter = Some((Arc::new(f), formats.iter().map(|s| s.to_string()).collect()));
        self
    }

    pub fn saving_extender<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecordValue, bool, &Record) -> OrmResult<()> + Send + Sync + 'static,
    {
        self.hooks.saving_extender = Some(Arc::new(f));
        self
    }

    pub fn delete_extender<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecordValue, bool) -> OrmResult<()> + Send + Sync + 'static,
    {
        self.hooks.delete_extender = Some(Arc::new(f));
        self
    }

    /// Value regenerated on every save, e.g. an `updated_at` timestamp.
    pub fn auto_updater<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.hooks.auto_updater = Some(Arc::new(f));
        self
    }

    // flags

    pub fn is_value_can_be_null(&self) -> bool {
        self.nullable
    }

    pub fn is_value_trimming_required(&self) -> bool {
        self.trim_value
    }

    pub fn is_value_lowercasing_required(&self) -> bool {
        self.lowercase_value
    }

    pub fn is_empty_string_must_be_converted_to_null(&self) -> bool {
        self.empty_string_to_null
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn is_exists_in_db(&self) -> bool {
        self.exists_in_db
    }

    pub fn is_value_can_be_set_or_changed(&self) -> bool {
        self.can_be_set_or_changed
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_image(&self) -> bool {
        self.kind.is_image()
    }

    pub fn is_auto_updating_value(&self) -> bool {
        self.hooks.auto_updater.is_some()
    }

    pub fn has_saving_extender(&self) -> bool {
        self.hooks.saving_extender.is_some()
    }

    pub fn has_delete_extender(&self) -> bool {
        self.hooks.delete_extender.is_some()
    }

    // defaults

    pub fn has_default_value(&self) -> bool {
        self.hooks.default_value_getter.is_some() || !matches!(self.default, DefaultValue::NotSet)
    }

    /// Resolves the default (getter hook, stored value, deferred computation or `fallback`)
    /// and validates it. Database expressions are returned without validation.
    pub fn get_valid_default_value(&self, fallback: Option<Value>) -> OrmResult<Value> {
        let resolved = if let Some(getter) = &self.hooks.default_value_getter {
            getter(fallback.unwrap_or_default(), self)
        } else {
            match &self.default {
                DefaultValue::Value(value) => value.clone(),
                DefaultValue::Deferred(f) => f(),
                DefaultValue::NotSet => fallback.ok_or_else(|| OrmError::ValueNotSet {
                    column: self.name().to_string(),
                    reason: NotSetReason::NoDefault,
                })?,
            }
        };
        if resolved.is_expr() {
            return Ok(resolved);
        }
        let errors = self.validate_value(&resolved, false, false);
        if !errors.is_empty() {
            let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
            return Err(OrmError::UnexpectedValue(format!(
                "Default value of column '{}' is not valid: {}",
                self.name(),
                codes.join(", ")
            )));
        }
        let preprocessed = self.preprocess_value(resolved, false);
        Ok(self.normalize_value(preprocessed, false))
    }

    // allowed values

    pub fn has_allowed_values(&self) -> bool {
        !matches!(self.allowed, AllowedValues::Any)
    }

    pub fn get_allowed_values(&self) -> Option<Vec<Value>> {
        match &self.allowed {
            AllowedValues::Any => None,
            AllowedValues::Fixed(values) => Some(values.clone()),
            AllowedValues::Lazy(provider, cell) => Some(cell.get_or_init(|| provider()).clone()),
        }
    }

    pub fn validate_allowed_values(&self, value: &Value, allowed: &[Value]) -> Vec<ValidationError> {
        match &self.hooks.allowed_values_validator {
            Some(validator) => validator(value, allowed, self),
            None => default_allowed_values_validator(value, allowed, self),
        }
    }

    // pipeline

    pub fn preprocess_value(&self, value: Value, is_from_db: bool) -> Value {
        match &self.hooks.preprocessor {
            Some(preprocessor) => preprocessor(value, is_from_db, self),
            None => default_value_preprocessor(value, is_from_db, self),
        }
    }

    /// Validation errors of `value` (empty when valid). Database expressions are always valid.
    pub fn validate_value(&self, value: &Value, is_from_db: bool, is_for_condition: bool) -> Vec<ValidationError> {
        if value.is_expr() {
            return vec![];
        }
        let preprocessed = self.preprocess_value(value.clone(), is_from_db);
        match &self.hooks.validator {
            Some(validator) => validator(&preprocessed, is_from_db, is_for_condition, self),
            None => default_value_validator(&preprocessed, is_from_db, is_for_condition, self),
        }
    }

    pub(crate) fn extend_validation(&self, value: &Value, is_from_db: bool) -> Vec<ValidationError> {
        match &self.hooks.validator_extender {
            Some(extender) => extender(value, is_from_db, self),
            None => vec![],
        }
    }

    pub fn normalize_value(&self, value: Value, is_from_db: bool) -> Value {
        if value.is_expr() {
            return value;
        }
        match &self.hooks.normalizer {
            Some(normalizer) => normalizer(value, is_from_db, self),
            None => normalize::default_value_normalizer(value, is_from_db, self),
        }
    }

    pub fn value_formats(&self) -> Vec<&str> {
        match &self.hooks.formatter {
            Some((_, formats)) => formats.iter().map(|s| s.as_str()).collect(),
            None => self.kind.value_formats().to_vec(),
        }
    }

    pub fn format_value(&self, value: &Value, format: &str) -> OrmResult<Value> {
        match &self.hooks.formatter {
            Some((formatter, _)) => formatter(value, format, self),
            None => format::default_value_formatter(value, format, self),
        }
    }

    pub fn get_value(&self, value: &RecordValue, format: Option<&str>, record_exists_in_db: bool) -> OrmResult<Value> {
        match &self.hooks.getter {
            Some(getter) => getter(value, format, record_exists_in_db),
            None => default_value_getter(value, format, record_exists_in_db),
        }
    }

    pub fn set_value(&self, new_value: Value, is_from_db: bool, current: &RecordValue, trust_data: bool) -> OrmResult<RecordValue> {
        match &self.hooks.setter {
            Some(setter) => setter(new_value, is_from_db, current, trust_data),
            None => default_value_setter(new_value, is_from_db, current, trust_data),
        }
    }

    pub fn auto_update_value(&self, record: &Record) -> Option<Value> {
        self.hooks.auto_updater.as_ref().map(|updater| updater(record))
    }

    pub fn run_saving_extender(&self, value: &RecordValue, is_update: bool, record: &Record) -> OrmResult<()> {
        match &self.hooks.saving_extender {
            Some(extender) => extender(value, is_update, record),
            None => Ok(()),
        }
    }

    pub fn run_delete_extender(&self, value: &RecordValue, delete_files: bool) -> OrmResult<()> {
        match &self.hooks.delete_extender {
            Some(extender) => extender(value, delete_files),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn name_is_set_once_and_checked() {
        let mut column = Column::create(ColumnType::String, None).unwrap();
        assert!(matches!(column.set_name("Bad-Name"), Err(OrmError::InvalidArgument(_))));
        column.set_name("title").unwrap();
        assert!(matches!(column.set_name("other"), Err(OrmError::BadMethodCall(_))));
        assert!(Column::create(ColumnType::Int, Some("9lives")).is_err());
    }

    #[test]
    fn binding_enforces_definition() {
        let enum_column = Column::new("status", ColumnType::Enum);
        assert!(matches!(enum_column.bind("users"), Err(OrmError::Schema(_))));
        let column = Column::new("status", ColumnType::Enum).allowed_values(["new", "done"]);
        column.bind("users").unwrap();
        assert_eq!(column.table_name(), Some("users"));
        assert!(column.bind("posts").is_err());
    }

    #[test]
    fn validation_order_and_condition_mode() {
        let column = Column::new("status", ColumnType::Enum)
            .disallows_null_values()
            .allowed_values(["new", "done"])
            .validator_extender(|value, _, _| {
                if value.as_str() == Some("done") { vec![ValidationError::Custom("closed".into())] } else { vec![] }
            });
        assert_eq!(column.validate_value(&Value::Null, false, false), vec![ValidationError::ValueCannotBeNull]);
        assert!(column.validate_value(&Value::Null, false, true).is_empty());
        assert_eq!(column.validate_value(&Value::from("old"), false, false), vec![ValidationError::ValueIsNotAllowed]);
        assert_eq!(column.validate_value(&Value::from("done"), false, false), vec![ValidationError::Custom("closed".into())]);
        assert!(column.validate_value(&Value::from("done"), false, true).is_empty());
        assert!(column.validate_value(&Value::Expr(crate::DbExpr::new("NOW()")), false, false).is_empty());
    }

    #[test]
    fn preprocessing_flags() {
        let column = Column::new("email", ColumnType::Email).trims_value().lowercases_value().converts_empty_string_to_null();
        assert_eq!(column.preprocess_value(Value::from("  Ann@Example.COM "), false), Value::from("ann@example.com"));
        assert_eq!(column.preprocess_value(Value::from("   "), false), Value::Null);
        assert!(column.validate_value(&Value::from(" Ann@Example.com "), false, false).is_empty());
    }

    #[test]
    fn defaults_are_resolved_and_validated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let column = Column::new("rank", ColumnType::Int).default_value_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::from("7")
        });
        assert_eq!(column.get_valid_default_value(None).unwrap(), Value::Int(7));
        assert_eq!(column.get_valid_default_value(None).unwrap(), Value::Int(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let broken = Column::new("rank", ColumnType::Int).default_value("seven");
        assert!(matches!(broken.get_valid_default_value(None), Err(OrmError::UnexpectedValue(_))));

        let expr = Column::new("id", ColumnType::Int).default_value(crate::DbExpr::default_value());
        assert!(expr.get_valid_default_value(None).unwrap().is_expr());

        let none = Column::new("rank", ColumnType::Int);
        assert!(!none.has_default_value());
        assert!(matches!(none.get_valid_default_value(None), Err(OrmError::ValueNotSet { .. })));
        assert_eq!(none.get_valid_default_value(Some(Value::Int(3))).unwrap(), Value::Int(3));
    }

    #[test]
    fn lazy_allowed_values_are_computed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let column = Column::new("lang", ColumnType::String).allowed_values_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![Value::from("en"), Value::from("de")]
        });
        assert!(column.validate_value(&Value::from("en"), false, false).is_empty());
        assert!(!column.validate_value(&Value::from("fr"), false, false).is_empty());
        assert_eq!(column.get_allowed_values(), Some(vec![Value::from("en"), Value::from("de")]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(Column::new("lang", ColumnType::String).get_allowed_values(), None);
    }

    #[test]
    fn custom_formats_replace_type_formats() {
        let column = Column::new("price", ColumnType::Int)
            .value_formatter(|value, _, _| Ok(Value::from(format!("${}", value))), &["money"]);
        assert_eq!(column.value_formats(), vec!["money"]);
        assert_eq!(column.format_value(&Value::Int(5), "money").unwrap(), Value::from("$5"));
    }
}
