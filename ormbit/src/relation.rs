use crate::error::{OrmError, OrmResult};
use crate::record::Record;
use crate::select::condition::Condition;
use crate::select::join::{JoinConfig, JoinType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

static RELATION_NAME_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Z][a-zA-Z0-9]*$").ok());

pub fn is_valid_relation_name(name: &str) -> bool {
    RELATION_NAME_PATTERN.as_ref().is_some_and(|re| re.is_match(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    HasOne,
    HasMany,
    BelongsTo,
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationType::HasOne => write!(f, "HAS_ONE"),
            RelationType::HasMany => write!(f, "HAS_MANY"),
            RelationType::BelongsTo => write!(f, "BELONGS_TO"),
        }
    }
}

pub type JoinConditionsResolver = Arc<dyn Fn(&Relation, Option<&Record>) -> Condition + Send + Sync>;

#[derive(Clone, Default)]
enum JoinConditions {
    #[default]
    None,
    Static(Condition),
    Deferred(JoinConditionsResolver),
}

/// Link between a local column and a column of a foreign table.
/// The foreign table is referenced by name and resolved through the registry.
#[derive(Clone)]
pub struct Relation {
    name: Option<String>,
    kind: RelationType,
    local_column: String,
    foreign_table: String,
    foreign_column: String,
    join_type: JoinType,
    join_conditions: JoinConditions,
    display_column: Option<String>,
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("local_column", &self.local_column)
            .field("foreign_table", &self.foreign_table)
            .field("foreign_column", &self.foreign_column)
            .field("join_type", &self.join_type)
            .finish()
    }
}

impl Relation {
    pub fn new(local_column: &str, kind: RelationType, foreign_table: &str, foreign_column: &str) -> Self {
        Relation {
            name: None,
            kind,
            local_column: local_column.to_string(),
            foreign_table: foreign_table.to_string(),
            foreign_column: foreign_column.to_string(),
            join_type: JoinType::Left,
            join_conditions: JoinConditions::None,
            display_column: None,
        }
    }

    pub fn has_one(local_column: &str, foreign_table: &str, foreign_column: &str) -> Self {
        Self::new(local_column, RelationType::HasOne, foreign_table, foreign_column)
    }

    pub fn has_many(local_column: &str, foreign_table: &str, foreign_column: &str) -> Self {
        Self::new(local_column, RelationType::HasMany, foreign_table, foreign_column)
    }

    pub fn belongs_to(local_column: &str, foreign_table: &str, foreign_column: &str) -> Self {
        Self::new(local_column, RelationType::BelongsTo, foreign_table, foreign_column)
    }

    /// Builder form of [`Relation::set_name`]; an invalid name surfaces when the structure is built.
    pub fn named(mut self, name: &str) -> Self {
        if self.name.is_none() {
            self.name = Some(name.to_string());
        }
        self
    }

    pub fn set_name(&mut self, name: &str) -> OrmResult<()> {
        if let Some(existing) = &self.name {
            return Err(OrmError::BadMethodCall(format!("Relation name is already set to '{}'", existing)));
        }
        if !is_valid_relation_name(name) {
            return Err(OrmError::InvalidArgument(format!("Relation name '{}' must match [A-Z][a-zA-Z0-9]*", name)));
        }
        self.name = Some(name.to_string());
        Ok(())
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    pub fn additional_join_conditions(mut self, conditions: Condition) -> Self {
        self.join_conditions = JoinConditions::Static(conditions);
        self
    }

    /// Conditions computed per use; the record is present when loading related records of one record.
    pub fn additional_join_conditions_with<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Relation, Option<&Record>) -> Condition + Send + Sync + 'static,
    {
        self.join_conditions = JoinConditions::Deferred(Arc::new(resolver));
        self
    }

    pub fn display_column(mut self, column: &str) -> Self {
        self.display_column = Some(column.to_string());
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    pub fn kind(&self) -> RelationType {
        self.kind
    }

    pub fn local_column(&self) -> &str {
        &self.local_column
    }

    pub fn foreign_table(&self) -> &str {
        &self.foreign_table
    }

    pub fn foreign_column(&self) -> &str {
        &self.foreign_column
    }

    pub fn get_join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn display_column_name(&self) -> Option<&str> {
        self.display_column.as_deref()
    }

    pub fn additional_conditions(&self, record: Option<&Record>) -> Option<Condition> {
        let conditions = match &self.join_conditions {
            JoinConditions::None => None,
            JoinConditions::Static(condition) => Some(condition.clone()),
            JoinConditions::Deferred(resolver) => Some(resolver(self, record)),
        };
        conditions.filter(|c| !c.is_empty())
    }

    /// Join descriptor for this relation under `path`, attached to the table at `local_path`.
    /// HAS_MANY cannot be flattened into one row and is rejected.
    pub fn to_join_config(&self, path: &str, local_path: &str, foreign_schema: Option<&str>) -> OrmResult<JoinConfig> {
        if self.kind == RelationType::HasMany {
            return Err(OrmError::InvalidArgument(format!(
                "Relation '{}' is HAS_MANY and cannot be joined; load it as a separate collection instead",
                self.name()
            )));
        }
        Ok(JoinConfig::new(path, local_path, &self.local_column, &self.foreign_table, &self.foreign_column)
            .join_type(self.join_type)
            .foreign_schema(foreign_schema)
            .conditions(self.additional_conditions(None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_guarded() {
        let mut relation = Relation::belongs_to("parent_id", "users", "id");
        assert!(matches!(relation.set_name("parent"), Err(OrmError::InvalidArgument(_))));
        relation.set_name("Parent").unwrap();
        assert!(matches!(relation.set_name("Other"), Err(OrmError::BadMethodCall(_))));
    }

    #[test]
    fn has_many_cannot_be_joined() {
        let relation = Relation::has_many("id", "posts", "user_id").named("Posts");
        let err = relation.to_join_config("Posts", "Users", None).unwrap_err();
        assert!(err.to_string().contains("HAS_MANY"));
    }

    #[test]
    fn join_config_carries_conditions() {
        let relation = Relation::belongs_to("parent_id", "users", "id")
            .named("Parent")
            .join_type(JoinType::Inner)
            .additional_join_conditions(Condition::eq("is_active", true));
        let join = relation.to_join_config("Parent", "Users", Some("public")).unwrap();
        assert_eq!(join.join_type, JoinType::Inner);
        assert_eq!(join.foreign_schema.as_deref(), Some("public"));
        assert_eq!(join.conditions, Some(Condition::eq("is_active", true)));
    }

    #[test]
    fn deferred_conditions_see_the_relation() {
        let relation = Relation::has_one("id", "profiles", "user_id")
            .named("Profile")
            .additional_join_conditions_with(|relation, record| {
                assert!(record.is_none());
                Condition::eq(relation.foreign_column(), 1)
            });
        assert_eq!(relation.additional_conditions(None), Some(Condition::eq("user_id", 1)));
    }
}
