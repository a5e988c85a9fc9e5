use crate::column::{Column, ColumnType};
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult, ValidationErrors};
use crate::record::Record;
use crate::relation::{is_valid_relation_name, Relation, RelationType};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Record lifecycle callbacks of one table.
pub trait RecordHooks: Send + Sync {
    /// Extra validation before a write; any error aborts the save.
    fn before_save(&self, _record: &Record, _columns: &[String], _is_update: bool) -> ValidationErrors {
        ValidationErrors::new()
    }

    fn after_save(&self, _record: &Record, _is_created: bool) -> OrmResult<()> {
        Ok(())
    }

    fn before_delete(&self, _record: &Record) -> OrmResult<()> {
        Ok(())
    }

    fn after_delete(&self, _record: &Record) -> OrmResult<()> {
        Ok(())
    }
}

/// Columns a foreign table declares, used to check relations without building its structure.
#[derive(Debug, Clone, Default)]
pub struct DeclaredColumns {
    pub columns: Vec<String>,
    pub primary_key: Option<String>,
    pub autodetect: bool,
}

/// Collects the definition of one table; see [`crate::registry::TableDef`].
pub struct StructureBuilder {
    table: String,
    schema: Option<String>,
    alias: Option<String>,
    columns: Vec<Column>,
    relations: Vec<Relation>,
    hooks: Option<Arc<dyn RecordHooks>>,
    autodetect: bool,
}

impl StructureBuilder {
    pub fn new(table: &str) -> Self {
        StructureBuilder {
            table: table.to_string(),
            schema: None,
            alias: None,
            columns: vec![],
            relations: vec![],
            hooks: None,
            autodetect: false,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn schema(&mut self, schema: &str) -> &mut Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn alias(&mut self, alias: &str) -> &mut Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn column(&mut self, column: Column) -> &mut Self {
        self.columns.push(column);
        self
    }

    pub fn relation(&mut self, relation: Relation) -> &mut Self {
        self.relations.push(relation);
        self
    }

    pub fn hooks(&mut self, hooks: impl RecordHooks + 'static) -> &mut Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Columns the definition leaves out are read from the live schema.
    pub fn autodetect_columns(&mut self) -> &mut Self {
        self.autodetect = true;
        self
    }

    pub fn declared_columns(&self) -> DeclaredColumns {
        DeclaredColumns {
            columns: self.columns.iter().map(|c| c.name().to_string()).collect(),
            primary_key: self.columns.iter().find(|c| c.is_primary_key()).map(|c| c.name().to_string()),
            autodetect: self.autodetect,
        }
    }

    fn detect_columns(&mut self, connection: &dyn Connection) -> OrmResult<()> {
        let description = connection.describe_table(self.schema.as_deref(), &self.table)?;
        for described in description.columns {
            if self.columns.iter().any(|c| c.name() == described.name) {
                continue;
            }
            let mut column = Column::create(ColumnType::from_db_type(&described.db_type), Some(described.name.as_str()))?.nullable(described.nullable);
            if described.primary_key {
                column = column.primary_key();
            }
            if described.unique {
                column = column.unique();
            }
            if let Some(default) = described.default {
                column = column.default_value(default);
            }
            self.columns.push(column);
        }
        Ok(())
    }

    /// Builds the frozen structure. `foreign` answers which columns another table declares.
    pub fn build<F>(mut self, connection: Option<&dyn Connection>, foreign: F) -> OrmResult<TableStructure>
    where
        F: Fn(&str) -> OrmResult<DeclaredColumns>,
    {
        if self.autodetect {
            let connection = connection.ok_or_else(|| {
                OrmError::Schema(format!("Table '{}' autodetects columns but has no connection", self.table))
            })?;
            self.detect_columns(connection)?;
        }

        let mut columns: IndexMap<String, Arc<Column>> = IndexMap::new();
        for column in self.columns {
            column.bind(&self.table)?;
            if columns.contains_key(column.name()) {
                return Err(OrmError::Schema(format!("Column '{}' is defined twice in table '{}'", column.name(), self.table)));
            }
            columns.insert(column.name().to_string(), Arc::new(column));
        }

        let primary_keys: Vec<&Arc<Column>> = columns.values().filter(|c| c.is_primary_key()).collect();
        let pk = match primary_keys.as_slice() {
            [pk] => (*pk).clone(),
            [] => return Err(OrmError::Schema(format!("Table '{}' has no primary key column", self.table))),
            _ => return Err(OrmError::Schema(format!("Table '{}' has more than one primary key column", self.table))),
        };

        let mut relations: IndexMap<String, Arc<Relation>> = IndexMap::new();
        let mut relations_by_column: HashMap<String, Vec<String>> = HashMap::new();
        for relation in self.relations {
            let name = relation.name().to_string();
            if !relation.has_name() || !is_valid_relation_name(&name) {
                return Err(OrmError::Schema(format!("Relation name '{}' in table '{}' must match [A-Z][a-zA-Z0-9]*", name, self.table)));
            }
            if relations.contains_key(&name) {
                return Err(OrmError::Schema(format!("Relation '{}' is defined twice in table '{}'", name, self.table)));
            }
            if !columns.contains_key(relation.local_column()) {
                return Err(OrmError::Schema(format!(
                    "Relation '{}' refers to unknown local column '{}' of table '{}'",
                    name,
                    relation.local_column(),
                    self.table
                )));
            }
            let declared = if relation.foreign_table() == self.table {
                DeclaredColumns { columns: columns.keys().cloned().collect(), primary_key: Some(pk.name().to_string()), autodetect: false }
            } else {
                foreign(relation.foreign_table())?
            };
            if !declared.autodetect && !declared.columns.iter().any(|c| c == relation.foreign_column()) {
                return Err(OrmError::Schema(format!(
                    "Relation '{}' refers to unknown column '{}' of foreign table '{}'",
                    name,
                    relation.foreign_column(),
                    relation.foreign_table()
                )));
            }
            if relation.kind() == RelationType::HasMany && declared.primary_key.as_deref() == Some(relation.foreign_column()) {
                return Err(OrmError::Schema(format!(
                    "HAS_MANY relation '{}' cannot use the primary key '{}' of table '{}' as its foreign column",
                    name,
                    relation.foreign_column(),
                    relation.foreign_table()
                )));
            }
            relations_by_column.entry(relation.local_column().to_string()).or_default().push(name.clone());
            relations.insert(name, Arc::new(relation));
        }

        let file_columns = names_where(&columns, |c| c.is_file());
        let db_columns = names_where(&columns, |c| c.is_exists_in_db());
        let virtual_columns = names_where(&columns, |c| !c.is_exists_in_db());
        let auto_updating_columns = names_where(&columns, |c| c.is_auto_updating_value());

        Ok(TableStructure {
            alias: self.alias.unwrap_or_else(|| to_camel_case(&self.table)),
            name: self.table,
            schema: self.schema,
            pk,
            columns,
            relations,
            relations_by_column,
            file_columns,
            db_columns,
            virtual_columns,
            auto_updating_columns,
            hooks: self.hooks,
        })
    }
}

fn names_where<F: Fn(&Column) -> bool>(columns: &IndexMap<String, Arc<Column>>, predicate: F) -> Vec<String> {
    columns.values().filter(|c| predicate(c)).map(|c| c.name().to_string()).collect()
}

/// `user_posts` -> `UserPosts`
pub fn to_camel_case(input: &str) -> String {
    input
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Frozen column and relation graph of one table.
pub struct TableStructure {
    name: String,
    schema: Option<String>,
    alias: String,
    pk: Arc<Column>,
    columns: IndexMap<String, Arc<Column>>,
    relations: IndexMap<String, Arc<Relation>>,
    relations_by_column: HashMap<String, Vec<String>>,
    file_columns: Vec<String>,
    db_columns: Vec<String>,
    virtual_columns: Vec<String>,
    auto_updating_columns: Vec<String>,
    hooks: Option<Arc<dyn RecordHooks>>,
}

impl fmt::Debug for TableStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableStructure")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("alias", &self.alias)
            .field("columns", &self.columns.keys().collect::<Vec<_>>())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TableStructure {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Name as passed to the connection: `schema.table` or `table`.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> OrmResult<&Arc<Column>> {
        self.columns
            .get(name)
            .ok_or_else(|| OrmError::InvalidArgument(format!("Table '{}' has no column '{}'", self.name, name)))
    }

    pub fn columns(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.columns.values()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn primary_key_column(&self) -> &Arc<Column> {
        &self.pk
    }

    pub fn primary_key_name(&self) -> &str {
        self.pk.name()
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn relation(&self, name: &str) -> OrmResult<&Arc<Relation>> {
        self.relations
            .get(name)
            .ok_or_else(|| OrmError::InvalidArgument(format!("Table '{}' has no relation '{}'", self.name, name)))
    }

    pub fn relations(&self) -> impl Iterator<Item = &Arc<Relation>> {
        self.relations.values()
    }

    /// Relations whose local column is `column`.
    pub fn column_relations(&self, column: &str) -> Vec<&Arc<Relation>> {
        self.relations_by_column
            .get(column)
            .map(|names| names.iter().filter_map(|n| self.relations.get(n)).collect())
            .unwrap_or_default()
    }

    pub fn file_columns(&self) -> &[String] {
        &self.file_columns
    }

    pub fn has_file_columns(&self) -> bool {
        !self.file_columns.is_empty()
    }

    pub fn db_columns(&self) -> &[String] {
        &self.db_columns
    }

    pub fn virtual_columns(&self) -> &[String] {
        &self.virtual_columns
    }

    pub fn auto_updating_columns(&self) -> &[String] {
        &self.auto_updating_columns
    }

    pub fn hooks(&self) -> Option<&Arc<dyn RecordHooks>> {
        self.hooks.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ColumnDescription, MemoryConnection, TableDescription};

    fn no_foreign(_: &str) -> OrmResult<DeclaredColumns> {
        Err(OrmError::InvalidArgument("unknown table".into()))
    }

    #[test]
    fn requires_exactly_one_primary_key() {
        let mut builder = StructureBuilder::new("users");
        builder.column(Column::new("name", ColumnType::String));
        assert!(matches!(builder.build(None, no_foreign), Err(OrmError::Schema(_))));

        let mut builder = StructureBuilder::new("users");
        builder.column(Column::new("id", ColumnType::Int).primary_key()).column(Column::new("uid", ColumnType::Int).primary_key());
        assert!(matches!(builder.build(None, no_foreign), Err(OrmError::Schema(_))));
    }

    #[test]
    fn partitions_and_relations() {
        let mut builder = StructureBuilder::new("user_posts");
        builder
            .column(Column::new("id", ColumnType::Int).primary_key())
            .column(Column::new("parent_id", ColumnType::Int))
            .column(Column::new("avatar", ColumnType::Image).not_in_db())
            .relation(Relation::belongs_to("parent_id", "user_posts", "id").named("Parent"))
            .relation(Relation::has_many("id", "user_posts", "parent_id").named("Children"));
        let structure = builder.build(None, no_foreign).unwrap();
        assert_eq!(structure.alias(), "UserPosts");
        assert_eq!(structure.primary_key_name(), "id");
        assert_eq!(structure.db_columns(), ["id", "parent_id"]);
        assert_eq!(structure.virtual_columns(), ["avatar"]);
        assert_eq!(structure.file_columns(), ["avatar"]);
        assert_eq!(structure.column_relations("parent_id")[0].name(), "Parent");
        assert!(matches!(structure.column("missing"), Err(OrmError::InvalidArgument(_))));
        assert!(matches!(structure.relation("Missing"), Err(OrmError::InvalidArgument(_))));
    }

    #[test]
    fn relation_columns_are_checked() {
        let mut builder = StructureBuilder::new("posts");
        builder
            .column(Column::new("id", ColumnType::Int).primary_key())
            .relation(Relation::belongs_to("user_id", "users", "id").named("Author"));
        assert!(matches!(builder.build(None, no_foreign), Err(OrmError::Schema(_))));

        let users = |_: &str| Ok(DeclaredColumns { columns: vec!["id".into()], primary_key: Some("id".into()), autodetect: false });
        let mut builder = StructureBuilder::new("posts");
        builder
            .column(Column::new("id", ColumnType::Int).primary_key())
            .relation(Relation::has_many("id", "users", "id").named("Users"));
        let err = builder.build(None, users).unwrap_err();
        assert!(err.to_string().contains("HAS_MANY"));
    }

    #[test]
    fn autodetect_fills_missing_columns() {
        let connection = MemoryConnection::new("describe").with_description(TableDescription {
            name: "tags".into(),
            schema: None,
            columns: vec![
                ColumnDescription::new("id", "integer").primary_key(),
                ColumnDescription::new("label", "character varying(64)").not_null(),
                ColumnDescription::new("meta", "jsonb"),
            ],
        });
        let mut builder = StructureBuilder::new("tags");
        builder.column(Column::new("label", ColumnType::String).trims_value().disallows_null_values()).autodetect_columns();
        let structure = builder.build(Some(&connection), no_foreign).unwrap();
        assert_eq!(structure.column_names(), vec!["label", "id", "meta"]);
        assert!(structure.column("label").unwrap().is_value_trimming_required());
        assert_eq!(structure.column("meta").unwrap().kind(), ColumnType::Jsonb);
    }
}
