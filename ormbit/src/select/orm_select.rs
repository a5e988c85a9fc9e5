use crate::error::{OrmError, OrmResult};
use crate::relation::RelationType;
use crate::select::condition::Condition;
use crate::select::db_select::{DbSelect, Direction, NullsPosition, OrderBy, OrderTarget, SelectColumn};
use crate::select::join::JoinType;
use crate::structure::TableStructure;
use crate::table::Table;
use crate::value::{DbExpr, Row, Value};
use indexmap::IndexMap;
use std::sync::Arc;

/// Eager loading request for a HAS_ONE or BELONGS_TO relation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contain {
    pub relation: String,
    /// Foreign columns to project, all DB columns of the foreign table when `None`.
    pub columns: Option<Vec<String>>,
    pub join_type: Option<JoinType>,
    /// Merged with the relation's own join conditions.
    pub conditions: Option<Condition>,
    pub nested: Vec<Contain>,
}

impl Contain {
    pub fn new(relation: &str) -> Self {
        Contain { relation: relation.to_string(), ..Default::default() }
    }

    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn conditions(mut self, conditions: Condition) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn contain(mut self, nested: Contain) -> Self {
        self.nested.push(nested);
        self
    }
}

/// Select bound to a table: column names and relation paths are checked against table structures.
#[derive(Debug, Clone)]
pub struct OrmSelect {
    table: Arc<Table>,
    select: DbSelect,
    expression_aliases: Vec<String>,
}

impl OrmSelect {
    pub fn new(table: Arc<Table>) -> Self {
        let structure = table.structure();
        let mut select = DbSelect::new(table.connection().clone(), &structure.qualified_name(), structure.alias());
        select.columns(structure.db_columns().iter().map(|c| SelectColumn::Column(c.clone())).collect());
        OrmSelect { table, select, expression_aliases: vec![] }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn db_select(&self) -> &DbSelect {
        &self.select
    }

    /// Replaces the selected main table columns; `*` stands for every DB column.
    pub fn columns<S: AsRef<str>>(&mut self, columns: &[S]) -> OrmResult<&mut Self> {
        let structure = self.table.structure();
        let mut selected = vec![];
        for column in columns.iter().map(|c| c.as_ref()) {
            if column == "*" {
                selected.extend(structure.db_columns().iter().map(|c| SelectColumn::Column(c.clone())));
                continue;
            }
            if !structure.column(column)?.is_exists_in_db() {
                return Err(OrmError::InvalidArgument(format!("Column '{}' does not exist in the database table '{}'", column, structure.name())));
            }
            selected.push(SelectColumn::Column(column.to_string()));
        }
        self.select.columns(selected);
        self.expression_aliases.clear();
        Ok(self)
    }

    pub fn column_expr(&mut self, expr: DbExpr, alias: &str) -> &mut Self {
        self.select.add_column(SelectColumn::Expr { expr, alias: alias.to_string() });
        self.expression_aliases.push(alias.to_string());
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.select.distinct(distinct);
        self
    }

    pub fn where_(&mut self, conditions: Condition) -> OrmResult<&mut Self> {
        self.check_references(&conditions)?;
        self.select.where_(conditions);
        Ok(self)
    }

    pub fn and_where(&mut self, conditions: Condition) -> OrmResult<&mut Self> {
        self.check_references(&conditions)?;
        self.select.and_where(conditions);
        Ok(self)
    }

    pub fn conditions(&self) -> &Condition {
        self.select.conditions()
    }

    pub fn having(&mut self, conditions: Condition) -> OrmResult<&mut Self> {
        self.check_references(&conditions)?;
        self.select.having(conditions);
        Ok(self)
    }

    pub fn group_by<S: AsRef<str>>(&mut self, columns: &[S]) -> OrmResult<&mut Self> {
        for column in columns {
            self.check_reference(column.as_ref())?;
        }
        self.select.group_by(columns);
        Ok(self)
    }

    pub fn order_by(&mut self, column: &str, direction: Direction) -> OrmResult<&mut Self> {
        self.check_reference(column)?;
        self.select.add_order_by(OrderBy::column(column, direction));
        Ok(self)
    }

    pub fn order_by_nulls(&mut self, column: &str, direction: Direction, nulls: NullsPosition) -> OrmResult<&mut Self> {
        self.check_reference(column)?;
        self.select.add_order_by(OrderBy::column(column, direction).nulls(nulls));
        Ok(self)
    }

    pub fn order_by_expr(&mut self, expr: DbExpr, direction: Direction) -> &mut Self {
        self.select.add_order_by(OrderBy::expr(expr, direction));
        self
    }

    pub fn replace_order(&mut self, order: Vec<OrderBy>) -> OrmResult<&mut Self> {
        for item in &order {
            if let OrderTarget::Column(column) = &item.target {
                self.check_reference(column)?;
            }
        }
        self.select.order_by(order);
        Ok(self)
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.select.limit(limit);
        self
    }

    pub fn offset(&mut self, offset: usize) -> &mut Self {
        self.select.offset(offset);
        self
    }

    pub fn get_limit(&self) -> usize {
        self.select.get_limit()
    }

    pub fn get_offset(&self) -> usize {
        self.select.get_offset()
    }

    /// Joins the requested relations, recursing into nested requests.
    pub fn contain(&mut self, contain: Contain) -> OrmResult<&mut Self> {
        let structure = self.table.structure().clone();
        let main = structure.alias().to_string();
        self.resolve_contain(&structure, &main, &contain)?;
        Ok(self)
    }

    fn resolve_contain(&mut self, structure: &TableStructure, local_path: &str, contain: &Contain) -> OrmResult<()> {
        let relation = structure.relation(&contain.relation)?;
        let path = self.child_path(local_path, relation.name());
        let foreign = self.table.sibling(relation.foreign_table())?;
        let foreign_structure = foreign.structure();

        let columns = match &contain.columns {
            Some(columns) => {
                for column in columns {
                    if !foreign_structure.column(column)?.is_exists_in_db() {
                        return Err(OrmError::InvalidArgument(format!("Column '{}' of relation '{}' is not stored in the database", column, path)));
                    }
                }
                columns.clone()
            }
            None => foreign_structure.db_columns().to_vec(),
        };
        let mut join = relation.to_join_config(&path, local_path, foreign_structure.schema())?.columns(&columns);
        if let Some(join_type) = contain.join_type {
            join = join.join_type(join_type);
        }
        if let Some(extra) = &contain.conditions {
            let merged = match join.conditions.take() {
                Some(existing) => existing.and(extra.clone()),
                None => extra.clone(),
            };
            join = join.conditions(Some(merged));
        }
        self.select.join(join)?;
        for nested in &contain.nested {
            self.resolve_contain(foreign_structure, &path, nested)?;
        }
        Ok(())
    }

    fn child_path(&self, local_path: &str, relation: &str) -> String {
        if local_path == self.select.alias() {
            relation.to_string()
        } else {
            format!("{}.{}", local_path, relation)
        }
    }

    /// Joins the relation path without projecting its columns, for filters on related tables.
    fn ensure_join(&mut self, path: &str) -> OrmResult<Arc<TableStructure>> {
        let mut structure = self.table.structure().clone();
        let mut local_path = self.select.alias().to_string();
        for name in path.split('.') {
            let relation = structure.relation(name)?.clone();
            if relation.kind() == RelationType::HasMany {
                return Err(OrmError::InvalidArgument(format!(
                    "Relation '{}' is HAS_MANY and cannot be used in conditions of a single row select",
                    name
                )));
            }
            let current = self.child_path(&local_path, name);
            let foreign = self.table.sibling(relation.foreign_table())?;
            if !self.select.has_join(&current) {
                let join = relation.to_join_config(&current, &local_path, foreign.structure().schema())?;
                self.select.join(join)?;
            }
            structure = foreign.structure().clone();
            local_path = current;
        }
        Ok(structure)
    }

    fn check_reference(&mut self, reference: &str) -> OrmResult<()> {
        match reference.rsplit_once('.') {
            Some((path, column)) => {
                let structure = self.ensure_join(path)?;
                structure.column(column).map(|_| ())
            }
            None if self.expression_aliases.iter().any(|a| a == reference) => Ok(()),
            None => self.table.structure().column(reference).map(|_| ()),
        }
    }

    fn check_references(&mut self, conditions: &Condition) -> OrmResult<()> {
        let references: Vec<String> = conditions.referenced_columns().into_iter().map(|c| c.to_string()).collect();
        for reference in references {
            self.check_reference(&reference)?;
        }
        Ok(())
    }

    pub fn to_sql(&self) -> OrmResult<String> {
        self.select.to_sql()
    }

    pub fn fetch_many(&self) -> OrmResult<Vec<Row>> {
        self.select.fetch_many()
    }

    pub fn fetch_one(&self) -> OrmResult<Option<Row>> {
        self.select.fetch_one()
    }

    pub fn fetch_column(&self) -> OrmResult<Vec<Value>> {
        self.select.fetch_column()
    }

    pub fn fetch_assoc(&self, key_column: &str) -> OrmResult<IndexMap<String, Row>> {
        self.select.fetch_assoc(key_column)
    }

    pub fn fetch_value(&self, expr: DbExpr) -> OrmResult<Value> {
        self.select.fetch_value(expr)
    }

    pub fn fetch_count(&self, ignore_outer_joins: bool) -> OrmResult<usize> {
        self.select.fetch_count(ignore_outer_joins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnType};
    use crate::connection::MemoryConnection;
    use crate::registry::register_table;
    use crate::relation::Relation;

    fn tables() -> (String, String) {
        let users = format!("users_{}", rand::random::<u32>());
        let profiles = format!("profiles_{}", rand::random::<u32>());
        let profiles_name = profiles.clone();
        let users_name = users.clone();
        register_table(&users, None, move |t| {
            t.alias("Users");
            t.column(Column::new("id", ColumnType::Int).primary_key());
            t.column(Column::new("name", ColumnType::String));
            t.column(Column::new("parent_id", ColumnType::Int));
            t.column(Column::new("password", ColumnType::Password).private());
            t.column(Column::new("avatar", ColumnType::Image).not_in_db());
            t.relation(Relation::belongs_to("parent_id", &users_name, "id").named("Parent"));
            t.relation(Relation::has_one("id", &profiles_name, "user_id").named("Profile"));
            t.relation(Relation::has_many("id", &users_name, "parent_id").named("Children"));
            Ok(())
        })
        .unwrap();
        register_table(&profiles, None, |t| {
            t.alias("Profiles");
            t.column(Column::new("id", ColumnType::Int).primary_key());
            t.column(Column::new("user_id", ColumnType::Int));
            t.column(Column::new("bio", ColumnType::Text));
            Ok(())
        })
        .unwrap();
        (users, profiles)
    }

    fn users_select() -> OrmSelect {
        let (users, _) = tables();
        let table = Table::with_connection(&users, Arc::new(MemoryConnection::new("orm_select"))).unwrap();
        OrmSelect::new(table)
    }

    #[test]
    fn selects_db_columns_by_default() {
        let select = users_select();
        let sql = select.to_sql().unwrap();
        assert!(sql.contains(r#""Users"."password" AS "_Users__password""#));
        assert!(!sql.contains("avatar"));
    }

    #[test]
    fn validates_column_names() {
        let mut select = users_select();
        assert!(matches!(select.columns(&["ghost"]), Err(OrmError::InvalidArgument(_))));
        assert!(matches!(select.columns(&["avatar"]), Err(OrmError::InvalidArgument(_))));
        assert!(select.where_(Condition::eq("ghost", 1)).is_err());
        select.columns(&["id", "name"]).unwrap();
        assert!(!select.to_sql().unwrap().contains("password"));
    }

    #[test]
    fn contains_nest_and_reject_has_many() {
        let mut select = users_select();
        select
            .contain(Contain::new("Parent").columns(&["name"]).contain(Contain::new("Profile").join_type(JoinType::Inner)))
            .unwrap();
        let sql = select.to_sql().unwrap();
        assert!(sql.contains(r#""Parent"."name" AS "_Parent__name""#));
        assert!(sql.contains(r#"INNER JOIN"#));
        assert!(sql.contains(r#"AS "Parent_Profile" ON ("Parent"."id" = "Parent_Profile"."user_id")"#));
        assert!(sql.contains(r#""Parent_Profile"."bio" AS "_Parent_Profile__bio""#));

        let err = select.contain(Contain::new("Children")).unwrap_err();
        assert!(err.to_string().contains("HAS_MANY"));
    }

    #[test]
    fn conditions_join_referenced_relations() {
        let mut select = users_select();
        select.where_(Condition::eq("Parent.name", "Ann")).unwrap();
        let sql = select.to_sql().unwrap();
        assert!(sql.contains(r#"LEFT JOIN"#));
        assert!(sql.contains(r#"WHERE "Parent"."name" = 'Ann'"#));
        assert!(!sql.contains("_Parent__name"));
        assert!(select.where_(Condition::eq("Children.name", "Bob")).is_err());
    }
}
