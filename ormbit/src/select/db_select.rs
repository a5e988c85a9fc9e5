use crate::config::settings;
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::select::alias::AliasRegistry;
use crate::select::condition::Condition;
use crate::select::join::JoinConfig;
use crate::value::{DbExpr, Row, Value};
use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// Every column of the main table, returned under its own name.
    All,
    Column(String),
    Expr { expr: DbExpr, alias: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsPosition {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    Column(String),
    Expr(DbExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub target: OrderTarget,
    pub direction: Direction,
    pub nulls: Option<NullsPosition>,
}

impl OrderBy {
    pub fn column(column: &str, direction: Direction) -> Self {
        OrderBy { target: OrderTarget::Column(column.to_string()), direction, nulls: None }
    }

    pub fn expr(expr: DbExpr, direction: Direction) -> Self {
        OrderBy { target: OrderTarget::Expr(expr), direction, nulls: None }
    }

    pub fn nulls(mut self, position: NullsPosition) -> Self {
        self.nulls = Some(position);
        self
    }
}

#[derive(Clone, Copy)]
struct RenderOptions {
    count: bool,
    skip_unreferenced_outer_joins: bool,
}

/// SQL SELECT over one table plus flattened joins. Column references are either plain column
/// names of the main table or dotted relation paths (`Parent.name`, `Parent.Grandparent.name`).
#[derive(Clone)]
pub struct DbSelect {
    connection: Arc<dyn Connection>,
    table: String,
    alias: String,
    columns: Vec<SelectColumn>,
    distinct: bool,
    conditions: Condition,
    having: Condition,
    group_by: Vec<String>,
    order_by: Vec<OrderBy>,
    limit: usize,
    offset: usize,
    joins: IndexMap<String, JoinConfig>,
    aliases: RefCell<AliasRegistry>,
}

impl std::fmt::Debug for DbSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSelect")
            .field("table", &self.table)
            .field("alias", &self.alias)
            .field("columns", &self.columns)
            .field("conditions", &self.conditions)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("joins", &self.joins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DbSelect {
    /// `table` may be schema-qualified, `alias` names the main table inside the query.
    pub fn new(connection: Arc<dyn Connection>, table: &str, alias: &str) -> Self {
        DbSelect {
            connection,
            table: table.to_string(),
            alias: alias.to_string(),
            columns: vec![SelectColumn::All],
            distinct: false,
            conditions: Condition::all(),
            having: Condition::all(),
            group_by: vec![],
            order_by: vec![],
            limit: 0,
            offset: 0,
            joins: IndexMap::new(),
            aliases: RefCell::new(AliasRegistry::new(settings().alias_max_length)),
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn columns(&mut self, columns: Vec<SelectColumn>) -> &mut Self {
        self.columns = columns;
        self
    }

    pub fn selected_columns(&self) -> &[SelectColumn] {
        &self.columns
    }

    pub fn add_column(&mut self, column: SelectColumn) -> &mut Self {
        self.columns.retain(|c| c != &column);
        self.columns.push(column);
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn where_(&mut self, conditions: Condition) -> &mut Self {
        self.conditions = conditions;
        self
    }

    pub fn and_where(&mut self, conditions: Condition) -> &mut Self {
        let current = std::mem::take(&mut self.conditions);
        self.conditions = current.and(conditions);
        self
    }

    pub fn conditions(&self) -> &Condition {
        &self.conditions
    }

    pub fn having(&mut self, conditions: Condition) -> &mut Self {
        self.having = conditions;
        self
    }

    pub fn group_by<S: AsRef<str>>(&mut self, columns: &[S]) -> &mut Self {
        self.group_by = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn order_by(&mut self, order: Vec<OrderBy>) -> &mut Self {
        self.order_by = order;
        self
    }

    pub fn add_order_by(&mut self, order: OrderBy) -> &mut Self {
        self.order_by.push(order);
        self
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// 0 means no limit.
    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = limit;
        self
    }

    pub fn offset(&mut self, offset: usize) -> &mut Self {
        self.offset = offset;
        self
    }

    pub fn get_limit(&self) -> usize {
        self.limit
    }

    pub fn get_offset(&self) -> usize {
        self.offset
    }

    /// Adds or replaces the join registered under `join.path`.
    pub fn join(&mut self, join: JoinConfig) -> OrmResult<&mut Self> {
        if join.local_path != self.alias && !self.joins.contains_key(&join.local_path) {
            return Err(OrmError::InvalidArgument(format!(
                "Join '{}' is attached to unknown path '{}'",
                join.path, join.local_path
            )));
        }
        self.joins.insert(join.path.clone(), join);
        Ok(self)
    }

    pub fn has_join(&self, path: &str) -> bool {
        self.joins.contains_key(path)
    }

    pub fn joins(&self) -> impl Iterator<Item = &JoinConfig> {
        self.joins.values()
    }

    fn table_sql_alias(&self, path: &str) -> String {
        if path == self.alias {
            self.alias.clone()
        } else {
            self.aliases.borrow_mut().table_alias(path)
        }
    }

    /// Quoted `"TableAlias"."column"` for a column reference.
    pub fn resolve_column(&self, reference: &str) -> OrmResult<String> {
        let (path, column) = match reference.rsplit_once('.') {
            Some((path, column)) => (path, column),
            None => (self.alias.as_str(), reference),
        };
        if path != self.alias && !self.joins.contains_key(path) {
            return Err(OrmError::InvalidArgument(format!("Column reference '{}' points to an unknown relation '{}'", reference, path)));
        }
        let table_alias = self.table_sql_alias(path);
        Ok(format!("{}.{}", self.connection.quote_identifier(&table_alias), self.connection.quote_identifier(column)))
    }

    fn resolve_join_column(&self, join: &JoinConfig, reference: &str) -> OrmResult<String> {
        if reference.contains('.') {
            self.resolve_column(reference)
        } else {
            self.resolve_column(&format!("{}.{}", join.path, reference))
        }
    }

    /// Join paths a count query cannot drop: referenced by filters, inner joins, and their parents.
    fn required_join_paths(&self) -> IndexSet<String> {
        let mut required = IndexSet::new();
        let referenced = self
            .conditions
            .referenced_columns()
            .into_iter()
            .chain(self.having.referenced_columns())
            .filter_map(|c| c.rsplit_once('.').map(|(path, _)| path.to_string()));
        for path in referenced {
            required.insert(path);
        }
        for join in self.joins.values().filter(|j| !j.join_type.is_outer()) {
            required.insert(join.path.clone());
        }
        let mut pending: Vec<String> = required.iter().cloned().collect();
        while let Some(path) = pending.pop() {
            if let Some(join) = self.joins.get(&path) {
                if join.local_path != self.alias && required.insert(join.local_path.clone()) {
                    pending.push(join.local_path.clone());
                }
            }
        }
        required
    }

    fn render_columns(&self) -> OrmResult<String> {
        let quote = |s: &str| self.connection.quote_identifier(s);
        let main_alias = quote(&self.alias);
        let mut parts = vec![];
        if self.columns.is_empty() {
            parts.push(format!("{}.*", main_alias));
        }
        for column in &self.columns {
            match column {
                SelectColumn::All => parts.push(format!("{}.*", main_alias)),
                SelectColumn::Column(name) => {
                    let alias = self.aliases.borrow_mut().column_alias(&self.alias, name);
                    parts.push(format!("{}.{} AS {}", main_alias, quote(name), quote(&alias)));
                }
                SelectColumn::Expr { expr, alias } => parts.push(format!("{} AS {}", expr.sql(), quote(alias))),
            }
        }
        for join in self.joins.values() {
            let table_alias = quote(&self.table_sql_alias(&join.path));
            for name in &join.columns {
                let alias = self.aliases.borrow_mut().column_alias(&join.path, name);
                parts.push(format!("{}.{} AS {}", table_alias, quote(name), quote(&alias)));
            }
        }
        Ok(parts.join(", "))
    }

    fn render_joins(&self, only: Option<&IndexSet<String>>) -> OrmResult<String> {
        let quote = |s: &str| self.connection.quote_identifier(s);
        let mut sql = String::new();
        for join in self.joins.values() {
            if only.is_some_and(|paths| !paths.contains(&join.path)) {
                continue;
            }
            let foreign_table = match &join.foreign_schema {
                Some(schema) => format!("{}.{}", schema, join.foreign_table),
                None => join.foreign_table.clone(),
            };
            let local = self.resolve_column(&if join.local_path == self.alias {
                join.local_column.clone()
            } else {
                format!("{}.{}", join.local_path, join.local_column)
            })?;
            let foreign = self.resolve_join_column(join, &join.foreign_column)?;
            let mut on = format!("{} = {}", local, foreign);
            if let Some(extra) = &join.conditions {
                let extra_sql = extra.to_sql(self.connection.as_ref(), &|c: &str| self.resolve_join_column(join, c))?;
                if !extra_sql.is_empty() {
                    on = format!("{} AND ({})", on, extra_sql);
                }
            }
            sql.push_str(&format!(
                " {} {} AS {} ON ({})",
                join.join_type.sql(),
                quote(&foreign_table),
                quote(&self.table_sql_alias(&join.path)),
                on
            ));
        }
        Ok(sql)
    }

    fn render(&self, options: RenderOptions) -> OrmResult<String> {
        let quote = |s: &str| self.connection.quote_identifier(s);
        let resolve = |c: &str| self.resolve_column(c);
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if options.count {
            sql.push_str("COUNT(*) AS \"count\"");
        } else {
            sql.push_str(&self.render_columns()?);
        }
        sql.push_str(&format!(" FROM {} AS {}", quote(&self.table), quote(&self.alias)));
        let required = options.skip_unreferenced_outer_joins.then(|| self.required_join_paths());
        sql.push_str(&self.render_joins(required.as_ref())?);

        let where_sql = self.conditions.to_sql(self.connection.as_ref(), &resolve)?;
        if !where_sql.is_empty() {
            sql.push_str(&format!(" WHERE {}", where_sql));
        }
        if !self.group_by.is_empty() {
            let columns = self.group_by.iter().map(|c| resolve(c.as_str())).collect::<OrmResult<Vec<_>>>()?;
            sql.push_str(&format!(" GROUP BY {}", columns.join(", ")));
        }
        let having_sql = self.having.to_sql(self.connection.as_ref(), &resolve)?;
        if !having_sql.is_empty() {
            sql.push_str(&format!(" HAVING {}", having_sql));
        }
        if options.count {
            return Ok(sql);
        }
        if !self.order_by.is_empty() {
            let mut parts = vec![];
            for order in &self.order_by {
                let target = match &order.target {
                    OrderTarget::Column(column) => resolve(column)?,
                    OrderTarget::Expr(expr) => expr.sql().to_string(),
                };
                let direction = match order.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                let nulls = match order.nulls {
                    Some(NullsPosition::First) => " NULLS FIRST",
                    Some(NullsPosition::Last) => " NULLS LAST",
                    None => "",
                };
                parts.push(format!("{} {}{}", target, direction, nulls));
            }
            sql.push_str(&format!(" ORDER BY {}", parts.join(", ")));
        }
        if self.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", self.limit));
        }
        if self.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", self.offset));
        }
        Ok(sql)
    }

    pub fn to_sql(&self) -> OrmResult<String> {
        self.render(RenderOptions { count: false, skip_unreferenced_outer_joins: false })
    }

    /// Counting query ignoring limit, offset and ordering. Grouped or distinct selects are
    /// counted through a subquery.
    pub fn count_sql(&self, ignore_outer_joins: bool) -> OrmResult<String> {
        if self.distinct || !self.group_by.is_empty() {
            let mut inner = self.clone();
            inner.limit = 0;
            inner.offset = 0;
            inner.order_by.clear();
            return Ok(format!("SELECT COUNT(*) AS \"count\" FROM ({}) AS \"_count\"", inner.to_sql()?));
        }
        self.render(RenderOptions { count: true, skip_unreferenced_outer_joins: ignore_outer_joins })
    }

    /// Maps aliased result columns back: main table columns to their names, joined columns
    /// into nested rows keyed by relation path segments.
    pub fn normalize_row(&self, raw: Row) -> Row {
        let aliases = self.aliases.borrow();
        let mut out = Row::new();
        for (key, value) in raw {
            match aliases.resolve_column_alias(&key) {
                Some((path, column)) if path == self.alias => {
                    out.insert(column.to_string(), value);
                }
                Some((path, column)) => {
                    let segments: Vec<&str> = path.split('.').collect();
                    insert_nested(&mut out, &segments, column, value);
                }
                None => {
                    out.insert(key, value);
                }
            }
        }
        out
    }

    pub fn fetch_many(&self) -> OrmResult<Vec<Row>> {
        let sql = self.to_sql()?;
        log::debug!("fetch_many: {}", sql);
        let rows = self.connection.query(&sql)?;
        Ok(rows.into_iter().map(|row| self.normalize_row(row)).collect())
    }

    pub fn fetch_one(&self) -> OrmResult<Option<Row>> {
        let mut select = self.clone();
        select.limit = 1;
        Ok(select.fetch_many()?.into_iter().next())
    }

    /// First selected value of every row.
    pub fn fetch_column(&self) -> OrmResult<Vec<Value>> {
        let sql = self.to_sql()?;
        log::debug!("fetch_column: {}", sql);
        let rows = self.connection.query(&sql)?;
        Ok(rows.into_iter().filter_map(|row| row.into_iter().next().map(|(_, v)| v)).collect())
    }

    /// Rows keyed by the value of `key_column`; later duplicates win.
    pub fn fetch_assoc(&self, key_column: &str) -> OrmResult<IndexMap<String, Row>> {
        let mut out = IndexMap::new();
        for row in self.fetch_many()? {
            let key = row
                .get(key_column)
                .ok_or_else(|| OrmError::InvalidArgument(format!("Column '{}' is not part of the selected rows", key_column)))?
                .key_string();
            out.insert(key, row);
        }
        Ok(out)
    }

    /// Single value of `expr`, `Value::Null` when nothing matched.
    pub fn fetch_value(&self, expr: DbExpr) -> OrmResult<Value> {
        let mut select = self.clone();
        select.columns = vec![SelectColumn::Expr { expr, alias: "value".to_string() }];
        select.joins.values_mut().for_each(|j| j.columns.clear());
        Ok(select.fetch_column()?.into_iter().next().unwrap_or(Value::Null))
    }

    pub fn fetch_count(&self, ignore_outer_joins: bool) -> OrmResult<usize> {
        let sql = self.count_sql(ignore_outer_joins)?;
        log::debug!("fetch_count: {}", sql);
        let rows = self.connection.query(&sql)?;
        let count = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|(_, value)| value)
            .unwrap_or(Value::Int(0));
        count
            .as_i64()
            .and_then(|c| usize::try_from(c).ok())
            .ok_or_else(|| OrmError::UnexpectedValue(format!("Count query returned {}", count)))
    }
}

fn insert_nested(row: &mut Row, path: &[&str], column: &str, value: Value) {
    match path.split_first() {
        None => {
            row.insert(column.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = row.entry(head.to_string()).or_insert_with(|| Value::Row(Row::new()));
            if let Value::Row(inner) = entry {
                insert_nested(inner, rest, column, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryConnection;
    use crate::row;
    use crate::select::join::JoinType;

    fn select(connection: Arc<MemoryConnection>) -> DbSelect {
        let mut select = DbSelect::new(connection, "users", "Users");
        select.columns(vec![SelectColumn::Column("id".into()), SelectColumn::Column("name".into())]);
        select
    }

    fn with_parent(select: &mut DbSelect) {
        select
            .join(JoinConfig::new("Parent", "Users", "parent_id", "users", "id").columns(&["name"]))
            .unwrap();
    }

    #[test]
    fn renders_full_query() {
        let connection = Arc::new(MemoryConnection::new("select"));
        let mut select = select(connection);
        with_parent(&mut select);
        select
            .where_(Condition::eq("Parent.name", "Ann"))
            .add_order_by(OrderBy::column("name", Direction::Desc).nulls(NullsPosition::Last))
            .limit(10)
            .offset(20);
        assert_eq!(
            select.to_sql().unwrap(),
            r#"SELECT "Users"."id" AS "_Users__id", "Users"."name" AS "_Users__name", "Parent"."name" AS "_Parent__name" FROM "users" AS "Users" LEFT JOIN "users" AS "Parent" ON ("Users"."parent_id" = "Parent"."id") WHERE "Parent"."name" = 'Ann' ORDER BY "Users"."name" DESC NULLS LAST LIMIT 10 OFFSET 20"#
        );
    }

    #[test]
    fn join_conditions_are_scoped_to_the_joined_table() {
        let connection = Arc::new(MemoryConnection::new("select"));
        let mut select = select(connection);
        select
            .join(
                JoinConfig::new("Parent", "Users", "parent_id", "users", "id")
                    .join_type(JoinType::Inner)
                    .conditions(Some(Condition::eq("is_active", true))),
            )
            .unwrap();
        let sql = select.to_sql().unwrap();
        assert!(sql.contains(r#"INNER JOIN "users" AS "Parent" ON ("Users"."parent_id" = "Parent"."id" AND ("Parent"."is_active" = TRUE))"#));
    }

    #[test]
    fn unknown_paths_are_rejected() {
        let connection = Arc::new(MemoryConnection::new("select"));
        let mut select = select(connection);
        select.where_(Condition::eq("Ghost.name", "x"));
        assert!(matches!(select.to_sql(), Err(OrmError::InvalidArgument(_))));
        assert!(select.join(JoinConfig::new("A.B", "A", "x", "t", "id")).is_err());
    }

    #[test]
    fn count_drops_unreferenced_outer_joins() {
        let connection = Arc::new(MemoryConnection::new("select"));
        let mut select = select(connection);
        with_parent(&mut select);
        select.limit(10).offset(5);
        assert_eq!(select.count_sql(true).unwrap(), r#"SELECT COUNT(*) AS "count" FROM "users" AS "Users""#);
        assert!(select.count_sql(false).unwrap().contains("LEFT JOIN"));

        select.where_(Condition::is_not_null("Parent.name"));
        assert!(select.count_sql(true).unwrap().contains("LEFT JOIN"));

        select.distinct(true);
        assert!(select.count_sql(true).unwrap().starts_with(r#"SELECT COUNT(*) AS "count" FROM (SELECT DISTINCT"#));
    }

    #[test]
    fn long_aliases_are_shortened_and_mapped_back() {
        let connection = Arc::new(MemoryConnection::new("select"));
        let mut select = DbSelect::new(connection.clone(), "users", "Users");
        let long_path = "VeryLongRelationNameNumberOne.AnotherQuiteLongRelationName";
        select.columns(vec![SelectColumn::Column("id".into())]);
        select.join(JoinConfig::new("VeryLongRelationNameNumberOne", "Users", "a_id", "a", "id")).unwrap();
        select.join(JoinConfig::new(long_path, "VeryLongRelationNameNumberOne", "b_id", "b", "id").columns(&["title"])).unwrap();
        let sql = select.to_sql().unwrap();
        let short = select.aliases.borrow_mut().column_alias(long_path, "title");
        assert!(short.starts_with('_') && short.len() == 17);
        assert!(sql.contains(&short));

        let raw = row! { "_Users__id" => 1, short.as_str() => "Title" };
        let normalized = select.normalize_row(raw);
        assert_eq!(normalized.get("id"), Some(&Value::Int(1)));
        let nested = normalized.get("VeryLongRelationNameNumberOne").and_then(|v| v.as_row()).unwrap();
        let inner = nested.get("AnotherQuiteLongRelationName").and_then(|v| v.as_row()).unwrap();
        assert_eq!(inner.get("title"), Some(&Value::from("Title")));
    }

    #[test]
    fn fetches_through_the_connection() {
        let connection = Arc::new(MemoryConnection::new("select"));
        let select = select(connection.clone());
        connection
            .push_query_result(vec![row! { "_Users__id" => 1, "_Users__name" => "Ann" }, row! { "_Users__id" => 2, "_Users__name" => "Bob" }])
            .unwrap();
        let assoc = select.fetch_assoc("name").unwrap();
        assert_eq!(assoc.keys().collect::<Vec<_>>(), vec!["Ann", "Bob"]);

        connection.push_query_result(vec![row! { "count" => 42 }]).unwrap();
        assert_eq!(select.fetch_count(true).unwrap(), 42);

        assert_eq!(select.fetch_value(DbExpr::new("MAX(id)")).unwrap(), Value::Null);
        assert!(connection.queries().unwrap().last().unwrap().starts_with(r#"SELECT MAX(id) AS "value" FROM "users""#));
    }
}
