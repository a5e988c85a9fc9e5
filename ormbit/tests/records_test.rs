use ormbit::*;
use std::sync::Arc;

fn define_authors(t: &mut StructureBuilder) -> OrmResult<()> {
    t.column(Column::new("id", ColumnType::Int).primary_key().default_value(DbExpr::default_value()));
    t.column(Column::new("name", ColumnType::String).disallows_null_values().trims_value());
    t.column(Column::new("bio", ColumnType::Text));
    t.column(Column::new("status", ColumnType::Enum).allowed_values(["draft", "published"]).default_value("draft"));
    t.relation(Relation::has_one("id", "profiles", "author_id").named("Profile"));
    t.relation(Relation::has_many("id", "books", "author_id").named("Books"));
    Ok(())
}

fn define_books(t: &mut StructureBuilder) -> OrmResult<()> {
    t.column(Column::new("id", ColumnType::Int).primary_key().default_value(DbExpr::default_value()));
    t.column(Column::new("author_id", ColumnType::Int).disallows_null_values());
    t.column(Column::new("title", ColumnType::String).disallows_null_values());
    t.relation(Relation::belongs_to("author_id", "authors", "id").named("Author"));
    Ok(())
}

fn define_profiles(t: &mut StructureBuilder) -> OrmResult<()> {
    t.column(Column::new("id", ColumnType::Int).primary_key().default_value(DbExpr::default_value()));
    t.column(Column::new("author_id", ColumnType::Int));
    t.column(Column::new("website", ColumnType::String));
    Ok(())
}

inventory::submit! {
    TableDef { name: "authors", schema: None, alias: Some("Authors"), connection: None, define: define_authors }
}

inventory::submit! {
    TableDef { name: "books", schema: None, alias: Some("Books"), connection: None, define: define_books }
}

inventory::submit! {
    TableDef { name: "profiles", schema: None, alias: None, connection: None, define: define_profiles }
}

#[derive(Model, Debug, PartialEq)]
struct Author {
    id: Option<i64>,
    name: String,
    bio: Option<String>,
    #[transient]
    book_count: usize,
}

fn authors(connection: MemoryConnection) -> (Arc<Table>, Arc<MemoryConnection>) {
    let connection = Arc::new(connection);
    (Table::with_connection("authors", connection.clone()).unwrap(), connection)
}

fn inserts(connection: &MemoryConnection) -> Vec<Row> {
    connection
        .writes()
        .unwrap()
        .into_iter()
        .filter_map(|statement| match statement {
            Statement::Insert { data, .. } => Some(data),
            _ => None,
        })
        .collect()
}

#[test]
fn insert_then_read_back() {
    let (table, connection) = authors(MemoryConnection::new("insert"));
    let mut record = Record::from_data(table, row! { "name" => "Ann" }, false).unwrap();
    record.save().unwrap();

    let inserted = inserts(&connection);
    assert_eq!(inserted.len(), 1);
    assert!(matches!(inserted[0].get("id"), Some(Value::Expr(expr)) if expr.is_default_placeholder()));
    assert_eq!(inserted[0].get("name"), Some(&Value::from("Ann")));
    assert!(record.get_as::<i64>("id").unwrap() > 0);
    assert!(record.exists_in_db(false).unwrap());
    assert_eq!(connection.statements().unwrap().last(), Some(&Statement::Commit));

    let author = Author::from_record(&record).unwrap();
    assert_eq!(author, Author { id: Some(1), name: "Ann".to_string(), bio: None, book_count: 0 });
}

#[test]
fn update_sends_only_changed_columns() {
    let seeded = MemoryConnection::new("update").with_rows("authors", vec![row! { "id" => 1, "name" => "Ann", "bio" => "poet", "status" => "draft" }]);
    let (table, connection) = authors(seeded);
    let mut record = Record::from_db(table, row! { "id" => 1, "name" => "Ann", "bio" => "poet", "status" => "draft" }).unwrap();
    record.update_value("name", "Bob", false).unwrap();
    record.save().unwrap();

    match &connection.writes().unwrap()[0] {
        Statement::Update { data, conditions, .. } => {
            assert_eq!(data, &row! { "name" => "Bob" });
            assert_eq!(conditions, &Condition::eq("id", 1));
        }
        other => panic!("unexpected statement {:?}", other),
    }
    assert!(record.is_value_from_db("name"));
    assert_eq!(connection.rows("authors").unwrap()[0].get("name"), Some(&Value::from("Bob")));

    record.save().unwrap();
    assert_eq!(connection.writes().unwrap().len(), 1);
}

#[test]
fn validation_blocks_writes() {
    let (table, connection) = authors(MemoryConnection::new("validation"));
    let mut record = Record::from_data(table, row! { "bio" => "no name" }, false).unwrap();
    let err = record.save().unwrap_err();
    let errors = err.validation_errors().unwrap();
    assert_eq!(errors.get("name"), Some(&[ValidationError::ValueCannotBeNull][..]));
    assert!(connection.statements().unwrap().is_empty());
}

#[test]
fn count_with_limit_and_offset() {
    let (table, connection) = authors(MemoryConnection::new("count"));
    connection
        .set_responder(|sql| {
            if sql.starts_with("SELECT COUNT(*)") {
                Ok(vec![row! { "count" => 100 }])
            } else {
                Ok(vec![])
            }
        })
        .unwrap();
    let mut set = table.select(Condition::all()).unwrap();
    set.replace_limit_and_offset(10, 95);
    assert_eq!(set.count().unwrap(), 5);
    assert_eq!(set.total_count().unwrap(), 100);
    assert!(!set.is_fetched());
}

#[test]
fn has_many_cannot_be_contained() {
    let (table, _) = authors(MemoryConnection::new("contain"));
    let mut select = table.query();
    assert!(matches!(select.contain(Contain::new("Books")), Err(OrmError::InvalidArgument(_))));
    select.contain(Contain::new("Profile").columns(&["website"])).unwrap();
    let sql = select.to_sql().unwrap();
    assert!(sql.contains(r#"LEFT JOIN "profiles" AS "Profile""#));
}

#[test]
fn contained_rows_become_related_records() {
    let (table, connection) = authors(MemoryConnection::new("contained"));
    connection
        .push_query_result(vec![
            row! { "id" => 1, "name" => "Ann", "Profile" => row! { "id" => 3, "author_id" => 1, "website" => "ann.example" } },
            row! { "id" => 2, "name" => "Bob", "Profile" => row! { "id" => Value::Null, "author_id" => Value::Null, "website" => Value::Null } },
        ])
        .unwrap();
    let mut set = table.select(Condition::all()).unwrap();
    let ann = set.record(0).unwrap();
    assert!(ann.is_related_loaded("Profile"));
    let website = ann.related("Profile").unwrap().record().unwrap().get_value("website", None).unwrap();
    assert_eq!(website, Value::from("ann.example"));
    let bob = set.record(1).unwrap();
    assert!(bob.related("Profile").unwrap().record().is_none());
    assert_eq!(connection.queries().unwrap().len(), 1);
}

#[test]
fn reused_instance_changes_under_the_caller() {
    let (table, connection) = authors(MemoryConnection::new("reuse"));
    connection.push_query_result(vec![row! { "id" => 1, "name" => "Ann" }, row! { "id" => 2, "name" => "Bob" }]).unwrap();
    let mut set = table.select(Condition::all()).unwrap();
    set.enable_reuse_instance();

    let first: *const Record = set.record(0).unwrap();
    let second: *const Record = set.record(1).unwrap();
    assert_eq!(first, second);
    // the record handed out for row 0 now holds row 1
    let current = set.record(1).unwrap();
    assert_eq!(current.get_value("name", None).unwrap(), Value::from("Bob"));
    assert_eq!(set.fetch().unwrap().rows()[0].get("name"), Some(&Value::from("Ann")));
}

#[test]
fn changing_the_primary_key_detaches_the_record() {
    let (table, _) = authors(MemoryConnection::new("identity"));
    let mut record = Record::from_db(table, row! { "id" => 1, "name" => "Ann", "bio" => "poet" }).unwrap();
    record.update_related("Profile", Value::Row(row! { "id" => 3, "author_id" => 1 }), true).unwrap();
    record.update_values(row! { "id" => 2 }, true).unwrap();
    assert!(!record.is_value_from_db("name"));
    assert!(!record.is_value_from_db("bio"));
    assert!(!record.is_related_loaded("Profile"));
    assert!(record.is_value_from_db("id"));
}

#[test]
fn has_many_relations_are_saved_with_the_parent_key() {
    let seeded = MemoryConnection::new("relations").with_rows("authors", vec![row! { "id" => 7, "name" => "Ann" }]);
    let (table, connection) = authors(seeded);
    let mut record = Record::from_db(table, row! { "id" => 7, "name" => "Ann" }).unwrap();
    record
        .set("Books", Value::Rows(vec![row! { "title" => "First" }, row! { "title" => "Second" }]))
        .unwrap();
    record.save_relations(&["Books"]).unwrap();

    let stored = connection.rows("books").unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|book| book.get("author_id") == Some(&Value::Int(7))));
    let books = record.related("Books").unwrap().records().unwrap();
    assert!(books.record(0).unwrap().exists_in_db(false).unwrap());
}

#[test]
fn injected_books_avoid_a_query_per_author() {
    let (table, connection) = authors(MemoryConnection::new("inject"));
    connection.push_query_result(vec![row! { "id" => 1, "name" => "Ann" }, row! { "id" => 2, "name" => "Bob" }]).unwrap();
    connection
        .push_query_result(vec![
            row! { "id" => 10, "author_id" => 2, "title" => "Tides" },
            row! { "id" => 11, "author_id" => 2, "title" => "Rivers" },
        ])
        .unwrap();
    let mut set = table.select(Condition::all()).unwrap();
    set.inject_has_many("Books", None).unwrap();
    let exported = set
        .to_arrays(&Projection::new().columns(&["name"]).relation("Books", Projection::new().columns(&["title"])))
        .unwrap();
    assert_eq!(
        exported,
        vec![
            row! { "name" => "Ann", "Books" => Vec::<Row>::new() },
            row! { "name" => "Bob", "Books" => vec![row! { "title" => "Tides" }, row! { "title" => "Rivers" }] },
        ]
    );
    assert_eq!(connection.queries().unwrap().len(), 2);
}

#[test]
fn external_transactions_are_not_committed() {
    let (table, connection) = authors(MemoryConnection::new("transaction"));
    table.begin_transaction().unwrap();
    let mut record = Record::from_data(table.clone(), row! { "name" => "Ann" }, false).unwrap();
    record.save().unwrap();
    assert!(table.in_transaction());
    table.rollback_transaction().unwrap();
    assert!(connection.rows("authors").unwrap().is_empty());
}
