use crate::config::settings;
use crate::connection::{self, Connection};
use crate::error::{OrmError, OrmResult};
use crate::info;
use crate::structure::{DeclaredColumns, StructureBuilder, TableStructure};
use crate::table::Table;
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Static table declaration, submitted with `inventory::submit!`.
pub struct TableDef {
    pub name: &'static str,
    pub schema: Option<&'static str>,
    pub alias: Option<&'static str>,
    /// Named connection, the configured default one when `None`.
    pub connection: Option<&'static str>,
    pub define: fn(&mut StructureBuilder) -> OrmResult<()>,
}

inventory::collect!(TableDef);

type DefineFn = Arc<dyn Fn(&mut StructureBuilder) -> OrmResult<()> + Send + Sync>;

struct TableEntry {
    name: String,
    schema: Option<String>,
    alias: Option<String>,
    connection: Option<String>,
    define: DefineFn,
    structure: OnceCell<Arc<TableStructure>>,
    table: OnceCell<Arc<Table>>,
}

impl TableEntry {
    fn builder(&self) -> OrmResult<StructureBuilder> {
        let mut builder = StructureBuilder::new(&self.name);
        if let Some(schema) = &self.schema {
            builder.schema(schema);
        }
        if let Some(alias) = &self.alias {
            builder.alias(alias);
        }
        (self.define)(&mut builder)?;
        Ok(builder)
    }

    fn connection_name(&self) -> String {
        self.connection.clone().unwrap_or_else(|| settings().default_connection.clone())
    }
}

static TABLES: Lazy<RwLock<HashMap<String, Arc<TableEntry>>>> = Lazy::new(|| {
    let mut tables = HashMap::new();
    for def in inventory::iter::<TableDef> {
        let define = def.define;
        tables.insert(
            def.name.to_string(),
            Arc::new(TableEntry {
                name: def.name.to_string(),
                schema: def.schema.map(|s| s.to_string()),
                alias: def.alias.map(|s| s.to_string()),
                connection: def.connection.map(|s| s.to_string()),
                define: Arc::new(define),
                structure: OnceCell::new(),
                table: OnceCell::new(),
            }),
        );
    }
    info!("Table registry initialized with {} declared tables", tables.len());
    RwLock::new(tables)
});

/// Registers a table at run time. A name can be registered only once.
pub fn register_table<F>(name: &str, connection: Option<&str>, define: F) -> OrmResult<()>
where
    F: Fn(&mut StructureBuilder) -> OrmResult<()> + Send + Sync + 'static,
{
    let mut tables = TABLES.write()?;
    if tables.contains_key(name) {
        return Err(OrmError::BadMethodCall(format!("Table '{}' is already registered", name)));
    }
    tables.insert(
        name.to_string(),
        Arc::new(TableEntry {
            name: name.to_string(),
            schema: None,
            alias: None,
            connection: connection.map(|s| s.to_string()),
            define: Arc::new(define),
            structure: OnceCell::new(),
            table: OnceCell::new(),
        }),
    );
    Ok(())
}

pub fn is_registered(name: &str) -> bool {
    TABLES.read().map(|t| t.contains_key(name)).unwrap_or(false)
}

pub fn registered_tables() -> Vec<String> {
    let mut names = TABLES.read().map(|t| t.keys().cloned().collect::<Vec<_>>()).unwrap_or_default();
    names.sort();
    names
}

fn entry(name: &str) -> OrmResult<Arc<TableEntry>> {
    let tables = TABLES.read()?;
    tables
        .get(name)
        .cloned()
        .ok_or_else(|| OrmError::InvalidArgument(format!("Table '{}' is not registered", name)))
}

/// Columns a table declares, without building its structure.
pub fn declared_columns(name: &str) -> OrmResult<DeclaredColumns> {
    Ok(entry(name)?.builder()?.declared_columns())
}

/// Structure of a registered table, built on first access.
pub fn table_structure(name: &str) -> OrmResult<Arc<TableStructure>> {
    let entry = entry(name)?;
    entry
        .structure
        .get_or_try_init(|| {
            let builder = entry.builder()?;
            let connection: Option<Arc<dyn Connection>> = connection::connection(&entry.connection_name()).ok();
            let structure = builder.build(connection.as_deref(), declared_columns)?;
            info!("Table structure '{}' built with {} columns", structure.name(), structure.column_names().len());
            Ok(Arc::new(structure))
        })
        .cloned()
}

/// Table bound to the connection the table was registered with, created on first access.
pub fn default_table(name: &str) -> OrmResult<Arc<Table>> {
    let entry = entry(name)?;
    entry
        .table
        .get_or_try_init(|| {
            let structure = table_structure(name)?;
            let connection = connection::connection(&entry.connection_name())?;
            Ok(Arc::new(Table::from_structure(structure, connection)))
        })
        .cloned()
}
