use crate::error::{OrmError, OrmResult};
use crate::record::{Record, Related};
use crate::value::{Row, Value};

/// What [`Record::to_array`] exports.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    columns: Option<Vec<String>>,
    relations: Vec<(String, Projection)>,
    load_missing_relations: bool,
    with_files: bool,
}

impl Default for Projection {
    fn default() -> Self {
        Projection { columns: None, relations: vec![], load_missing_relations: false, with_files: true }
    }
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns or `<column>_as_<format>` keys to export; every column when not called.
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.as_ref().to_string()).collect());
        self
    }

    pub fn relation(mut self, name: &str, projection: Projection) -> Self {
        self.relations.push((name.to_string(), projection));
        self
    }

    pub fn load_missing_relations(mut self, load: bool) -> Self {
        self.load_missing_relations = load;
        self
    }

    pub fn with_files(mut self, with_files: bool) -> Self {
        self.with_files = with_files;
        self
    }
}

fn exported(value: Value) -> Value {
    match value {
        Value::Expr(_) => Value::Null,
        other => other,
    }
}

/// Structured info of a file column: a stored path becomes `{path, name, extension}`,
/// payload rows are kept as they are.
fn file_info(value: Value) -> Value {
    match value {
        Value::Text(path) => {
            let name = path.rsplit(['/', '\\']).next().unwrap_or_default().to_string();
            let extension = match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Value::from(ext.to_lowercase()),
                _ => Value::Null,
            };
            let mut info = Row::new();
            info.insert("path".to_string(), Value::Text(path));
            info.insert("name".to_string(), Value::Text(name));
            info.insert("extension".to_string(), extension);
            Value::Row(info)
        }
        other => exported(other),
    }
}

impl Record {
    /// Plain row of the projected columns and relations. Private columns are never exported
    /// and database expressions export as null. File columns export as structured file info
    /// unless the projection leaves files out.
    pub fn to_array(&mut self, projection: &Projection) -> OrmResult<Row> {
        let names = match &projection.columns {
            Some(columns) => columns.clone(),
            None => self.table.structure().column_names(),
        };
        let mut out = Row::new();
        for name in names {
            if let Some(container) = self.values.get(&name) {
                let column = container.column();
                if column.is_private() || (column.is_file() && !projection.with_files) {
                    continue;
                }
                if self.has_value_or_default(&name) {
                    let value = self.get_value(&name, None)?;
                    let value = if column.is_file() { file_info(value) } else { exported(value) };
                    out.insert(name.clone(), value);
                } else {
                    out.insert(name.clone(), Value::Null);
                }
            } else if let Some((column, format)) = self.split_format_key(&name) {
                if self.has_value_or_default(&column) {
                    out.insert(name.clone(), exported(self.get_value(&column, Some(&format))?));
                } else {
                    out.insert(name.clone(), Value::Null);
                }
            } else {
                return Err(OrmError::InvalidArgument(format!("Table '{}' has no column '{}'", self.table.name(), name)));
            }
        }
        for (name, nested) in &projection.relations {
            if !self.is_related_loaded(name) && !projection.load_missing_relations {
                return Err(OrmError::BadMethodCall(format!(
                    "Relation '{}' is not loaded; enable loading of missing relations to export it",
                    name
                )));
            }
            let value = match self.related(name)? {
                Related::One(Some(record)) => Value::Row(record.to_array(nested)?),
                Related::One(None) => Value::Null,
                Related::Many(records) => Value::Rows(records.to_arrays(nested)?),
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }

    pub fn to_array_without_files(&mut self, projection: &Projection) -> OrmResult<Row> {
        self.to_array(&projection.clone().with_files(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnType};
    use crate::connection::MemoryConnection;
    use crate::record::tests::people;
    use crate::registry::register_table;
    use crate::row;
    use crate::table::Table;
    use std::sync::Arc;

    #[test]
    fn exports_public_columns() {
        let (table, _) = people();
        let mut record = Record::from_db(table.clone(), row! { "id" => 1, "name" => "Ann", "token" => "secret", "created_at" => "2024-03-01 10:20:30" }).unwrap();
        let exported = record.to_array(&Projection::new().columns(&["id", "name", "token", "created_at_as_date"])).unwrap();
        assert_eq!(exported, row! { "id" => 1, "name" => "Ann", "created_at_as_date" => "2024-03-01" });

        let mut fresh = Record::new(table);
        fresh.update_value("name", "Bob", false).unwrap();
        let exported = fresh.to_array(&Projection::new().columns(&["id", "name", "status"])).unwrap();
        assert_eq!(exported, row! { "id" => Value::Null, "name" => "Bob", "status" => "new" });
    }

    #[test]
    fn relations_need_loading_or_permission() {
        let (table, connection) = people();
        let mut record = Record::from_db(table, row! { "id" => 1, "name" => "Ann", "parent_id" => 4 }).unwrap();
        let projection = Projection::new().columns(&["name"]).relation("Parent", Projection::new().columns(&["name"]));
        assert!(matches!(record.to_array(&projection), Err(OrmError::BadMethodCall(_))));

        connection.push_query_result(vec![row! { "id" => 4, "name" => "Eve" }]).unwrap();
        let exported = record.to_array(&projection.load_missing_relations(true)).unwrap();
        assert_eq!(exported, row! { "name" => "Ann", "Parent" => row! { "name" => "Eve" } });
    }

    #[test]
    fn file_columns_export_file_info() {
        let name = format!("documents_{}", rand::random::<u32>());
        register_table(&name, None, |t| {
            t.column(Column::new("id", ColumnType::Int).primary_key());
            t.column(Column::new("title", ColumnType::String));
            t.column(Column::new("scan", ColumnType::File));
            Ok(())
        })
        .unwrap();
        let table = Table::with_connection(&name, Arc::new(MemoryConnection::new("documents"))).unwrap();
        let mut record = Record::from_db(table, row! { "id" => 1, "title" => "Lease", "scan" => "files/2024/Lease.PDF" }).unwrap();

        let exported = record.to_array(&Projection::new()).unwrap();
        assert_eq!(
            exported.get("scan"),
            Some(&Value::Row(row! { "path" => "files/2024/Lease.PDF", "name" => "Lease.PDF", "extension" => "pdf" }))
        );
        let without_files = record.to_array_without_files(&Projection::new()).unwrap();
        assert_eq!(without_files, row! { "id" => 1, "title" => "Lease" });
    }
}
