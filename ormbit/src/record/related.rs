use crate::error::{OrmError, OrmResult};
use crate::record::Record;
use crate::records::RecordsArray;
use crate::relation::RelationType;
use crate::select::condition::Condition;
use crate::table::Table;
use crate::value::{Row, Value};
use std::sync::Arc;

/// Loaded related data of one relation.
#[derive(Debug, Clone)]
pub enum Related {
    /// HAS_ONE or BELONGS_TO; `None` when no related row exists.
    One(Option<Box<Record>>),
    /// HAS_MANY.
    Many(RecordsArray),
}

impl Related {
    pub fn record(&mut self) -> Option<&mut Record> {
        match self {
            Related::One(record) => record.as_deref_mut(),
            Related::Many(_) => None,
        }
    }

    pub fn records(&mut self) -> Option<&mut RecordsArray> {
        match self {
            Related::Many(records) => Some(records),
            Related::One(_) => None,
        }
    }

    /// Plain values: a row for a single record, a list of rows for a collection.
    pub fn to_value(&self) -> OrmResult<Value> {
        Ok(match self {
            Related::One(Some(record)) => Value::Row(record.values_row()),
            Related::One(None) => Value::Null,
            Related::Many(records) => Value::Rows(records.current_rows()),
        })
    }
}

fn is_empty_row(row: &Row) -> bool {
    row.values().all(|v| v.is_null() || v.as_row().is_some_and(is_empty_row))
}

impl Record {
    pub fn is_related_loaded(&self, name: &str) -> bool {
        self.related.contains_key(name)
    }

    /// Related data, loaded from storage on first access.
    pub fn related(&mut self, name: &str) -> OrmResult<&mut Related> {
        if !self.related.contains_key(name) {
            let loaded = self.load_related(name)?;
            self.related.insert(name.to_string(), loaded);
        }
        self.related
            .get_mut(name)
            .ok_or_else(|| OrmError::InvalidArgument(format!("Relation '{}' is not loaded", name)))
    }

    fn load_related(&self, name: &str) -> OrmResult<Related> {
        let relation = self.table.structure().relation(name)?.clone();
        let foreign = self.table.sibling(relation.foreign_table())?;
        let local_value = self.value_or_null(relation.local_column())?;
        if local_value.is_null() || local_value.is_expr() {
            return Ok(match relation.kind() {
                RelationType::HasMany => Related::Many(RecordsArray::new(foreign, vec![], true)),
                _ => Related::One(None),
            });
        }
        let mut conditions = Condition::eq(relation.foreign_column(), local_value);
        if let Some(extra) = relation.additional_conditions(Some(self)) {
            conditions = conditions.and(extra);
        }
        let mut select = foreign.query();
        select.where_(conditions)?;
        match relation.kind() {
            RelationType::HasMany => {
                let rows = select.fetch_many()?;
                Ok(Related::Many(RecordsArray::new(foreign, rows, true)))
            }
            _ => match select.fetch_one()? {
                Some(row) => Ok(Related::One(Some(Box::new(Record::from_db(foreign, row)?)))),
                None => Ok(Related::One(None)),
            },
        }
    }

    /// Attaches related data given as a row (HAS_ONE, BELONGS_TO) or a list of rows (HAS_MANY).
    /// A row of nulls, as produced by an outer join without a match, means no related record.
    pub fn update_related(&mut self, name: &str, value: Value, is_from_db: bool) -> OrmResult<&mut Self> {
        self.ensure_writable()?;
        let relation = self.table.structure().relation(name)?.clone();
        let foreign = self.table.sibling(relation.foreign_table())?;
        let related = match (relation.kind(), value) {
            (RelationType::HasMany, Value::Rows(rows)) => Related::Many(RecordsArray::new(foreign, rows, is_from_db)),
            (RelationType::HasMany, Value::Null) => Related::Many(RecordsArray::new(foreign, vec![], is_from_db)),
            (RelationType::HasMany, other) => {
                return Err(OrmError::InvalidArgument(format!("Relation '{}' expects a list of rows, got {}", name, other.type_name())))
            }
            (_, Value::Null) => Related::One(None),
            (_, Value::Row(row)) if is_empty_row(&row) => Related::One(None),
            (_, Value::Row(row)) => Related::One(Some(Box::new(related_record(foreign, row, is_from_db)?))),
            (_, other) => {
                return Err(OrmError::InvalidArgument(format!("Relation '{}' expects a row, got {}", name, other.type_name())))
            }
        };
        self.related.insert(name.to_string(), related);
        Ok(self)
    }

    /// Attaches an existing record of the foreign table to a HAS_ONE or BELONGS_TO relation.
    pub fn attach_related_record(&mut self, name: &str, record: Record) -> OrmResult<&mut Self> {
        self.ensure_writable()?;
        let relation = self.table.structure().relation(name)?.clone();
        if relation.kind() == RelationType::HasMany {
            return Err(OrmError::InvalidArgument(format!("Relation '{}' is HAS_MANY, attach rows instead", name)));
        }
        if record.table().name() != relation.foreign_table() {
            return Err(OrmError::InvalidArgument(format!(
                "Relation '{}' expects a record of '{}', got '{}'",
                name,
                relation.foreign_table(),
                record.table().name()
            )));
        }
        self.related.insert(name.to_string(), Related::One(Some(Box::new(record))));
        Ok(self)
    }

    /// Saves loaded related records after syncing their foreign column with this record.
    /// BELONGS_TO relations point at a parent and are never saved from the child.
    pub fn save_relations(&mut self, names: &[&str]) -> OrmResult<&mut Self> {
        for name in names {
            let relation = self.table.structure().relation(name)?.clone();
            if relation.kind() == RelationType::BelongsTo {
                return Err(OrmError::InvalidArgument(format!("Relation '{}' is BELONGS_TO and cannot be saved from here", name)));
            }
            if !self.related.contains_key(*name) {
                continue;
            }
            let local_value = self.get_value(relation.local_column(), None)?;
            let foreign_column = relation.foreign_column().to_string();
            let sync = |record: &mut Record| -> OrmResult<()> {
                if !record.structure().column(&foreign_column)?.is_primary_key() {
                    record.update_value(&foreign_column, local_value.clone(), false)?;
                }
                record.save()?;
                Ok(())
            };
            match self.related.get_mut(*name) {
                Some(Related::One(Some(record))) => sync(record.as_mut())?,
                Some(Related::Many(records)) => records.try_for_each(sync)?,
                _ => {}
            }
        }
        Ok(self)
    }
}

fn related_record(table: Arc<Table>, row: Row, is_from_db: bool) -> OrmResult<Record> {
    let pk = table.structure().primary_key_name().to_string();
    let has_pk = row.get(&pk).is_some_and(|v| !v.is_null());
    Record::from_data(table, row, is_from_db && has_pk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Statement;
    use crate::record::tests::people;
    use crate::row;

    #[test]
    fn related_records_load_lazily() {
        let (table, connection) = people();
        let mut record = Record::from_db(table, row! { "id" => 1, "name" => "Ann", "parent_id" => 7 }).unwrap();
        connection.push_query_result(vec![row! { "id" => 7, "name" => "Eve" }]).unwrap();
        let parent = record.related("Parent").unwrap().record().unwrap();
        assert_eq!(parent.get_value("name", None).unwrap(), Value::from("Eve"));
        assert!(connection.queries().unwrap()[0].contains(r#"."id" = 7"#));

        connection.push_query_result(vec![row! { "id" => 2, "name" => "Bob", "parent_id" => 1 }]).unwrap();
        let children = record.related("Children").unwrap().records().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(connection.queries().unwrap().len(), 2);
        record.related("Children").unwrap();
        assert_eq!(connection.queries().unwrap().len(), 2);
    }

    #[test]
    fn missing_local_value_means_nothing_related() {
        let (table, connection) = people();
        let mut record = Record::from_db(table, row! { "id" => 1, "name" => "Ann" }).unwrap();
        assert!(record.related("Parent").unwrap().record().is_none());
        assert!(connection.queries().unwrap().is_empty());
    }

    #[test]
    fn outer_join_rows_of_nulls_are_empty_relations() {
        let (table, _) = people();
        let row = row! { "id" => 1, "name" => "Ann", "Parent" => row! { "id" => Value::Null, "name" => Value::Null } };
        let mut record = Record::from_db(table, row).unwrap();
        assert!(record.is_related_loaded("Parent"));
        assert!(record.related("Parent").unwrap().record().is_none());
        assert!(record.update_related("Parent", Value::from(5), false).is_err());
    }

    #[test]
    fn belongs_to_is_not_saved() {
        let (table, _) = people();
        let mut record = Record::from_db(table, row! { "id" => 1, "name" => "Ann" }).unwrap();
        assert!(matches!(record.save_relations(&["Parent"]), Err(OrmError::InvalidArgument(_))));
    }

    #[test]
    fn has_many_children_get_the_parent_key() {
        let (table, connection) = people();
        let mut record = Record::from_db(table, row! { "id" => 1, "name" => "Ann" }).unwrap();
        record
            .update_related("Children", Value::Rows(vec![row! { "name" => "Bob" }, row! { "name" => "Carl" }]), false)
            .unwrap();
        record.save_relations(&["Children"]).unwrap();
        let inserted: Vec<Row> = connection
            .writes()
            .unwrap()
            .into_iter()
            .filter_map(|s| match s {
                Statement::Insert { data, .. } => Some(data),
                _ => None,
            })
            .collect();
        assert_eq!(inserted.len(), 2);
        assert!(inserted.iter().all(|data| data.get("parent_id") == Some(&Value::Int(1))));
    }
}
