use crate::connection::Connection;
use crate::error::{OrmError, OrmResult, ValidationError, ValidationErrors};
use crate::record::Record;
use crate::select::condition::Condition;
use crate::value::{Row, Value};
use crate::{error, warn};
use std::sync::Arc;

enum WriteOutcome {
    Stored,
    Vanished,
}

/// Storage transaction opened only when none is active, and closed only by its opener.
struct OwnedTransaction {
    connection: Arc<dyn Connection>,
    owned: bool,
}

impl OwnedTransaction {
    fn begin(connection: &Arc<dyn Connection>) -> OrmResult<Self> {
        let owned = !connection.in_transaction();
        if owned {
            connection.begin()?;
        }
        Ok(OwnedTransaction { connection: connection.clone(), owned })
    }

    fn commit(self) -> OrmResult<()> {
        if self.owned {
            self.connection.commit()?;
        }
        Ok(())
    }

    fn rollback(self, table: &str, cause: &OrmError) {
        if !self.owned {
            return;
        }
        match self.connection.rollback() {
            Ok(()) => warn!("Write to '{}' rolled back: {}", table, cause),
            Err(e) => error!("Rollback of '{}' failed after '{}': {}", table, cause, e),
        }
    }
}

impl Record {
    /// Inserts a new record or updates the changed columns of a stored one.
    pub fn save(&mut self) -> OrmResult<&mut Self> {
        self.save_with_relations(&[])
    }

    pub fn save_with_relations(&mut self, relations: &[&str]) -> OrmResult<&mut Self> {
        self.ensure_writable()?;
        if self.backup.is_some() {
            return Err(OrmError::BadMethodCall("save() cannot be used while collecting updates, commit or roll back first".to_string()));
        }
        self.save_columns(None)?;
        self.save_relations(relations)
    }

    /// Changed stored values, plus usable defaults for inserts. Columns outside `only` are skipped.
    fn collect_values_for_save(&self, is_update: bool, only: Option<&[String]>) -> OrmResult<Row> {
        let structure = self.table.structure();
        let mut data = Row::new();
        let mut errors = ValidationErrors::new();
        for name in structure.db_columns() {
            if only.is_some_and(|columns| !columns.contains(name)) {
                continue;
            }
            let container = self.record_value(name)?;
            let column = container.column();
            if column.is_primary_key() {
                continue;
            }
            if container.has_value() {
                if container.is_from_db() {
                    continue;
                }
                let value = container.value()?.clone();
                if matches!(&value, Value::Expr(expr) if expr.is_default_placeholder()) {
                    continue;
                }
                let found = if container.is_validated() {
                    container.validation_errors().to_vec()
                } else {
                    column.validate_value(&value, false, false)
                };
                if !found.is_empty() {
                    errors.extend(name, found);
                }
                data.insert(name.clone(), value);
            } else if !is_update {
                if container.is_default_value_can_be_used(false)? {
                    let value = container.value_or_default(false)?;
                    if !matches!(&value, Value::Expr(expr) if expr.is_default_placeholder()) {
                        data.insert(name.clone(), value);
                    }
                } else if !column.is_value_can_be_null() {
                    errors.extend(name, vec![ValidationError::ValueCannotBeNull]);
                }
            }
        }
        if !errors.is_empty() {
            return Err(OrmError::InvalidData(errors));
        }
        Ok(data)
    }

    pub(crate) fn save_columns(&mut self, only: Option<&[String]>) -> OrmResult<()> {
        let is_update = self.is_persisted();
        let structure = self.table.structure().clone();
        let mut data = self.collect_values_for_save(is_update, only)?;
        if is_update && data.is_empty() {
            log::debug!("Nothing to save for '{}'", structure.name());
            self.run_saving_extenders(is_update)?;
            return self.run_after_save(false);
        }
        for name in structure.auto_updating_columns() {
            let column = structure.column(name)?;
            if !column.is_exists_in_db() {
                continue;
            }
            if let Some(value) = column.auto_update_value(self) {
                data.insert(name.clone(), value);
            }
        }

        let pk_name = structure.primary_key_name().to_string();
        let conditions = if is_update {
            let pk = self.primary_key_value().unwrap_or_default();
            Some(Condition::eq(&pk_name, pk))
        } else {
            let pk = self.record_value(&pk_name)?;
            let default = if pk.is_default_value_can_be_used(false)? { Some(pk.value_or_default(false)?) } else { None };
            let value = match default {
                Some(value) if value.is_expr() => value,
                _ => Value::Expr(self.table.connection().default_value_expression()),
            };
            data.shift_insert(0, pk_name.clone(), value);
            None
        };

        if let Some(hooks) = structure.hooks() {
            let columns: Vec<String> = data.keys().cloned().collect();
            let errors = hooks.before_save(self, &columns, is_update);
            if !errors.is_empty() {
                return Err(OrmError::InvalidData(errors));
            }
        }

        let transaction = OwnedTransaction::begin(self.table.connection())?;
        match self.write_and_hydrate(&data, conditions.as_ref()) {
            Ok(WriteOutcome::Stored) => {
                transaction.commit()?;
                self.run_after_save(!is_update)
            }
            Ok(WriteOutcome::Vanished) => {
                transaction.commit()?;
                self.reset();
                Ok(())
            }
            Err(e) => {
                transaction.rollback(structure.name(), &e);
                Err(e)
            }
        }
    }

    fn write_and_hydrate(&mut self, data: &Row, conditions: Option<&Condition>) -> OrmResult<WriteOutcome> {
        let structure = self.table.structure().clone();
        let connection = self.table.connection().clone();
        let table = structure.qualified_name();
        let returning = vec!["*".to_string()];
        let is_update = conditions.is_some();
        let result = match conditions {
            Some(conditions) => connection.update(&table, data, conditions, &returning)?,
            None => connection.insert(&table, data, &returning)?,
        };
        match result.rows.into_iter().next() {
            Some(row) => {
                let known: Row = row.into_iter().filter(|(name, _)| structure.has_column(name)).collect();
                self.update_values(known, true)?;
            }
            None if is_update => {
                warn!("Update of '{}' matched no rows, the record no longer exists", structure.name());
                return Ok(WriteOutcome::Vanished);
            }
            None => {
                return Err(OrmError::UnexpectedValue(format!("Insert into '{}' returned no row", structure.name())));
            }
        }
        self.run_saving_extenders(is_update)?;
        Ok(WriteOutcome::Stored)
    }

    fn run_saving_extenders(&self, is_update: bool) -> OrmResult<()> {
        for container in self.values.values() {
            let column = container.column();
            if column.has_saving_extender() {
                column.run_saving_extender(container, is_update, self)?;
            }
        }
        Ok(())
    }

    fn run_after_save(&self, is_created: bool) -> OrmResult<()> {
        match self.table.structure().hooks() {
            Some(hooks) => hooks.after_save(self, is_created),
            None => Ok(()),
        }
    }

    /// Deletes the stored row. Delete extenders of file columns run only with `delete_files`.
    /// Afterwards the record is reset completely or only loses its primary key value.
    pub fn delete(&mut self, reset_all: bool, delete_files: bool) -> OrmResult<&mut Self> {
        self.ensure_writable()?;
        let structure = self.table.structure().clone();
        let pk_name = structure.primary_key_name().to_string();
        let pk = self
            .primary_key_value()
            .ok_or_else(|| OrmError::BadMethodCall(format!("Record of '{}' has no primary key value to delete by", structure.name())))?;
        if let Some(hooks) = structure.hooks() {
            hooks.before_delete(self)?;
        }

        let transaction = OwnedTransaction::begin(self.table.connection())?;
        let deleted = self
            .table
            .connection()
            .delete(&structure.qualified_name(), &Condition::eq(&pk_name, pk), &[])
            .and_then(|_| match structure.hooks() {
                Some(hooks) => hooks.after_delete(self),
                None => Ok(()),
            });
        match deleted {
            Ok(()) => transaction.commit()?,
            Err(e) => {
                transaction.rollback(structure.name(), &e);
                return Err(e);
            }
        }

        for container in self.values.values() {
            let column = container.column();
            if !column.has_delete_extender() || (column.is_file() && !delete_files) {
                continue;
            }
            column.run_delete_extender(container, delete_files)?;
        }
        if reset_all {
            self.reset();
        } else {
            self.unset_primary_key_value()?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnType};
    use crate::connection::{MemoryConnection, Statement};
    use crate::record::tests::people;
    use crate::registry::register_table;
    use crate::row;
    use crate::table::Table;
    use crate::value::DbExpr;

    #[test]
    fn insert_collects_values_and_defaults() {
        let (table, connection) = people();
        let mut record = Record::from_data(table, row! { "name" => "Ann" }, false).unwrap();
        record.save().unwrap();
        let writes = connection.writes().unwrap();
        assert_eq!(writes.len(), 1);
        match &writes[0] {
            Statement::Insert { data, .. } => {
                assert!(matches!(data.get("id"), Some(Value::Expr(expr)) if expr.is_default_placeholder()));
                assert_eq!(data.get("name"), Some(&Value::from("Ann")));
                assert_eq!(data.get("status"), Some(&Value::from("new")));
                assert!(data.get("email").is_none());
            }
            other => panic!("unexpected statement {:?}", other),
        }
        assert_eq!(record.get_value("id", None).unwrap(), Value::Int(1));
        assert!(record.exists_in_db(false).unwrap());
        assert!(record.is_value_from_db("name"));
        assert!(!record.has_value_or_default("email"));
    }

    #[test]
    fn insert_without_values_still_stores_a_row() {
        let name = format!("notes_{}", rand::random::<u32>());
        register_table(&name, None, |t| {
            t.column(Column::new("id", ColumnType::Int).primary_key().default_value(DbExpr::default_value()));
            t.column(Column::new("note", ColumnType::Text));
            Ok(())
        })
        .unwrap();
        let connection = Arc::new(MemoryConnection::new("notes"));
        let table = Table::with_connection(&name, connection.clone()).unwrap();
        let mut record = Record::new(table);
        record.save().unwrap();

        let writes = connection.writes().unwrap();
        assert_eq!(writes.len(), 1);
        match &writes[0] {
            Statement::Insert { data, .. } => {
                assert_eq!(data.len(), 1);
                assert!(matches!(data.get("id"), Some(Value::Expr(expr)) if expr.is_default_placeholder()));
            }
            other => panic!("unexpected statement {:?}", other),
        }
        assert!(record.exists_in_db(false).unwrap());
        assert_eq!(record.get_value("id", None).unwrap(), Value::Int(1));
    }

    #[test]
    fn missing_required_value_blocks_the_write() {
        let (table, connection) = people();
        let mut record = Record::new(table);
        let err = record.save().unwrap_err();
        assert!(err.validation_errors().unwrap().contains("name"));
        assert!(connection.statements().unwrap().is_empty());
    }

    #[test]
    fn failed_write_rolls_back_and_propagates() {
        let (table, connection) = people();
        let mut record = Record::from_data(table, row! { "name" => "Ann" }, false).unwrap();
        connection.fail_next_write("disk full").unwrap();
        assert!(matches!(record.save(), Err(OrmError::Connection(_))));
        assert_eq!(connection.statements().unwrap(), vec![Statement::Begin, Statement::Rollback]);
        assert!(!record.exists_in_db(false).unwrap());
    }

    #[test]
    fn external_transaction_is_left_open() {
        let (table, connection) = people();
        table.begin_transaction().unwrap();
        let mut record = Record::from_data(table.clone(), row! { "name" => "Ann" }, false).unwrap();
        record.save().unwrap();
        assert!(table.in_transaction());
        table.commit_transaction().unwrap();
        assert_eq!(connection.statements().unwrap().iter().filter(|s| **s == Statement::Begin).count(), 1);
    }

    #[test]
    fn update_of_vanished_row_resets_the_record() {
        let (table, connection) = people();
        let mut record = Record::from_db(table, row! { "id" => 5, "name" => "Ann" }).unwrap();
        record.update_value("name", "Bob", false).unwrap();
        record.save().unwrap();
        assert!(!record.has_value("name"));
        assert!(!record.exists_in_db(false).unwrap());
        assert!(matches!(connection.writes().unwrap()[0], Statement::Update { .. }));
    }

    #[test]
    fn delete_requires_primary_key_and_resets() {
        let (table, connection) = people();
        let mut fresh = Record::new(table.clone());
        assert!(matches!(fresh.delete(true, true), Err(OrmError::BadMethodCall(_))));

        let mut record = Record::from_db(table, row! { "id" => 5, "name" => "Ann" }).unwrap();
        record.delete(false, true).unwrap();
        assert!(!record.has_primary_key_value());
        assert!(!record.is_value_from_db("name"));
        assert_eq!(record.get_value("name", None).unwrap(), Value::from("Ann"));
        match &connection.writes().unwrap()[0] {
            Statement::Delete { conditions, .. } => assert_eq!(conditions, &Condition::eq("id", 5)),
            other => panic!("unexpected statement {:?}", other),
        }
    }
}
