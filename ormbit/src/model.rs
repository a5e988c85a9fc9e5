use crate::error::OrmResult;
use crate::record::Record;
use crate::table::Table;
use crate::value::Row;
use std::sync::Arc;

/// Typed view of a record, usually derived with `#[derive(Model)]`.
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> OrmResult<Self>;
}

/// Column values of a typed struct keyed by column name.
pub trait IntoRow {
    fn into_row(self) -> Row;
}

/// Builds a pending record of `table` from a typed value.
pub fn new_record<M: IntoRow>(table: &Arc<Table>, model: M) -> OrmResult<Record> {
    Record::from_data(table.clone(), model.into_row(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::people;
    use crate::value::Value;
    use crate::row;

    #[derive(Debug, PartialEq)]
    struct Person {
        id: Option<i64>,
        name: String,
    }

    impl FromRecord for Person {
        fn from_record(record: &Record) -> OrmResult<Self> {
            Ok(Person { id: record.get_as("id")?, name: record.get_as("name")? })
        }
    }

    impl IntoRow for Person {
        fn into_row(self) -> Row {
            row! { "name" => self.name }
        }
    }

    #[test]
    fn typed_values_round_trip_through_records() {
        let (table, _) = people();
        let mut record = new_record(&table, Person { id: None, name: " Ann ".to_string() }).unwrap();
        assert_eq!(record.get_as::<String>("name").unwrap(), "Ann");
        record.save().unwrap();
        assert_eq!(Person::from_record(&record).unwrap(), Person { id: Some(1), name: "Ann".to_string() });
        assert_eq!(record.get_value("status", None).unwrap(), Value::from("new"));
    }
}
