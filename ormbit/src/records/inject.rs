use crate::error::{OrmError, OrmResult};
use crate::records::RecordsArray;
use crate::relation::RelationType;
use crate::select::condition::Condition;
use crate::value::{Row, Value};
use indexmap::IndexSet;
use std::collections::HashMap;

/// Loads a HAS_MANY relation for all rows of `array` with a single query and stores each group
/// of foreign rows under the relation name. Converted records are turned back into rows first.
pub fn inject_has_many(array: &mut RecordsArray, relation_name: &str, columns: Option<&[&str]>) -> OrmResult<()> {
    let table = array.table().clone();
    let relation = table.structure().relation(relation_name)?.clone();
    if relation.kind() != RelationType::HasMany {
        return Err(OrmError::InvalidArgument(format!("Relation '{}' of '{}' is not HAS_MANY", relation_name, table.name())));
    }
    let local_column = relation.local_column().to_string();
    let foreign_column = relation.foreign_column().to_string();

    let rows = array.force_rows();
    let mut seen = IndexSet::new();
    let mut keys: Vec<Value> = vec![];
    for value in rows.iter().filter_map(|row| row.get(&local_column)).filter(|v| !v.is_null()) {
        if seen.insert(value.key_string()) {
            keys.push(value.clone());
        }
    }

    let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
    if !keys.is_empty() {
        let foreign = table.sibling(relation.foreign_table())?;
        let mut select = foreign.query();
        if let Some(columns) = columns {
            let mut with_key: Vec<&str> = columns.to_vec();
            if !with_key.contains(&foreign_column.as_str()) {
                with_key.push(foreign_column.as_str());
            }
            select.columns(&with_key)?;
        }
        let mut conditions = Condition::is_in(&foreign_column, keys);
        if let Some(extra) = relation.additional_conditions(None) {
            conditions = conditions.and(extra);
        }
        select.where_(conditions)?;
        for row in select.fetch_many()? {
            let key = row.get(&foreign_column).map(Value::key_string).unwrap_or_default();
            groups.entry(key).or_default().push(row);
        }
    }

    log::debug!("Injecting '{}' into {} rows of '{}' from {} groups", relation_name, rows.len(), table.name(), groups.len());
    for row in rows.iter_mut() {
        let group = row
            .get(&local_column)
            .filter(|v| !v.is_null())
            .and_then(|v| groups.get(&v.key_string()))
            .cloned()
            .unwrap_or_default();
        row.insert(relation_name.to_string(), Value::Rows(group));
    }
    Ok(())
}
