use crate::error::{OrmError, OrmResult};
use crate::record::{Projection, Record};
use crate::table::Table;
use crate::value::{Row, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Rows of one table, turned into [`Record`]s on first access and cached by index.
///
/// In reuse-instance mode a single record is refilled on every access instead. The reference
/// handed out by [`RecordsArray::record`] then shows the values of whichever row was accessed
/// last, so it must not be kept across accesses.
#[derive(Debug, Clone)]
pub struct RecordsArray {
    table: Arc<Table>,
    rows: Vec<Row>,
    records: HashMap<usize, Record>,
    from_db: bool,
    reuse_instance: bool,
    shared: Option<Box<Record>>,
}

impl RecordsArray {
    pub fn new(table: Arc<Table>, rows: Vec<Row>, from_db: bool) -> Self {
        RecordsArray { table, rows, records: HashMap::new(), from_db, reuse_instance: false, shared: None }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as received; changes made through cached records are not included.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_from_db(&self) -> bool {
        self.from_db
    }

    pub fn enable_reuse_instance(&mut self) -> &mut Self {
        self.reuse_instance = true;
        self.records.clear();
        self
    }

    pub fn disable_reuse_instance(&mut self) -> &mut Self {
        self.reuse_instance = false;
        self.shared = None;
        self
    }

    pub fn is_reusing_instance(&self) -> bool {
        self.reuse_instance
    }

    pub fn record(&mut self, index: usize) -> OrmResult<&mut Record> {
        let row = self
            .rows
            .get(index)
            .cloned()
            .ok_or_else(|| OrmError::InvalidArgument(format!("No row at index {} of {} in '{}'", index, self.rows.len(), self.table.name())))?;
        if self.reuse_instance {
            let shared = self.shared.get_or_insert_with(|| Box::new(Record::new(self.table.clone())));
            shared.fill(row, self.from_db)?;
            return Ok(shared.as_mut());
        }
        if !self.records.contains_key(&index) {
            let record = Record::from_data(self.table.clone(), row, self.from_db)?;
            self.records.insert(index, record);
        }
        self.records
            .get_mut(&index)
            .ok_or_else(|| OrmError::InvalidArgument(format!("No record at index {} in '{}'", index, self.table.name())))
    }

    pub fn first(&mut self) -> OrmResult<Option<&mut Record>> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        self.record(0).map(Some)
    }

    pub fn last(&mut self) -> OrmResult<Option<&mut Record>> {
        match self.rows.len() {
            0 => Ok(None),
            len => self.record(len - 1).map(Some),
        }
    }

    /// Visits every record in order, stopping at the first error.
    pub fn try_for_each<F>(&mut self, mut f: F) -> OrmResult<()>
    where
        F: FnMut(&mut Record) -> OrmResult<()>,
    {
        for index in 0..self.rows.len() {
            f(self.record(index)?)?;
        }
        Ok(())
    }

    pub fn to_arrays(&mut self, projection: &Projection) -> OrmResult<Vec<Row>> {
        let mut out = Vec::with_capacity(self.rows.len());
        for index in 0..self.rows.len() {
            out.push(self.record(index)?.to_array(projection)?);
        }
        Ok(out)
    }

    pub fn column_values(&self, column: &str) -> Vec<Value> {
        self.current_rows().iter().map(|row| row.get(column).cloned().unwrap_or_default()).collect()
    }

    /// First record whose `column` holds `value`.
    pub fn find_one(&mut self, column: &str, value: &Value) -> OrmResult<Option<&mut Record>> {
        let found = self.current_rows().iter().position(|row| row.get(column).is_some_and(|v| v.same_key(value)));
        match found {
            Some(index) => self.record(index).map(Some),
            None => Ok(None),
        }
    }

    pub fn filter_rows<P>(&self, predicate: P) -> RecordsArray
    where
        P: Fn(&Row) -> bool,
    {
        let rows = self.current_rows().into_iter().filter(|row| predicate(row)).collect();
        let mut filtered = RecordsArray::new(self.table.clone(), rows, self.from_db);
        filtered.reuse_instance = self.reuse_instance;
        filtered
    }

    /// Rows with the values of already converted records merged in.
    pub fn current_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| match self.records.get(&index) {
                Some(record) => merged(row, record),
                None => row.clone(),
            })
            .collect()
    }

    /// Turns converted records back into plain rows so that extra keys can be added to them.
    pub(crate) fn force_rows(&mut self) -> &mut Vec<Row> {
        for (index, record) in self.records.drain() {
            if let Some(row) = self.rows.get_mut(index) {
                *row = merged(row, &record);
            }
        }
        self.shared = None;
        &mut self.rows
    }
}

fn merged(row: &Row, record: &Record) -> Row {
    let mut merged = row.clone();
    for (name, value) in record.values_row() {
        merged.insert(name, value);
    }
    merged
}
