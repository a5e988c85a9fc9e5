use crate::config::settings;
use crate::error::{OrmError, OrmResult};
use crate::record::{Projection, Record};
use crate::records::{inject, RecordsArray};
use crate::select::condition::Condition;
use crate::select::db_select::OrderBy;
use crate::select::orm_select::OrmSelect;
use crate::value::Row;
use std::cmp::min;

/// Records selected by a query. Rows are fetched on first access and counts are computed
/// without fetching; every change of the query drops what was fetched or counted.
#[derive(Debug, Clone)]
pub struct RecordsSet {
    select: OrmSelect,
    array: Option<RecordsArray>,
    count: Option<usize>,
    total_count: Option<usize>,
    reuse_instance: bool,
}

impl RecordsSet {
    pub fn new(select: OrmSelect) -> Self {
        RecordsSet { select, array: None, count: None, total_count: None, reuse_instance: false }
    }

    pub fn select(&self) -> &OrmSelect {
        &self.select
    }

    pub fn is_fetched(&self) -> bool {
        self.array.is_some()
    }

    fn invalidate(&mut self) {
        self.array = None;
        self.count = None;
        self.total_count = None;
    }

    pub fn fetch(&mut self) -> OrmResult<&mut RecordsArray> {
        if self.array.is_none() {
            let rows = self.select.fetch_many()?;
            log::debug!("Fetched {} rows of '{}'", rows.len(), self.select.table().name());
            let mut array = RecordsArray::new(self.select.table().clone(), rows, true);
            if self.reuse_instance {
                array.enable_reuse_instance();
            }
            self.array = Some(array);
        }
        self.array
            .as_mut()
            .ok_or_else(|| OrmError::UnexpectedValue("Fetched records are missing".to_string()))
    }

    pub fn enable_reuse_instance(&mut self) -> &mut Self {
        self.reuse_instance = true;
        if let Some(array) = self.array.as_mut() {
            array.enable_reuse_instance();
        }
        self
    }

    pub fn disable_reuse_instance(&mut self) -> &mut Self {
        self.reuse_instance = false;
        if let Some(array) = self.array.as_mut() {
            array.disable_reuse_instance();
        }
        self
    }

    /// Number of records within limit and offset.
    pub fn count(&mut self) -> OrmResult<usize> {
        if let Some(count) = self.count {
            return Ok(count);
        }
        let count = match &self.array {
            Some(array) => array.len(),
            None => {
                let (limit, offset) = (self.select.get_limit(), self.select.get_offset());
                if limit == 0 && offset == 0 {
                    self.total_count()?
                } else {
                    let remaining = self.total_count()?.saturating_sub(offset);
                    if limit == 0 { remaining } else { min(remaining, limit) }
                }
            }
        };
        self.count = Some(count);
        Ok(count)
    }

    /// Number of matching records ignoring limit and offset.
    pub fn total_count(&mut self) -> OrmResult<usize> {
        if let Some(total) = self.total_count {
            return Ok(total);
        }
        let total = self.select.fetch_count(settings().count_ignores_outer_joins)?;
        self.total_count = Some(total);
        Ok(total)
    }

    pub fn replace_where(&mut self, conditions: Condition) -> OrmResult<&mut Self> {
        self.select.where_(conditions)?;
        self.invalidate();
        Ok(self)
    }

    pub fn append_where(&mut self, conditions: Condition) -> OrmResult<&mut Self> {
        self.select.and_where(conditions)?;
        self.invalidate();
        Ok(self)
    }

    pub fn replace_order(&mut self, order: Vec<OrderBy>) -> OrmResult<&mut Self> {
        self.select.replace_order(order)?;
        self.invalidate();
        Ok(self)
    }

    pub fn replace_limit_and_offset(&mut self, limit: usize, offset: usize) -> &mut Self {
        self.select.limit(limit).offset(offset);
        self.invalidate();
        self
    }

    fn page_size(&self) -> OrmResult<usize> {
        match self.select.get_limit() {
            0 => Err(OrmError::BadMethodCall("Paging needs a limit".to_string())),
            limit => Ok(limit),
        }
    }

    pub fn next_page(&mut self) -> OrmResult<&mut Self> {
        let limit = self.page_size()?;
        let offset = self.select.get_offset() + limit;
        Ok(self.replace_limit_and_offset(limit, offset))
    }

    pub fn prev_page(&mut self) -> OrmResult<&mut Self> {
        let limit = self.page_size()?;
        let offset = self.select.get_offset().saturating_sub(limit);
        Ok(self.replace_limit_and_offset(limit, offset))
    }

    /// Moves to a page counted from 1.
    pub fn nth_page(&mut self, page: usize) -> OrmResult<&mut Self> {
        let limit = self.page_size()?;
        if page == 0 {
            return Err(OrmError::InvalidArgument("Pages are counted from 1".to_string()));
        }
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| OrmError::InvalidArgument(format!("Page {} is out of range for page size {}", page, limit)))?;
        Ok(self.replace_limit_and_offset(limit, offset))
    }

    pub fn record(&mut self, index: usize) -> OrmResult<&mut Record> {
        self.fetch()?.record(index)
    }

    pub fn try_for_each<F>(&mut self, f: F) -> OrmResult<()>
    where
        F: FnMut(&mut Record) -> OrmResult<()>,
    {
        self.fetch()?.try_for_each(f)
    }

    /// Visits the selected records fetching `chunk_size` rows per query. Nothing is cached.
    pub fn try_for_each_chunked<F>(&self, chunk_size: usize, mut f: F) -> OrmResult<()>
    where
        F: FnMut(&mut Record) -> OrmResult<()>,
    {
        if chunk_size == 0 {
            return Err(OrmError::InvalidArgument("Chunk size must be positive".to_string()));
        }
        let (limit, offset) = (self.select.get_limit(), self.select.get_offset());
        let mut visited = 0;
        loop {
            let take = if limit == 0 { chunk_size } else { min(chunk_size, limit.saturating_sub(visited)) };
            if take == 0 {
                break;
            }
            let mut chunk = self.select.clone();
            chunk.limit(take).offset(offset + visited);
            let rows = chunk.fetch_many()?;
            let fetched = rows.len();
            let mut array = RecordsArray::new(self.select.table().clone(), rows, true);
            if self.reuse_instance {
                array.enable_reuse_instance();
            }
            array.try_for_each(&mut f)?;
            visited += fetched;
            if fetched < take {
                break;
            }
        }
        Ok(())
    }

    pub fn to_arrays(&mut self, projection: &Projection) -> OrmResult<Vec<Row>> {
        self.fetch()?.to_arrays(projection)
    }

    /// Loads a HAS_MANY relation of every fetched record with one query.
    pub fn inject_has_many(&mut self, relation: &str, columns: Option<&[&str]>) -> OrmResult<&mut Self> {
        inject::inject_has_many(self.fetch()?, relation, columns)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::people;
    use crate::row;
    use crate::value::Value;

    #[test]
    fn counts_respect_limit_and_offset_without_fetching() {
        let (table, connection) = people();
        let mut set = table.select(Condition::all()).unwrap();
        set.replace_limit_and_offset(10, 95);
        connection.push_query_result(vec![row! { "count" => 100 }]).unwrap();
        assert_eq!(set.count().unwrap(), 5);
        assert_eq!(set.total_count().unwrap(), 100);
        assert!(!set.is_fetched());
        assert_eq!(connection.queries().unwrap().len(), 1);

        set.nth_page(3).unwrap();
        assert_eq!(set.select().get_offset(), 20);
        connection.push_query_result(vec![row! { "count" => 100 }]).unwrap();
        assert_eq!(set.count().unwrap(), 10);
    }

    #[test]
    fn rows_are_fetched_lazily_once() {
        let (table, connection) = people();
        let mut set = table.select(Condition::gt("id", 0)).unwrap();
        assert!(connection.queries().unwrap().is_empty());
        connection.push_query_result(vec![row! { "id" => 1, "name" => "Ann" }, row! { "id" => 2, "name" => "Bob" }]).unwrap();
        assert_eq!(set.record(1).unwrap().get_value("name", None).unwrap(), Value::from("Bob"));
        assert_eq!(set.count().unwrap(), 2);
        assert_eq!(connection.queries().unwrap().len(), 1);

        set.append_where(Condition::like("name", "A%")).unwrap();
        assert!(!set.is_fetched());
        assert!(set.fetch().unwrap().is_empty());
        assert_eq!(connection.queries().unwrap().len(), 2);
    }

    #[test]
    fn paging_needs_a_limit() {
        let (table, _) = people();
        let mut set = table.select(Condition::all()).unwrap();
        assert!(matches!(set.next_page(), Err(OrmError::BadMethodCall(_))));
        set.replace_limit_and_offset(5, 0);
        set.next_page().unwrap().next_page().unwrap();
        assert_eq!(set.select().get_offset(), 10);
        set.prev_page().unwrap();
        assert_eq!(set.select().get_offset(), 5);
        assert!(matches!(set.nth_page(0), Err(OrmError::InvalidArgument(_))));
        assert!(matches!(set.nth_page(usize::MAX), Err(OrmError::InvalidArgument(_))));
        assert_eq!(set.select().get_offset(), 5);
    }

    #[test]
    fn chunked_iteration_pages_through_the_query() {
        let (table, connection) = people();
        let set = table.select(Condition::all()).unwrap();
        connection.push_query_result(vec![row! { "id" => 1, "name" => "Ann" }, row! { "id" => 2, "name" => "Bob" }]).unwrap();
        connection.push_query_result(vec![row! { "id" => 3, "name" => "Carl" }]).unwrap();
        let mut ids = vec![];
        set.try_for_each_chunked(2, |record| {
            ids.push(record.get_as::<i64>("id")?);
            Ok(())
        })
        .unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
        let queries = connection.queries().unwrap();
        assert_eq!(queries.len(), 2);
        assert!(queries[1].contains("LIMIT 2 OFFSET 2"));
    }
}
