use crate::select::condition::Condition;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Left,
    Right,
    Inner,
}

impl JoinType {
    pub fn sql(&self) -> &'static str {
        match self {
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Inner => "INNER JOIN",
        }
    }

    pub fn is_outer(&self) -> bool {
        !matches!(self, JoinType::Inner)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql())
    }
}

/// One resolved join. `path` is the relation path (`Parent` or `Parent.Grandparent`) under which
/// the joined columns appear in result rows; `local_path` is the path of the table it joins onto.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinConfig {
    pub path: String,
    pub join_type: JoinType,
    pub local_path: String,
    pub local_column: String,
    pub foreign_table: String,
    pub foreign_schema: Option<String>,
    pub foreign_column: String,
    /// Extra filter on the joined table; unqualified columns belong to the joined table.
    pub conditions: Option<Condition>,
    pub columns: Vec<String>,
}

impl JoinConfig {
    pub fn new(path: &str, local_path: &str, local_column: &str, foreign_table: &str, foreign_column: &str) -> Self {
        JoinConfig {
            path: path.to_string(),
            join_type: JoinType::Left,
            local_path: local_path.to_string(),
            local_column: local_column.to_string(),
            foreign_table: foreign_table.to_string(),
            foreign_schema: None,
            foreign_column: foreign_column.to_string(),
            conditions: None,
            columns: vec![],
        }
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    pub fn foreign_schema(mut self, schema: Option<&str>) -> Self {
        self.foreign_schema = schema.map(|s| s.to_string());
        self
    }

    pub fn conditions(mut self, conditions: Option<Condition>) -> Self {
        self.conditions = conditions.filter(|c| !c.is_empty());
        self
    }

    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Parent relation path, `None` for joins onto the main table.
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rsplit_once('.').map(|(parent, _)| parent)
    }
}
