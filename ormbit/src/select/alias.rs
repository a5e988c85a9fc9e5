use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Per-query alias cache. Aliases longer than `max_length` get a deterministic hashed short form.
#[derive(Debug, Clone)]
pub struct AliasRegistry {
    max_length: usize,
    shortened: HashMap<String, String>,
    columns: HashMap<String, (String, String)>,
}

impl AliasRegistry {
    pub fn new(max_length: usize) -> Self {
        AliasRegistry { max_length, shortened: HashMap::new(), columns: HashMap::new() }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn shorten(&mut self, alias: &str) -> String {
        if alias.len() <= self.max_length {
            return alias.to_string();
        }
        self.shortened
            .entry(alias.to_string())
            .or_insert_with(|| format!("_{:016x}", xxh3_64(alias.as_bytes())))
            .clone()
    }

    /// SQL alias of a table reached through a relation path like `Parent.Grandparent`.
    pub fn table_alias(&mut self, path: &str) -> String {
        self.shorten(&path.replace('.', "_"))
    }

    /// SQL alias of a selected column, remembered for mapping result rows back.
    pub fn column_alias(&mut self, table_path: &str, column: &str) -> String {
        let alias = self.shorten(&format!("_{}__{}", table_path.replace('.', "_"), column));
        self.columns.insert(alias.clone(), (table_path.to_string(), column.to_string()));
        alias
    }

    /// `(table path, column)` a column alias was produced for.
    pub fn resolve_column_alias(&self, alias: &str) -> Option<(&str, &str)> {
        self.columns.get(alias).map(|(path, column)| (path.as_str(), column.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_aliases_are_kept() {
        let mut aliases = AliasRegistry::new(48);
        assert_eq!(aliases.column_alias("Users", "name"), "_Users__name");
        assert_eq!(aliases.resolve_column_alias("_Users__name"), Some(("Users", "name")));
        assert_eq!(aliases.table_alias("Parent.Grandparent"), "Parent_Grandparent");
    }

    #[test]
    fn long_aliases_are_hashed_deterministically() {
        let mut aliases = AliasRegistry::new(24);
        let long = "VeryLongRelationName.AnotherVeryLongRelationName";
        let first = aliases.table_alias(long);
        assert!(first.len() <= 24);
        assert_eq!(aliases.table_alias(long), first);
        assert_eq!(AliasRegistry::new(24).table_alias(long), first);

        let column = aliases.column_alias(long, "some_column_name");
        assert_eq!(aliases.resolve_column_alias(&column), Some((long, "some_column_name")));
    }
}
