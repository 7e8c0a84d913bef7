//! Column lookup for physical tables.
//!
//! Wildcard expansion needs to know what `users.*` means. The engine never
//! talks to a database, so callers inject the answer.

use std::collections::{BTreeMap, HashMap};

/// Resolves a physical table name to its ordered column list.
///
/// Implemented for closures `Fn(&str) -> Option<Vec<String>>` and for maps
/// keyed by table name.
pub trait TableColumnResolver {
    /// Columns of `table`, or `None` when the table is unknown.
    fn columns(&self, table: &str) -> Option<Vec<String>>;
}

impl<F> TableColumnResolver for F
where
    F: Fn(&str) -> Option<Vec<String>>,
{
    fn columns(&self, table: &str) -> Option<Vec<String>> {
        self(table)
    }
}

impl TableColumnResolver for HashMap<String, Vec<String>> {
    fn columns(&self, table: &str) -> Option<Vec<String>> {
        self.get(table).cloned().or_else(|| {
            self.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(table))
                .map(|(_, v)| v.clone())
        })
    }
}

impl TableColumnResolver for BTreeMap<String, Vec<String>> {
    fn columns(&self, table: &str) -> Option<Vec<String>> {
        self.get(table).cloned().or_else(|| {
            self.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(table))
                .map(|(_, v)| v.clone())
        })
    }
}

/// Look `schema.name` up first, then the bare name.
pub(crate) fn resolve_table(
    resolver: &dyn TableColumnResolver,
    schema: Option<&str>,
    name: &str,
) -> Option<Vec<String>> {
    schema
        .and_then(|s| resolver.columns(&format!("{}.{}", s, name)))
        .or_else(|| resolver.columns(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_resolver() {
        let resolver = |table: &str| match table {
            "users" => Some(vec!["id".to_string(), "name".to_string()]),
            _ => None,
        };
        assert_eq!(resolver.columns("users").unwrap().len(), 2);
        assert!(resolver.columns("orders").is_none());
    }

    #[test]
    fn test_map_resolver_is_case_insensitive_fallback() {
        let mut map = HashMap::new();
        map.insert("Users".to_string(), vec!["id".to_string()]);
        assert_eq!(map.columns("users"), Some(vec!["id".to_string()]));
    }

    #[test]
    fn test_schema_qualified_lookup_falls_back_to_name() {
        let mut map = BTreeMap::new();
        map.insert("users".to_string(), vec!["id".to_string()]);
        map.insert("audit.users".to_string(), vec!["event".to_string()]);
        assert_eq!(
            resolve_table(&map, Some("audit"), "users"),
            Some(vec!["event".to_string()])
        );
        assert_eq!(
            resolve_table(&map, Some("public"), "users"),
            Some(vec!["id".to_string()])
        );
    }
}
