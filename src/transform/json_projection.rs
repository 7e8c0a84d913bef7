//! Nested JSON projection over a flat query.
//!
//! A [`JsonMapping`] describes a tree of entities, each picking columns of
//! the flat result. The builder wraps the query as `(...) AS _sub` and
//! selects one JSON document built from those columns:
//!
//! ```text
//! root entity  ──► jsonb_build_object('id', _sub.id, ..., 'customer', <child>)
//!   child      ──► CASE WHEN <all child columns IS NULL> THEN NULL
//!                  ELSE jsonb_build_object(...) END
//! ```
//!
//! The null guard makes an absent child (an outer-joined row) serialize as
//! `null` rather than as an object of nulls.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde::de::{MapAccess, Visitor as DeVisitor};
use serde::{Deserialize, Deserializer};

use crate::ast::types::*;
use crate::error::{SqlError, SqlResult};

const SUBQUERY_ALIAS: &str = "_sub";

/// Shape of the projected result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    /// One JSON array aggregating every row.
    #[default]
    Array,
    /// One JSON object built from the first row.
    Single,
}

/// One node of the entity tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonEntity {
    pub id: String,
    pub name: String,
    /// Parent entity id. Nested entities without one hang off the root.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Key this entity is nested under in its parent object.
    #[serde(default)]
    pub property_name: Option<String>,
    /// JSON key to source column, in declaration order.
    #[serde(deserialize_with = "ordered_pairs")]
    pub columns: Vec<(String, String)>,
}

impl JsonEntity {
    pub fn new<I, K, C>(id: impl Into<String>, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            property_name: None,
            columns: columns
                .into_iter()
                .map(|(k, c)| (k.into(), c.into()))
                .collect(),
        }
    }

    /// Nest this entity under `parent` as `property`.
    pub fn nested_in(mut self, parent: impl Into<String>, property: impl Into<String>) -> Self {
        self.parent_id = Some(parent.into());
        self.property_name = Some(property.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonMapping {
    pub root_name: String,
    pub root_entity: JsonEntity,
    #[serde(default)]
    pub nested_entities: Vec<JsonEntity>,
    #[serde(default)]
    pub result_format: ResultFormat,
}

impl JsonMapping {
    /// Check the entity tree: every parent exists, every nested entity has
    /// a property name, and every entity is reachable from the root.
    pub fn validate(&self) -> SqlResult<()> {
        let mut ids: HashSet<&str> = HashSet::new();
        ids.insert(self.root_entity.id.as_str());
        for entity in &self.nested_entities {
            ids.insert(entity.id.as_str());
        }

        for entity in &self.nested_entities {
            let parent = self.parent_of(entity);
            if !ids.contains(parent) {
                return Err(SqlError::InvalidParentEntity {
                    entity: entity.id.clone(),
                    parent: parent.to_string(),
                });
            }
            if entity.property_name.is_none() {
                return Err(SqlError::MissingPropertyName {
                    entity: entity.id.clone(),
                });
            }
        }

        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue = VecDeque::from([self.root_entity.id.as_str()]);
        while let Some(id) = queue.pop_front() {
            if !reached.insert(id) {
                continue;
            }
            queue.extend(self.children(id).map(|e| e.id.as_str()));
        }
        match self
            .nested_entities
            .iter()
            .find(|e| !reached.contains(e.id.as_str()))
        {
            Some(orphan) => Err(SqlError::InvalidParentEntity {
                entity: orphan.id.clone(),
                parent: self.parent_of(orphan).to_string(),
            }),
            None => Ok(()),
        }
    }

    fn parent_of<'m>(&'m self, entity: &'m JsonEntity) -> &'m str {
        entity
            .parent_id
            .as_deref()
            .unwrap_or(self.root_entity.id.as_str())
    }

    fn children<'m>(&'m self, parent: &'m str) -> impl Iterator<Item = &'m JsonEntity> + 'm {
        self.nested_entities
            .iter()
            .filter(move |e| e.id != parent && self.parent_of(e) == parent)
    }
}

/// Deserialize a JSON object into key/value pairs, keeping document order.
fn ordered_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> DeVisitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of JSON keys to column names")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, column)) = map.next_entry::<String, String>()? {
                pairs.push((key, column));
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(PairsVisitor)
}

/// Wraps a query into a single JSON-producing select.
#[derive(Debug, Clone, Copy)]
pub struct JsonProjectionBuilder {
    use_jsonb: bool,
    limit_single: bool,
}

impl Default for JsonProjectionBuilder {
    fn default() -> Self {
        Self {
            use_jsonb: true,
            limit_single: true,
        }
    }
}

impl JsonProjectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the `jsonb_*` function family (default) or `json_*`.
    pub fn use_jsonb(mut self, jsonb: bool) -> Self {
        self.use_jsonb = jsonb;
        self
    }

    /// Append `LIMIT 1` for the single-object format.
    pub fn limit_single(mut self, limit: bool) -> Self {
        self.limit_single = limit;
        self
    }

    pub fn build(&self, stmt: Statement, mapping: &JsonMapping) -> SqlResult<Statement> {
        mapping.validate()?;
        let object = self.object(mapping, &mapping.root_entity);
        let (value, limit) = match mapping.result_format {
            ResultFormat::Array => (ValueComponent::function(self.func("agg"), vec![object]), None),
            ResultFormat::Single => (
                object,
                self.limit_single
                    .then(|| ValueComponent::Literal(Literal::Number("1".into()))),
            ),
        };
        tracing::debug!(
            root = %mapping.root_name,
            entities = mapping.nested_entities.len() + 1,
            "built JSON projection"
        );
        Ok(Statement::Select(Box::new(SimpleSelect {
            items: vec![SelectItem::aliased(value, mapping.root_name.as_str())],
            from: vec![TableSource::subquery(stmt, SUBQUERY_ALIAS)],
            limit,
            ..Default::default()
        })))
    }

    fn func(&self, suffix: &str) -> String {
        let family = if self.use_jsonb { "jsonb" } else { "json" };
        format!("{}_{}", family, suffix)
    }

    fn object(&self, mapping: &JsonMapping, entity: &JsonEntity) -> ValueComponent {
        let mut args = Vec::new();
        for (key, column) in &entity.columns {
            args.push(ValueComponent::string(key.as_str()));
            args.push(sub_column(column));
        }
        for child in mapping.children(&entity.id) {
            let property = child.property_name.as_deref().unwrap_or(&child.name);
            args.push(ValueComponent::string(property));
            args.push(self.guarded(mapping, child));
        }
        ValueComponent::function(self.func("build_object"), args)
    }

    fn guarded(&self, mapping: &JsonMapping, entity: &JsonEntity) -> ValueComponent {
        let object = self.object(mapping, entity);
        let mut columns = Vec::new();
        descendant_columns(mapping, entity, &mut columns);
        let checks = columns
            .into_iter()
            .map(|c| ValueComponent::is_null(sub_column(c)))
            .collect();
        match ValueComponent::and_all(checks) {
            Some(all_null) => ValueComponent::Case {
                operand: None,
                branches: vec![(all_null, ValueComponent::null())],
                else_value: Some(Box::new(object)),
            },
            None => object,
        }
    }
}

fn sub_column(column: &str) -> ValueComponent {
    ValueComponent::column(Some(SUBQUERY_ALIAS), column)
}

/// Columns of `entity` and of everything nested below it, deduplicated.
fn descendant_columns<'m>(mapping: &'m JsonMapping, entity: &'m JsonEntity, out: &mut Vec<&'m str>) {
    for (_, column) in &entity.columns {
        if !out.contains(&column.as_str()) {
            out.push(column.as_str());
        }
    }
    for child in mapping.children(&entity.id) {
        descendant_columns(mapping, child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse;
    use crate::format::{FormatOptions, SqlFormatter};
    use serde_json::json;

    fn render(stmt: &Statement) -> String {
        SqlFormatter::new(FormatOptions {
            quote_identifiers: false,
            ..Default::default()
        })
        .format(stmt)
        .unwrap()
        .sql
    }

    fn orders_mapping() -> JsonMapping {
        JsonMapping {
            root_name: "orders".into(),
            root_entity: JsonEntity::new("order", "Order", [("id", "order_id")]),
            nested_entities: vec![
                JsonEntity::new("customer", "Customer", [("name", "customer_name")])
                    .nested_in("order", "customer"),
            ],
            result_format: ResultFormat::Array,
        }
    }

    #[test]
    fn test_null_child_is_guarded() {
        let stmt = JsonProjectionBuilder::new()
            .build(
                parse("SELECT o.id AS order_id, c.name AS customer_name FROM orders o LEFT JOIN customers c ON c.id = o.customer_id").unwrap(),
                &orders_mapping(),
            )
            .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT jsonb_agg(jsonb_build_object('id', _sub.order_id, 'customer', \
             CASE WHEN _sub.customer_name IS NULL THEN NULL \
             ELSE jsonb_build_object('name', _sub.customer_name) END)) AS orders \
             FROM (SELECT o.id AS order_id, c.name AS customer_name FROM orders AS o \
             LEFT JOIN customers AS c ON c.id = o.customer_id) AS _sub"
        );
    }

    #[test]
    fn test_guard_includes_grandchild_columns() {
        let mut mapping = orders_mapping();
        mapping.nested_entities.push(
            JsonEntity::new("address", "Address", [("city", "city")])
                .nested_in("customer", "address"),
        );
        mapping.result_format = ResultFormat::Single;
        let stmt = JsonProjectionBuilder::new()
            .use_jsonb(false)
            .build(parse("SELECT * FROM flat").unwrap(), &mapping)
            .unwrap();
        let sql = render(&stmt);
        assert!(
            sql.starts_with(
                "SELECT json_build_object('id', _sub.order_id, 'customer', \
                 CASE WHEN _sub.customer_name IS NULL AND _sub.city IS NULL THEN NULL"
            ),
            "{}",
            sql
        );
        assert!(sql.ends_with("AS _sub LIMIT 1"), "{}", sql);
    }

    #[test]
    fn test_unknown_parent_fails_before_building() {
        let mut mapping = orders_mapping();
        mapping.nested_entities[0].parent_id = Some("invoice".into());
        assert_eq!(
            JsonProjectionBuilder::new()
                .build(parse("SELECT 1").unwrap(), &mapping)
                .unwrap_err(),
            SqlError::InvalidParentEntity {
                entity: "customer".into(),
                parent: "invoice".into()
            }
        );
    }

    #[test]
    fn test_missing_property_name() {
        let mut mapping = orders_mapping();
        mapping.nested_entities[0].property_name = None;
        assert_eq!(
            mapping.validate().unwrap_err(),
            SqlError::MissingPropertyName {
                entity: "customer".into()
            }
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut mapping = orders_mapping();
        mapping.nested_entities = vec![
            JsonEntity::new("a", "A", [("x", "x")]).nested_in("b", "a"),
            JsonEntity::new("b", "B", [("y", "y")]).nested_in("a", "b"),
        ];
        assert!(matches!(
            mapping.validate(),
            Err(SqlError::InvalidParentEntity { .. })
        ));
    }

    #[test]
    fn test_deserialize_camel_case() {
        let mapping: JsonMapping = serde_json::from_value(json!({
            "rootName": "users",
            "rootEntity": {
                "id": "user",
                "name": "User",
                "columns": { "zeta": "z", "alpha": "a" }
            },
            "nestedEntities": [{
                "id": "team",
                "name": "Team",
                "parentId": "user",
                "propertyName": "team",
                "columns": { "title": "team_title" }
            }],
            "resultFormat": "single"
        }))
        .unwrap();
        assert_eq!(mapping.result_format, ResultFormat::Single);
        assert_eq!(mapping.nested_entities[0].property_name.as_deref(), Some("team"));
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn test_columns_keep_document_order() {
        let entity: JsonEntity = serde_json::from_str(
            r#"{ "id": "u", "name": "User", "columns": { "zeta": "z", "alpha": "a" } }"#,
        )
        .unwrap();
        assert_eq!(
            entity.columns,
            vec![
                ("zeta".to_string(), "z".to_string()),
                ("alpha".to_string(), "a".to_string())
            ]
        );
    }
}
