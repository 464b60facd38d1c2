//! In-memory rows keyed by resource type, with a direct executor for
//! [`QueryPredicate`] and relation hydration for the decision evaluator.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::authz::condition::{Includes, Quantifier};
use crate::authz::errors::AuthzError;
use crate::authz::instance::Instance;
use crate::authz::query::QueryPredicate;
use crate::authz::schema::{RelationKind, Schema};
use crate::authz::types::ResourceType;

pub type Row = Map<String, Value>;

/// Normalized rows: attributes and foreign key columns only, no nesting.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    schema: Arc<Schema>,
    tables: BTreeMap<ResourceType, Vec<Row>>,
}

impl MemoryStore {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            tables: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Add a row. Every column of the entity must be present; nullable
    /// columns may be `null`.
    pub fn insert(&mut self, resource_type: ResourceType, row: Value) -> Result<(), AuthzError> {
        let Value::Object(row) = row else {
            return Err(AuthzError::InvalidInstance(format!(
                "`{resource_type}` row must be a JSON object"
            )));
        };
        let entity = self.schema.entity(resource_type)?;
        for attr in &entity.attributes {
            match row.get(attr.name) {
                None => {
                    return Err(AuthzError::MissingAttribute {
                        resource_type,
                        attribute: attr.name.to_string(),
                    })
                }
                Some(Value::Null) if attr.nullable => {}
                Some(Value::Null) => {
                    return Err(AuthzError::InvalidInstance(format!(
                        "`{resource_type}.{}` is not nullable",
                        attr.name
                    )))
                }
                Some(_) => {}
            }
        }
        if let Some(extra) = row.keys().find(|k| entity.attribute(k).is_none()) {
            return Err(AuthzError::InvalidInstance(format!(
                "`{resource_type}` has no column `{extra}`"
            )));
        }
        self.tables.entry(resource_type).or_default().push(row);
        Ok(())
    }

    pub fn rows(&self, resource_type: ResourceType) -> &[Row] {
        self.tables
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Ids of the rows `predicate` selects, in insertion order.
    pub fn select(
        &self,
        resource_type: ResourceType,
        predicate: &QueryPredicate,
    ) -> Result<Vec<String>, AuthzError> {
        let mut ids = Vec::new();
        for row in self.rows(resource_type) {
            if self.matches(resource_type, row, predicate)? {
                ids.push(row_id(row)?.to_string());
            }
        }
        Ok(ids)
    }

    pub fn matches(
        &self,
        resource_type: ResourceType,
        row: &Row,
        predicate: &QueryPredicate,
    ) -> Result<bool, AuthzError> {
        match predicate {
            QueryPredicate::MatchAll => Ok(true),
            QueryPredicate::MatchNone => Ok(false),
            QueryPredicate::FieldEq { field, value } => {
                let actual = row.get(field).ok_or_else(|| AuthzError::MissingAttribute {
                    resource_type,
                    attribute: field.clone(),
                })?;
                Ok(value.matches_json(actual))
            }
            QueryPredicate::And(ps) => {
                for p in ps {
                    if !self.matches(resource_type, row, p)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            QueryPredicate::Or(ps) => {
                for p in ps {
                    if self.matches(resource_type, row, p)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            QueryPredicate::Not(p) => Ok(!self.matches(resource_type, row, p)?),
            QueryPredicate::Relation {
                quantifier,
                relation,
                filter,
            } => {
                let (target, related) = self.related(resource_type, row, relation)?;
                let mut hits = related
                    .into_iter()
                    .map(|r| self.matches(target, r, filter));
                match quantifier {
                    Quantifier::Some => first_true(&mut hits),
                    Quantifier::Every => first_false(&mut hits).map(|found| !found),
                    Quantifier::None => first_true(&mut hits).map(|found| !found),
                }
            }
        }
    }

    fn related<'s>(
        &'s self,
        resource_type: ResourceType,
        row: &Row,
        relation: &str,
    ) -> Result<(ResourceType, Vec<&'s Row>), AuthzError> {
        let rel = self
            .schema
            .relation(resource_type, relation)
            .ok_or_else(|| AuthzError::UnresolvedPath {
                resource_type,
                path: relation.to_string(),
                reason: format!("`{resource_type}` has no relation `{relation}`"),
            })?;
        let rows = self.rows(rel.target);
        let related = match rel.kind {
            RelationKind::BelongsTo { column } => match row.get(column) {
                Some(Value::String(fk)) => rows
                    .iter()
                    .filter(|r| r.get("id").and_then(Value::as_str) == Some(fk.as_str()))
                    .collect(),
                _ => Vec::new(),
            },
            RelationKind::HasMany { foreign_column } => {
                let id = row_id(row)?;
                rows.iter()
                    .filter(|r| r.get(foreign_column).and_then(Value::as_str) == Some(id))
                    .collect()
            }
        };
        Ok((rel.target, related))
    }

    /// Materialize one row with the relations in `includes` nested in.
    pub fn hydrate(
        &self,
        resource_type: ResourceType,
        id: &str,
        includes: &Includes,
    ) -> Result<Option<Instance>, AuthzError> {
        let Some(row) = self
            .rows(resource_type)
            .iter()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
        else {
            return Ok(None);
        };
        let record = self.hydrate_row(resource_type, row, includes)?;
        Ok(Some(Instance::new(resource_type, record)))
    }

    pub fn hydrate_all(
        &self,
        resource_type: ResourceType,
        includes: &Includes,
    ) -> Result<Vec<Instance>, AuthzError> {
        self.rows(resource_type)
            .iter()
            .map(|row| {
                self.hydrate_row(resource_type, row, includes)
                    .map(|record| Instance::new(resource_type, record))
            })
            .collect()
    }

    fn hydrate_row(
        &self,
        resource_type: ResourceType,
        row: &Row,
        includes: &Includes,
    ) -> Result<Row, AuthzError> {
        let mut record = row.clone();
        for (relation, nested) in includes.iter() {
            let (target, related) = self.related(resource_type, row, relation)?;
            let is_to_one = self
                .schema
                .relation(resource_type, relation)
                .is_some_and(|r| r.is_to_one());
            let value = if is_to_one {
                match related.first() {
                    Some(r) => Value::Object(self.hydrate_row(target, r, nested)?),
                    None => Value::Null,
                }
            } else {
                Value::Array(
                    related
                        .into_iter()
                        .map(|r| self.hydrate_row(target, r, nested).map(Value::Object))
                        .collect::<Result<_, _>>()?,
                )
            };
            record.insert(relation.to_string(), value);
        }
        Ok(record)
    }
}

fn row_id(row: &Row) -> Result<&str, AuthzError> {
    row.get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthzError::InvalidInstance("row without a text `id`".into()))
}

fn first_true(
    hits: &mut impl Iterator<Item = Result<bool, AuthzError>>,
) -> Result<bool, AuthzError> {
    for hit in hits {
        if hit? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn first_false(
    hits: &mut impl Iterator<Item = Result<bool, AuthzError>>,
) -> Result<bool, AuthzError> {
    for hit in hits {
        if !hit? {
            return Ok(true);
        }
    }
    Ok(false)
}
