//! Condition trees attached to grants, and their evaluation against
//! materialized instances.
//!
//! Supported nodes:
//! - `True`
//! - `FieldEquals`: dot-path through to-one relations ending at an attribute,
//!   compared with a literal or the requesting subject's id
//! - `And`, `Or`, `Not`
//! - `Relationship`: SOME / EVERY / NONE quantification over a relation path

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::authz::errors::AuthzError;
use crate::authz::instance::TYPE_FIELD;
use crate::authz::schema::{AttributeType, Schema};
use crate::authz::types::{ResourceType, ValueRef};

// ─── AST ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantifier {
    Some,
    Every,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    True,
    FieldEquals {
        path: Vec<String>,
        value: ValueRef,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Relationship {
        quantifier: Quantifier,
        path: Vec<String>,
        nested: Box<Condition>,
    },
}

// ─── Builders ───────────────────────────────────────────────────────────

pub fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn always() -> Condition {
    Condition::True
}

pub fn never() -> Condition {
    Condition::Not(Box::new(Condition::True))
}

/// `field_eq("conference.id", subject.id())`
pub fn field_eq(path: &str, value: impl Into<ValueRef>) -> Condition {
    Condition::FieldEquals {
        path: split_path(path),
        value: value.into(),
    }
}

pub fn subject_id() -> ValueRef {
    ValueRef::SubjectId
}

pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::And(conditions.into_iter().collect())
}

pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Condition {
    Condition::Or(conditions.into_iter().collect())
}

pub fn not(condition: Condition) -> Condition {
    Condition::Not(Box::new(condition))
}

fn quantified(quantifier: Quantifier, path: &str, nested: Condition) -> Condition {
    Condition::Relationship {
        quantifier,
        path: split_path(path),
        nested: Box::new(nested),
    }
}

pub fn some(path: &str, nested: Condition) -> Condition {
    quantified(Quantifier::Some, path, nested)
}

/// Vacuously true when nothing is reachable through `path`.
pub fn every(path: &str, nested: Condition) -> Condition {
    quantified(Quantifier::Every, path, nested)
}

pub fn none(path: &str, nested: Condition) -> Condition {
    quantified(Quantifier::None, path, nested)
}

// ─── Includes ───────────────────────────────────────────────────────────

/// Tree of relations that must be loaded on an instance before evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Includes(BTreeMap<String, Includes>);

impl Includes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_path<S: AsRef<str>>(&mut self, path: &[S]) {
        let mut node = self;
        for seg in path {
            node = node.0.entry(seg.as_ref().to_string()).or_default();
        }
    }

    pub fn get(&self, relation: &str) -> Option<&Includes> {
        self.0.get(relation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Includes)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Condition {
    /// Collect every relation path this condition walks into `out`.
    pub fn collect_includes(&self, out: &mut Includes) {
        self.collect_with_prefix(&mut Vec::new(), out);
    }

    fn collect_with_prefix(&self, prefix: &mut Vec<String>, out: &mut Includes) {
        match self {
            Condition::True => {}
            Condition::FieldEquals { path, .. } => {
                if path.len() > 1 {
                    let mut full = prefix.clone();
                    full.extend_from_slice(&path[..path.len() - 1]);
                    out.insert_path(&full);
                }
            }
            Condition::And(cs) | Condition::Or(cs) => {
                for c in cs {
                    c.collect_with_prefix(prefix, out);
                }
            }
            Condition::Not(c) => c.collect_with_prefix(prefix, out),
            Condition::Relationship { path, nested, .. } => {
                let depth = prefix.len();
                prefix.extend(path.iter().cloned());
                out.insert_path(prefix);
                nested.collect_with_prefix(prefix, out);
                prefix.truncate(depth);
            }
        }
    }

    pub fn references_subject(&self) -> bool {
        match self {
            Condition::True => false,
            Condition::FieldEquals { value, .. } => matches!(value, ValueRef::SubjectId),
            Condition::And(cs) | Condition::Or(cs) => cs.iter().any(Condition::references_subject),
            Condition::Not(c) => c.references_subject(),
            Condition::Relationship { nested, .. } => nested.references_subject(),
        }
    }
}

// ─── Validation ─────────────────────────────────────────────────────────

/// Check every path and literal of `condition` against the schema, rooted
/// at `resource_type`.
pub fn validate(
    condition: &Condition,
    schema: &Schema,
    resource_type: ResourceType,
) -> Result<(), AuthzError> {
    match condition {
        Condition::True => Ok(()),
        Condition::FieldEquals { path, value } => {
            let Some((attr_name, relations)) = path.split_last() else {
                return Err(AuthzError::UnresolvedPath {
                    resource_type,
                    path: String::new(),
                    reason: "empty field path".into(),
                });
            };
            let mut current = resource_type;
            for rel_name in relations {
                let rel = schema.relation(current, rel_name).ok_or_else(|| {
                    unresolved(resource_type, path, format!("`{current}` has no relation `{rel_name}`"))
                })?;
                if !rel.is_to_one() {
                    return Err(unresolved(
                        resource_type,
                        path,
                        format!("`{current}.{rel_name}` is to-many; use a quantifier"),
                    ));
                }
                current = rel.target;
            }
            let attr = schema.attribute(current, attr_name).ok_or_else(|| {
                unresolved(resource_type, path, format!("`{current}` has no attribute `{attr_name}`"))
            })?;
            let ok = match value {
                ValueRef::Literal(s) => attr.ty.accepts(s),
                ValueRef::SubjectId => attr.ty == AttributeType::Text,
            };
            if !ok {
                return Err(AuthzError::TypeMismatch {
                    resource_type: current,
                    attribute: attr_name.clone(),
                    expected: attr.ty.name().to_string(),
                });
            }
            Ok(())
        }
        Condition::And(cs) | Condition::Or(cs) => cs
            .iter()
            .try_for_each(|c| validate(c, schema, resource_type)),
        Condition::Not(c) => validate(c, schema, resource_type),
        Condition::Relationship {
            quantifier,
            path,
            nested,
        } => {
            if path.is_empty() {
                return Err(AuthzError::MalformedQuantifier(format!(
                    "{quantifier:?} on `{resource_type}` has an empty relation path"
                )));
            }
            let mut current = resource_type;
            for rel_name in path {
                let rel = schema.relation(current, rel_name).ok_or_else(|| {
                    unresolved(resource_type, path, format!("`{current}` has no relation `{rel_name}`"))
                })?;
                current = rel.target;
            }
            validate(nested, schema, current)
        }
    }
}

fn unresolved(resource_type: ResourceType, path: &[String], reason: String) -> AuthzError {
    AuthzError::UnresolvedPath {
        resource_type,
        path: path.join("."),
        reason,
    }
}

// ─── Evaluator ──────────────────────────────────────────────────────────

/// What a condition is evaluated with besides the instance itself.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub schema: &'a Schema,
    pub subject_id: Option<&'a str>,
}

/// Evaluate `condition` against one loaded record of type `resource_type`.
///
/// Relations that are referenced but absent from the record are an error,
/// never a silent `false`.
pub fn evaluate(
    condition: &Condition,
    ctx: &EvalContext<'_>,
    resource_type: ResourceType,
    record: &Map<String, Value>,
) -> Result<bool, AuthzError> {
    match condition {
        Condition::True => Ok(true),
        Condition::FieldEquals { path, value } => {
            let Some((attr_name, relations)) = path.split_last() else {
                return Err(unresolved(resource_type, path, "empty field path".into()));
            };
            let mut current_type = resource_type;
            let mut current = record;
            for rel_name in relations {
                let rel = ctx.schema.relation(current_type, rel_name).ok_or_else(|| {
                    unresolved(resource_type, path, format!("`{current_type}` has no relation `{rel_name}`"))
                })?;
                match current.get(rel_name) {
                    None => {
                        return Err(AuthzError::UnloadedRelation {
                            resource_type: current_type,
                            relation: rel_name.clone(),
                        })
                    }
                    Some(Value::Null) if rel.is_to_one() => return Ok(false),
                    Some(Value::Object(next)) if rel.is_to_one() => {
                        check_tag(next, rel.target)?;
                        current = next;
                        current_type = rel.target;
                    }
                    Some(_) => {
                        return Err(AuthzError::InvalidInstance(format!(
                            "`{current_type}.{rel_name}` must be a single object or null"
                        )))
                    }
                }
            }
            if ctx.schema.attribute(current_type, attr_name).is_none() {
                return Err(unresolved(
                    resource_type,
                    path,
                    format!("`{current_type}` has no attribute `{attr_name}`"),
                ));
            }
            let actual = current
                .get(attr_name)
                .ok_or_else(|| AuthzError::MissingAttribute {
                    resource_type: current_type,
                    attribute: attr_name.clone(),
                })?;
            Ok(match value.resolve(ctx.subject_id) {
                Some(expected) => expected.matches_json(actual),
                None => false,
            })
        }
        Condition::And(cs) => {
            for c in cs {
                if !evaluate(c, ctx, resource_type, record)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or(cs) => {
            for c in cs {
                if evaluate(c, ctx, resource_type, record)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not(c) => Ok(!evaluate(c, ctx, resource_type, record)?),
        Condition::Relationship {
            quantifier,
            path,
            nested,
        } => {
            let (target, elements) = reachable(ctx.schema, resource_type, record, path)?;
            match quantifier {
                Quantifier::Some => {
                    for e in elements {
                        if evaluate(nested, ctx, target, e)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Quantifier::Every => {
                    for e in elements {
                        if !evaluate(nested, ctx, target, e)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Quantifier::None => {
                    for e in elements {
                        if evaluate(nested, ctx, target, e)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
            }
        }
    }
}

/// All records reachable from `record` by following `path`, flattened.
fn reachable<'r>(
    schema: &Schema,
    resource_type: ResourceType,
    record: &'r Map<String, Value>,
    path: &[String],
) -> Result<(ResourceType, Vec<&'r Map<String, Value>>), AuthzError> {
    if path.is_empty() {
        return Err(AuthzError::MalformedQuantifier(format!(
            "empty relation path on `{resource_type}`"
        )));
    }
    let mut current_type = resource_type;
    let mut frontier = vec![record];
    for rel_name in path {
        let rel = schema.relation(current_type, rel_name).ok_or_else(|| {
            unresolved(resource_type, path, format!("`{current_type}` has no relation `{rel_name}`"))
        })?;
        let mut next = Vec::new();
        for r in frontier {
            let value = r.get(rel_name).ok_or_else(|| AuthzError::UnloadedRelation {
                resource_type: current_type,
                relation: rel_name.clone(),
            })?;
            match (rel.is_to_one(), value) {
                (true, Value::Null) => {}
                (true, Value::Object(m)) => {
                    check_tag(m, rel.target)?;
                    next.push(m);
                }
                (false, Value::Array(items)) => {
                    for item in items {
                        let Value::Object(m) = item else {
                            return Err(AuthzError::InvalidInstance(format!(
                                "`{current_type}.{rel_name}` must contain objects"
                            )));
                        };
                        check_tag(m, rel.target)?;
                        next.push(m);
                    }
                }
                _ => {
                    return Err(AuthzError::InvalidInstance(format!(
                        "`{current_type}.{rel_name}` has the wrong shape for a {} relation",
                        if rel.is_to_one() { "to-one" } else { "to-many" }
                    )))
                }
            }
        }
        frontier = next;
        current_type = rel.target;
    }
    Ok((current_type, frontier))
}

/// Nested records may carry their own discriminator; it has to agree with
/// the schema.
fn check_tag(record: &Map<String, Value>, expected: ResourceType) -> Result<(), AuthzError> {
    match record.get(TYPE_FIELD).and_then(Value::as_str) {
        Some(tag) if tag != expected.as_str() => Err(AuthzError::InvalidInstance(format!(
            "nested record tagged `{tag}` where `{expected}` was expected"
        ))),
        _ => Ok(()),
    }
}
