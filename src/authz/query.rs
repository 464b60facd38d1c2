//! Compiles an ability set into a storage-layer filter.
//!
//! The predicate selects exactly the rows `engine::can` accepts once they
//! are materialized with their relations loaded.

use serde::Serialize;

use crate::authz::ability::AbilitySet;
use crate::authz::condition::{Condition, Quantifier};
use crate::authz::types::{Action, ResourceType, Scalar};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPredicate {
    MatchAll,
    MatchNone,
    FieldEq {
        field: String,
        value: Scalar,
    },
    And(Vec<QueryPredicate>),
    Or(Vec<QueryPredicate>),
    Not(Box<QueryPredicate>),
    Relation {
        quantifier: Quantifier,
        relation: String,
        filter: Box<QueryPredicate>,
    },
}

impl QueryPredicate {
    fn relation(quantifier: Quantifier, relation: &str, filter: QueryPredicate) -> Self {
        QueryPredicate::Relation {
            quantifier,
            relation: relation.to_string(),
            filter: Box::new(filter),
        }
    }

    /// Wrap `inner` in one `Relation` per segment, innermost last.
    fn nest(quantifier: Quantifier, path: &[String], inner: QueryPredicate) -> Self {
        path.iter()
            .rev()
            .fold(inner, |acc, rel| Self::relation(quantifier, rel, acc))
    }
}

/// Filter for the rows of `resource_type` the subject may `action`.
///
/// Never fails: no applicable grants yields `MatchNone`.
pub fn compile(
    ability: &AbilitySet,
    action: Action,
    resource_type: ResourceType,
) -> QueryPredicate {
    if ability.is_wildcard() {
        return QueryPredicate::MatchAll;
    }

    let subject_id = ability.subject_id();
    let mut branches: Vec<QueryPredicate> = ability
        .applicable(action, resource_type)
        .map(|g| compile_condition(&g.condition, subject_id))
        .collect();

    match branches.len() {
        0 => QueryPredicate::MatchNone,
        1 => branches.remove(0),
        _ => QueryPredicate::Or(branches),
    }
}

pub fn compile_condition(condition: &Condition, subject_id: Option<&str>) -> QueryPredicate {
    match condition {
        Condition::True => QueryPredicate::MatchAll,
        Condition::FieldEquals { path, value } => {
            let (Some((field, relations)), Some(value)) =
                (path.split_last(), value.resolve(subject_id))
            else {
                return QueryPredicate::MatchNone;
            };
            QueryPredicate::nest(
                Quantifier::Some,
                relations,
                QueryPredicate::FieldEq {
                    field: field.clone(),
                    value,
                },
            )
        }
        Condition::And(cs) if cs.is_empty() => QueryPredicate::MatchAll,
        Condition::And(cs) => QueryPredicate::And(
            cs.iter().map(|c| compile_condition(c, subject_id)).collect(),
        ),
        Condition::Or(cs) if cs.is_empty() => QueryPredicate::MatchNone,
        Condition::Or(cs) => QueryPredicate::Or(
            cs.iter().map(|c| compile_condition(c, subject_id)).collect(),
        ),
        Condition::Not(c) => QueryPredicate::Not(Box::new(compile_condition(c, subject_id))),
        Condition::Relationship {
            quantifier,
            path,
            nested,
        } => {
            let inner = compile_condition(nested, subject_id);
            match quantifier {
                Quantifier::Some => QueryPredicate::nest(Quantifier::Some, path, inner),
                Quantifier::Every => QueryPredicate::nest(Quantifier::Every, path, inner),
                Quantifier::None => match path.split_first() {
                    Some((first, rest)) => QueryPredicate::relation(
                        Quantifier::None,
                        first,
                        QueryPredicate::nest(Quantifier::Some, rest, inner),
                    ),
                    // validated away at registry build
                    None => QueryPredicate::MatchNone,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::condition::{all, any, every, field_eq, none, not, some, subject_id};
    use crate::authz::registry::RegistryBuilder;
    use crate::authz::schema::Schema;
    use crate::authz::types::Subject;
    use serde_json::json;

    fn rel(q: Quantifier, r: &str, f: QueryPredicate) -> QueryPredicate {
        QueryPredicate::relation(q, r, f)
    }

    fn eq(field: &str, v: &str) -> QueryPredicate {
        QueryPredicate::FieldEq {
            field: field.into(),
            value: Scalar::Str(v.into()),
        }
    }

    #[test]
    fn test_some_over_path_nests() {
        let p = compile_condition(&some("members.user", field_eq("id", subject_id())), Some("u1"));
        assert_eq!(
            p,
            rel(Quantifier::Some, "members", rel(Quantifier::Some, "user", eq("id", "u1")))
        );
    }

    #[test]
    fn test_every_and_none_shapes() {
        let p = compile_condition(&every("members.user", field_eq("id", "x")), None);
        assert_eq!(
            p,
            rel(Quantifier::Every, "members", rel(Quantifier::Every, "user", eq("id", "x")))
        );
        let p = compile_condition(&none("members.user", field_eq("id", "x")), None);
        assert_eq!(
            p,
            rel(Quantifier::None, "members", rel(Quantifier::Some, "user", eq("id", "x")))
        );
    }

    #[test]
    fn test_field_path_compiles_to_some() {
        let p = compile_condition(&field_eq("conference.state", "ACTIVE"), None);
        assert_eq!(p, rel(Quantifier::Some, "conference", eq("state", "ACTIVE")));
    }

    #[test]
    fn test_anonymous_subject_id_matches_nothing() {
        let p = compile_condition(&field_eq("user_id", subject_id()), None);
        assert_eq!(p, QueryPredicate::MatchNone);
        let p = compile_condition(&not(field_eq("user_id", subject_id())), None);
        assert_eq!(p, QueryPredicate::Not(Box::new(QueryPredicate::MatchNone)));
    }

    #[test]
    fn test_empty_junctions() {
        assert_eq!(compile_condition(&all(Vec::new()), None), QueryPredicate::MatchAll);
        assert_eq!(compile_condition(&any(Vec::new()), None), QueryPredicate::MatchNone);
    }

    #[test]
    fn test_compile_or_in_registration_order_and_deterministic() {
        let mut b = RegistryBuilder::new(Schema::conference());
        b.module("a").grant(ResourceType::Delegation, Action::Read, |s| {
            some("members", field_eq("user_id", s.id()))
        });
        b.module("b").grant(ResourceType::Delegation, Action::Read, |_| field_eq("applied", true));
        let reg = b.build().unwrap();
        let ability = AbilitySet::for_subject(&reg, Some(Subject::new("u1", Vec::<String>::new())));

        let first = compile(&ability, Action::Read, ResourceType::Delegation);
        let second = compile(&ability, Action::Read, ResourceType::Delegation);
        assert_eq!(first, second);
        let QueryPredicate::Or(branches) = &first else {
            panic!("expected Or, got {first:?}");
        };
        assert_eq!(branches[0], rel(Quantifier::Some, "members", eq("user_id", "u1")));
        assert_eq!(
            branches[1],
            QueryPredicate::FieldEq {
                field: "applied".into(),
                value: Scalar::Bool(true)
            }
        );
    }

    #[test]
    fn test_no_grants_and_wildcard() {
        let reg = RegistryBuilder::new(Schema::conference()).build().unwrap();
        let user = AbilitySet::for_subject(&reg, Some(Subject::new("u1", Vec::<String>::new())));
        assert_eq!(compile(&user, Action::List, ResourceType::Paper), QueryPredicate::MatchNone);
        let admin = AbilitySet::for_subject(&reg, Some(Subject::new("root", ["admin"])));
        assert_eq!(compile(&admin, Action::Delete, ResourceType::Paper), QueryPredicate::MatchAll);
    }

    #[test]
    fn test_serializes_snake_case() {
        let v = serde_json::to_value(rel(Quantifier::Some, "members", QueryPredicate::MatchAll)).unwrap();
        assert_eq!(
            v,
            json!({ "relation": { "quantifier": "some", "relation": "members", "filter": "match_all" } })
        );
    }
}
