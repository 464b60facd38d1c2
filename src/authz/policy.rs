use kdl::{KdlDocument, KdlNode, KdlValue};

use crate::authz::condition::{split_path, Condition, Quantifier};
use crate::authz::errors::AuthzError;
use crate::authz::registry::Audience;
use crate::authz::types::{ActionSet, ResourceType, Scalar, ValueRef};

/// One `grant` node of a rule file.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyGrant {
    pub resource_type: ResourceType,
    pub actions: ActionSet,
    pub audience: Audience,
    pub condition: Condition,
}

#[derive(Debug, Default)]
pub struct ParsedPolicy {
    pub grants: Vec<PolicyGrant>,
}

/// Parse a KDL rule file into grant definitions.
pub fn parse_kdl_document(source: &str) -> Result<ParsedPolicy, AuthzError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AuthzError::KdlParse(e.to_string()))?;

    let mut policy = ParsedPolicy::default();

    for node in doc.nodes() {
        match node.name().value() {
            "grant" => policy.grants.push(parse_grant(node)?),
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

fn parse_grant(node: &KdlNode) -> Result<PolicyGrant, AuthzError> {
    let resource_type: ResourceType = first_string_arg(node)
        .ok_or_else(|| {
            AuthzError::InvalidPolicy(
                "grant node requires a resource type argument (e.g. grant \"Paper\")".into(),
            )
        })?
        .parse()?;

    let mut actions = None;
    let mut audience = Audience::Authenticated;
    let mut condition = Condition::True;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "actions" => {
                    actions = Some(
                        string_args(child)
                            .map(|a| a.parse())
                            .collect::<Result<ActionSet, _>>()?,
                    );
                }
                "audience" => {
                    audience = match first_string_arg(child).as_deref() {
                        Some("anyone") => Audience::Anyone,
                        Some("authenticated") => Audience::Authenticated,
                        other => {
                            return Err(AuthzError::InvalidPolicy(format!(
                                "grant `{resource_type}`: audience must be \"anyone\" or \"authenticated\", got {other:?}"
                            )))
                        }
                    };
                }
                "when" => condition = parse_conjunction(child)?,
                other => {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "unexpected child `{other}` in grant `{resource_type}` (expected `actions`, `audience` or `when`)"
                    )));
                }
            }
        }
    }

    let actions = actions.ok_or_else(|| {
        AuthzError::InvalidPolicy(format!("grant `{resource_type}` is missing `actions`"))
    })?;

    Ok(PolicyGrant {
        resource_type,
        actions,
        audience,
        condition,
    })
}

/// Children of a node, ANDed. No children means `True`.
fn parse_conjunction(node: &KdlNode) -> Result<Condition, AuthzError> {
    let mut parts = parse_children(node)?;
    Ok(match parts.len() {
        0 => Condition::True,
        1 => parts.remove(0),
        _ => Condition::And(parts),
    })
}

fn parse_children(node: &KdlNode) -> Result<Vec<Condition>, AuthzError> {
    node.children()
        .map(|doc| doc.nodes().iter().map(parse_condition).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn parse_condition(node: &KdlNode) -> Result<Condition, AuthzError> {
    let name = node.name().value();
    match name {
        "always" => Ok(Condition::True),
        "eq" => {
            let path = first_string_arg(node).ok_or_else(|| {
                AuthzError::InvalidPolicy("eq requires a path argument (e.g. eq \"status\" value=\"PUBLISHED\")".into())
            })?;
            let value = match (node.get("value"), node.get("subject")) {
                (Some(v), None) => ValueRef::Literal(scalar(v).ok_or_else(|| {
                    AuthzError::InvalidPolicy(format!("eq `{path}`: unsupported value {v}"))
                })?),
                (None, Some(s)) if s.as_string() == Some("id") => ValueRef::SubjectId,
                _ => {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "eq `{path}` needs exactly one of value=<scalar> or subject=\"id\""
                    )))
                }
            };
            Ok(Condition::FieldEquals {
                path: split_path(&path),
                value,
            })
        }
        "all" => Ok(Condition::And(parse_children(node)?)),
        "any" => Ok(Condition::Or(parse_children(node)?)),
        "not" => Ok(Condition::Not(Box::new(parse_conjunction(node)?))),
        "some" | "every" | "none" => {
            let quantifier = match name {
                "some" => Quantifier::Some,
                "every" => Quantifier::Every,
                _ => Quantifier::None,
            };
            // a missing path is reported by the registry as a malformed quantifier
            let path = first_string_arg(node).map(|p| split_path(&p)).unwrap_or_default();
            Ok(Condition::Relationship {
                quantifier,
                path,
                nested: Box::new(parse_conjunction(node)?),
            })
        }
        other => Err(AuthzError::InvalidPolicy(format!(
            "unknown condition node `{other}`"
        ))),
    }
}

fn scalar(value: &KdlValue) -> Option<Scalar> {
    if let Some(s) = value.as_string() {
        return Some(Scalar::Str(s.to_string()));
    }
    if let Some(b) = value.as_bool() {
        return Some(Scalar::Bool(b));
    }
    value
        .as_integer()
        .and_then(|n| i64::try_from(n).ok())
        .map(Scalar::Int)
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    string_args(node).next().map(str::to_string)
}

fn string_args(node: &KdlNode) -> impl Iterator<Item = &str> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
}
