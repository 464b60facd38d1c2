use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::authz::errors::AuthzError;

/// Name of a global (tenant-independent) role, e.g. "admin".
pub type RoleName = String;

/// The actor an authorization decision is made for. Absent subject = anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    #[serde(default)]
    pub global_roles: BTreeSet<RoleName>,
}

impl Subject {
    pub fn new<I, R>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleName>,
    {
        Self {
            id: id.into(),
            global_roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.global_roles.contains(role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    List,
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::List,
        Action::Read,
        Action::Create,
        Action::Update,
        Action::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl FromStr for Action {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AuthzError::InvalidPolicy(format!("unknown action `{s}`")))
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of actions a grant covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActionSet(BTreeSet<Action>);

impl ActionSet {
    pub fn all() -> Self {
        Self(Action::ALL.into_iter().collect())
    }

    pub fn contains(&self, action: Action) -> bool {
        self.0.contains(&action)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }
}

impl From<Action> for ActionSet {
    fn from(action: Action) -> Self {
        Self(BTreeSet::from([action]))
    }
}

impl<const N: usize> From<[Action; N]> for ActionSet {
    fn from(actions: [Action; N]) -> Self {
        Self(actions.into_iter().collect())
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<T: IntoIterator<Item = Action>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Closed set of domain entities that can be authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    User,
    Conference,
    ConferenceMember,
    Committee,
    AgendaItem,
    Nation,
    Delegation,
    DelegationMember,
    ConferenceSupervisor,
    SupervisorAssignment,
    SingleParticipant,
    Paper,
}

impl ResourceType {
    pub const ALL: [ResourceType; 12] = [
        ResourceType::User,
        ResourceType::Conference,
        ResourceType::ConferenceMember,
        ResourceType::Committee,
        ResourceType::AgendaItem,
        ResourceType::Nation,
        ResourceType::Delegation,
        ResourceType::DelegationMember,
        ResourceType::ConferenceSupervisor,
        ResourceType::SupervisorAssignment,
        ResourceType::SingleParticipant,
        ResourceType::Paper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::User => "User",
            ResourceType::Conference => "Conference",
            ResourceType::ConferenceMember => "ConferenceMember",
            ResourceType::Committee => "Committee",
            ResourceType::AgendaItem => "AgendaItem",
            ResourceType::Nation => "Nation",
            ResourceType::Delegation => "Delegation",
            ResourceType::DelegationMember => "DelegationMember",
            ResourceType::ConferenceSupervisor => "ConferenceSupervisor",
            ResourceType::SupervisorAssignment => "SupervisorAssignment",
            ResourceType::SingleParticipant => "SingleParticipant",
            ResourceType::Paper => "Paper",
        }
    }
}

impl FromStr for ResourceType {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AuthzError::UnknownResourceType(s.to_string()))
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal value a field can be compared against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Scalar {
    /// Compare against a loaded JSON value. `null` and values of another
    /// type never match.
    pub fn matches_json(&self, value: &serde_json::Value) -> bool {
        match (self, value) {
            (Scalar::Bool(a), serde_json::Value::Bool(b)) => a == b,
            (Scalar::Int(a), serde_json::Value::Number(n)) => n.as_i64() == Some(*a),
            (Scalar::Str(a), serde_json::Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Right-hand side of a field comparison. `SubjectId` is substituted with the
/// requesting subject's id at evaluation/compile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRef {
    Literal(Scalar),
    SubjectId,
}

impl ValueRef {
    /// Resolve against the requesting subject. Returns `None` for `SubjectId`
    /// when the subject is anonymous: such a comparison matches nothing.
    pub fn resolve(&self, subject_id: Option<&str>) -> Option<Scalar> {
        match self {
            ValueRef::Literal(s) => Some(s.clone()),
            ValueRef::SubjectId => subject_id.map(|id| Scalar::Str(id.to_string())),
        }
    }
}

impl From<&str> for ValueRef {
    fn from(s: &str) -> Self {
        ValueRef::Literal(Scalar::Str(s.to_string()))
    }
}

impl From<String> for ValueRef {
    fn from(s: String) -> Self {
        ValueRef::Literal(Scalar::Str(s))
    }
}

impl From<&String> for ValueRef {
    fn from(s: &String) -> Self {
        ValueRef::Literal(Scalar::Str(s.clone()))
    }
}

impl From<i64> for ValueRef {
    fn from(n: i64) -> Self {
        ValueRef::Literal(Scalar::Int(n))
    }
}

impl From<bool> for ValueRef {
    fn from(b: bool) -> Self {
        ValueRef::Literal(Scalar::Bool(b))
    }
}

impl From<Scalar> for ValueRef {
    fn from(s: Scalar) -> Self {
        ValueRef::Literal(s)
    }
}
