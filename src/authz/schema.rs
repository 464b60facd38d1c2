//! Shape of the persisted domain: attributes and relations per resource type.
//!
//! Both the decision evaluator and the storage executors walk relations through
//! this one description, which keeps their notion of "reachable" identical.

use std::collections::BTreeMap;

use crate::authz::errors::AuthzError;
use crate::authz::types::{ResourceType, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Text,
    Integer,
    Boolean,
}

impl AttributeType {
    pub fn accepts(&self, value: &Scalar) -> bool {
        matches!(
            (self, value),
            (AttributeType::Text, Scalar::Str(_))
                | (AttributeType::Integer, Scalar::Int(_))
                | (AttributeType::Boolean, Scalar::Bool(_))
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            AttributeType::Text => "text",
            AttributeType::Integer => "integer",
            AttributeType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: &'static str,
    pub ty: AttributeType,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `self.column` holds the target's id (to-one, possibly null).
    BelongsTo { column: &'static str },
    /// `target.foreign_column` holds `self.id` (to-many).
    HasMany { foreign_column: &'static str },
}

#[derive(Debug, Clone)]
pub struct Relation {
    pub name: &'static str,
    pub target: ResourceType,
    pub kind: RelationKind,
}

impl Relation {
    pub fn is_to_one(&self) -> bool {
        matches!(self.kind, RelationKind::BelongsTo { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub resource_type: ResourceType,
    pub table: &'static str,
    pub attributes: Vec<Attribute>,
    pub relations: Vec<Relation>,
}

impl Entity {
    /// Start an entity definition; every entity has a text primary key `id`.
    pub fn new(resource_type: ResourceType, table: &'static str) -> Self {
        Self {
            resource_type,
            table,
            attributes: vec![Attribute {
                name: "id",
                ty: AttributeType::Text,
                nullable: false,
            }],
            relations: Vec::new(),
        }
    }

    fn attr(mut self, name: &'static str, ty: AttributeType, nullable: bool) -> Self {
        self.attributes.push(Attribute { name, ty, nullable });
        self
    }

    pub fn text(self, name: &'static str) -> Self {
        self.attr(name, AttributeType::Text, false)
    }

    pub fn nullable_text(self, name: &'static str) -> Self {
        self.attr(name, AttributeType::Text, true)
    }

    pub fn integer(self, name: &'static str) -> Self {
        self.attr(name, AttributeType::Integer, false)
    }

    pub fn boolean(self, name: &'static str) -> Self {
        self.attr(name, AttributeType::Boolean, false)
    }

    /// To-one relation through a non-null foreign key column on this entity.
    pub fn belongs_to(
        self,
        name: &'static str,
        target: ResourceType,
        column: &'static str,
    ) -> Self {
        self.text(column).relation(name, target, RelationKind::BelongsTo { column })
    }

    /// To-one relation through a nullable foreign key column on this entity.
    pub fn optional_belongs_to(
        self,
        name: &'static str,
        target: ResourceType,
        column: &'static str,
    ) -> Self {
        self.nullable_text(column)
            .relation(name, target, RelationKind::BelongsTo { column })
    }

    pub fn has_many(
        self,
        name: &'static str,
        target: ResourceType,
        foreign_column: &'static str,
    ) -> Self {
        self.relation(name, target, RelationKind::HasMany { foreign_column })
    }

    fn relation(mut self, name: &'static str, target: ResourceType, kind: RelationKind) -> Self {
        self.relations.push(Relation { name, target, kind });
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relation_named(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: BTreeMap<ResourceType, Entity>,
}

impl Schema {
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            entities: entities
                .into_iter()
                .map(|e| (e.resource_type, e))
                .collect(),
        }
    }

    pub fn entity(&self, resource_type: ResourceType) -> Result<&Entity, AuthzError> {
        self.entities.get(&resource_type).ok_or_else(|| {
            AuthzError::InvalidSchema(format!("no entity defined for `{resource_type}`"))
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn relation(&self, resource_type: ResourceType, name: &str) -> Option<&Relation> {
        self.entities
            .get(&resource_type)
            .and_then(|e| e.relation_named(name))
    }

    pub fn attribute(&self, resource_type: ResourceType, name: &str) -> Option<&Attribute> {
        self.entities
            .get(&resource_type)
            .and_then(|e| e.attribute(name))
    }

    /// Check that relations point at defined entities and existing columns,
    /// and that no name is both an attribute and a relation.
    pub fn validate(&self) -> Result<(), AuthzError> {
        for entity in self.entities.values() {
            for rel in &entity.relations {
                let target = self.entities.get(&rel.target).ok_or_else(|| {
                    AuthzError::InvalidSchema(format!(
                        "relation `{}.{}` targets undefined entity `{}`",
                        entity.resource_type, rel.name, rel.target
                    ))
                })?;
                if entity.attribute(rel.name).is_some() {
                    return Err(AuthzError::InvalidSchema(format!(
                        "`{}.{}` is both an attribute and a relation",
                        entity.resource_type, rel.name
                    )));
                }
                let (owner, column) = match rel.kind {
                    RelationKind::BelongsTo { column } => (entity, column),
                    RelationKind::HasMany { foreign_column } => (target, foreign_column),
                };
                if owner.attribute(column).is_none() {
                    return Err(AuthzError::InvalidSchema(format!(
                        "relation `{}.{}` uses missing column `{}.{}`",
                        entity.resource_type, rel.name, owner.resource_type, column
                    )));
                }
            }
        }
        Ok(())
    }

    /// The conference platform's data model.
    pub fn conference() -> Self {
        use ResourceType::*;

        Self::from_entities([
            Entity::new(User, "users")
                .text("name")
                .nullable_text("email")
                .has_many("conference_memberships", ConferenceMember, "user_id")
                .has_many("delegation_memberships", DelegationMember, "user_id")
                .has_many("supervisions", ConferenceSupervisor, "user_id")
                .has_many("single_participations", SingleParticipant, "user_id"),
            Entity::new(Conference, "conferences")
                .text("title")
                .text("state")
                .has_many("members", ConferenceMember, "conference_id")
                .has_many("committees", Committee, "conference_id")
                .has_many("delegations", Delegation, "conference_id")
                .has_many("supervisors", ConferenceSupervisor, "conference_id")
                .has_many("single_participants", SingleParticipant, "conference_id"),
            Entity::new(ConferenceMember, "conference_members")
                .text("role")
                .belongs_to("conference", Conference, "conference_id")
                .belongs_to("user", User, "user_id"),
            Entity::new(Committee, "committees")
                .text("name")
                .text("abbreviation")
                .belongs_to("conference", Conference, "conference_id")
                .has_many("agenda_items", AgendaItem, "committee_id"),
            Entity::new(AgendaItem, "agenda_items")
                .text("title")
                .belongs_to("committee", Committee, "committee_id")
                .has_many("papers", Paper, "agenda_item_id"),
            Entity::new(Nation, "nations").text("alpha3_code"),
            Entity::new(Delegation, "delegations")
                .text("entry_code")
                .boolean("applied")
                .belongs_to("conference", Conference, "conference_id")
                .optional_belongs_to("assigned_nation", Nation, "assigned_nation_id")
                .has_many("members", DelegationMember, "delegation_id")
                .has_many("supervisor_assignments", SupervisorAssignment, "delegation_id")
                .has_many("papers", Paper, "delegation_id"),
            Entity::new(DelegationMember, "delegation_members")
                .boolean("is_head_delegate")
                .belongs_to("delegation", Delegation, "delegation_id")
                .belongs_to("user", User, "user_id")
                .optional_belongs_to("assigned_committee", Committee, "assigned_committee_id"),
            Entity::new(ConferenceSupervisor, "conference_supervisors")
                .boolean("plans_attendance")
                .belongs_to("conference", Conference, "conference_id")
                .belongs_to("user", User, "user_id")
                .has_many("assignments", SupervisorAssignment, "supervisor_id"),
            Entity::new(SupervisorAssignment, "supervisor_assignments")
                .belongs_to("supervisor", ConferenceSupervisor, "supervisor_id")
                .belongs_to("delegation", Delegation, "delegation_id"),
            Entity::new(SingleParticipant, "single_participants")
                .boolean("applied")
                .belongs_to("conference", Conference, "conference_id")
                .belongs_to("user", User, "user_id"),
            Entity::new(Paper, "papers")
                .text("title")
                .text("status")
                .integer("revision")
                .belongs_to("delegation", Delegation, "delegation_id")
                .belongs_to("agenda_item", AgendaItem, "agenda_item_id"),
        ])
    }
}
