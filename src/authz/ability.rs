use std::sync::Arc;

use serde::Serialize;

use crate::authz::condition::{Condition, Includes};
use crate::authz::engine;
use crate::authz::errors::AuthzError;
use crate::authz::instance::Instance;
use crate::authz::query::{self, QueryPredicate};
use crate::authz::registry::RuleRegistry;
use crate::authz::schema::Schema;
use crate::authz::types::{Action, ActionSet, ResourceType, Subject};

/// A rule instantiated for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub resource_type: ResourceType,
    pub actions: ActionSet,
    pub condition: Condition,
    pub module: String,
}

/// Everything one subject may do, derived per request.
#[derive(Debug, Clone, Serialize)]
pub struct AbilitySet {
    subject: Option<Subject>,
    wildcard: bool,
    grants: Vec<Grant>,
    #[serde(skip)]
    schema: Arc<Schema>,
}

impl PartialEq for AbilitySet {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
            && self.wildcard == other.wildcard
            && self.grants == other.grants
    }
}

impl AbilitySet {
    /// Collect applicable grants in registration order. Never fails; an
    /// empty grant list is a valid, fully unauthorized result.
    pub fn for_subject(registry: &RuleRegistry, subject: Option<Subject>) -> Self {
        let wildcard = subject
            .as_ref()
            .is_some_and(|s| s.has_role(registry.admin_role()));

        let grants = registry
            .rules()
            .iter()
            .filter_map(|rule| {
                rule.condition
                    .instantiate(subject.as_ref())
                    .map(|condition| Grant {
                        resource_type: rule.resource_type,
                        actions: rule.actions.clone(),
                        condition,
                        module: rule.module.clone(),
                    })
            })
            .collect();

        Self {
            subject,
            wildcard,
            grants,
            schema: Arc::clone(registry.schema()),
        }
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject.as_ref().map(Subject::id)
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn applicable(
        &self,
        action: Action,
        resource_type: ResourceType,
    ) -> impl Iterator<Item = &Grant> {
        self.grants
            .iter()
            .filter(move |g| g.resource_type == resource_type && g.actions.contains(action))
    }

    /// Exact relation tree this subject's grants need loaded.
    pub fn includes_for(&self, action: Action, resource_type: ResourceType) -> Includes {
        let mut includes = Includes::new();
        for grant in self.applicable(action, resource_type) {
            grant.condition.collect_includes(&mut includes);
        }
        includes
    }

    pub fn can(&self, action: Action, instance: &Instance) -> Result<bool, AuthzError> {
        engine::can(self, action, instance)
    }

    pub fn compile(&self, action: Action, resource_type: ResourceType) -> QueryPredicate {
        query::compile(self, action, resource_type)
    }
}
