use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::authz::condition::{self, Condition, Includes};
use crate::authz::errors::AuthzError;
use crate::authz::schema::Schema;
use crate::authz::types::{Action, ActionSet, ResourceType, RoleName, Subject};

pub const DEFAULT_ADMIN_ROLE: &str = "admin";

/// Produces a grant's condition. Subject-dependent builders only run for
/// authenticated subjects.
#[derive(Clone)]
pub enum ConditionBuilder {
    Static(Condition),
    PerSubject(Arc<dyn Fn(&Subject) -> Condition + Send + Sync>),
}

impl ConditionBuilder {
    /// `None` when the rule does not apply to this (anonymous) subject.
    pub fn instantiate(&self, subject: Option<&Subject>) -> Option<Condition> {
        match (self, subject) {
            (ConditionBuilder::Static(c), _) => Some(c.clone()),
            (ConditionBuilder::PerSubject(f), Some(s)) => Some(f(s)),
            (ConditionBuilder::PerSubject(_), None) => None,
        }
    }

    pub fn audience(&self) -> Audience {
        match self {
            ConditionBuilder::Static(_) => Audience::Anyone,
            ConditionBuilder::PerSubject(_) => Audience::Authenticated,
        }
    }
}

impl fmt::Debug for ConditionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionBuilder::Static(c) => f.debug_tuple("Static").field(c).finish(),
            ConditionBuilder::PerSubject(_) => f.write_str("PerSubject(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Anyone,
    Authenticated,
}

/// One registration, as written by a rule module.
#[derive(Debug, Clone)]
pub struct GrantRule {
    pub module: String,
    pub resource_type: ResourceType,
    pub actions: ActionSet,
    pub condition: ConditionBuilder,
}

impl GrantRule {
    pub fn covers(&self, action: Action, resource_type: ResourceType) -> bool {
        self.resource_type == resource_type && self.actions.contains(action)
    }
}

/// Collects registrations from rule modules before freezing them into a
/// [`RuleRegistry`].
pub struct RegistryBuilder {
    schema: Schema,
    admin_role: RoleName,
    checked_roles: BTreeSet<RoleName>,
    modules: Vec<String>,
    rules: Vec<GrantRule>,
}

impl RegistryBuilder {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
            checked_roles: BTreeSet::new(),
            modules: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn admin_role(mut self, role: impl Into<RoleName>) -> Self {
        self.admin_role = role.into();
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Open (or reopen) a named rule module.
    pub fn module(&mut self, name: impl Into<String>) -> Registrar<'_> {
        let name = name.into();
        if !self.modules.contains(&name) {
            self.modules.push(name.clone());
        }
        Registrar {
            builder: self,
            module: name,
        }
    }

    /// Validate every registration against the schema and freeze.
    ///
    /// Subject-dependent conditions are instantiated for a role-less
    /// subject, for each role declared with [`Registrar::checks_role`] and
    /// for all declared roles at once, and every variant is validated.
    pub fn build(self) -> Result<RuleRegistry, AuthzError> {
        self.schema.validate()?;

        let validation_subjects = self.validation_subjects();
        for rule in &self.rules {
            if rule.actions.is_empty() {
                return Err(AuthzError::InvalidPolicy(format!(
                    "grant on `{}` in module `{}` covers no actions",
                    rule.resource_type, rule.module
                )));
            }
            match &rule.condition {
                ConditionBuilder::Static(c) => {
                    if c.references_subject() {
                        return Err(AuthzError::SubjectInPublicGrant {
                            module: rule.module.clone(),
                            resource_type: rule.resource_type,
                        });
                    }
                    condition::validate(c, &self.schema, rule.resource_type)?;
                }
                ConditionBuilder::PerSubject(f) => {
                    for subject in &validation_subjects {
                        condition::validate(&f(subject), &self.schema, rule.resource_type)?;
                    }
                }
            }
        }

        let resource_types: BTreeSet<ResourceType> =
            self.rules.iter().map(|r| r.resource_type).collect();
        tracing::info!(
            modules = self.modules.len(),
            rules = self.rules.len(),
            resource_types = resource_types.len(),
            admin_role = %self.admin_role,
            checked_roles = self.checked_roles.len(),
            "Rule registry built"
        );

        Ok(RuleRegistry {
            schema: Arc::new(self.schema),
            admin_role: self.admin_role,
            modules: self.modules,
            rules: self.rules,
        })
    }

    fn validation_subjects(&self) -> Vec<Subject> {
        let mut subjects = vec![placeholder_subject()];
        subjects.extend(
            self.checked_roles
                .iter()
                .map(|role| Subject::new(PLACEHOLDER_ID, [role.clone()])),
        );
        if self.checked_roles.len() > 1 {
            subjects.push(Subject::new(PLACEHOLDER_ID, self.checked_roles.iter().cloned()));
        }
        subjects
    }
}

/// Registration handle scoped to one rule module.
pub struct Registrar<'a> {
    builder: &'a mut RegistryBuilder,
    module: String,
}

impl Registrar<'_> {
    /// Declare a global role this module's conditions branch on, so that
    /// `build` also validates the branch taken for holders of that role.
    pub fn checks_role(&mut self, role: impl Into<RoleName>) -> &mut Self {
        self.builder.checked_roles.insert(role.into());
        self
    }

    /// Grant for authenticated subjects. The condition may reference
    /// the subject's id. Branches on global roles are only validated at
    /// build time when the role is declared with [`Registrar::checks_role`].
    pub fn grant<F>(
        &mut self,
        resource_type: ResourceType,
        actions: impl Into<ActionSet>,
        condition: F,
    ) -> &mut Self
    where
        F: Fn(&Subject) -> Condition + Send + Sync + 'static,
    {
        self.push(
            resource_type,
            actions.into(),
            ConditionBuilder::PerSubject(Arc::new(condition)),
        )
    }

    /// Grant that also applies to anonymous requests.
    pub fn public_grant(
        &mut self,
        resource_type: ResourceType,
        actions: impl Into<ActionSet>,
        condition: Condition,
    ) -> &mut Self {
        self.push(
            resource_type,
            actions.into(),
            ConditionBuilder::Static(condition),
        )
    }

    pub fn push(
        &mut self,
        resource_type: ResourceType,
        actions: ActionSet,
        condition: ConditionBuilder,
    ) -> &mut Self {
        self.builder.rules.push(GrantRule {
            module: self.module.clone(),
            resource_type,
            actions,
            condition,
        });
        self
    }
}

/// Immutable, validated rule set. Shared as `Arc<RuleRegistry>`.
#[derive(Debug)]
pub struct RuleRegistry {
    schema: Arc<Schema>,
    admin_role: RoleName,
    modules: Vec<String>,
    rules: Vec<GrantRule>,
}

impl RuleRegistry {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Registrations in registration order.
    pub fn rules(&self) -> &[GrantRule] {
        &self.rules
    }

    /// Whether any registration, for any audience, covers the pair.
    pub fn has_rule(&self, resource_type: ResourceType, action: Action) -> bool {
        self.rules.iter().any(|r| r.covers(action, resource_type))
    }

    /// Relations the rules for this pair walk. Subject-dependent rules are
    /// instantiated for a role-less placeholder subject; use
    /// `AbilitySet::includes_for` for the exact tree of one subject.
    pub fn includes_for(&self, action: Action, resource_type: ResourceType) -> Includes {
        let subject = placeholder_subject();
        let mut includes = Includes::new();
        for rule in self.rules.iter().filter(|r| r.covers(action, resource_type)) {
            if let Some(c) = rule.condition.instantiate(Some(&subject)) {
                c.collect_includes(&mut includes);
            }
        }
        includes
    }
}

const PLACEHOLDER_ID: &str = "placeholder";

fn placeholder_subject() -> Subject {
    Subject::new(PLACEHOLDER_ID, Vec::<RoleName>::new())
}
