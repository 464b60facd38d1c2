use serde_json::Value;

use crate::authz::ability::AbilitySet;
use crate::authz::condition::{self, EvalContext};
use crate::authz::errors::AuthzError;
use crate::authz::instance::Instance;
use crate::authz::types::Action;

/// Decide whether the ability set allows `action` on one materialized
/// `instance`.
pub fn can(ability: &AbilitySet, action: Action, instance: &Instance) -> Result<bool, AuthzError> {
    // 1. Privileged roles short-circuit everything
    if ability.is_wildcard() {
        return Ok(true);
    }

    let ctx = EvalContext {
        schema: ability.schema(),
        subject_id: ability.subject_id(),
    };

    // 2. Union of all applicable grants, first match wins
    for grant in ability.applicable(action, instance.resource_type()) {
        if condition::evaluate(
            &grant.condition,
            &ctx,
            instance.resource_type(),
            instance.record(),
        )? {
            tracing::debug!(
                action = %action,
                resource_type = %instance.resource_type(),
                module = %grant.module,
                "grant matched"
            );
            return Ok(true);
        }
    }
    Ok(false)
}

/// Same as [`can`] for an untyped object carrying a `__typename` tag.
pub fn can_json(ability: &AbilitySet, action: Action, instance: Value) -> Result<bool, AuthzError> {
    let instance = Instance::from_json(instance)?;
    can(ability, action, &instance)
}
