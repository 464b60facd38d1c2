use crate::authz::condition::{all, always, any, field_eq, never, some};
use crate::authz::registry::RegistryBuilder;
use crate::authz::types::{Action, ResourceType};

use super::{roles, SUPPORT_ROLE};

pub(super) fn register(builder: &mut RegistryBuilder) {
    builder
        .module("users")
        .checks_role(SUPPORT_ROLE)
        // own account
        .grant(
            ResourceType::User,
            [Action::Read, Action::List, Action::Update],
            |s| field_eq("id", s.id()),
        )
        .grant(ResourceType::User, [Action::Read, Action::List], |s| {
            if s.has_role(SUPPORT_ROLE) {
                always()
            } else {
                never()
            }
        })
        // conference staff see everyone taking part in their conference
        .grant(ResourceType::User, [Action::Read, Action::List], |s| {
            let staff = all([
                field_eq("user_id", s.id()),
                any(roles::ALL_STAFF.iter().map(|r| field_eq("role", *r))),
            ]);
            any([
                some("delegation_memberships.delegation.conference.members", staff.clone()),
                some("supervisions.conference.members", staff.clone()),
                some("single_participations.conference.members", staff),
            ])
        })
        // accounts are created by the identity provider sync, never by users
        .grant(ResourceType::User, [Action::Create, Action::Delete], |_| never());
}
