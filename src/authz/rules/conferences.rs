use crate::authz::condition::{always, field_eq, never, some, subject_id};
use crate::authz::registry::RegistryBuilder;
use crate::authz::types::{Action, ResourceType};

use super::{conference_staff, roles};

pub(super) fn register(builder: &mut RegistryBuilder) {
    builder
        .module("conferences")
        .public_grant(
            ResourceType::Conference,
            [Action::Read, Action::List],
            always(),
        )
        .grant(ResourceType::Conference, Action::Update, |s| {
            conference_staff("", s, roles::MANAGERS)
        })
        .grant(ResourceType::Conference, Action::Delete, |s| {
            conference_staff("", s, &[roles::ADMIN])
        })
        // new conferences are set up by global admins only
        .grant(ResourceType::Conference, Action::Create, |_| never())
        .grant(
            ResourceType::ConferenceMember,
            [Action::Read, Action::List],
            |_| field_eq("user_id", subject_id()),
        )
        .grant(
            ResourceType::ConferenceMember,
            [Action::Read, Action::List],
            |s| some("conference.members", field_eq("user_id", s.id())),
        )
        .grant(
            ResourceType::ConferenceMember,
            [Action::Create, Action::Update, Action::Delete],
            |s| conference_staff("conference", s, roles::MANAGERS),
        );
}
