use crate::authz::condition::{always, never};
use crate::authz::registry::RegistryBuilder;
use crate::authz::types::{Action, ResourceType};

use super::{conference_staff, roles};

pub(super) fn register(builder: &mut RegistryBuilder) {
    builder
        .module("committees")
        .public_grant(ResourceType::Committee, [Action::Read, Action::List], always())
        .grant(
            ResourceType::Committee,
            [Action::Create, Action::Update, Action::Delete],
            |s| conference_staff("conference", s, roles::MANAGERS),
        )
        .public_grant(ResourceType::AgendaItem, [Action::Read, Action::List], always())
        .grant(
            ResourceType::AgendaItem,
            [Action::Create, Action::Update, Action::Delete],
            |s| conference_staff("committee.conference", s, roles::MANAGERS),
        )
        .public_grant(ResourceType::Nation, [Action::Read, Action::List], always())
        // the nation catalogue is seeded, not edited
        .grant(
            ResourceType::Nation,
            [Action::Create, Action::Update, Action::Delete],
            |_| never(),
        );
}
