use crate::authz::condition::{all, always, any, field_eq};
use crate::authz::registry::RegistryBuilder;
use crate::authz::types::{Action, ResourceType};

use super::{conference_staff, roles};

pub(super) fn register(builder: &mut RegistryBuilder) {
    builder
        .module("participants")
        .grant(
            ResourceType::SingleParticipant,
            [Action::Read, Action::List],
            |s| {
                any([
                    field_eq("user_id", s.id()),
                    conference_staff("conference", s, roles::ALL_STAFF),
                ])
            },
        )
        .grant(ResourceType::SingleParticipant, Action::Create, |_| always())
        .grant(
            ResourceType::SingleParticipant,
            [Action::Update, Action::Delete],
            |s| all([field_eq("user_id", s.id()), field_eq("applied", false)]),
        )
        .grant(ResourceType::SingleParticipant, Action::Update, |s| {
            conference_staff("conference", s, roles::MANAGERS)
        });
}
