use crate::authz::condition::{all, always, any, every, field_eq, some};
use crate::authz::registry::RegistryBuilder;
use crate::authz::types::{Action, ResourceType};

use super::{conference_staff, roles};

pub(super) fn register(builder: &mut RegistryBuilder) {
    builder
        .module("supervisors")
        .grant(
            ResourceType::ConferenceSupervisor,
            [Action::Read, Action::List],
            |s| {
                any([
                    field_eq("user_id", s.id()),
                    some("assignments.delegation.members", field_eq("user_id", s.id())),
                    conference_staff("conference", s, roles::ALL_STAFF),
                ])
            },
        )
        .grant(ResourceType::ConferenceSupervisor, Action::Create, |_| always())
        .grant(ResourceType::ConferenceSupervisor, Action::Update, |s| {
            field_eq("user_id", s.id())
        })
        // Withdrawing is allowed while none of the supervised delegations has
        // applied. A supervisor without delegations is unassigned and may
        // always withdraw.
        .grant(ResourceType::ConferenceSupervisor, Action::Delete, |s| {
            all([
                field_eq("user_id", s.id()),
                every("assignments.delegation", field_eq("applied", false)),
            ])
        })
        .grant(ResourceType::ConferenceSupervisor, Action::Delete, |s| {
            conference_staff("conference", s, roles::MANAGERS)
        })
        .grant(
            ResourceType::SupervisorAssignment,
            [Action::Read, Action::List],
            |s| {
                any([
                    field_eq("supervisor.user_id", s.id()),
                    some("delegation.members", field_eq("user_id", s.id())),
                    conference_staff("delegation.conference", s, roles::ALL_STAFF),
                ])
            },
        )
        .grant(
            ResourceType::SupervisorAssignment,
            [Action::Create, Action::Update, Action::Delete],
            |s| field_eq("supervisor.user_id", s.id()),
        );
}
