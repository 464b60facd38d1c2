use crate::authz::condition::{all, always, any, field_eq, some};
use crate::authz::registry::RegistryBuilder;
use crate::authz::types::{Action, ResourceType};

use super::{conference_staff, head_delegate, roles};

pub(super) fn register(builder: &mut RegistryBuilder) {
    let mut module = builder.module("delegations");

    // Delegation: its members, its supervisors and conference staff may see it
    module
        .grant(ResourceType::Delegation, [Action::Read, Action::List], |s| {
            some("members.user", field_eq("id", s.id()))
        })
        .grant(ResourceType::Delegation, [Action::Read, Action::List], |s| {
            some("supervisor_assignments.supervisor", field_eq("user_id", s.id()))
        })
        .grant(ResourceType::Delegation, [Action::Read, Action::List], |s| {
            conference_staff("conference", s, roles::ALL_STAFF)
        })
        .grant(ResourceType::Delegation, Action::Create, |_| always())
        .grant(ResourceType::Delegation, Action::Update, |s| {
            any([
                head_delegate("", s),
                conference_staff("conference", s, roles::MANAGERS),
            ])
        })
        // an application that was already submitted cannot be withdrawn
        .grant(ResourceType::Delegation, Action::Delete, |s| {
            all([field_eq("applied", false), head_delegate("", s)])
        });

    module
        .grant(
            ResourceType::DelegationMember,
            [Action::Read, Action::List],
            |s| {
                any([
                    field_eq("user_id", s.id()),
                    some("delegation.members", field_eq("user_id", s.id())),
                    conference_staff("delegation.conference", s, roles::ALL_STAFF),
                ])
            },
        )
        // joining happens through the delegation's entry code
        .grant(ResourceType::DelegationMember, Action::Create, |_| always())
        .grant(ResourceType::DelegationMember, Action::Update, |s| {
            any([
                head_delegate("delegation", s),
                conference_staff("delegation.conference", s, roles::MANAGERS),
            ])
        })
        .grant(ResourceType::DelegationMember, Action::Delete, |s| {
            all([
                field_eq("delegation.applied", false),
                any([
                    head_delegate("delegation", s),
                    all([
                        field_eq("user_id", s.id()),
                        field_eq("is_head_delegate", false),
                    ]),
                ]),
            ])
        });
}
