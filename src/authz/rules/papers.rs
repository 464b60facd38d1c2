use crate::authz::condition::{all, any, field_eq, some};
use crate::authz::registry::RegistryBuilder;
use crate::authz::types::{Action, ResourceType};

use super::{conference_staff, head_delegate, paper_status, roles};

pub(super) fn register(builder: &mut RegistryBuilder) {
    builder
        .module("papers")
        .public_grant(
            ResourceType::Paper,
            [Action::Read, Action::List],
            field_eq("status", paper_status::PUBLISHED),
        )
        .grant(ResourceType::Paper, [Action::Read, Action::List], |s| {
            any([
                some("delegation.members", field_eq("user_id", s.id())),
                some("delegation.supervisor_assignments.supervisor", field_eq("user_id", s.id())),
            ])
        })
        .grant(ResourceType::Paper, [Action::Read, Action::List], |s| {
            all([
                field_eq("status", paper_status::SUBMITTED),
                conference_staff("delegation.conference", s, roles::ALL_STAFF),
            ])
        })
        .grant(ResourceType::Paper, [Action::Create, Action::Update], |s| {
            all([
                field_eq("status", paper_status::DRAFT),
                some("delegation.members", field_eq("user_id", s.id())),
            ])
        })
        .grant(ResourceType::Paper, Action::Update, |s| {
            all([
                field_eq("status", paper_status::SUBMITTED),
                conference_staff("delegation.conference", s, roles::MANAGERS),
            ])
        })
        .grant(ResourceType::Paper, Action::Delete, |s| {
            all([
                field_eq("status", paper_status::DRAFT),
                head_delegate("delegation", s),
            ])
        });
}
