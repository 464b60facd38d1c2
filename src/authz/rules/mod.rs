//! Built-in rule modules for the conference platform.
//!
//! Module order is fixed: these modules first, in the order listed in
//! [`builtin`], then rule files from `authz.policies_dir` sorted by name.

mod committees;
mod conferences;
mod delegations;
mod papers;
mod participants;
mod supervisors;
mod users;

use crate::authz::condition::{all, any, field_eq, some, Condition};
use crate::authz::errors::AuthzError;
use crate::authz::loader::load_policies;
use crate::authz::registry::{RegistryBuilder, RuleRegistry};
use crate::authz::schema::Schema;
use crate::authz::types::Subject;
use crate::settings::Authz;

/// Per-conference team roles, as stored in `conference_members.role`.
pub mod roles {
    pub const ADMIN: &str = "ADMIN";
    pub const PROJECT_MANAGEMENT: &str = "PROJECT_MANAGEMENT";
    pub const PARTICIPANT_CARE: &str = "PARTICIPANT_CARE";
    pub const MATERIALS: &str = "MATERIALS";
    pub const TEAM_MEMBER: &str = "TEAM_MEMBER";

    pub const MANAGERS: &[&str] = &[ADMIN, PROJECT_MANAGEMENT];
    pub const ALL_STAFF: &[&str] = &[ADMIN, PROJECT_MANAGEMENT, PARTICIPANT_CARE, MATERIALS, TEAM_MEMBER];
}

/// Paper workflow states.
pub mod paper_status {
    pub const DRAFT: &str = "DRAFT";
    pub const SUBMITTED: &str = "SUBMITTED";
    pub const PUBLISHED: &str = "PUBLISHED";
}

/// Global role allowed to look up any user account.
pub const SUPPORT_ROLE: &str = "support";

pub fn builtin(builder: &mut RegistryBuilder) {
    users::register(builder);
    conferences::register(builder);
    committees::register(builder);
    delegations::register(builder);
    supervisors::register(builder);
    participants::register(builder);
    papers::register(builder);
}

/// Built-in modules plus any rule files, validated and frozen.
pub fn default_registry(settings: &Authz) -> Result<RuleRegistry, AuthzError> {
    let mut builder =
        RegistryBuilder::new(Schema::conference()).admin_role(settings.admin_role.clone());
    builtin(&mut builder);
    if let Some(dir) = &settings.policies_dir {
        load_policies(dir, &mut builder)?;
    }
    builder.build()
}

/// The subject holds one of `team_roles` on the conference reached through
/// `conference_path`. An empty path means the resource is the conference.
pub(crate) fn conference_staff(
    conference_path: &str,
    subject: &Subject,
    team_roles: &[&str],
) -> Condition {
    let members = if conference_path.is_empty() {
        "members".to_string()
    } else {
        format!("{conference_path}.members")
    };
    some(
        &members,
        all([
            field_eq("user_id", subject.id()),
            any(team_roles.iter().map(|r| field_eq("role", *r))),
        ]),
    )
}

/// The subject is a head delegate of the delegation reached through
/// `delegation_path` (empty: the resource itself).
pub(crate) fn head_delegate(delegation_path: &str, subject: &Subject) -> Condition {
    let members = if delegation_path.is_empty() {
        "members".to_string()
    } else {
        format!("{delegation_path}.members")
    };
    some(
        &members,
        all([
            field_eq("user_id", subject.id()),
            field_eq("is_head_delegate", true),
        ]),
    )
}
