use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};
use tribune::authz::rules::{paper_status, roles};
use tribune::authz::{ResourceType, Schema, Subject};
use tribune::storage::MemoryStore;

/// Normalized rows in insertion order, loadable into either store.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: Vec<(ResourceType, Value)>,
}

impl Dataset {
    pub fn rows(&self) -> &[(ResourceType, Value)] {
        &self.rows
    }

    pub fn memory_store(&self, schema: Arc<Schema>) -> MemoryStore {
        let mut store = MemoryStore::new(schema);
        for (rt, row) in &self.rows {
            store
                .insert(*rt, row.clone())
                .expect("Failed to insert fixture row");
        }
        store
    }
}

/// Builder for conference datasets. Link rows (memberships, assignments)
/// get generated ids.
#[derive(Debug, Default)]
pub struct WorldBuilder {
    dataset: Dataset,
    next_id: usize,
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, rt: ResourceType, row: Value) -> &mut Self {
        self.dataset.rows.push((rt, row));
        self
    }

    fn generated_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    pub fn user(&mut self, id: &str) -> &mut Self {
        self.push(
            ResourceType::User,
            json!({ "id": id, "name": id, "email": null }),
        )
    }

    pub fn user_with_email(&mut self, id: &str, email: &str) -> &mut Self {
        self.push(
            ResourceType::User,
            json!({ "id": id, "name": id, "email": email }),
        )
    }

    pub fn nation(&mut self, id: &str, alpha3_code: &str) -> &mut Self {
        self.push(
            ResourceType::Nation,
            json!({ "id": id, "alpha3_code": alpha3_code }),
        )
    }

    /// A conference with one committee (`<id>-k`) and agenda item (`<id>-a`).
    pub fn conference(&mut self, id: &str) -> &mut Self {
        self.push(
            ResourceType::Conference,
            json!({ "id": id, "title": id, "state": "ACTIVE" }),
        );
        let committee = format!("{id}-k");
        self.push(
            ResourceType::Committee,
            json!({ "id": committee, "name": "General Assembly", "abbreviation": "GA",
                    "conference_id": id }),
        );
        self.push(
            ResourceType::AgendaItem,
            json!({ "id": format!("{id}-a"), "title": "Climate", "committee_id": committee }),
        )
    }

    pub fn staff(&mut self, conference: &str, user: &str, role: &str) -> &mut Self {
        let id = self.generated_id("cm");
        self.push(
            ResourceType::ConferenceMember,
            json!({ "id": id, "role": role, "conference_id": conference, "user_id": user }),
        )
    }

    pub fn delegation(&mut self, id: &str, conference: &str, applied: bool) -> &mut Self {
        self.assigned_delegation(id, conference, applied, None)
    }

    pub fn assigned_delegation(
        &mut self,
        id: &str,
        conference: &str,
        applied: bool,
        nation: Option<&str>,
    ) -> &mut Self {
        self.push(
            ResourceType::Delegation,
            json!({ "id": id, "entry_code": format!("{id}-code"), "applied": applied,
                    "conference_id": conference, "assigned_nation_id": nation }),
        )
    }

    pub fn member(&mut self, delegation: &str, user: &str, head: bool) -> &mut Self {
        self.seated_member(delegation, user, head, None)
    }

    /// A delegation member, optionally seated in a committee.
    pub fn seated_member(
        &mut self,
        delegation: &str,
        user: &str,
        head: bool,
        committee: Option<&str>,
    ) -> &mut Self {
        let id = self.generated_id("dm");
        self.push(
            ResourceType::DelegationMember,
            json!({ "id": id, "is_head_delegate": head, "delegation_id": delegation,
                    "user_id": user, "assigned_committee_id": committee }),
        )
    }

    pub fn supervisor(&mut self, id: &str, conference: &str, user: &str) -> &mut Self {
        self.push(
            ResourceType::ConferenceSupervisor,
            json!({ "id": id, "plans_attendance": true, "conference_id": conference,
                    "user_id": user }),
        )
    }

    pub fn assignment(&mut self, supervisor: &str, delegation: &str) -> &mut Self {
        let id = self.generated_id("sa");
        self.push(
            ResourceType::SupervisorAssignment,
            json!({ "id": id, "supervisor_id": supervisor, "delegation_id": delegation }),
        )
    }

    pub fn single_participant(&mut self, conference: &str, user: &str, applied: bool) -> &mut Self {
        let id = self.generated_id("sp");
        self.push(
            ResourceType::SingleParticipant,
            json!({ "id": id, "applied": applied, "conference_id": conference, "user_id": user }),
        )
    }

    /// A paper on the first agenda item of `conference`.
    pub fn paper(&mut self, id: &str, conference: &str, delegation: &str, status: &str) -> &mut Self {
        self.push(
            ResourceType::Paper,
            json!({ "id": id, "title": id, "status": status, "revision": 1,
                    "delegation_id": delegation, "agenda_item_id": format!("{conference}-a") }),
        )
    }

    pub fn build(&mut self) -> Dataset {
        std::mem::take(&mut self.dataset)
    }
}

/// Two conferences with one of every relationship the built-in rules look at.
pub fn conference_world() -> Dataset {
    WorldBuilder::new()
        .user("u-head")
        .user("u-member")
        .user("u-head2")
        .user("u-care")
        .user("u-pm")
        .user("u-sup")
        .user("u-single")
        .user("u-outsider")
        .conference("c1")
        .conference("c2")
        .staff("c1", "u-care", roles::PARTICIPANT_CARE)
        .staff("c1", "u-pm", roles::PROJECT_MANAGEMENT)
        .delegation("D1", "c1", false)
        .delegation("D2", "c1", true)
        .delegation("D3", "c2", false)
        .member("D1", "u-head", true)
        .member("D1", "u-member", false)
        .member("D2", "u-head2", true)
        .supervisor("s1", "c1", "u-sup")
        .supervisor("s2", "c2", "u-sup")
        .assignment("s1", "D1")
        .single_participant("c1", "u-single", false)
        .paper("p1", "c1", "D1", paper_status::DRAFT)
        .paper("p2", "c1", "D1", paper_status::SUBMITTED)
        .paper("p3", "c1", "D2", paper_status::PUBLISHED)
        .build()
}

/// Nullable columns both set and unset: emails, nation assignments and
/// committee seats. Member ids are `dm1`..`dm4` in insertion order.
pub fn assignment_world() -> Dataset {
    WorldBuilder::new()
        .user_with_email("u-a", "a@mun.example")
        .user("u-b")
        .user_with_email("u-c", "c@mun.example")
        .user("u-d")
        .conference("c1")
        .conference("c2")
        .nation("n-fr", "FRA")
        .nation("n-de", "DEU")
        .assigned_delegation("D1", "c1", false, Some("n-fr"))
        .assigned_delegation("D2", "c1", true, None)
        .assigned_delegation("D3", "c2", false, Some("n-de"))
        .assigned_delegation("D4", "c2", true, None)
        .seated_member("D1", "u-a", true, Some("c1-k"))
        .seated_member("D1", "u-b", false, None)
        .seated_member("D2", "u-c", true, None)
        .seated_member("D3", "u-b", true, Some("c2-k"))
        .build()
}

pub const USERS: [&str; 4] = ["u0", "u1", "u2", "u3"];
const CONFERENCES: [&str; 2] = ["c0", "c1"];
const STATUSES: [&str; 3] = [paper_status::DRAFT, paper_status::SUBMITTED, paper_status::PUBLISHED];

/// Subjects worth checking against a generated dataset: anonymous, each
/// generated user, and a global admin.
pub fn subjects() -> Vec<Option<Subject>> {
    let mut subjects = vec![None];
    subjects.extend(
        USERS
            .iter()
            .map(|u| Some(Subject::new(*u, Vec::<String>::new()))),
    );
    subjects.push(Some(Subject::new("root", ["admin"])));
    subjects
}

/// Random conference datasets over a small, fixed population so that
/// relationships actually overlap.
pub fn arb_dataset() -> impl Strategy<Value = Dataset> {
    (
        prop::collection::vec((0..2usize, 0..4usize, 0..roles::ALL_STAFF.len()), 0..4),
        prop::collection::vec((0..2usize, any::<bool>()), 0..4),
        prop::collection::vec((0..4usize, 0..4usize, any::<bool>()), 0..6),
        prop::collection::vec((0..2usize, 0..4usize), 0..3),
        prop::collection::vec((0..3usize, 0..4usize), 0..4),
        prop::collection::vec((0..4usize, 0..STATUSES.len()), 0..4),
        prop::collection::vec((0..2usize, 0..4usize, any::<bool>()), 0..3),
    )
        .prop_map(
            |(staff, delegations, members, supervisors, assignments, papers, singles)| {
                let mut world = WorldBuilder::new();
                for user in USERS {
                    world.user(user);
                }
                for conf in CONFERENCES {
                    world.conference(conf);
                }
                for (conf, user, role) in staff {
                    world.staff(CONFERENCES[conf], USERS[user], roles::ALL_STAFF[role]);
                }

                let delegation_confs: Vec<usize> = delegations.iter().map(|(c, _)| *c).collect();
                for (i, (conf, applied)) in delegations.iter().enumerate() {
                    world.delegation(&format!("D{i}"), CONFERENCES[*conf], *applied);
                }
                if !delegation_confs.is_empty() {
                    for (d, user, head) in members {
                        let d = d % delegation_confs.len();
                        world.member(&format!("D{d}"), USERS[user], head);
                    }
                    for (d, status) in papers {
                        let d = d % delegation_confs.len();
                        let id = world.generated_id("p");
                        world.paper(
                            &id,
                            CONFERENCES[delegation_confs[d]],
                            &format!("D{d}"),
                            STATUSES[status],
                        );
                    }
                }

                for (i, (conf, user)) in supervisors.iter().enumerate() {
                    world.supervisor(&format!("s{i}"), CONFERENCES[*conf], USERS[*user]);
                }
                if !supervisors.is_empty() && !delegation_confs.is_empty() {
                    for (s, d) in assignments {
                        world.assignment(
                            &format!("s{}", s % supervisors.len()),
                            &format!("D{}", d % delegation_confs.len()),
                        );
                    }
                }

                for (conf, user, applied) in singles {
                    world.single_participant(CONFERENCES[conf], USERS[user], applied);
                }
                world.build()
            },
        )
}
