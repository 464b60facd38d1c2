//! Compiled predicates executed by SQLite agree with the in-memory executor,
//! and guarded deletes only remove rows the caller may delete.

mod helpers;

use std::sync::Arc;

use helpers::fixtures::{arb_dataset, conference_world, subjects};
use helpers::{Dataset, TestDb};
use proptest::prelude::*;
use serde_json::json;
use tribune::authz::rules::default_registry;
use tribune::authz::{AbilitySet, Action, ResourceType, RuleRegistry, Subject};
use tribune::settings::Authz;
use tribune::storage::sql;

fn registry() -> RuleRegistry {
    default_registry(&Authz::default()).expect("built-in rules must validate")
}

fn user(id: &str) -> Option<Subject> {
    Some(Subject::new(id, Vec::<String>::new()))
}

#[tokio::test]
async fn test_sql_matches_memory_for_every_subject() {
    let reg = registry();
    let world = conference_world();
    let db = TestDb::seeded(reg.schema(), &world).await;
    let store = world.memory_store(Arc::clone(reg.schema()));

    let mut people: Vec<Option<Subject>> = [
        "u-head", "u-member", "u-head2", "u-care", "u-pm", "u-sup", "u-single", "u-outsider",
    ]
    .into_iter()
    .map(user)
    .collect();
    people.push(None);
    people.push(Some(Subject::new("root", ["admin"])));

    for subject in people {
        let ability = AbilitySet::for_subject(&reg, subject.clone());
        for rt in ResourceType::ALL {
            for action in Action::ALL {
                let predicate = ability.compile(action, rt);
                let mut expected = store.select(rt, &predicate).unwrap();
                expected.sort();
                let actual = sql::select_ids(db.connection(), reg.schema(), rt, &predicate)
                    .await
                    .unwrap_or_else(|e| panic!("{action} on {rt}: {e}"));
                assert_eq!(actual, expected, "{action} on {rt} for {subject:?}");
            }
        }
    }
}

#[tokio::test]
async fn test_guarded_delete() {
    let reg = registry();
    let world = conference_world();
    let db = TestDb::seeded(reg.schema(), &world).await;

    let head2 = AbilitySet::for_subject(&reg, user("u-head2"));
    let predicate = head2.compile(Action::Delete, ResourceType::Delegation);
    // D2 has applied already
    assert!(!sql::delete_guarded(db.connection(), reg.schema(), ResourceType::Delegation, "D2", &predicate)
        .await
        .unwrap());

    let head = AbilitySet::for_subject(&reg, user("u-head"));
    let predicate = head.compile(Action::Delete, ResourceType::Delegation);
    assert!(!sql::delete_guarded(db.connection(), reg.schema(), ResourceType::Delegation, "D3", &predicate)
        .await
        .unwrap());
    assert!(sql::delete_guarded(db.connection(), reg.schema(), ResourceType::Delegation, "D1", &predicate)
        .await
        .unwrap());

    let admin = AbilitySet::for_subject(&reg, Some(Subject::new("root", ["admin"])));
    let all = admin.compile(Action::List, ResourceType::Delegation);
    let remaining = sql::select_ids(db.connection(), reg.schema(), ResourceType::Delegation, &all)
        .await
        .unwrap();
    assert_eq!(remaining, ["D2", "D3"]);
}

#[tokio::test]
async fn test_insert_row_rejects_wrong_column_type() {
    let reg = registry();
    let db = TestDb::new(reg.schema()).await;
    let err = sql::insert_row(
        db.connection(),
        reg.schema(),
        ResourceType::Nation,
        &json!({ "id": "n1", "alpha3_code": 42 }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, tribune::errors::TribuneError::BadRequest(_)));
}

/// Every compiled filter selects the same ids from SQLite as from memory.
async fn assert_sql_matches_memory(reg: &RuleRegistry, dataset: &Dataset) {
    let db = TestDb::seeded(reg.schema(), dataset).await;
    let store = dataset.memory_store(Arc::clone(reg.schema()));
    for subject in subjects() {
        let ability = AbilitySet::for_subject(reg, subject.clone());
        for rt in ResourceType::ALL {
            for action in Action::ALL {
                let predicate = ability.compile(action, rt);
                let mut expected = store.select(rt, &predicate).unwrap();
                expected.sort();
                let actual = sql::select_ids(db.connection(), reg.schema(), rt, &predicate)
                    .await
                    .unwrap_or_else(|e| panic!("{action} on {rt}: {e}"));
                assert_eq!(actual, expected, "{action} on {rt} for {subject:?}");
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_sqlite_matches_memory_on_generated_worlds(dataset in arb_dataset()) {
        let reg = registry();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to build runtime");
        runtime.block_on(assert_sql_matches_memory(&reg, &dataset));
    }
}
