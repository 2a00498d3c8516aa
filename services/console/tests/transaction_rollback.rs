mod common;

use common::{ROOT, memory_state};
use console::model::{Permission, PermissionQuery};
use console::store::{ConsoleStore, LockMode};
use std::sync::Arc;

#[tokio::test]
async fn panic_inside_a_transaction_rolls_back() {
    let (state, _) = memory_state().await;
    let store: Arc<dyn ConsoleStore> = state.store.clone();

    let task = tokio::spawn(async move {
        let mut tx = store.begin(LockMode::ForUpdate).await.expect("begin");
        tx.insert_permission(&Permission {
            record_id: "p1".to_string(),
            name: "half written".to_string(),
            ..Permission::default()
        })
        .await
        .expect("insert");
        panic!("boom mid-transaction");
    });
    let err = task.await.expect_err("task panicked");
    assert!(err.is_panic());

    // The lock was released and nothing was committed.
    let all = state
        .store
        .query_permissions(&PermissionQuery::default(), None)
        .await
        .expect("query");
    assert_eq!(all.total, 0);
    state
        .permissions
        .create(
            Permission {
                name: "after".to_string(),
                ..Permission::default()
            },
            ROOT,
        )
        .await
        .expect("store still usable");
}

#[tokio::test]
async fn failed_step_discards_earlier_writes() {
    let (state, _) = memory_state().await;
    let parent = state
        .permissions
        .create(
            Permission {
                name: "parent".to_string(),
                ..Permission::default()
            },
            ROOT,
        )
        .await
        .expect("parent");

    let mut tx = state.store.begin(LockMode::Shared).await.expect("begin");
    state
        .permissions
        .create_in(
            tx.as_mut(),
            Permission {
                name: "child".to_string(),
                parent_id: parent.record_id.clone(),
                ..Permission::default()
            },
            ROOT,
        )
        .await
        .expect("child");
    let duplicate = state
        .permissions
        .create_in(
            tx.as_mut(),
            Permission {
                name: "child".to_string(),
                parent_id: parent.record_id.clone(),
                ..Permission::default()
            },
            ROOT,
        )
        .await;
    assert!(duplicate.is_err());
    tx.rollback().await.expect("rollback");

    let children = state
        .permissions
        .query(
            &PermissionQuery {
                parent_id: Some(parent.record_id.clone()),
                ..PermissionQuery::default()
            },
            None,
        )
        .await
        .expect("query");
    assert_eq!(children.total, 0);
}
