//! Relational-to-policy synchronization.
//!
//! # Purpose
//! [`PolicyAdapter`] projects roles and users from the store into the
//! [`FactBase`] on two paths:
//! - incremental: one role or one user at a time, called by the managers
//!   after their transaction commits
//! - bulk: [`PolicyAdapter::load_policy`] rebuilds the whole fact base at
//!   startup and from the reload timer
//!
//! # Notes
//! The store is authoritative. Incremental syncs take the subject id, re-read
//! the committed row and replace that subject's facts while holding the
//! adapter's sync lock, so concurrent writers converge on the last commit no
//! matter which sync lands first. A failed sync leaves the fact base stale
//! until the next bulk load; callers decide whether that fails the request.
use crate::auth::rbac::engine::{FactBase, PolicyError};
use crate::auth::rbac::facts::{
    Fact, FactSet, FactSubject, granted_resources, role_facts, user_facts,
};
use crate::model::{
    Permission, PermissionQuery, PermissionResource, Role, RoleQuery, UserQuery, UserStatus,
};
use crate::store::{ConsoleStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Incremental policy maintenance invoked after committed writes.
///
/// `sync_*` re-derive a subject's facts from its stored row; a subject that
/// no longer exists loses all of its facts.
#[async_trait]
pub trait PolicySynchronizer: Send + Sync {
    async fn sync_role(&self, role_id: &str) -> Result<(), PolicyError>;
    async fn sync_user(&self, user_id: &str) -> Result<(), PolicyError>;
    async fn remove_role(&self, role_id: &str) -> Result<(), PolicyError>;
    async fn remove_user(&self, user_id: &str) -> Result<(), PolicyError>;
}

fn record_sync(kind: &'static str, result: &Result<(), PolicyError>) {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!("console_policy_sync_total", "kind" => kind, "result" => outcome)
        .increment(1);
}

#[derive(Clone)]
pub struct PolicyAdapter {
    store: Arc<dyn ConsoleStore>,
    facts: Arc<dyn FactBase>,
    // Held from the store read until the fact base write completes.
    sync_lock: Arc<Mutex<()>>,
}

impl PolicyAdapter {
    pub fn new(store: Arc<dyn ConsoleStore>, facts: Arc<dyn FactBase>) -> Self {
        Self {
            store,
            facts,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn facts(&self) -> Arc<dyn FactBase> {
        self.facts.clone()
    }

    async fn permissions_by_id(
        &self,
        ids: Vec<String>,
    ) -> Result<HashMap<String, Permission>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let query = PermissionQuery {
            record_ids: Some(ids),
            ..PermissionQuery::default()
        };
        let result = self.store.query_permissions(&query, None).await?;
        Ok(result
            .items
            .into_iter()
            .map(|item| (item.record_id.clone(), item))
            .collect())
    }

    /// Flattened resources granted to `role`; the exact input to its permission facts.
    pub async fn role_resources(&self, role: &Role) -> Result<Vec<PermissionResource>, StoreError> {
        let permissions = self.permissions_by_id(role.permission_ids()).await?;
        Ok(granted_resources(role, &permissions))
    }

    /// Derive the complete fact base from the store.
    pub async fn collect_facts(&self) -> Result<FactSet, PolicyError> {
        let roles = self.store.query_roles(&RoleQuery::default(), None).await?;
        let mut permission_ids: Vec<String> = roles
            .items
            .iter()
            .flat_map(|role| role.permission_ids())
            .collect();
        permission_ids.sort();
        permission_ids.dedup();
        let permissions = self.permissions_by_id(permission_ids).await?;

        let mut set = FactSet::default();
        for role in &roles.items {
            let resources = granted_resources(role, &permissions);
            set.permissions
                .extend(role_facts(&role.record_id, &resources));
        }

        let users = self
            .store
            .query_users(
                &UserQuery {
                    status: Some(UserStatus::Enabled),
                    ..UserQuery::default()
                },
                None,
            )
            .await?;
        for user in &users.items {
            set.groupings.extend(user_facts(user));
        }
        Ok(set.normalized())
    }

    /// Rebuild the fact base from the store and swap it in.
    pub async fn load_policy(&self) -> Result<FactSet, PolicyError> {
        let result = self.reload().await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("console_policy_reload_total", "result" => outcome).increment(1);
        result
    }

    async fn reload(&self) -> Result<FactSet, PolicyError> {
        let _guard = self.sync_lock.lock().await;
        let set = self.collect_facts().await?;
        self.facts.bulk_replace(set.clone()).await?;
        self.facts.rebuild_role_links().await?;
        metrics::gauge!("console_policy_facts", "kind" => "permission")
            .set(set.permissions.len() as f64);
        metrics::gauge!("console_policy_facts", "kind" => "grouping")
            .set(set.groupings.len() as f64);
        tracing::debug!(
            permissions = set.permissions.len(),
            groupings = set.groupings.len(),
            "policy loaded"
        );
        Ok(set)
    }
}

#[async_trait]
impl PolicySynchronizer for PolicyAdapter {
    async fn sync_role(&self, role_id: &str) -> Result<(), PolicyError> {
        let subject = FactSubject::Role(role_id.to_string());
        let result = async {
            let _guard = self.sync_lock.lock().await;
            match self.store.get_role(role_id).await? {
                Some(role) => {
                    let resources = self.role_resources(&role).await?;
                    let facts = role_facts(&role.record_id, &resources)
                        .into_iter()
                        .map(Fact::Permission)
                        .collect();
                    self.facts.replace_facts_for(&subject, facts).await
                }
                None => self.facts.remove_facts_for(&subject).await,
            }
        }
        .await;
        record_sync("role", &result);
        result
    }

    async fn sync_user(&self, user_id: &str) -> Result<(), PolicyError> {
        let subject = FactSubject::User(user_id.to_string());
        let result = async {
            let _guard = self.sync_lock.lock().await;
            match self.store.get_user(user_id).await? {
                Some(user) => {
                    let facts = user_facts(&user).into_iter().map(Fact::Grouping).collect();
                    self.facts.replace_facts_for(&subject, facts).await
                }
                None => self.facts.remove_facts_for(&subject).await,
            }
        }
        .await;
        record_sync("user", &result);
        result
    }

    async fn remove_role(&self, role_id: &str) -> Result<(), PolicyError> {
        let _guard = self.sync_lock.lock().await;
        let result = self
            .facts
            .remove_facts_for(&FactSubject::Role(role_id.to_string()))
            .await;
        record_sync("role", &result);
        result
    }

    async fn remove_user(&self, user_id: &str) -> Result<(), PolicyError> {
        let _guard = self.sync_lock.lock().await;
        let result = self
            .facts
            .remove_facts_for(&FactSubject::User(user_id.to_string()))
            .await;
        record_sync("user", &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rbac::engine::CasbinFactBase;
    use crate::auth::rbac::facts::{GroupingFact, PermissionFact};
    use crate::model::{PermissionResource, RolePermission, User};
    use crate::store::LockMode;
    use crate::store::memory::InMemoryStore;

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let mut tx = store.begin(LockMode::Shared).await.expect("begin");
        tx.insert_permission(&Permission {
            record_id: "p1".into(),
            name: "users".into(),
            ..Permission::default()
        })
        .await
        .expect("permission");
        tx.insert_permission_resource(
            "p1",
            &PermissionResource {
                code: "query".into(),
                name: "query".into(),
                method: "GET".into(),
                path: "/api/v1/users".into(),
            },
        )
        .await
        .expect("resource");
        tx.insert_role(&Role {
            record_id: "r1".into(),
            name: "viewer".into(),
            ..Role::default()
        })
        .await
        .expect("role");
        tx.insert_role_permission(
            "r1",
            &RolePermission {
                permission_id: "p1".into(),
                actions: vec![],
                resources: vec!["query".into()],
            },
        )
        .await
        .expect("grant");
        for (id, status) in [("u1", UserStatus::Enabled), ("u2", UserStatus::Disabled)] {
            tx.insert_user(&User {
                record_id: id.into(),
                user_name: id.into(),
                status,
                ..User::default()
            })
            .await
            .expect("user");
            tx.insert_user_role(id, "r1").await.expect("user role");
        }
        tx.commit().await.expect("commit");
        store
    }

    #[tokio::test]
    async fn load_policy_derives_facts_for_enabled_users_only() {
        let store = seeded_store().await;
        let facts = Arc::new(CasbinFactBase::new(None).await.expect("facts"));
        let adapter = PolicyAdapter::new(store, facts.clone());

        let first = adapter.load_policy().await.expect("load");
        assert_eq!(
            first.permissions,
            vec![PermissionFact {
                role_id: "r1".into(),
                path: "/api/v1/users".into(),
                method: "GET".into(),
            }]
        );
        assert_eq!(
            first.groupings,
            vec![GroupingFact {
                user_id: "u1".into(),
                role_id: "r1".into(),
            }]
        );
        assert_eq!(facts.snapshot().await, first);

        let second = adapter.load_policy().await.expect("reload");
        assert_eq!(first, second);
        assert_eq!(facts.snapshot().await, second);
    }

    #[tokio::test]
    async fn sync_user_rereads_the_stored_row() {
        let store = seeded_store().await;
        let facts = Arc::new(CasbinFactBase::new(None).await.expect("facts"));
        let adapter = PolicyAdapter::new(store.clone(), facts.clone());
        adapter.load_policy().await.expect("load");

        let mut tx = store.begin(LockMode::ForUpdate).await.expect("begin");
        tx.update_user_status("u2", UserStatus::Enabled)
            .await
            .expect("enable");
        tx.commit().await.expect("commit");
        adapter.sync_user("u2").await.expect("sync");
        assert_eq!(facts.snapshot().await.groupings.len(), 2);

        adapter.remove_user("u1").await.expect("remove");
        let snapshot = facts.snapshot().await;
        assert_eq!(snapshot.groupings_for("u1").len(), 0);
        assert_eq!(snapshot.groupings_for("u2").len(), 1);

        adapter.sync_user("missing").await.expect("sync missing");
        assert_eq!(facts.snapshot().await.groupings.len(), 1);
    }

    #[tokio::test]
    async fn sync_role_of_a_deleted_role_drops_its_facts() {
        let store = seeded_store().await;
        let facts = Arc::new(CasbinFactBase::new(None).await.expect("facts"));
        let adapter = PolicyAdapter::new(store.clone(), facts.clone());
        adapter.load_policy().await.expect("load");
        assert_eq!(facts.snapshot().await.permissions_for("r1").len(), 1);

        let mut tx = store.begin(LockMode::ForUpdate).await.expect("begin");
        tx.delete_role_permissions("r1").await.expect("grants");
        tx.delete_role("r1").await.expect("role");
        tx.commit().await.expect("commit");
        adapter.sync_role("r1").await.expect("sync");
        assert!(facts.snapshot().await.permissions_for("r1").is_empty());
    }
}
