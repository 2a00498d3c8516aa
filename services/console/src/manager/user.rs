//! User manager.
//!
//! # Purpose
//! Maintains users and their role assignments. After each committed change
//! the user's grouping facts are replaced: enabled users get one fact per
//! assigned role, disabled users get none.
//!
//! # Key invariants
//! - User names are unique and the root user name is reserved.
//! - Passwords are stored only as Argon2 hashes.
//! - Assignments may only name existing roles.
use crate::auth::password::hash_password;
use crate::auth::rbac::PolicySynchronizer;
use crate::manager::diff::partition_by_key;
use crate::manager::{ManagerError, ManagerResult, settle_sync};
use crate::model::{
    PageParam, PageResult, RoleQuery, User, UserQuery, UserRole, UserShow, UserStatus,
};
use crate::store::{ConsoleStore, LockMode, StoreError, StoreTx};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

const NAME_ILLEGAL: &str = "Username is illegal";
const NAME_EXISTS: &str = "Username already exists";
const EMPTY_PASSWORD: &str = "Password is not allowed to be empty";

/// Keep the first assignment of each role.
fn dedup_roles(roles: &mut Vec<UserRole>) {
    let mut seen = HashSet::new();
    roles.retain(|role| seen.insert(role.role_id.clone()));
}

pub(crate) fn hash(password: &str) -> ManagerResult<String> {
    hash_password(password).map_err(|err| {
        ManagerError::Internal(StoreError::Unexpected(anyhow::anyhow!(
            "hash password: {err}"
        )))
    })
}

#[derive(Clone)]
pub struct UserManager {
    store: Arc<dyn ConsoleStore>,
    sync: Arc<dyn PolicySynchronizer>,
    root_user_name: String,
    strict_sync: bool,
}

impl UserManager {
    pub fn new(
        store: Arc<dyn ConsoleStore>,
        sync: Arc<dyn PolicySynchronizer>,
        root_user_name: impl Into<String>,
        strict_sync: bool,
    ) -> Self {
        Self {
            store,
            sync,
            root_user_name: root_user_name.into(),
            strict_sync,
        }
    }

    /// List users with their role records resolved.
    pub async fn query(
        &self,
        query: &UserQuery,
        page: Option<PageParam>,
    ) -> ManagerResult<PageResult<UserShow>> {
        let result = self.store.query_users(query, page).await?;
        let mut role_ids: Vec<String> = result.items.iter().flat_map(User::role_ids).collect();
        role_ids.sort();
        role_ids.dedup();
        let roles = if role_ids.is_empty() {
            Vec::new()
        } else {
            self.store
                .query_roles(
                    &RoleQuery {
                        record_ids: Some(role_ids),
                        ..RoleQuery::default()
                    },
                    None,
                )
                .await?
                .items
        };
        Ok(PageResult {
            total: result.total,
            items: result
                .items
                .into_iter()
                .map(|user| UserShow::new(user, &roles))
                .collect(),
        })
    }

    pub async fn get(&self, record_id: &str) -> ManagerResult<User> {
        self.store
            .get_user(record_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound("user".to_string()))
    }

    async fn check_user_name(
        &self,
        tx: &mut dyn StoreTx,
        user_name: &str,
    ) -> ManagerResult<()> {
        if user_name == self.root_user_name {
            return Err(ManagerError::Validation(NAME_ILLEGAL.to_string()));
        }
        let existing = tx
            .query_users(&UserQuery {
                user_name: Some(user_name.to_string()),
                ..UserQuery::default()
            })
            .await?;
        if !existing.is_empty() {
            return Err(ManagerError::Validation(NAME_EXISTS.to_string()));
        }
        Ok(())
    }

    async fn check_roles(tx: &mut dyn StoreTx, roles: &[UserRole]) -> ManagerResult<()> {
        let ids: Vec<String> = roles.iter().map(|role| role.role_id.clone()).collect();
        if ids.is_empty() {
            return Ok(());
        }
        let found = tx
            .query_roles(&RoleQuery {
                record_ids: Some(ids.clone()),
                ..RoleQuery::default()
            })
            .await?;
        if found.len() != ids.len() {
            return Err(ManagerError::NotFound("role".to_string()));
        }
        Ok(())
    }

    async fn after_save(&self, user_id: &str) -> ManagerResult<()> {
        settle_sync(
            self.sync.sync_user(user_id).await,
            self.strict_sync,
            "user",
            user_id,
        )
    }

    pub async fn create(&self, item: User, creator: &str) -> ManagerResult<User> {
        let mut tx = self.store.begin(LockMode::Shared).await?;
        let created = self.create_in(tx.as_mut(), item, creator).await?;
        tx.commit().await?;
        self.after_save(&created.record_id).await?;
        Ok(created)
    }

    pub async fn create_in(
        &self,
        tx: &mut dyn StoreTx,
        mut item: User,
        creator: &str,
    ) -> ManagerResult<User> {
        if item.password.is_empty() {
            return Err(ManagerError::Validation(EMPTY_PASSWORD.to_string()));
        }
        self.check_user_name(tx, &item.user_name).await?;
        dedup_roles(&mut item.roles);
        Self::check_roles(tx, &item.roles).await?;

        item.password = hash(&item.password)?;
        item.record_id = uuid::Uuid::new_v4().to_string();
        item.creator = creator.to_string();
        item.created_at = Utc::now();
        tx.insert_user(&item).await?;
        for role in &item.roles {
            tx.insert_user_role(&item.record_id, &role.role_id).await?;
        }
        tracing::debug!(user_id = %item.record_id, user_name = %item.user_name, "user created");
        Ok(item)
    }

    pub async fn update(&self, record_id: &str, item: User) -> ManagerResult<User> {
        let mut tx = self.store.begin(LockMode::ForUpdate).await?;
        let updated = self.update_in(tx.as_mut(), record_id, item).await?;
        tx.commit().await?;
        self.after_save(&updated.record_id).await?;
        Ok(updated)
    }

    pub async fn update_in(
        &self,
        tx: &mut dyn StoreTx,
        record_id: &str,
        mut item: User,
    ) -> ManagerResult<User> {
        let old = tx
            .get_user(record_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound("user".to_string()))?;
        if old.user_name != item.user_name {
            self.check_user_name(tx, &item.user_name).await?;
        }
        dedup_roles(&mut item.roles);
        Self::check_roles(tx, &item.roles).await?;

        let password = if item.password.is_empty() {
            old.password.clone()
        } else {
            hash(&item.password)?
        };
        let next = User {
            record_id: old.record_id.clone(),
            creator: old.creator.clone(),
            created_at: old.created_at,
            password,
            ..item
        };
        tx.update_user(&next).await?;

        let roles = partition_by_key(&old.roles, &next.roles, |r| r.role_id.as_str());
        for role in &roles.create {
            tx.insert_user_role(record_id, &role.role_id).await?;
        }
        for role in &roles.delete {
            tx.delete_user_role(record_id, &role.role_id).await?;
        }
        Ok(next)
    }

    pub async fn delete(&self, record_id: &str) -> ManagerResult<()> {
        let mut tx = self.store.begin(LockMode::ForUpdate).await?;
        self.delete_in(tx.as_mut(), record_id).await?;
        tx.commit().await?;
        settle_sync(
            self.sync.remove_user(record_id).await,
            self.strict_sync,
            "user",
            record_id,
        )
    }

    pub async fn delete_in(&self, tx: &mut dyn StoreTx, record_id: &str) -> ManagerResult<()> {
        if tx.get_user(record_id).await?.is_none() {
            return Err(ManagerError::NotFound("user".to_string()));
        }
        tx.delete_user_roles(record_id).await?;
        tx.delete_user(record_id).await?;
        Ok(())
    }

    /// Enable or disable a user, then re-derive their grouping facts from the
    /// stored role assignments.
    pub async fn update_status(&self, record_id: &str, status: UserStatus) -> ManagerResult<()> {
        let mut tx = self.store.begin(LockMode::ForUpdate).await?;
        if tx.get_user(record_id).await?.is_none() {
            return Err(ManagerError::NotFound("user".to_string()));
        }
        tx.update_user_status(record_id, status).await?;
        tx.commit().await?;
        tracing::info!(user_id = %record_id, enabled = status.is_enabled(), "user status changed");
        self.after_save(record_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::auth::rbac::{CasbinFactBase, FactBase, PolicyAdapter};
    use crate::manager::RoleManager;
    use crate::model::Role;
    use crate::store::memory::InMemoryStore;

    struct Fixture {
        roles: RoleManager,
        users: UserManager,
        facts: Arc<CasbinFactBase>,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn ConsoleStore> = Arc::new(InMemoryStore::new());
        let facts = Arc::new(CasbinFactBase::new(None).await.expect("facts"));
        let sync = Arc::new(PolicyAdapter::new(store.clone(), facts.clone()));
        Fixture {
            roles: RoleManager::new(store.clone(), sync.clone(), false),
            users: UserManager::new(store, sync, "root", false),
            facts,
        }
    }

    fn user(name: &str, password: &str, roles: &[&str]) -> User {
        User {
            user_name: name.into(),
            password: password.into(),
            roles: roles
                .iter()
                .map(|id| UserRole {
                    role_id: id.to_string(),
                })
                .collect(),
            ..User::default()
        }
    }

    #[tokio::test]
    async fn reserved_and_duplicate_names_are_rejected() {
        let fx = fixture().await;
        let err = fx
            .users
            .create(user("root", "pw", &[]), "root")
            .await
            .expect_err("reserved");
        assert!(matches!(err, ManagerError::Validation(msg) if msg == NAME_ILLEGAL));

        fx.users
            .create(user("alice", "pw", &[]), "root")
            .await
            .expect("alice");
        let err = fx
            .users
            .create(user("alice", "pw", &[]), "root")
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ManagerError::Validation(msg) if msg == NAME_EXISTS));

        let err = fx
            .users
            .create(user("bob", "", &[]), "root")
            .await
            .expect_err("empty password");
        assert!(matches!(err, ManagerError::Validation(msg) if msg == EMPTY_PASSWORD));
    }

    #[tokio::test]
    async fn passwords_are_hashed_and_kept_on_blank_update() {
        let fx = fixture().await;
        let created = fx
            .users
            .create(user("alice", "abc-123", &[]), "root")
            .await
            .expect("create");
        let stored = fx.users.get(&created.record_id).await.expect("get");
        assert_ne!(stored.password, "abc-123");
        assert!(verify_password("abc-123", &stored.password));

        let mut next = stored.clone();
        next.password = String::new();
        next.real_name = "Alice".into();
        fx.users
            .update(&created.record_id, next)
            .await
            .expect("update");
        let updated = fx.users.get(&created.record_id).await.expect("get");
        assert_eq!(updated.real_name, "Alice");
        assert_eq!(updated.password, stored.password);
    }

    #[tokio::test]
    async fn status_changes_toggle_grouping_facts() {
        let fx = fixture().await;
        let role = fx
            .roles
            .create(
                Role {
                    name: "viewer".into(),
                    ..Role::default()
                },
                "root",
            )
            .await
            .expect("role");
        let created = fx
            .users
            .create(user("alice", "pw", &[role.record_id.as_str()]), "root")
            .await
            .expect("user");
        assert_eq!(fx.facts.snapshot().await.groupings_for(&created.record_id).len(), 1);

        fx.users
            .update_status(&created.record_id, UserStatus::Disabled)
            .await
            .expect("disable");
        assert!(fx.facts.snapshot().await.groupings_for(&created.record_id).is_empty());

        fx.users
            .update_status(&created.record_id, UserStatus::Enabled)
            .await
            .expect("enable");
        assert_eq!(fx.facts.snapshot().await.groupings_for(&created.record_id).len(), 1);
    }

    #[tokio::test]
    async fn repeated_role_assignments_collapse() {
        let fx = fixture().await;
        let role = fx
            .roles
            .create(
                Role {
                    name: "viewer".into(),
                    ..Role::default()
                },
                "root",
            )
            .await
            .expect("role");
        let id = role.record_id.as_str();
        let created = fx
            .users
            .create(user("alice", "pw", &[id, id]), "root")
            .await
            .expect("create with repeated role");
        assert_eq!(created.roles.len(), 1);

        let mut next = fx.users.get(&created.record_id).await.expect("get");
        next.roles = vec![
            UserRole {
                role_id: id.to_string(),
            },
            UserRole {
                role_id: id.to_string(),
            },
        ];
        fx.users
            .update(&created.record_id, next)
            .await
            .expect("update with repeated role");
        let stored = fx.users.get(&created.record_id).await.expect("get");
        assert_eq!(stored.roles.len(), 1);
        assert_eq!(fx.facts.snapshot().await.groupings_for(&created.record_id).len(), 1);
    }

    #[tokio::test]
    async fn query_resolves_role_records() {
        let fx = fixture().await;
        let role = fx
            .roles
            .create(
                Role {
                    name: "viewer".into(),
                    ..Role::default()
                },
                "root",
            )
            .await
            .expect("role");
        fx.users
            .create(user("alice", "pw", &[role.record_id.as_str()]), "root")
            .await
            .expect("user");
        let page = fx
            .users
            .query(&UserQuery::default(), None)
            .await
            .expect("query");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].roles[0].name, "viewer");
    }
}
