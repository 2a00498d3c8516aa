//! Role manager.
//!
//! # Purpose
//! Maintains roles and their permission grants, and keeps each role's
//! permission facts in step after every committed change.
//!
//! # Key invariants
//! - Role names are globally unique.
//! - A role assigned to any user cannot be deleted.
//! - Grants may only name existing permission nodes.
use crate::auth::rbac::PolicySynchronizer;
use crate::auth::rbac::facts::granted_resources;
use crate::manager::diff::partition_by_key;
use crate::manager::{ManagerError, ManagerResult, settle_sync};
use crate::model::{
    PageParam, PageResult, PermissionQuery, PermissionResource, Role, RolePermission, RoleQuery,
    UserQuery,
};
use crate::store::{ConsoleStore, LockMode, StoreTx};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const NAME_EXISTS: &str = "The role name already exists";
const ROLE_IN_USE: &str = "This role has been assigned to the user and is not allowed to delete";

/// Keep the first grant of each permission.
fn dedup_grants(grants: &mut Vec<RolePermission>) {
    let mut seen = HashSet::new();
    grants.retain(|grant| seen.insert(grant.permission_id.clone()));
}

#[derive(Clone)]
pub struct RoleManager {
    store: Arc<dyn ConsoleStore>,
    sync: Arc<dyn PolicySynchronizer>,
    strict_sync: bool,
}

impl RoleManager {
    pub fn new(
        store: Arc<dyn ConsoleStore>,
        sync: Arc<dyn PolicySynchronizer>,
        strict_sync: bool,
    ) -> Self {
        Self {
            store,
            sync,
            strict_sync,
        }
    }

    pub async fn query(
        &self,
        query: &RoleQuery,
        page: Option<PageParam>,
    ) -> ManagerResult<PageResult<Role>> {
        Ok(self.store.query_roles(query, page).await?)
    }

    /// Every role without grants, for selection lists.
    pub async fn select(&self, query: &RoleQuery) -> ManagerResult<Vec<Role>> {
        let mut roles = self.store.query_roles(query, None).await?.items;
        for role in &mut roles {
            role.permissions.clear();
        }
        Ok(roles)
    }

    pub async fn get(&self, record_id: &str) -> ManagerResult<Role> {
        self.store
            .get_role(record_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound("role".to_string()))
    }

    /// The flattened `(path, method)` resources `role` grants.
    pub async fn get_permission_resources(
        &self,
        role: &Role,
    ) -> ManagerResult<Vec<PermissionResource>> {
        let ids = role.permission_ids();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let permissions = self
            .store
            .query_permissions(
                &PermissionQuery {
                    record_ids: Some(ids),
                    ..PermissionQuery::default()
                },
                None,
            )
            .await?
            .items
            .into_iter()
            .map(|item| (item.record_id.clone(), item))
            .collect::<HashMap<_, _>>();
        Ok(granted_resources(role, &permissions))
    }

    async fn check_name(tx: &mut dyn StoreTx, name: &str) -> ManagerResult<()> {
        let existing = tx
            .query_roles(&RoleQuery {
                name: Some(name.to_string()),
                ..RoleQuery::default()
            })
            .await?;
        if !existing.is_empty() {
            return Err(ManagerError::Validation(NAME_EXISTS.to_string()));
        }
        Ok(())
    }

    async fn check_permissions(tx: &mut dyn StoreTx, role: &Role) -> ManagerResult<()> {
        let ids = role.permission_ids();
        if ids.is_empty() {
            return Ok(());
        }
        let found = tx
            .query_permissions(&PermissionQuery {
                record_ids: Some(ids.clone()),
                ..PermissionQuery::default()
            })
            .await?;
        if found.len() != ids.len() {
            return Err(ManagerError::NotFound("permission".to_string()));
        }
        Ok(())
    }

    pub async fn create(&self, item: Role, creator: &str) -> ManagerResult<Role> {
        let mut tx = self.store.begin(LockMode::Shared).await?;
        let created = self.create_in(tx.as_mut(), item, creator).await?;
        tx.commit().await?;
        settle_sync(
            self.sync.sync_role(&created.record_id).await,
            self.strict_sync,
            "role",
            &created.record_id,
        )?;
        Ok(created)
    }

    pub async fn create_in(
        &self,
        tx: &mut dyn StoreTx,
        mut item: Role,
        creator: &str,
    ) -> ManagerResult<Role> {
        Self::check_name(tx, &item.name).await?;
        dedup_grants(&mut item.permissions);
        Self::check_permissions(tx, &item).await?;
        item.record_id = uuid::Uuid::new_v4().to_string();
        item.creator = creator.to_string();
        item.created_at = Utc::now();

        tx.insert_role(&item).await?;
        for grant in &item.permissions {
            tx.insert_role_permission(&item.record_id, grant).await?;
        }
        tracing::debug!(role_id = %item.record_id, name = %item.name, "role created");
        Ok(item)
    }

    pub async fn update(&self, record_id: &str, item: Role) -> ManagerResult<Role> {
        let mut tx = self.store.begin(LockMode::ForUpdate).await?;
        let updated = self.update_in(tx.as_mut(), record_id, item).await?;
        tx.commit().await?;
        settle_sync(
            self.sync.sync_role(record_id).await,
            self.strict_sync,
            "role",
            record_id,
        )?;
        Ok(updated)
    }

    pub async fn update_in(
        &self,
        tx: &mut dyn StoreTx,
        record_id: &str,
        mut item: Role,
    ) -> ManagerResult<Role> {
        let old = tx
            .get_role(record_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound("role".to_string()))?;
        if old.name != item.name {
            Self::check_name(tx, &item.name).await?;
        }
        dedup_grants(&mut item.permissions);
        Self::check_permissions(tx, &item).await?;

        let next = Role {
            record_id: old.record_id.clone(),
            creator: old.creator.clone(),
            created_at: old.created_at,
            ..item
        };
        tx.update_role(&next).await?;

        let grants = partition_by_key(&old.permissions, &next.permissions, |g| {
            g.permission_id.as_str()
        });
        for grant in &grants.create {
            tx.insert_role_permission(record_id, grant).await?;
        }
        for grant in &grants.delete {
            tx.delete_role_permission(record_id, &grant.permission_id)
                .await?;
        }
        for grant in &grants.update {
            tx.update_role_permission(record_id, grant).await?;
        }
        Ok(next)
    }

    pub async fn delete(&self, record_id: &str) -> ManagerResult<()> {
        let mut tx = self.store.begin(LockMode::ForUpdate).await?;
        self.delete_in(tx.as_mut(), record_id).await?;
        tx.commit().await?;
        settle_sync(
            self.sync.remove_role(record_id).await,
            self.strict_sync,
            "role",
            record_id,
        )
    }

    pub async fn delete_in(&self, tx: &mut dyn StoreTx, record_id: &str) -> ManagerResult<()> {
        if tx.get_role(record_id).await?.is_none() {
            return Err(ManagerError::NotFound("role".to_string()));
        }
        let holders = tx
            .query_users(&UserQuery {
                role_ids: Some(vec![record_id.to_string()]),
                ..UserQuery::default()
            })
            .await?;
        if !holders.is_empty() {
            return Err(ManagerError::Validation(ROLE_IN_USE.to_string()));
        }
        tx.delete_role_permissions(record_id).await?;
        tx.delete_role(record_id).await?;
        Ok(())
    }
}
