//! Permission tree manager.
//!
//! # Purpose
//! Owns the rules for permission nodes: sibling-unique names, parent path
//! resolution, subtree moves, and the no-delete-with-children guard.
//!
//! # Key invariants
//! - A node's `parent_path` is `join_parent_path(parent.parent_path, parent.record_id)`,
//!   or empty for roots.
//! - A move rewrites the node and every descendant in the same transaction.
//! - A node can never be re-parented under itself or its own subtree.
use crate::auth::rbac::PolicySynchronizer;
use crate::manager::diff::partition_by_key;
use crate::manager::{ManagerError, ManagerResult, settle_sync};
use crate::model::{
    PageParam, PageResult, Permission, PermissionQuery, PermissionTree, RoleQuery,
    join_parent_path, split_and_get_all_ids, to_tree,
};
use crate::store::{ConsoleStore, LockMode, StoreTx};
use chrono::Utc;
use std::sync::Arc;

const NAME_EXISTS: &str = "Permission name is already exists";

#[derive(Clone)]
pub struct PermissionManager {
    store: Arc<dyn ConsoleStore>,
    sync: Arc<dyn PolicySynchronizer>,
    strict_sync: bool,
}

impl PermissionManager {
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
        query: &PermissionQuery,
        page: Option<PageParam>,
    ) -> ManagerResult<PageResult<Permission>> {
        Ok(self.store.query_permissions(query, page).await?)
    }

    pub async fn get(&self, record_id: &str) -> ManagerResult<Permission> {
        self.store
            .get_permission(record_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound("permission".to_string()))
    }

    /// Matching nodes nested as a tree.
    ///
    /// Ancestors of the matches are pulled in so a filtered query still nests
    /// under its real roots.
    pub async fn query_tree(
        &self,
        query: &PermissionQuery,
        include_actions: bool,
        include_resources: bool,
    ) -> ManagerResult<Vec<PermissionTree>> {
        let matched = self.store.query_permissions(query, None).await?.items;
        let items = if is_unfiltered(query) || matched.is_empty() {
            matched
        } else {
            let ids = split_and_get_all_ids(&matched);
            let full = PermissionQuery {
                record_ids: Some(ids),
                ..PermissionQuery::default()
            };
            self.store.query_permissions(&full, None).await?.items
        };
        let mut tree = to_tree(&items);
        strip_tree(&mut tree, include_actions, include_resources);
        Ok(tree)
    }

    /// True when no permission node exists yet.
    pub async fn is_empty(&self) -> ManagerResult<bool> {
        let page = PageParam::new(Some(1), Some(1));
        let result = self
            .store
            .query_permissions(&PermissionQuery::default(), Some(page))
            .await?;
        Ok(result.total == 0)
    }

    async fn check_name(
        tx: &mut dyn StoreTx,
        parent_id: &str,
        name: &str,
        record_id: &str,
    ) -> ManagerResult<()> {
        let siblings = tx
            .query_permissions(&PermissionQuery {
                parent_id: Some(parent_id.to_string()),
                name: Some(name.to_string()),
                ..PermissionQuery::default()
            })
            .await?;
        if siblings.iter().any(|item| item.record_id != record_id) {
            return Err(ManagerError::Validation(NAME_EXISTS.to_string()));
        }
        Ok(())
    }

    async fn parent_path(tx: &mut dyn StoreTx, parent_id: &str) -> ManagerResult<String> {
        if parent_id.is_empty() {
            return Ok(String::new());
        }
        let parent = tx
            .get_permission(parent_id)
            .await?
            .ok_or(ManagerError::InvalidParent)?;
        Ok(join_parent_path(&parent.parent_path, &parent.record_id))
    }

    pub async fn create(&self, item: Permission, creator: &str) -> ManagerResult<Permission> {
        let mut tx = self.store.begin(LockMode::Shared).await?;
        let created = self.create_in(tx.as_mut(), item, creator).await?;
        tx.commit().await?;
        Ok(created)
    }

    pub async fn create_in(
        &self,
        tx: &mut dyn StoreTx,
        mut item: Permission,
        creator: &str,
    ) -> ManagerResult<Permission> {
        Self::check_name(tx, &item.parent_id, &item.name, "").await?;
        item.parent_path = Self::parent_path(tx, &item.parent_id).await?;
        item.record_id = uuid::Uuid::new_v4().to_string();
        item.creator = creator.to_string();
        item.created_at = Utc::now();

        tx.insert_permission(&item).await?;
        for action in &item.actions {
            tx.insert_permission_action(&item.record_id, action).await?;
        }
        for resource in &item.resources {
            tx.insert_permission_resource(&item.record_id, resource)
                .await?;
        }
        tracing::debug!(permission_id = %item.record_id, name = %item.name, "permission created");
        Ok(item)
    }

    pub async fn update(&self, record_id: &str, item: Permission) -> ManagerResult<Permission> {
        let mut tx = self.store.begin(LockMode::ForUpdate).await?;
        let updated = self.update_in(tx.as_mut(), record_id, item).await?;
        tx.commit().await?;
        self.resync_granting_roles(record_id).await?;
        Ok(updated)
    }

    pub async fn update_in(
        &self,
        tx: &mut dyn StoreTx,
        record_id: &str,
        item: Permission,
    ) -> ManagerResult<Permission> {
        if record_id == item.parent_id {
            return Err(ManagerError::InvalidParent);
        }
        let old = tx
            .get_permission(record_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound("permission".to_string()))?;
        let moved = old.parent_id != item.parent_id;
        if old.name != item.name || moved {
            Self::check_name(tx, &item.parent_id, &item.name, record_id).await?;
        }

        let mut next = Permission {
            record_id: old.record_id.clone(),
            creator: old.creator.clone(),
            created_at: old.created_at,
            parent_path: old.parent_path.clone(),
            ..item
        };
        if moved {
            let parent_path = Self::parent_path(tx, &next.parent_id).await?;
            if parent_path.split('/').any(|segment| segment == record_id) {
                return Err(ManagerError::InvalidParent);
            }
            next.parent_path = parent_path;
        }
        tx.update_permission(&next).await?;

        let actions = partition_by_key(&old.actions, &next.actions, |a| a.code.as_str());
        for action in &actions.create {
            tx.insert_permission_action(record_id, action).await?;
        }
        for action in &actions.delete {
            tx.delete_permission_action(record_id, &action.code).await?;
        }
        for action in &actions.update {
            tx.update_permission_action(record_id, action).await?;
        }

        let resources = partition_by_key(&old.resources, &next.resources, |r| r.code.as_str());
        for resource in &resources.create {
            tx.insert_permission_resource(record_id, resource).await?;
        }
        for resource in &resources.delete {
            tx.delete_permission_resource(record_id, &resource.code)
                .await?;
        }
        for resource in &resources.update {
            tx.update_permission_resource(record_id, resource).await?;
        }

        if moved {
            let old_prefix = join_parent_path(&old.parent_path, record_id);
            let new_prefix = join_parent_path(&next.parent_path, record_id);
            let descendants = tx
                .query_permissions(&PermissionQuery {
                    prefix_parent_path: Some(old_prefix.clone()),
                    ..PermissionQuery::default()
                })
                .await?;
            let nested = format!("{old_prefix}/");
            for descendant in descendants {
                let path = &descendant.parent_path;
                // The LIKE prefix also matches sibling ids that merely share leading characters.
                if path != &old_prefix && !path.starts_with(&nested) {
                    continue;
                }
                let rewritten = format!("{new_prefix}{}", &path[old_prefix.len()..]);
                tx.update_permission_parent_path(&descendant.record_id, &rewritten)
                    .await?;
            }
            tracing::debug!(
                permission_id = %record_id,
                from = %old_prefix,
                to = %new_prefix,
                "permission subtree moved"
            );
        }
        Ok(next)
    }

    pub async fn delete(&self, record_id: &str) -> ManagerResult<()> {
        let mut tx = self.store.begin(LockMode::ForUpdate).await?;
        self.delete_in(tx.as_mut(), record_id).await?;
        tx.commit().await?;
        self.resync_granting_roles(record_id).await
    }

    pub async fn delete_in(&self, tx: &mut dyn StoreTx, record_id: &str) -> ManagerResult<()> {
        if tx.get_permission(record_id).await?.is_none() {
            return Err(ManagerError::NotFound("permission".to_string()));
        }
        let children = tx
            .query_permissions(&PermissionQuery {
                parent_id: Some(record_id.to_string()),
                ..PermissionQuery::default()
            })
            .await?;
        if !children.is_empty() {
            return Err(ManagerError::NotAllowDeleteWithChild);
        }
        tx.delete_permission_actions(record_id).await?;
        tx.delete_permission_resources(record_id).await?;
        tx.delete_permission(record_id).await?;
        Ok(())
    }

    /// Re-derive facts for roles whose grants reference `permission_id`.
    async fn resync_granting_roles(&self, permission_id: &str) -> ManagerResult<()> {
        let roles = self
            .store
            .query_roles(&RoleQuery::default(), None)
            .await?
            .items;
        for role in roles
            .iter()
            .filter(|role| role.permissions.iter().any(|g| g.permission_id == permission_id))
        {
            let result = self.sync.sync_role(&role.record_id).await;
            settle_sync(result, self.strict_sync, "role", &role.record_id)?;
        }
        Ok(())
    }
}

fn is_unfiltered(query: &PermissionQuery) -> bool {
    query.record_ids.is_none()
        && query.name.is_none()
        && query.like_name.is_none()
        && query.parent_id.is_none()
        && query.prefix_parent_path.is_none()
        && query.hidden.is_none()
}

fn strip_tree(nodes: &mut [PermissionTree], include_actions: bool, include_resources: bool) {
    for node in nodes {
        if !include_actions {
            node.actions.clear();
        }
        if !include_resources {
            node.resources.clear();
        }
        strip_tree(&mut node.children, include_actions, include_resources);
    }
}
