//! In-memory implementation of the console store.
//!
//! # Purpose
//! Implements [`ConsoleStore`] entirely in memory. It exists for:
//! - local development and tests (no external dependencies)
//! - deployments where durability is not required
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Serialized transactions**: a transaction holds the single write lock
//!   for its lifetime and mutates a staged copy of the data. `commit` swaps
//!   the copy in; dropping the transaction (including during a panic unwind)
//!   releases the lock and leaves the committed data untouched.
//! - Reads outside a transaction take the read lock and therefore never see
//!   staged writes.
//!
//! # Constraints
//! The same uniqueness rules as the Postgres schema are enforced here so both
//! backends report concurrent duplicates as [`StoreError::Conflict`]:
//! permission names per parent, role names, user names, and child codes.
use super::{ConsoleStore, LockMode, StoreError, StoreResult, StoreTx};
use crate::model::{
    PageParam, PageResult, Permission, PermissionAction, PermissionQuery, PermissionResource,
    Role, RolePermission, RoleQuery, User, UserQuery, UserRole, UserStatus,
};
use async_trait::async_trait;
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Clone, Default)]
struct ConsoleData {
    permissions: Vec<Permission>,
    roles: Vec<Role>,
    users: Vec<User>,
}

/// Order by `sequence` descending, newest insertion first among equals.
fn ordered<T>(items: Vec<T>, sequence: impl Fn(&T) -> i32) -> Vec<T> {
    let mut items: Vec<T> = items.into_iter().rev().collect();
    items.sort_by_key(|item| Reverse(sequence(item)));
    items
}

fn paged<T>(items: Vec<T>, page: Option<PageParam>) -> PageResult<T> {
    let total = items.len() as u64;
    let items = match page {
        Some(page) => page.apply(items),
        None => items,
    };
    PageResult { items, total }
}

impl ConsoleData {
    fn permissions(&self, query: &PermissionQuery) -> Vec<Permission> {
        let items = self
            .permissions
            .iter()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        ordered(items, |item: &Permission| item.sequence)
    }

    fn roles(&self, query: &RoleQuery) -> Vec<Role> {
        let items = self
            .roles
            .iter()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        ordered(items, |item: &Role| item.sequence)
    }

    fn users(&self, query: &UserQuery) -> Vec<User> {
        let items = self
            .users
            .iter()
            .filter(|item| query.matches(item))
            .cloned()
            .collect();
        ordered(items, |_: &User| 0)
    }

    fn permission(&self, record_id: &str) -> Option<Permission> {
        self.permissions
            .iter()
            .find(|item| item.record_id == record_id)
            .cloned()
    }

    fn role(&self, record_id: &str) -> Option<Role> {
        self.roles
            .iter()
            .find(|item| item.record_id == record_id)
            .cloned()
    }

    fn user(&self, record_id: &str) -> Option<User> {
        self.users
            .iter()
            .find(|item| item.record_id == record_id)
            .cloned()
    }

    fn permission_mut(&mut self, record_id: &str) -> StoreResult<&mut Permission> {
        self.permissions
            .iter_mut()
            .find(|item| item.record_id == record_id)
            .ok_or_else(|| StoreError::NotFound(format!("permission {record_id}")))
    }

    fn role_mut(&mut self, record_id: &str) -> StoreResult<&mut Role> {
        self.roles
            .iter_mut()
            .find(|item| item.record_id == record_id)
            .ok_or_else(|| StoreError::NotFound(format!("role {record_id}")))
    }

    fn user_mut(&mut self, record_id: &str) -> StoreResult<&mut User> {
        self.users
            .iter_mut()
            .find(|item| item.record_id == record_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {record_id}")))
    }

    fn check_permission_unique(&self, item: &Permission) -> StoreResult<()> {
        let clash = self.permissions.iter().any(|other| {
            other.record_id != item.record_id
                && other.parent_id == item.parent_id
                && other.name == item.name
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "permission name {} under parent {:?}",
                item.name, item.parent_id
            )));
        }
        Ok(())
    }

    fn check_role_unique(&self, item: &Role) -> StoreResult<()> {
        if self
            .roles
            .iter()
            .any(|other| other.record_id != item.record_id && other.name == item.name)
        {
            return Err(StoreError::Conflict(format!("role name {}", item.name)));
        }
        Ok(())
    }

    fn check_user_unique(&self, item: &User) -> StoreResult<()> {
        if self
            .users
            .iter()
            .any(|other| other.record_id != item.record_id && other.user_name == item.user_name)
        {
            return Err(StoreError::Conflict(format!("user name {}", item.user_name)));
        }
        Ok(())
    }
}

/// Non-durable store backed by process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<ConsoleData>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsoleStore for InMemoryStore {
    async fn begin(&self, mode: LockMode) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.data.clone().write_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            staged,
            mode,
        }))
    }

    async fn query_permissions(
        &self,
        query: &PermissionQuery,
        page: Option<PageParam>,
    ) -> StoreResult<PageResult<Permission>> {
        let data = self.data.read().await;
        Ok(paged(data.permissions(query), page))
    }

    async fn get_permission(&self, record_id: &str) -> StoreResult<Option<Permission>> {
        Ok(self.data.read().await.permission(record_id))
    }

    async fn query_roles(
        &self,
        query: &RoleQuery,
        page: Option<PageParam>,
    ) -> StoreResult<PageResult<Role>> {
        let data = self.data.read().await;
        Ok(paged(data.roles(query), page))
    }

    async fn get_role(&self, record_id: &str) -> StoreResult<Option<Role>> {
        Ok(self.data.read().await.role(record_id))
    }

    async fn query_users(
        &self,
        query: &UserQuery,
        page: Option<PageParam>,
    ) -> StoreResult<PageResult<User>> {
        let data = self.data.read().await;
        Ok(paged(data.users(query), page))
    }

    async fn get_user(&self, record_id: &str) -> StoreResult<Option<User>> {
        Ok(self.data.read().await.user(record_id))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Transaction over a staged copy of the in-memory data.
pub struct InMemoryTx {
    guard: OwnedRwLockWriteGuard<ConsoleData>,
    staged: ConsoleData,
    mode: LockMode,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    fn lock_mode(&self) -> LockMode {
        self.mode
    }

    async fn get_permission(&mut self, record_id: &str) -> StoreResult<Option<Permission>> {
        Ok(self.staged.permission(record_id))
    }

    async fn query_permissions(
        &mut self,
        query: &PermissionQuery,
    ) -> StoreResult<Vec<Permission>> {
        Ok(self.staged.permissions(query))
    }

    async fn insert_permission(&mut self, item: &Permission) -> StoreResult<()> {
        if self.staged.permission(&item.record_id).is_some() {
            return Err(StoreError::Conflict(format!("permission {}", item.record_id)));
        }
        self.staged.check_permission_unique(item)?;
        let mut row = item.clone();
        row.actions.clear();
        row.resources.clear();
        self.staged.permissions.push(row);
        Ok(())
    }

    async fn update_permission(&mut self, item: &Permission) -> StoreResult<()> {
        self.staged.check_permission_unique(item)?;
        let row = self.staged.permission_mut(&item.record_id)?;
        row.name = item.name.clone();
        row.sequence = item.sequence;
        row.icon = item.icon.clone();
        row.router = item.router.clone();
        row.hidden = item.hidden;
        row.parent_id = item.parent_id.clone();
        row.parent_path = item.parent_path.clone();
        Ok(())
    }

    async fn update_permission_parent_path(
        &mut self,
        record_id: &str,
        parent_path: &str,
    ) -> StoreResult<()> {
        self.staged.permission_mut(record_id)?.parent_path = parent_path.to_string();
        Ok(())
    }

    async fn delete_permission(&mut self, record_id: &str) -> StoreResult<()> {
        self.staged
            .permissions
            .retain(|item| item.record_id != record_id);
        Ok(())
    }

    async fn insert_permission_action(
        &mut self,
        permission_id: &str,
        action: &PermissionAction,
    ) -> StoreResult<()> {
        let row = self.staged.permission_mut(permission_id)?;
        if row.actions.iter().any(|item| item.code == action.code) {
            return Err(StoreError::Conflict(format!("action code {}", action.code)));
        }
        row.actions.push(action.clone());
        Ok(())
    }

    async fn update_permission_action(
        &mut self,
        permission_id: &str,
        action: &PermissionAction,
    ) -> StoreResult<()> {
        let row = self.staged.permission_mut(permission_id)?;
        if let Some(existing) = row.actions.iter_mut().find(|item| item.code == action.code) {
            *existing = action.clone();
        }
        Ok(())
    }

    async fn delete_permission_action(
        &mut self,
        permission_id: &str,
        code: &str,
    ) -> StoreResult<()> {
        let row = self.staged.permission_mut(permission_id)?;
        row.actions.retain(|item| item.code != code);
        Ok(())
    }

    async fn delete_permission_actions(&mut self, permission_id: &str) -> StoreResult<()> {
        if let Ok(row) = self.staged.permission_mut(permission_id) {
            row.actions.clear();
        }
        Ok(())
    }

    async fn insert_permission_resource(
        &mut self,
        permission_id: &str,
        resource: &PermissionResource,
    ) -> StoreResult<()> {
        let row = self.staged.permission_mut(permission_id)?;
        if row.resources.iter().any(|item| item.code == resource.code) {
            return Err(StoreError::Conflict(format!(
                "resource code {}",
                resource.code
            )));
        }
        row.resources.push(resource.clone());
        Ok(())
    }

    async fn update_permission_resource(
        &mut self,
        permission_id: &str,
        resource: &PermissionResource,
    ) -> StoreResult<()> {
        let row = self.staged.permission_mut(permission_id)?;
        if let Some(existing) = row
            .resources
            .iter_mut()
            .find(|item| item.code == resource.code)
        {
            *existing = resource.clone();
        }
        Ok(())
    }

    async fn delete_permission_resource(
        &mut self,
        permission_id: &str,
        code: &str,
    ) -> StoreResult<()> {
        let row = self.staged.permission_mut(permission_id)?;
        row.resources.retain(|item| item.code != code);
        Ok(())
    }

    async fn delete_permission_resources(&mut self, permission_id: &str) -> StoreResult<()> {
        if let Ok(row) = self.staged.permission_mut(permission_id) {
            row.resources.clear();
        }
        Ok(())
    }

    async fn get_role(&mut self, record_id: &str) -> StoreResult<Option<Role>> {
        Ok(self.staged.role(record_id))
    }

    async fn query_roles(&mut self, query: &RoleQuery) -> StoreResult<Vec<Role>> {
        Ok(self.staged.roles(query))
    }

    async fn insert_role(&mut self, item: &Role) -> StoreResult<()> {
        if self.staged.role(&item.record_id).is_some() {
            return Err(StoreError::Conflict(format!("role {}", item.record_id)));
        }
        self.staged.check_role_unique(item)?;
        let mut row = item.clone();
        row.permissions.clear();
        self.staged.roles.push(row);
        Ok(())
    }

    async fn update_role(&mut self, item: &Role) -> StoreResult<()> {
        self.staged.check_role_unique(item)?;
        let row = self.staged.role_mut(&item.record_id)?;
        row.name = item.name.clone();
        row.sequence = item.sequence;
        row.memo = item.memo.clone();
        Ok(())
    }

    async fn delete_role(&mut self, record_id: &str) -> StoreResult<()> {
        self.staged.roles.retain(|item| item.record_id != record_id);
        Ok(())
    }

    async fn insert_role_permission(
        &mut self,
        role_id: &str,
        grant: &RolePermission,
    ) -> StoreResult<()> {
        let row = self.staged.role_mut(role_id)?;
        if row
            .permissions
            .iter()
            .any(|item| item.permission_id == grant.permission_id)
        {
            return Err(StoreError::Conflict(format!(
                "role permission {}",
                grant.permission_id
            )));
        }
        row.permissions.push(grant.clone());
        Ok(())
    }

    async fn update_role_permission(
        &mut self,
        role_id: &str,
        grant: &RolePermission,
    ) -> StoreResult<()> {
        let row = self.staged.role_mut(role_id)?;
        if let Some(existing) = row
            .permissions
            .iter_mut()
            .find(|item| item.permission_id == grant.permission_id)
        {
            *existing = grant.clone();
        }
        Ok(())
    }

    async fn delete_role_permission(
        &mut self,
        role_id: &str,
        permission_id: &str,
    ) -> StoreResult<()> {
        let row = self.staged.role_mut(role_id)?;
        row.permissions
            .retain(|item| item.permission_id != permission_id);
        Ok(())
    }

    async fn delete_role_permissions(&mut self, role_id: &str) -> StoreResult<()> {
        if let Ok(row) = self.staged.role_mut(role_id) {
            row.permissions.clear();
        }
        Ok(())
    }

    async fn get_user(&mut self, record_id: &str) -> StoreResult<Option<User>> {
        Ok(self.staged.user(record_id))
    }

    async fn query_users(&mut self, query: &UserQuery) -> StoreResult<Vec<User>> {
        Ok(self.staged.users(query))
    }

    async fn insert_user(&mut self, item: &User) -> StoreResult<()> {
        if self.staged.user(&item.record_id).is_some() {
            return Err(StoreError::Conflict(format!("user {}", item.record_id)));
        }
        self.staged.check_user_unique(item)?;
        let mut row = item.clone();
        row.roles.clear();
        self.staged.users.push(row);
        Ok(())
    }

    async fn update_user(&mut self, item: &User) -> StoreResult<()> {
        self.staged.check_user_unique(item)?;
        let row = self.staged.user_mut(&item.record_id)?;
        row.user_name = item.user_name.clone();
        row.real_name = item.real_name.clone();
        row.password = item.password.clone();
        row.phone = item.phone.clone();
        row.email = item.email.clone();
        row.status = item.status;
        Ok(())
    }

    async fn update_user_status(
        &mut self,
        record_id: &str,
        status: UserStatus,
    ) -> StoreResult<()> {
        self.staged.user_mut(record_id)?.status = status;
        Ok(())
    }

    async fn update_user_password(&mut self, record_id: &str, password: &str) -> StoreResult<()> {
        self.staged.user_mut(record_id)?.password = password.to_string();
        Ok(())
    }

    async fn delete_user(&mut self, record_id: &str) -> StoreResult<()> {
        self.staged.users.retain(|item| item.record_id != record_id);
        Ok(())
    }

    async fn insert_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()> {
        let row = self.staged.user_mut(user_id)?;
        if row.roles.iter().any(|item| item.role_id == role_id) {
            return Err(StoreError::Conflict(format!("user role {role_id}")));
        }
        row.roles.push(UserRole {
            role_id: role_id.to_string(),
        });
        Ok(())
    }

    async fn delete_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()> {
        let row = self.staged.user_mut(user_id)?;
        row.roles.retain(|item| item.role_id != role_id);
        Ok(())
    }

    async fn delete_user_roles(&mut self, user_id: &str) -> StoreResult<()> {
        if let Ok(row) = self.staged.user_mut(user_id) {
            row.roles.clear();
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
