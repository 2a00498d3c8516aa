//! Relational persistence for permissions, roles, and users.
//!
//! # Purpose
//! Defines the storage contract used by the managers: a [`ConsoleStore`] for
//! reads outside a transaction, and a [`StoreTx`] unit of work that carries
//! every multi-row mutation.
//!
//! # Key invariants
//! - Nothing written through a [`StoreTx`] is visible until `commit`.
//! - Dropping a [`StoreTx`] without committing discards its writes, including
//!   when the owning task unwinds from a panic.
//! - Query results are ordered by `sequence` descending, then newest first,
//!   and always carry their child rows (actions, resources, grants, roles).
use crate::model::{
    PageParam, PageResult, Permission, PermissionAction, PermissionQuery, PermissionResource,
    Role, RolePermission, RoleQuery, User, UserQuery, UserStatus,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if postgres::is_unique_violation(&err) {
            return StoreError::Conflict(err.to_string());
        }
        StoreError::Unexpected(anyhow::Error::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(anyhow::Error::new(err))
    }
}

/// Row locking requested for reads made inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    Shared,
    /// Reads take row locks (`SELECT ... FOR UPDATE`) where the backend supports it.
    ForUpdate,
}

#[async_trait]
pub trait ConsoleStore: Send + Sync {
    async fn begin(&self, mode: LockMode) -> StoreResult<Box<dyn StoreTx>>;

    async fn query_permissions(
        &self,
        query: &PermissionQuery,
        page: Option<PageParam>,
    ) -> StoreResult<PageResult<Permission>>;
    async fn get_permission(&self, record_id: &str) -> StoreResult<Option<Permission>>;

    async fn query_roles(
        &self,
        query: &RoleQuery,
        page: Option<PageParam>,
    ) -> StoreResult<PageResult<Role>>;
    async fn get_role(&self, record_id: &str) -> StoreResult<Option<Role>>;

    async fn query_users(
        &self,
        query: &UserQuery,
        page: Option<PageParam>,
    ) -> StoreResult<PageResult<User>>;
    async fn get_user(&self, record_id: &str) -> StoreResult<Option<User>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// A single database transaction.
///
/// Node-level methods (`insert_permission`, `update_role`, ...) only touch the
/// owning row; child rows are written through their dedicated methods so the
/// managers can apply create/delete/update partitions one statement at a time.
#[async_trait]
pub trait StoreTx: Send {
    fn lock_mode(&self) -> LockMode;

    async fn get_permission(&mut self, record_id: &str) -> StoreResult<Option<Permission>>;
    async fn query_permissions(&mut self, query: &PermissionQuery)
    -> StoreResult<Vec<Permission>>;
    async fn insert_permission(&mut self, item: &Permission) -> StoreResult<()>;
    async fn update_permission(&mut self, item: &Permission) -> StoreResult<()>;
    async fn update_permission_parent_path(
        &mut self,
        record_id: &str,
        parent_path: &str,
    ) -> StoreResult<()>;
    async fn delete_permission(&mut self, record_id: &str) -> StoreResult<()>;

    async fn insert_permission_action(
        &mut self,
        permission_id: &str,
        action: &PermissionAction,
    ) -> StoreResult<()>;
    async fn update_permission_action(
        &mut self,
        permission_id: &str,
        action: &PermissionAction,
    ) -> StoreResult<()>;
    async fn delete_permission_action(&mut self, permission_id: &str, code: &str)
    -> StoreResult<()>;
    async fn delete_permission_actions(&mut self, permission_id: &str) -> StoreResult<()>;

    async fn insert_permission_resource(
        &mut self,
        permission_id: &str,
        resource: &PermissionResource,
    ) -> StoreResult<()>;
    async fn update_permission_resource(
        &mut self,
        permission_id: &str,
        resource: &PermissionResource,
    ) -> StoreResult<()>;
    async fn delete_permission_resource(
        &mut self,
        permission_id: &str,
        code: &str,
    ) -> StoreResult<()>;
    async fn delete_permission_resources(&mut self, permission_id: &str) -> StoreResult<()>;

    async fn get_role(&mut self, record_id: &str) -> StoreResult<Option<Role>>;
    async fn query_roles(&mut self, query: &RoleQuery) -> StoreResult<Vec<Role>>;
    async fn insert_role(&mut self, item: &Role) -> StoreResult<()>;
    async fn update_role(&mut self, item: &Role) -> StoreResult<()>;
    async fn delete_role(&mut self, record_id: &str) -> StoreResult<()>;
    async fn insert_role_permission(
        &mut self,
        role_id: &str,
        grant: &RolePermission,
    ) -> StoreResult<()>;
    async fn update_role_permission(
        &mut self,
        role_id: &str,
        grant: &RolePermission,
    ) -> StoreResult<()>;
    async fn delete_role_permission(&mut self, role_id: &str, permission_id: &str)
    -> StoreResult<()>;
    async fn delete_role_permissions(&mut self, role_id: &str) -> StoreResult<()>;

    async fn get_user(&mut self, record_id: &str) -> StoreResult<Option<User>>;
    async fn query_users(&mut self, query: &UserQuery) -> StoreResult<Vec<User>>;
    async fn insert_user(&mut self, item: &User) -> StoreResult<()>;
    async fn update_user(&mut self, item: &User) -> StoreResult<()>;
    async fn update_user_status(&mut self, record_id: &str, status: UserStatus)
    -> StoreResult<()>;
    async fn update_user_password(&mut self, record_id: &str, password: &str)
    -> StoreResult<()>;
    async fn delete_user(&mut self, record_id: &str) -> StoreResult<()>;
    async fn insert_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()>;
    async fn delete_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()>;
    async fn delete_user_roles(&mut self, user_id: &str) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
