//! Postgres-backed implementation of the console store.
//!
//! # What this module is
//! Implements [`ConsoleStore`] and [`StoreTx`] on Postgres (via `sqlx`). The
//! relational tables are the source of truth for permissions, roles, and
//! users; the policy fact base is derived from them.
//!
//! # Data model
//! - `permissions` with `permission_actions` / `permission_resources` child rows.
//! - `roles` with `role_permissions`, whose granted action and resource codes
//!   are `TEXT[]` columns.
//! - `users` with `user_roles`.
//!
//! Every child table carries a `BIGSERIAL id` so child rows come back in
//! insertion order.
//!
//! # Transactions and locking
//! - [`PostgresStore::begin`] opens a `sqlx` transaction. Dropping it without
//!   `commit` rolls it back, which also covers a panicking handler.
//! - In [`LockMode::ForUpdate`] every read of owning rows inside the
//!   transaction appends `FOR UPDATE`.
//!
//! # Operational notes
//! - Migrations are executed at startup via `sqlx::migrate!("./migrations")`.
//! - Pool limits and acquire timeouts are explicit so a slow database fails
//!   requests instead of hanging them.
//! - Database URLs may contain credentials; they are never logged here.
//! - Dynamic SQL is limited to `QueryBuilder` filters whose values are bound,
//!   never interpolated.
use super::{ConsoleStore, LockMode, StoreError, StoreResult, StoreTx};
use crate::config::PostgresConfig;
use crate::model::{
    PageParam, PageResult, Permission, PermissionAction, PermissionQuery, PermissionResource,
    Role, RolePermission, RoleQuery, User, UserQuery, UserRole, UserStatus,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const PERMISSION_COLUMNS: &str =
    "record_id, name, sequence, icon, router, hidden, parent_id, parent_path, creator, created_at";
const ROLE_COLUMNS: &str = "record_id, name, sequence, memo, creator, created_at";
const USER_COLUMNS: &str =
    "record_id, user_name, real_name, password, phone, email, status, creator, created_at";

/// Durable console store backed by Postgres.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect, run migrations, and return a ready store.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        // Avoid logging `pg.url`; it may contain credentials.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;

        // Handlers assume the schema exists; fail startup if it cannot be applied.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, FromRow)]
struct PermissionRow {
    record_id: String,
    name: String,
    sequence: i32,
    icon: String,
    router: String,
    hidden: i32,
    parent_id: String,
    parent_path: String,
    creator: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct ActionRow {
    permission_id: String,
    code: String,
    name: String,
}

#[derive(Debug, Clone, FromRow)]
struct ResourceRow {
    permission_id: String,
    code: String,
    name: String,
    method: String,
    path: String,
}

#[derive(Debug, Clone, FromRow)]
struct RoleRow {
    record_id: String,
    name: String,
    sequence: i32,
    memo: String,
    creator: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct RolePermissionRow {
    role_id: String,
    permission_id: String,
    actions: Vec<String>,
    resources: Vec<String>,
}

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    record_id: String,
    user_name: String,
    real_name: String,
    password: String,
    phone: String,
    email: String,
    status: i32,
    creator: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct UserRoleRow {
    user_id: String,
    role_id: String,
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_permission_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &PermissionQuery) {
    builder.push(" WHERE TRUE");
    if let Some(ids) = &query.record_ids {
        builder
            .push(" AND record_id = ANY(")
            .push_bind(ids.clone())
            .push(")");
    }
    if let Some(name) = &query.name {
        builder.push(" AND name = ").push_bind(name.clone());
    }
    if let Some(like) = &query.like_name {
        builder
            .push(" AND name LIKE ")
            .push_bind(format!("%{}%", escape_like(like)));
    }
    if let Some(parent_id) = &query.parent_id {
        builder.push(" AND parent_id = ").push_bind(parent_id.clone());
    }
    if let Some(prefix) = &query.prefix_parent_path {
        builder
            .push(" AND parent_path LIKE ")
            .push_bind(format!("{}%", escape_like(prefix)));
    }
    if let Some(hidden) = query.hidden {
        builder.push(" AND hidden = ").push_bind(hidden);
    }
}

fn push_role_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &RoleQuery) {
    builder.push(" WHERE TRUE");
    if let Some(ids) = &query.record_ids {
        builder
            .push(" AND record_id = ANY(")
            .push_bind(ids.clone())
            .push(")");
    }
    if let Some(name) = &query.name {
        builder.push(" AND name = ").push_bind(name.clone());
    }
    if let Some(like) = &query.like_name {
        builder
            .push(" AND name LIKE ")
            .push_bind(format!("%{}%", escape_like(like)));
    }
}

fn push_user_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &UserQuery) {
    builder.push(" WHERE TRUE");
    if let Some(name) = &query.user_name {
        builder.push(" AND user_name = ").push_bind(name.clone());
    }
    if let Some(like) = &query.like_user_name {
        builder
            .push(" AND user_name LIKE ")
            .push_bind(format!("%{}%", escape_like(like)));
    }
    if let Some(like) = &query.like_real_name {
        builder
            .push(" AND real_name LIKE ")
            .push_bind(format!("%{}%", escape_like(like)));
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(i32::from(status));
    }
    if let Some(role_ids) = &query.role_ids {
        builder
            .push(" AND record_id IN (SELECT user_id FROM user_roles WHERE role_id = ANY(")
            .push_bind(role_ids.clone())
            .push("))");
    }
}

fn push_page_and_lock(
    builder: &mut QueryBuilder<'_, Postgres>,
    page: Option<PageParam>,
    lock: LockMode,
) {
    if let Some(page) = page {
        builder
            .push(" LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
    }
    if lock == LockMode::ForUpdate {
        builder.push(" FOR UPDATE");
    }
}

async fn select_permissions(
    conn: &mut PgConnection,
    query: &PermissionQuery,
    page: Option<PageParam>,
    lock: LockMode,
) -> StoreResult<Vec<Permission>> {
    let mut builder = QueryBuilder::new(format!("SELECT {PERMISSION_COLUMNS} FROM permissions"));
    push_permission_filters(&mut builder, query);
    builder.push(" ORDER BY sequence DESC, id DESC");
    push_page_and_lock(&mut builder, page, lock);
    let rows = builder
        .build_query_as::<PermissionRow>()
        .fetch_all(&mut *conn)
        .await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = rows.iter().map(|row| row.record_id.clone()).collect();
    let action_rows = sqlx::query_as::<_, ActionRow>(
        r#"SELECT permission_id, code, name FROM permission_actions
           WHERE permission_id = ANY($1) ORDER BY id"#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;
    let resource_rows = sqlx::query_as::<_, ResourceRow>(
        r#"SELECT permission_id, code, name, method, path FROM permission_resources
           WHERE permission_id = ANY($1) ORDER BY id"#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut actions: HashMap<String, Vec<PermissionAction>> = HashMap::new();
    for row in action_rows {
        actions
            .entry(row.permission_id)
            .or_default()
            .push(PermissionAction {
                code: row.code,
                name: row.name,
            });
    }
    let mut resources: HashMap<String, Vec<PermissionResource>> = HashMap::new();
    for row in resource_rows {
        resources
            .entry(row.permission_id)
            .or_default()
            .push(PermissionResource {
                code: row.code,
                name: row.name,
                method: row.method,
                path: row.path,
            });
    }

    Ok(rows
        .into_iter()
        .map(|row| Permission {
            actions: actions.remove(&row.record_id).unwrap_or_default(),
            resources: resources.remove(&row.record_id).unwrap_or_default(),
            record_id: row.record_id,
            name: row.name,
            sequence: row.sequence,
            icon: row.icon,
            router: row.router,
            hidden: row.hidden,
            parent_id: row.parent_id,
            parent_path: row.parent_path,
            creator: row.creator,
            created_at: row.created_at,
        })
        .collect())
}

async fn count_permissions(conn: &mut PgConnection, query: &PermissionQuery) -> StoreResult<u64> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM permissions");
    push_permission_filters(&mut builder, query);
    let total: i64 = builder.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;
    Ok(total as u64)
}

async fn select_roles(
    conn: &mut PgConnection,
    query: &RoleQuery,
    page: Option<PageParam>,
    lock: LockMode,
) -> StoreResult<Vec<Role>> {
    let mut builder = QueryBuilder::new(format!("SELECT {ROLE_COLUMNS} FROM roles"));
    push_role_filters(&mut builder, query);
    builder.push(" ORDER BY sequence DESC, id DESC");
    push_page_and_lock(&mut builder, page, lock);
    let rows = builder
        .build_query_as::<RoleRow>()
        .fetch_all(&mut *conn)
        .await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = rows.iter().map(|row| row.record_id.clone()).collect();
    let grant_rows = sqlx::query_as::<_, RolePermissionRow>(
        r#"SELECT role_id, permission_id, actions, resources FROM role_permissions
           WHERE role_id = ANY($1) ORDER BY id"#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;
    let mut grants: HashMap<String, Vec<RolePermission>> = HashMap::new();
    for row in grant_rows {
        grants.entry(row.role_id).or_default().push(RolePermission {
            permission_id: row.permission_id,
            actions: row.actions,
            resources: row.resources,
        });
    }

    Ok(rows
        .into_iter()
        .map(|row| Role {
            permissions: grants.remove(&row.record_id).unwrap_or_default(),
            record_id: row.record_id,
            name: row.name,
            sequence: row.sequence,
            memo: row.memo,
            creator: row.creator,
            created_at: row.created_at,
        })
        .collect())
}

async fn count_roles(conn: &mut PgConnection, query: &RoleQuery) -> StoreResult<u64> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM roles");
    push_role_filters(&mut builder, query);
    let total: i64 = builder.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;
    Ok(total as u64)
}

fn user_from_row(row: UserRow, roles: Vec<UserRole>) -> StoreResult<User> {
    let status = UserStatus::try_from(row.status).map_err(|err| anyhow!(err))?;
    Ok(User {
        record_id: row.record_id,
        user_name: row.user_name,
        real_name: row.real_name,
        password: row.password,
        phone: row.phone,
        email: row.email,
        status,
        creator: row.creator,
        created_at: row.created_at,
        roles,
    })
}

async fn select_users(
    conn: &mut PgConnection,
    query: &UserQuery,
    page: Option<PageParam>,
    lock: LockMode,
) -> StoreResult<Vec<User>> {
    let mut builder = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
    push_user_filters(&mut builder, query);
    builder.push(" ORDER BY id DESC");
    push_page_and_lock(&mut builder, page, lock);
    let rows = builder
        .build_query_as::<UserRow>()
        .fetch_all(&mut *conn)
        .await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = rows.iter().map(|row| row.record_id.clone()).collect();
    let role_rows = sqlx::query_as::<_, UserRoleRow>(
        r#"SELECT user_id, role_id FROM user_roles WHERE user_id = ANY($1) ORDER BY id"#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;
    let mut roles: HashMap<String, Vec<UserRole>> = HashMap::new();
    for row in role_rows {
        roles.entry(row.user_id).or_default().push(UserRole {
            role_id: row.role_id,
        });
    }

    rows.into_iter()
        .map(|row| {
            let assigned = roles.remove(&row.record_id).unwrap_or_default();
            user_from_row(row, assigned)
        })
        .collect()
}

async fn count_users(conn: &mut PgConnection, query: &UserQuery) -> StoreResult<u64> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM users");
    push_user_filters(&mut builder, query);
    let total: i64 = builder.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;
    Ok(total as u64)
}

fn by_id_permission(record_id: &str) -> PermissionQuery {
    PermissionQuery {
        record_ids: Some(vec![record_id.to_string()]),
        ..PermissionQuery::default()
    }
}

fn by_id_role(record_id: &str) -> RoleQuery {
    RoleQuery {
        record_ids: Some(vec![record_id.to_string()]),
        ..RoleQuery::default()
    }
}

fn ensure_affected(rows: u64, what: &str) -> StoreResult<()> {
    if rows == 0 {
        return Err(StoreError::NotFound(what.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ConsoleStore for PostgresStore {
    async fn begin(&self, mode: LockMode) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx { tx, mode }))
    }

    async fn query_permissions(
        &self,
        query: &PermissionQuery,
        page: Option<PageParam>,
    ) -> StoreResult<PageResult<Permission>> {
        let mut conn = self.pool.acquire().await?;
        let items = select_permissions(&mut conn, query, page, LockMode::Shared).await?;
        let total = match page {
            Some(_) => count_permissions(&mut conn, query).await?,
            None => items.len() as u64,
        };
        Ok(PageResult { items, total })
    }

    async fn get_permission(&self, record_id: &str) -> StoreResult<Option<Permission>> {
        let mut conn = self.pool.acquire().await?;
        let items = select_permissions(
            &mut conn,
            &by_id_permission(record_id),
            None,
            LockMode::Shared,
        )
        .await?;
        Ok(items.into_iter().next())
    }

    async fn query_roles(
        &self,
        query: &RoleQuery,
        page: Option<PageParam>,
    ) -> StoreResult<PageResult<Role>> {
        let mut conn = self.pool.acquire().await?;
        let items = select_roles(&mut conn, query, page, LockMode::Shared).await?;
        let total = match page {
            Some(_) => count_roles(&mut conn, query).await?,
            None => items.len() as u64,
        };
        Ok(PageResult { items, total })
    }

    async fn get_role(&self, record_id: &str) -> StoreResult<Option<Role>> {
        let mut conn = self.pool.acquire().await?;
        let items = select_roles(&mut conn, &by_id_role(record_id), None, LockMode::Shared).await?;
        Ok(items.into_iter().next())
    }

    async fn query_users(
        &self,
        query: &UserQuery,
        page: Option<PageParam>,
    ) -> StoreResult<PageResult<User>> {
        let mut conn = self.pool.acquire().await?;
        let items = select_users(&mut conn, query, page, LockMode::Shared).await?;
        let total = match page {
            Some(_) => count_users(&mut conn, query).await?,
            None => items.len() as u64,
        };
        Ok(PageResult { items, total })
    }

    async fn get_user(&self, record_id: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE record_id = $1"
        ))
        .bind(record_id)
        .fetch_optional(&mut *conn)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let roles = sqlx::query_as::<_, UserRoleRow>(
            r#"SELECT user_id, role_id FROM user_roles WHERE user_id = $1 ORDER BY id"#,
        )
        .bind(record_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|row| UserRole {
            role_id: row.role_id,
        })
        .collect();
        user_from_row(row, roles).map(Some)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// An open Postgres transaction.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
    mode: LockMode,
}

#[async_trait]
impl StoreTx for PostgresTx {
    fn lock_mode(&self) -> LockMode {
        self.mode
    }

    async fn get_permission(&mut self, record_id: &str) -> StoreResult<Option<Permission>> {
        let items =
            select_permissions(&mut self.tx, &by_id_permission(record_id), None, self.mode)
                .await?;
        Ok(items.into_iter().next())
    }

    async fn query_permissions(
        &mut self,
        query: &PermissionQuery,
    ) -> StoreResult<Vec<Permission>> {
        select_permissions(&mut self.tx, query, None, self.mode).await
    }

    async fn insert_permission(&mut self, item: &Permission) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO permissions (record_id, name, sequence, icon, router, hidden, parent_id, parent_path, creator, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(&item.record_id)
        .bind(&item.name)
        .bind(item.sequence)
        .bind(&item.icon)
        .bind(&item.router)
        .bind(item.hidden)
        .bind(&item.parent_id)
        .bind(&item.parent_path)
        .bind(&item.creator)
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_permission(&mut self, item: &Permission) -> StoreResult<()> {
        let result = sqlx::query(
            r#"UPDATE permissions SET name = $1, sequence = $2, icon = $3, router = $4, hidden = $5, parent_id = $6, parent_path = $7
               WHERE record_id = $8"#,
        )
        .bind(&item.name)
        .bind(item.sequence)
        .bind(&item.icon)
        .bind(&item.router)
        .bind(item.hidden)
        .bind(&item.parent_id)
        .bind(&item.parent_path)
        .bind(&item.record_id)
        .execute(&mut *self.tx)
        .await?;
        ensure_affected(result.rows_affected(), "permission")
    }

    async fn update_permission_parent_path(
        &mut self,
        record_id: &str,
        parent_path: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(r#"UPDATE permissions SET parent_path = $1 WHERE record_id = $2"#)
            .bind(parent_path)
            .bind(record_id)
            .execute(&mut *self.tx)
            .await?;
        ensure_affected(result.rows_affected(), "permission")
    }

    async fn delete_permission(&mut self, record_id: &str) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM permissions WHERE record_id = $1"#)
            .bind(record_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_permission_action(
        &mut self,
        permission_id: &str,
        action: &PermissionAction,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO permission_actions (permission_id, code, name) VALUES ($1, $2, $3)"#,
        )
        .bind(permission_id)
        .bind(&action.code)
        .bind(&action.name)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_permission_action(
        &mut self,
        permission_id: &str,
        action: &PermissionAction,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"UPDATE permission_actions SET name = $1 WHERE permission_id = $2 AND code = $3"#,
        )
        .bind(&action.name)
        .bind(permission_id)
        .bind(&action.code)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_permission_action(
        &mut self,
        permission_id: &str,
        code: &str,
    ) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM permission_actions WHERE permission_id = $1 AND code = $2"#)
            .bind(permission_id)
            .bind(code)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_permission_actions(&mut self, permission_id: &str) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM permission_actions WHERE permission_id = $1"#)
            .bind(permission_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_permission_resource(
        &mut self,
        permission_id: &str,
        resource: &PermissionResource,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO permission_resources (permission_id, code, name, method, path) VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(permission_id)
        .bind(&resource.code)
        .bind(&resource.name)
        .bind(&resource.method)
        .bind(&resource.path)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_permission_resource(
        &mut self,
        permission_id: &str,
        resource: &PermissionResource,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"UPDATE permission_resources SET name = $1, method = $2, path = $3 WHERE permission_id = $4 AND code = $5"#,
        )
        .bind(&resource.name)
        .bind(&resource.method)
        .bind(&resource.path)
        .bind(permission_id)
        .bind(&resource.code)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_permission_resource(
        &mut self,
        permission_id: &str,
        code: &str,
    ) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM permission_resources WHERE permission_id = $1 AND code = $2"#)
            .bind(permission_id)
            .bind(code)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_permission_resources(&mut self, permission_id: &str) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM permission_resources WHERE permission_id = $1"#)
            .bind(permission_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_role(&mut self, record_id: &str) -> StoreResult<Option<Role>> {
        let items = select_roles(&mut self.tx, &by_id_role(record_id), None, self.mode).await?;
        Ok(items.into_iter().next())
    }

    async fn query_roles(&mut self, query: &RoleQuery) -> StoreResult<Vec<Role>> {
        select_roles(&mut self.tx, query, None, self.mode).await
    }

    async fn insert_role(&mut self, item: &Role) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO roles (record_id, name, sequence, memo, creator, created_at) VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(&item.record_id)
        .bind(&item.name)
        .bind(item.sequence)
        .bind(&item.memo)
        .bind(&item.creator)
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_role(&mut self, item: &Role) -> StoreResult<()> {
        let result = sqlx::query(
            r#"UPDATE roles SET name = $1, sequence = $2, memo = $3 WHERE record_id = $4"#,
        )
        .bind(&item.name)
        .bind(item.sequence)
        .bind(&item.memo)
        .bind(&item.record_id)
        .execute(&mut *self.tx)
        .await?;
        ensure_affected(result.rows_affected(), "role")
    }

    async fn delete_role(&mut self, record_id: &str) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM roles WHERE record_id = $1"#)
            .bind(record_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_role_permission(
        &mut self,
        role_id: &str,
        grant: &RolePermission,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO role_permissions (role_id, permission_id, actions, resources) VALUES ($1, $2, $3, $4)"#,
        )
        .bind(role_id)
        .bind(&grant.permission_id)
        .bind(&grant.actions)
        .bind(&grant.resources)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_role_permission(
        &mut self,
        role_id: &str,
        grant: &RolePermission,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"UPDATE role_permissions SET actions = $1, resources = $2 WHERE role_id = $3 AND permission_id = $4"#,
        )
        .bind(&grant.actions)
        .bind(&grant.resources)
        .bind(role_id)
        .bind(&grant.permission_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_role_permission(
        &mut self,
        role_id: &str,
        permission_id: &str,
    ) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2"#)
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_role_permissions(&mut self, role_id: &str) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM role_permissions WHERE role_id = $1"#)
            .bind(role_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_user(&mut self, record_id: &str) -> StoreResult<Option<User>> {
        let mut builder = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        builder
            .push(" WHERE record_id = ")
            .push_bind(record_id.to_string());
        push_page_and_lock(&mut builder, None, self.mode);
        let row = builder
            .build_query_as::<UserRow>()
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let roles = sqlx::query_as::<_, UserRoleRow>(
            r#"SELECT user_id, role_id FROM user_roles WHERE user_id = $1 ORDER BY id"#,
        )
        .bind(record_id)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(|row| UserRole {
            role_id: row.role_id,
        })
        .collect();
        user_from_row(row, roles).map(Some)
    }

    async fn query_users(&mut self, query: &UserQuery) -> StoreResult<Vec<User>> {
        select_users(&mut self.tx, query, None, self.mode).await
    }

    async fn insert_user(&mut self, item: &User) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO users (record_id, user_name, real_name, password, phone, email, status, creator, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(&item.record_id)
        .bind(&item.user_name)
        .bind(&item.real_name)
        .bind(&item.password)
        .bind(&item.phone)
        .bind(&item.email)
        .bind(i32::from(item.status))
        .bind(&item.creator)
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_user(&mut self, item: &User) -> StoreResult<()> {
        let result = sqlx::query(
            r#"UPDATE users SET user_name = $1, real_name = $2, password = $3, phone = $4, email = $5, status = $6
               WHERE record_id = $7"#,
        )
        .bind(&item.user_name)
        .bind(&item.real_name)
        .bind(&item.password)
        .bind(&item.phone)
        .bind(&item.email)
        .bind(i32::from(item.status))
        .bind(&item.record_id)
        .execute(&mut *self.tx)
        .await?;
        ensure_affected(result.rows_affected(), "user")
    }

    async fn update_user_status(
        &mut self,
        record_id: &str,
        status: UserStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query(r#"UPDATE users SET status = $1 WHERE record_id = $2"#)
            .bind(i32::from(status))
            .bind(record_id)
            .execute(&mut *self.tx)
            .await?;
        ensure_affected(result.rows_affected(), "user")
    }

    async fn update_user_password(&mut self, record_id: &str, password: &str) -> StoreResult<()> {
        let result = sqlx::query(r#"UPDATE users SET password = $1 WHERE record_id = $2"#)
            .bind(password)
            .bind(record_id)
            .execute(&mut *self.tx)
            .await?;
        ensure_affected(result.rows_affected(), "user")
    }

    async fn delete_user(&mut self, record_id: &str) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM users WHERE record_id = $1"#)
            .bind(record_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()> {
        sqlx::query(r#"INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)"#)
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_user_role(&mut self, user_id: &str, role_id: &str) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2"#)
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_user_roles(&mut self, user_id: &str) -> StoreResult<()> {
        sqlx::query(r#"DELETE FROM user_roles WHERE user_id = $1"#)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
