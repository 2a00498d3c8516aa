//! Login, session tokens, and the current user's view of the console.
//!
//! # Purpose
//! Verifies credentials, issues and revokes access tokens, and answers the
//! "current user" queries: profile, visible permission tree, password change.
//!
//! # Notes
//! The root user is configured rather than stored. Its subject in tokens and
//! policy checks is the root user name.
use crate::auth::password::verify_password;
use crate::auth::token::{JwtAuth, TokenError, TokenInfo};
use crate::config::RootConfig;
use crate::manager::user::hash;
use crate::manager::{ManagerError, ManagerResult};
use crate::model::{
    PermissionQuery, PermissionTree, Role, RoleQuery, User, UserQuery, merge_granted_actions,
    split_and_get_all_ids, to_tree,
};
use crate::store::{ConsoleStore, LockMode, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

const INVALID_USER_NAME: &str = "Invalid username";
const INVALID_PASSWORD: &str = "Invalid password";
const INVALID_USER: &str = "Invalid user";
const USER_DISABLED: &str = "User is disabled, please contact administrator";
const ROOT_PASSWORD_LOCKED: &str = "Root user not allowed to update the password";
const OLD_PASSWORD_INCORRECT: &str = "Old password is incorrect";
const EMPTY_PASSWORD: &str = "Password is not allowed to be empty";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LoginInfo {
    pub user_name: String,
    pub real_name: String,
    #[serde(default)]
    pub role_names: Vec<String>,
}

#[derive(Clone)]
pub struct LoginManager {
    store: Arc<dyn ConsoleStore>,
    tokens: Arc<JwtAuth>,
    root: RootConfig,
}

impl LoginManager {
    pub fn new(store: Arc<dyn ConsoleStore>, tokens: Arc<JwtAuth>, root: RootConfig) -> Self {
        Self {
            store,
            tokens,
            root,
        }
    }

    pub fn is_root(&self, subject: &str) -> bool {
        subject == self.root.user_name
    }

    /// Check credentials and return the subject to put in the token.
    pub async fn verify(&self, user_name: &str, password: &str) -> ManagerResult<String> {
        if user_name == self.root.user_name && password == self.root.password {
            return Ok(self.root.user_name.clone());
        }
        let found = self
            .store
            .query_users(
                &UserQuery {
                    user_name: Some(user_name.to_string()),
                    ..UserQuery::default()
                },
                None,
            )
            .await?;
        let Some(user) = found.items.into_iter().next() else {
            return Err(ManagerError::Validation(INVALID_USER_NAME.to_string()));
        };
        if !verify_password(password, &user.password) {
            return Err(ManagerError::Validation(INVALID_PASSWORD.to_string()));
        }
        if !user.status.is_enabled() {
            return Err(ManagerError::Validation(USER_DISABLED.to_string()));
        }
        Ok(user.record_id)
    }

    pub fn generate_token(&self, subject: &str) -> ManagerResult<TokenInfo> {
        self.tokens.generate(subject).map_err(token_failure)
    }

    pub fn destroy_token(&self, token: &str) -> ManagerResult<()> {
        self.tokens.destroy(token).map_err(token_failure)
    }

    /// Issue a fresh token for an already authenticated subject.
    pub async fn refresh(&self, subject: &str) -> ManagerResult<TokenInfo> {
        if !self.is_root(subject) {
            self.enabled_user(subject).await?;
        }
        self.generate_token(subject)
    }

    async fn enabled_user(&self, subject: &str) -> ManagerResult<User> {
        let user = self
            .store
            .get_user(subject)
            .await?
            .ok_or_else(|| ManagerError::Validation(INVALID_USER.to_string()))?;
        if !user.status.is_enabled() {
            return Err(ManagerError::Validation(USER_DISABLED.to_string()));
        }
        Ok(user)
    }

    async fn roles_of(&self, user: &User) -> ManagerResult<Vec<Role>> {
        let ids = user.role_ids();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .query_roles(
                &RoleQuery {
                    record_ids: Some(ids),
                    ..RoleQuery::default()
                },
                None,
            )
            .await?
            .items)
    }

    pub async fn get_login_info(&self, subject: &str) -> ManagerResult<LoginInfo> {
        if self.is_root(subject) {
            return Ok(LoginInfo {
                user_name: self.root.user_name.clone(),
                real_name: self.root.real_name.clone(),
                role_names: Vec::new(),
            });
        }
        let user = self.enabled_user(subject).await?;
        let roles = self.roles_of(&user).await?;
        Ok(LoginInfo {
            user_name: user.user_name,
            real_name: user.real_name,
            role_names: roles.into_iter().map(|role| role.name).collect(),
        })
    }

    /// The menu tree the subject may see, with actions narrowed to what their
    /// roles grant. Root sees every non-hidden node.
    pub async fn query_user_permission_tree(
        &self,
        subject: &str,
    ) -> ManagerResult<Vec<PermissionTree>> {
        if self.is_root(subject) {
            let visible = self
                .store
                .query_permissions(
                    &PermissionQuery {
                        hidden: Some(0),
                        ..PermissionQuery::default()
                    },
                    None,
                )
                .await?;
            let mut tree = to_tree(&visible.items);
            strip_resources(&mut tree);
            return Ok(tree);
        }

        let user = self.enabled_user(subject).await?;
        let roles = self.roles_of(&user).await?;
        if roles.is_empty() {
            return Err(ManagerError::NoPermission);
        }

        let mut permission_ids: Vec<String> = roles.iter().flat_map(Role::permission_ids).collect();
        permission_ids.sort();
        permission_ids.dedup();
        if permission_ids.is_empty() {
            return Err(ManagerError::NoPermission);
        }
        let granted = self
            .store
            .query_permissions(
                &PermissionQuery {
                    record_ids: Some(permission_ids),
                    ..PermissionQuery::default()
                },
                None,
            )
            .await?
            .items;
        if granted.is_empty() {
            return Err(ManagerError::NoPermission);
        }

        let full = self
            .store
            .query_permissions(
                &PermissionQuery {
                    record_ids: Some(split_and_get_all_ids(&granted)),
                    ..PermissionQuery::default()
                },
                None,
            )
            .await?
            .items;
        let actions = merge_granted_actions(&roles);
        let mut tree = to_tree(&full);
        narrow_actions(&mut tree, &actions);
        strip_resources(&mut tree);
        Ok(tree)
    }

    pub async fn update_password(
        &self,
        subject: &str,
        old_password: &str,
        new_password: &str,
    ) -> ManagerResult<()> {
        if self.is_root(subject) {
            return Err(ManagerError::Validation(ROOT_PASSWORD_LOCKED.to_string()));
        }
        if new_password.is_empty() {
            return Err(ManagerError::Validation(EMPTY_PASSWORD.to_string()));
        }
        let user = self.enabled_user(subject).await?;
        if !verify_password(old_password, &user.password) {
            return Err(ManagerError::Validation(OLD_PASSWORD_INCORRECT.to_string()));
        }
        let hashed = hash(new_password)?;
        let mut tx = self.store.begin(LockMode::Shared).await?;
        tx.update_user_password(subject, &hashed).await?;
        tx.commit().await?;
        tracing::info!(user_id = %subject, "password updated");
        Ok(())
    }
}

fn token_failure(err: TokenError) -> ManagerError {
    match err {
        TokenError::Invalid | TokenError::Expired | TokenError::Revoked => {
            ManagerError::InvalidToken
        }
        TokenError::Jwt(err) => {
            ManagerError::Internal(StoreError::Unexpected(anyhow::anyhow!("jwt: {err}")))
        }
    }
}

fn narrow_actions(nodes: &mut [PermissionTree], granted: &HashMap<String, Vec<String>>) {
    for node in nodes {
        let codes = granted.get(&node.record_id);
        // Keep granted order, matching codes against the node's own actions.
        node.actions = codes
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(|code| node.actions.iter().find(|a| &a.code == code).cloned())
                    .collect()
            })
            .unwrap_or_default();
        narrow_actions(&mut node.children, granted);
    }
}

fn strip_resources(nodes: &mut [PermissionTree]) {
    for node in nodes {
        node.resources.clear();
        strip_resources(&mut node.children);
    }
}
