//! User records, role assignments, and account status.
use super::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Account status; encoded on the wire as `1` (enabled) or `2` (disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "i32", into = "i32")]
pub enum UserStatus {
    #[default]
    Enabled,
    Disabled,
}

impl UserStatus {
    pub fn is_enabled(self) -> bool {
        matches!(self, UserStatus::Enabled)
    }
}

impl TryFrom<i32> for UserStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(UserStatus::Enabled),
            2 => Ok(UserStatus::Disabled),
            other => Err(format!("invalid user status: {other}")),
        }
    }
}

impl From<UserStatus> for i32 {
    fn from(value: UserStatus) -> Self {
        match value {
            UserStatus::Enabled => 1,
            UserStatus::Disabled => 2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq)]
pub struct User {
    #[serde(default)]
    pub record_id: String,
    pub user_name: String,
    #[serde(default)]
    pub real_name: String,
    /// Plain text on input, a password hash once stored. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    /// Required on every write so an edit never flips the account state.
    #[schema(value_type = i32)]
    pub status: UserStatus,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub roles: Vec<UserRole>,
}

impl User {
    pub fn role_ids(&self) -> Vec<String> {
        self.roles.iter().map(|role| role.role_id.clone()).collect()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq, Eq)]
pub struct UserRole {
    pub role_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub user_name: Option<String>,
    pub like_user_name: Option<String>,
    pub like_real_name: Option<String>,
    pub status: Option<UserStatus>,
    pub role_ids: Option<Vec<String>>,
}

impl UserQuery {
    pub fn matches(&self, item: &User) -> bool {
        if let Some(name) = &self.user_name {
            if &item.user_name != name {
                return false;
            }
        }
        if let Some(like) = &self.like_user_name {
            if !item.user_name.contains(like.as_str()) {
                return false;
            }
        }
        if let Some(like) = &self.like_real_name {
            if !item.real_name.contains(like.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if let Some(role_ids) = &self.role_ids {
            if !item.roles.iter().any(|role| role_ids.contains(&role.role_id)) {
                return false;
            }
        }
        true
    }
}

/// List view of a user with resolved role records.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UserShow {
    pub record_id: String,
    pub user_name: String,
    pub real_name: String,
    pub phone: String,
    pub email: String,
    #[schema(value_type = i32)]
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub roles: Vec<Role>,
}

impl UserShow {
    pub fn new(user: User, all_roles: &[Role]) -> Self {
        let roles = user
            .roles
            .iter()
            .filter_map(|assigned| {
                all_roles
                    .iter()
                    .find(|role| role.record_id == assigned.role_id)
                    .cloned()
            })
            .collect();
        Self {
            record_id: user.record_id,
            user_name: user.user_name,
            real_name: user.real_name,
            phone: user.phone,
            email: user.email,
            status: user.status,
            created_at: user.created_at,
            roles,
        }
    }
}
