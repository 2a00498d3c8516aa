//! Role records and their permission grants.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq)]
pub struct Role {
    #[serde(default)]
    pub record_id: String,
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub permissions: Vec<RolePermission>,
}

/// Grant of a subset of one permission node's action and resource codes.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq, Eq)]
pub struct RolePermission {
    pub permission_id: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RoleQuery {
    pub record_ids: Option<Vec<String>>,
    pub name: Option<String>,
    pub like_name: Option<String>,
}

impl RoleQuery {
    pub fn matches(&self, item: &Role) -> bool {
        if let Some(ids) = &self.record_ids {
            if !ids.iter().any(|id| id == &item.record_id) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &item.name != name {
                return false;
            }
        }
        if let Some(like) = &self.like_name {
            if !item.name.contains(like.as_str()) {
                return false;
            }
        }
        true
    }
}

impl Role {
    pub fn permission_ids(&self) -> Vec<String> {
        self.permissions
            .iter()
            .map(|grant| grant.permission_id.clone())
            .collect()
    }
}

/// Merge the action codes granted by several roles, keyed by permission id.
pub fn merge_granted_actions(roles: &[Role]) -> HashMap<String, Vec<String>> {
    let mut merged: HashMap<String, Vec<String>> = HashMap::new();
    for role in roles {
        for grant in &role.permissions {
            let codes = merged.entry(grant.permission_id.clone()).or_default();
            for code in &grant.actions {
                if !codes.contains(code) {
                    codes.push(code.clone());
                }
            }
        }
    }
    merged
}
