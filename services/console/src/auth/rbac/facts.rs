//! Policy fact shapes and their derivation from relational records.
//!
//! # Purpose
//! Defines the two fact kinds held by the enforcement engine and the pure
//! functions that project roles and users into them.
//!
//! # Key invariants
//! - A role yields one [`PermissionFact`] per granted resource with a
//!   non-empty path and method.
//! - A user yields [`GroupingFact`]s only while enabled.
use crate::model::{Permission, PermissionResource, Role, User};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `p(role_id, path, method)`: the role may invoke `method` on `path`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionFact {
    pub role_id: String,
    pub path: String,
    pub method: String,
}

/// `g(user_id, role_id)`: the user is a member of the role.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupingFact {
    pub user_id: String,
    pub role_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    Permission(PermissionFact),
    Grouping(GroupingFact),
}

/// Owner of a group of facts: permission facts belong to a role, grouping
/// facts to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactSubject {
    Role(String),
    User(String),
}

impl FactSubject {
    pub fn id(&self) -> &str {
        match self {
            FactSubject::Role(id) | FactSubject::User(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FactSubject::Role(_) => "role",
            FactSubject::User(_) => "user",
        }
    }
}

/// A complete fact base.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactSet {
    pub permissions: Vec<PermissionFact>,
    pub groupings: Vec<GroupingFact>,
}

impl FactSet {
    /// Sort and deduplicate so two sets with the same facts compare equal.
    pub fn normalized(mut self) -> Self {
        self.permissions.sort();
        self.permissions.dedup();
        self.groupings.sort();
        self.groupings.dedup();
        self
    }

    pub fn permissions_for(&self, role_id: &str) -> Vec<&PermissionFact> {
        self.permissions
            .iter()
            .filter(|fact| fact.role_id == role_id)
            .collect()
    }

    pub fn groupings_for(&self, user_id: &str) -> Vec<&GroupingFact> {
        self.groupings
            .iter()
            .filter(|fact| fact.user_id == user_id)
            .collect()
    }
}

/// Resources a role was granted, resolved against the permission nodes it names.
///
/// Grants for permissions missing from `permissions` contribute nothing, and
/// resources without both a path and a method are skipped.
pub fn granted_resources(
    role: &Role,
    permissions: &HashMap<String, Permission>,
) -> Vec<PermissionResource> {
    let mut out = Vec::new();
    for grant in &role.permissions {
        let Some(permission) = permissions.get(&grant.permission_id) else {
            continue;
        };
        for resource in &permission.resources {
            if !grant.resources.contains(&resource.code) {
                continue;
            }
            if resource.path.is_empty() || resource.method.is_empty() {
                continue;
            }
            out.push(resource.clone());
        }
    }
    out
}

pub fn role_facts(role_id: &str, resources: &[PermissionResource]) -> Vec<PermissionFact> {
    resources
        .iter()
        .map(|resource| PermissionFact {
            role_id: role_id.to_string(),
            path: resource.path.clone(),
            method: resource.method.to_uppercase(),
        })
        .collect()
}

pub fn user_facts(user: &User) -> Vec<GroupingFact> {
    if !user.status.is_enabled() {
        return Vec::new();
    }
    user.roles
        .iter()
        .map(|assigned| GroupingFact {
            user_id: user.record_id.clone(),
            role_id: assigned.role_id.clone(),
        })
        .collect()
}
