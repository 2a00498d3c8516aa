//! Permission tree records and pure tree helpers.
//!
//! # Purpose
//! Defines permission nodes with their actions and resources, the nested tree
//! view returned to clients, and the helpers that convert between flat lists
//! and trees.
//!
//! # Key invariants
//! - `parent_path` is the slash-joined chain of ancestor ids, excluding the
//!   node itself; it is empty for roots.
//! - A child's `parent_path` equals `join_parent_path(parent.parent_path, parent.record_id)`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq)]
pub struct Permission {
    #[serde(default)]
    pub record_id: String,
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub router: String,
    /// 0 shows the node in menus, 1 hides it.
    #[serde(default)]
    pub hidden: i32,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub parent_path: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub actions: Vec<PermissionAction>,
    #[serde(default)]
    pub resources: Vec<PermissionResource>,
}

/// Business-level capability attached to a permission node.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq, Eq)]
pub struct PermissionAction {
    pub code: String,
    #[serde(default)]
    pub name: String,
}

/// Concrete HTTP target attached to a permission node.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq, Eq)]
pub struct PermissionResource {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
}

/// Filters for permission queries; unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct PermissionQuery {
    pub record_ids: Option<Vec<String>>,
    pub name: Option<String>,
    pub like_name: Option<String>,
    pub parent_id: Option<String>,
    pub prefix_parent_path: Option<String>,
    pub hidden: Option<i32>,
}

impl PermissionQuery {
    pub fn matches(&self, item: &Permission) -> bool {
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
        if let Some(parent_id) = &self.parent_id {
            if &item.parent_id != parent_id {
                return false;
            }
        }
        if let Some(prefix) = &self.prefix_parent_path {
            if !item.parent_path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(hidden) = self.hidden {
            if item.hidden != hidden {
                return false;
            }
        }
        true
    }
}

/// Nested view of a permission node and its descendants.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default, PartialEq)]
pub struct PermissionTree {
    #[serde(default)]
    pub record_id: String,
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub router: String,
    #[serde(default)]
    pub hidden: i32,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub parent_path: String,
    #[serde(default)]
    pub actions: Vec<PermissionAction>,
    #[serde(default)]
    pub resources: Vec<PermissionResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schema(no_recursion)]
    pub children: Vec<PermissionTree>,
}

impl From<&Permission> for PermissionTree {
    fn from(item: &Permission) -> Self {
        Self {
            record_id: item.record_id.clone(),
            name: item.name.clone(),
            sequence: item.sequence,
            icon: item.icon.clone(),
            router: item.router.clone(),
            hidden: item.hidden,
            parent_id: item.parent_id.clone(),
            parent_path: item.parent_path.clone(),
            actions: item.actions.clone(),
            resources: item.resources.clone(),
            children: Vec::new(),
        }
    }
}

/// Compute the `parent_path` of a node whose parent has `parent_path` and `parent_id`.
pub fn join_parent_path(parent_path: &str, parent_id: &str) -> String {
    if parent_path.is_empty() {
        parent_id.to_string()
    } else {
        format!("{parent_path}/{parent_id}")
    }
}

/// Build a forest from a flat list in a single pass over parent ids.
///
/// Nodes whose parent is absent from `items` become additional roots, so a
/// filtered list that skipped an ancestor yields more than one root. Input
/// order is kept among siblings.
pub fn to_tree(items: &[Permission]) -> Vec<PermissionTree> {
    let ids: HashSet<&str> = items.iter().map(|item| item.record_id.as_str()).collect();
    let mut children: HashMap<&str, Vec<&Permission>> = HashMap::new();
    let mut roots = Vec::new();
    for item in items {
        let parent = item.parent_id.as_str();
        if parent.is_empty() || parent == item.record_id || !ids.contains(parent) {
            roots.push(item);
        } else {
            children.entry(parent).or_default().push(item);
        }
    }
    roots
        .into_iter()
        .map(|root| build_node(root, &children))
        .collect()
}

fn build_node(item: &Permission, children: &HashMap<&str, Vec<&Permission>>) -> PermissionTree {
    let mut node = PermissionTree::from(item);
    if let Some(kids) = children.get(item.record_id.as_str()) {
        node.children = kids.iter().map(|kid| build_node(kid, children)).collect();
    }
    node
}

/// Collect the ids of `items` plus every ancestor named in their parent paths.
///
/// Callers query with the returned ids to get a list that `to_tree` can nest
/// without orphaned roots.
pub fn split_and_get_all_ids(items: &[Permission]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for item in items {
        if seen.insert(item.record_id.clone()) {
            ids.push(item.record_id.clone());
        }
        for ancestor in item.parent_path.split('/').filter(|id| !id.is_empty()) {
            if seen.insert(ancestor.to_string()) {
                ids.push(ancestor.to_string());
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, parent_id: &str, parent_path: &str) -> Permission {
        Permission {
            record_id: id.to_string(),
            name: id.to_string(),
            parent_id: parent_id.to_string(),
            parent_path: parent_path.to_string(),
            ..Permission::default()
        }
    }

    #[test]
    fn join_parent_path_skips_leading_separator() {
        assert_eq!(join_parent_path("", "a"), "a");
        assert_eq!(join_parent_path("a", "b"), "a/b");
        assert_eq!(join_parent_path("a/b", "c"), "a/b/c");
    }

    #[test]
    fn to_tree_nests_children_under_parents() {
        let items = vec![
            node("a", "", ""),
            node("b", "a", "a"),
            node("c", "b", "a/b"),
            node("d", "a", "a"),
        ];
        let tree = to_tree(&items);
        assert_eq!(tree.len(), 1);
        let root = &tree[0];
        assert_eq!(root.record_id, "a");
        let kids: Vec<&str> = root.children.iter().map(|c| c.record_id.as_str()).collect();
        assert_eq!(kids, vec!["b", "d"]);
        assert_eq!(root.children[0].children[0].record_id, "c");
    }

    #[test]
    fn to_tree_promotes_orphans_to_roots() {
        let items = vec![node("b", "a", "a"), node("c", "b", "a/b"), node("x", "", "")];
        let tree = to_tree(&items);
        let roots: Vec<&str> = tree.iter().map(|n| n.record_id.as_str()).collect();
        assert_eq!(roots, vec!["b", "x"]);
        assert_eq!(tree[0].children[0].record_id, "c");
    }

    #[test]
    fn split_and_get_all_ids_adds_ancestors_once() {
        let items = vec![node("c", "b", "a/b"), node("d", "b", "a/b"), node("a", "", "")];
        assert_eq!(split_and_get_all_ids(&items), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn query_matches_prefix_and_flags() {
        let item = Permission {
            hidden: 1,
            ..node("c", "b", "a/b")
        };
        let query = PermissionQuery {
            prefix_parent_path: Some("a".into()),
            hidden: Some(1),
            ..PermissionQuery::default()
        };
        assert!(query.matches(&item));
        let query = PermissionQuery {
            like_name: Some("zzz".into()),
            ..PermissionQuery::default()
        };
        assert!(!query.matches(&item));
    }

    #[test]
    fn tree_omits_empty_children_in_json() {
        let tree = to_tree(&[node("a", "", "")]);
        let json = serde_json::to_value(&tree).expect("json");
        assert!(json[0].get("children").is_none());
    }
}
