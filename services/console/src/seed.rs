//! Permission seed loader.
//!
//! # Purpose
//! Reads a JSON permission tree and creates it on first start, when the
//! permission table is still empty. The whole tree goes in through one
//! transaction, so a bad node leaves nothing behind.
use crate::manager::PermissionManager;
use crate::model::{Permission, PermissionAction, PermissionResource};
use crate::store::{ConsoleStore, LockMode};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// One node of the seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedNode {
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
    pub actions: Vec<PermissionAction>,
    #[serde(default)]
    pub resources: Vec<PermissionResource>,
    #[serde(default)]
    pub children: Vec<SeedNode>,
}

pub fn read_seed(path: &Path) -> anyhow::Result<Vec<SeedNode>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read permission seed: {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| "parse permission seed json")
}

/// Create the seed tree if no permission exists yet. Returns the number of
/// nodes created; zero when the table already had data.
pub async fn load_permission_seed(
    store: &dyn ConsoleStore,
    permissions: &PermissionManager,
    path: &Path,
    creator: &str,
) -> anyhow::Result<usize> {
    if !permissions
        .is_empty()
        .await
        .context("check permission table")?
    {
        tracing::info!("permission table not empty; seed skipped");
        return Ok(0);
    }
    let nodes = read_seed(path)?;

    let mut tx = store.begin(LockMode::Shared).await.context("begin seed")?;
    let mut created = 0usize;
    // Depth-first so every parent exists before its children.
    let mut pending: Vec<(String, SeedNode)> = nodes
        .into_iter()
        .rev()
        .map(|node| (String::new(), node))
        .collect();
    while let Some((parent_id, node)) = pending.pop() {
        let item = Permission {
            name: node.name,
            sequence: node.sequence,
            icon: node.icon,
            router: node.router,
            hidden: node.hidden,
            parent_id,
            actions: node.actions,
            resources: node.resources,
            ..Permission::default()
        };
        let saved = permissions
            .create_in(tx.as_mut(), item, creator)
            .await
            .context("create seed permission")?;
        created += 1;
        for child in node.children.into_iter().rev() {
            pending.push((saved.record_id.clone(), child));
        }
    }
    tx.commit().await.context("commit seed")?;
    tracing::info!(created, path = %path.display(), "permission seed loaded");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rbac::{CasbinFactBase, PolicyAdapter};
    use crate::model::PermissionQuery;
    use crate::store::memory::InMemoryStore;
    use std::io::Write;
    use std::sync::Arc;

    const SEED: &str = r#"[
      {
        "name": "System",
        "sequence": 10,
        "icon": "setting",
        "children": [
          {
            "name": "Users",
            "router": "/system/users",
            "actions": [{"code": "query", "name": "Query"}],
            "resources": [{"code": "query", "name": "Query", "method": "GET", "path": "/api/v1/users"}],
            "children": [{"name": "Detail", "hidden": 1}]
          },
          {"name": "Roles", "router": "/system/roles"}
        ]
      }
    ]"#;

    async fn setup() -> (Arc<dyn ConsoleStore>, PermissionManager) {
        let store: Arc<dyn ConsoleStore> = Arc::new(InMemoryStore::new());
        let facts = Arc::new(CasbinFactBase::new(None).await.expect("facts"));
        let sync = Arc::new(PolicyAdapter::new(store.clone(), facts));
        let permissions = PermissionManager::new(store.clone(), sync, false);
        (store, permissions)
    }

    fn seed_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[tokio::test]
    async fn seed_builds_tree_with_parent_paths() {
        let (store, permissions) = setup().await;
        let file = seed_file(SEED);
        let created = load_permission_seed(store.as_ref(), &permissions, file.path(), "root")
            .await
            .expect("seed");
        assert_eq!(created, 4);

        let all = permissions
            .query(&PermissionQuery::default(), None)
            .await
            .expect("query")
            .items;
        let find = |name: &str| {
            all.iter()
                .find(|item| item.name == name)
                .cloned()
                .expect("node")
        };
        let system = find("System");
        let users = find("Users");
        let detail = find("Detail");
        assert_eq!(system.parent_path, "");
        assert_eq!(users.parent_id, system.record_id);
        assert_eq!(users.parent_path, system.record_id);
        assert_eq!(
            detail.parent_path,
            format!("{}/{}", system.record_id, users.record_id)
        );
        assert_eq!(users.resources.len(), 1);
    }

    #[tokio::test]
    async fn seed_is_skipped_when_permissions_exist() {
        let (store, permissions) = setup().await;
        let file = seed_file(SEED);
        load_permission_seed(store.as_ref(), &permissions, file.path(), "root")
            .await
            .expect("first");
        let again = load_permission_seed(store.as_ref(), &permissions, file.path(), "root")
            .await
            .expect("second");
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn failing_seed_leaves_table_empty() {
        let (store, permissions) = setup().await;
        // Duplicate sibling names fail on the second node.
        let file = seed_file(r#"[{"name": "A"}, {"name": "A"}]"#);
        let result = load_permission_seed(store.as_ref(), &permissions, file.path(), "root").await;
        assert!(result.is_err());
        assert!(permissions.is_empty().await.expect("empty"));
    }

    #[test]
    fn malformed_seed_is_reported() {
        let file = seed_file("{not json");
        let err = read_seed(file.path()).expect_err("malformed");
        assert!(format!("{err:#}").contains("parse permission seed json"));
    }
}
