//! Three-way partition of child rows keyed by code or id.
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition<T> {
    /// In `new` but not in `old`.
    pub create: Vec<T>,
    /// In `old` but not in `new`.
    pub delete: Vec<T>,
    /// In both; carries the `new` value.
    pub update: Vec<T>,
}

pub fn partition_by_key<T, K>(old: &[T], new: &[T], key: K) -> Partition<T>
where
    T: Clone,
    K: Fn(&T) -> &str,
{
    let old_keys: HashSet<&str> = old.iter().map(&key).collect();
    let new_keys: HashSet<&str> = new.iter().map(&key).collect();

    let mut create = Vec::new();
    let mut update = Vec::new();
    for item in new {
        if old_keys.contains(key(item)) {
            update.push(item.clone());
        } else {
            create.push(item.clone());
        }
    }
    let delete = old
        .iter()
        .filter(|item| !new_keys.contains(key(item)))
        .cloned()
        .collect();
    Partition {
        create,
        delete,
        update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PermissionAction;

    fn action(code: &str, name: &str) -> PermissionAction {
        PermissionAction {
            code: code.into(),
            name: name.into(),
        }
    }

    #[test]
    fn partitions_by_code() {
        let old = vec![action("query", "Query"), action("add", "Add")];
        let new = vec![action("query", "List"), action("edit", "Edit")];
        let parts = partition_by_key(&old, &new, |item| item.code.as_str());
        assert_eq!(parts.create, vec![action("edit", "Edit")]);
        assert_eq!(parts.delete, vec![action("add", "Add")]);
        assert_eq!(parts.update, vec![action("query", "List")]);
    }

    #[test]
    fn empty_sides() {
        let items = vec![action("query", "Query")];
        let parts = partition_by_key(&[], &items, |item| item.code.as_str());
        assert_eq!(parts.create.len(), 1);
        let parts = partition_by_key(&items, &[], |item| item.code.as_str());
        assert_eq!(parts.delete.len(), 1);
    }
}
