//! Console data model module.
//!
//! # Purpose
//! Re-exports the permission, role, and user records shared by the store,
//! manager, and HTTP layers, plus the paging primitives used by list queries.
mod permission;
mod role;
mod user;

pub use permission::{
    Permission, PermissionAction, PermissionQuery, PermissionResource, PermissionTree,
    join_parent_path, split_and_get_all_ids, to_tree,
};
pub use role::{Role, RolePermission, RoleQuery, merge_granted_actions};
pub use user::{User, UserQuery, UserRole, UserShow, UserStatus};

/// Largest page a list endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 50;

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParam {
    pub current: u32,
    pub page_size: u32,
}

impl PageParam {
    /// Build a page request, clamping out-of-range values to the defaults.
    pub fn new(current: Option<u32>, page_size: Option<u32>) -> Self {
        let current = current.filter(|value| *value > 0).unwrap_or(1);
        let page_size = page_size
            .filter(|value| *value > 0)
            .map(|value| value.min(MAX_PAGE_SIZE))
            .unwrap_or(MAX_PAGE_SIZE);
        Self { current, page_size }
    }

    pub fn offset(&self) -> usize {
        (self.current as usize - 1) * self.page_size as usize
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }

    /// Slice an already ordered result set down to this page.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.limit())
            .collect()
    }
}

/// A page of results with the unpaged total.
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> PageResult<T> {
    pub fn unpaged(items: Vec<T>) -> Self {
        let total = items.len() as u64;
        Self { items, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_param_defaults_and_caps() {
        let page = PageParam::new(None, None);
        assert_eq!(page.current, 1);
        assert_eq!(page.page_size, MAX_PAGE_SIZE);

        let page = PageParam::new(Some(0), Some(500));
        assert_eq!(page.current, 1);
        assert_eq!(page.page_size, MAX_PAGE_SIZE);

        let page = PageParam::new(Some(3), Some(10));
        assert_eq!(page.offset(), 20);
        assert_eq!(page.limit(), 10);
    }

    #[test]
    fn page_param_slices_items() {
        let page = PageParam::new(Some(2), Some(2));
        assert_eq!(page.apply(vec![1, 2, 3, 4, 5]), vec![3, 4]);
        let page = PageParam::new(Some(4), Some(2));
        assert!(page.apply(vec![1, 2, 3]).is_empty());
    }
}
