//! HTTP API request/response types.
//!
//! # Purpose
//! Defines shared payload shapes for the console REST API and OpenAPI
//! schema generation. Query strings use the camelCase names the admin UI
//! sends (`pageSize`, `parentID`, `roleIDs`).
use crate::model::{
    PageParam, PageResult, PermissionQuery, RoleQuery, UserQuery, UserStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorItem {
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorItem,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub total: u64,
    pub current: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ListResponse<T> {
    pub list: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pagination: Option<Pagination>,
}

impl<T> ListResponse<T> {
    pub fn paged(result: PageResult<T>, page: PageParam) -> Self {
        Self {
            list: result.items,
            pagination: Some(Pagination {
                total: result.total,
                current: page.current,
                page_size: page.page_size,
            }),
        }
    }

    pub fn unpaged(list: Vec<T>) -> Self {
        Self {
            list,
            pagination: None,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub current: Option<u32>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> PageParam {
        PageParam::new(self.current, self.page_size)
    }
}

#[derive(Debug, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct PermissionListQuery {
    pub name: Option<String>,
    pub hidden: Option<i32>,
    #[serde(rename = "parentID")]
    pub parent_id: Option<String>,
}

impl PermissionListQuery {
    pub fn to_query(&self) -> PermissionQuery {
        PermissionQuery {
            like_name: self.name.clone().filter(|name| !name.is_empty()),
            hidden: self.hidden,
            parent_id: self.parent_id.clone(),
            ..PermissionQuery::default()
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct PermissionTreeQuery {
    pub name: Option<String>,
    pub hidden: Option<i32>,
    #[serde(rename = "parentID")]
    pub parent_id: Option<String>,
    /// `1` keeps each node's actions.
    #[serde(rename = "includeActions")]
    pub include_actions: Option<u8>,
    /// `1` keeps each node's resources.
    #[serde(rename = "includeResources")]
    pub include_resources: Option<u8>,
}

impl PermissionTreeQuery {
    pub fn to_query(&self) -> PermissionQuery {
        PermissionListQuery {
            name: self.name.clone(),
            hidden: self.hidden,
            parent_id: self.parent_id.clone(),
        }
        .to_query()
    }
}

#[derive(Debug, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct RoleListQuery {
    pub name: Option<String>,
}

impl RoleListQuery {
    pub fn to_query(&self) -> RoleQuery {
        RoleQuery {
            like_name: self.name.clone().filter(|name| !name.is_empty()),
            ..RoleQuery::default()
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    #[serde(rename = "realName")]
    pub real_name: Option<String>,
    /// 1 enabled, 2 disabled.
    pub status: Option<i32>,
    /// Comma-separated role ids.
    #[serde(rename = "roleIDs")]
    pub role_ids: Option<String>,
}

impl UserListQuery {
    pub fn to_query(&self) -> Result<UserQuery, String> {
        let status = self.status.map(UserStatus::try_from).transpose()?;
        let role_ids = self.role_ids.as_deref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        Ok(UserQuery {
            like_user_name: self.user_name.clone().filter(|name| !name.is_empty()),
            like_real_name: self.real_name.clone().filter(|name| !name.is_empty()),
            status,
            role_ids: role_ids.filter(|ids| !ids.is_empty()),
            ..UserQuery::default()
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UpdatePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}
