//! Console authentication and authorization.
//!
//! # Purpose
//! Groups password hashing, access tokens, the casbin-backed policy adapter,
//! and the request authorization middleware.
pub mod middleware;
pub mod password;
pub mod rbac;
pub mod token;
