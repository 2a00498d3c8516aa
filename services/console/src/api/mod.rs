//! Console HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules, payload types, and error mapping. Handlers
//! stay thin: they parse the request, call one manager operation, and wrap
//! the result.
pub mod error;
pub mod login;
pub mod openapi;
pub mod permissions;
pub mod roles;
pub mod system;
pub mod types;
pub mod users;
