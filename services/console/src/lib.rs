//! Admin console RBAC service library crate.
//!
//! # Purpose
//! Exposes the permission tree, role and user managers, the casbin policy
//! adapter, the HTTP API, configuration, and storage backends for use by the
//! binary and tests.
//!
//! # Notes
//! Module boundaries mirror the layers: `api` parses, `manager` validates
//! and orchestrates, `store` persists, `auth::rbac` enforces.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod manager;
pub mod model;
pub mod observability;
pub mod seed;
pub mod store;
