//! Policy enforcement adapter.
//!
//! # Purpose
//! Keeps an in-memory casbin fact base in step with the relational store:
//! - `p(role_id, path, method)` for every resource a role is granted
//! - `g(user_id, role_id)` for every role assigned to an enabled user
//!
//! The managers call the [`sync::PolicySynchronizer`] after each committed
//! write; [`sync::PolicyAdapter::load_policy`] rebuilds everything at startup
//! and on the [`reload`] timer.
pub mod engine;
pub mod facts;
pub mod reload;
pub mod sync;

// Embed the Casbin model so deployments don't need a separate config file.
pub const MODEL_CONF: &str = include_str!("rbac/model.conf");

pub use engine::{CasbinFactBase, FactBase, PolicyError};
pub use facts::{FactSet, FactSubject, GroupingFact, PermissionFact};
pub use reload::{PolicyReloader, ReloadHandle};
pub use sync::{PolicyAdapter, PolicySynchronizer};
