//! Casbin-backed fact base shared by every request.
//!
//! # Purpose and responsibility
//! Wraps a casbin [`Enforcer`] behind an async reader/writer lock so request
//! authorization (shared reads) can interleave with role/user resyncs and
//! bulk reloads (exclusive writes).
//!
//! # Key invariants and assumptions
//! - The casbin model is embedded in `MODEL_CONF`; paths are matched with
//!   `keyMatch2`, so resources may use `:id` segments.
//! - [`FactBase::replace_facts_for`] swaps one subject's facts under a single
//!   write lock; readers see either the old set or the new one.
//! - [`FactBase::bulk_replace`] builds a complete enforcer off-lock and swaps
//!   it in, so a reload never exposes a partial fact set.
//! - The configured superuser is allowed without consulting casbin.
use crate::auth::rbac::MODEL_CONF;
use crate::auth::rbac::facts::{Fact, FactSet, FactSubject, GroupingFact, PermissionFact};
use crate::store::StoreError;
use async_trait::async_trait;
use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy engine error: {0}")]
    Engine(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<casbin::Error> for PolicyError {
    fn from(err: casbin::Error) -> Self {
        PolicyError::Engine(err.to_string())
    }
}

/// Enforcement engine contract consumed by the adapter and the middleware.
#[async_trait]
pub trait FactBase: Send + Sync {
    async fn enforce(&self, subject: &str, path: &str, method: &str) -> Result<bool, PolicyError>;
    async fn add_fact(&self, fact: Fact) -> Result<(), PolicyError>;
    async fn remove_facts_for(&self, subject: &FactSubject) -> Result<(), PolicyError>;
    /// Atomically replace every fact owned by `subject` with `facts`.
    async fn replace_facts_for(
        &self,
        subject: &FactSubject,
        facts: Vec<Fact>,
    ) -> Result<(), PolicyError>;
    async fn rebuild_role_links(&self) -> Result<(), PolicyError>;
    async fn bulk_replace(&self, facts: FactSet) -> Result<(), PolicyError>;
    /// Current facts, normalized.
    async fn snapshot(&self) -> FactSet;
}

/// Build an in-memory casbin enforcer holding exactly `facts`.
pub async fn build_enforcer(facts: &FactSet) -> casbin::Result<Enforcer> {
    // Step 1: Load the embedded Casbin model.
    let model = DefaultModel::from_str(MODEL_CONF).await?;
    // Step 2: Facts are derived from the store, so the adapter starts empty.
    let mut enforcer = Enforcer::new(model, MemoryAdapter::default()).await?;

    for fact in &facts.permissions {
        // Step 3: Permission facts; duplicates are reported as `false` and ignored.
        enforcer.add_policy(permission_rule(fact)).await?;
    }
    for fact in &facts.groupings {
        // Step 4: Grouping facts.
        enforcer.add_grouping_policy(grouping_rule(fact)).await?;
    }

    // Step 5: Build role links after all rules are loaded.
    enforcer.build_role_links()?;
    Ok(enforcer)
}

fn permission_rule(fact: &PermissionFact) -> Vec<String> {
    vec![fact.role_id.clone(), fact.path.clone(), fact.method.clone()]
}

fn grouping_rule(fact: &GroupingFact) -> Vec<String> {
    vec![fact.user_id.clone(), fact.role_id.clone()]
}

async fn apply_fact(enforcer: &mut Enforcer, fact: &Fact) -> casbin::Result<()> {
    match fact {
        Fact::Permission(fact) => {
            enforcer.add_policy(permission_rule(fact)).await?;
        }
        Fact::Grouping(fact) => {
            enforcer.add_grouping_policy(grouping_rule(fact)).await?;
        }
    }
    Ok(())
}

async fn clear_subject(enforcer: &mut Enforcer, subject: &FactSubject) -> casbin::Result<()> {
    match subject {
        FactSubject::Role(role_id) => {
            enforcer
                .remove_filtered_policy(0, vec![role_id.clone()])
                .await?;
        }
        FactSubject::User(user_id) => {
            enforcer
                .remove_filtered_grouping_policy(0, vec![user_id.clone()])
                .await?;
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct CasbinFactBase {
    enforcer: Arc<RwLock<Enforcer>>,
    superuser: Option<String>,
}

impl CasbinFactBase {
    /// Create an empty fact base. `superuser` names a subject that is always allowed.
    pub async fn new(superuser: Option<String>) -> Result<Self, PolicyError> {
        let enforcer = build_enforcer(&FactSet::default()).await?;
        Ok(Self {
            enforcer: Arc::new(RwLock::new(enforcer)),
            superuser,
        })
    }
}

#[async_trait]
impl FactBase for CasbinFactBase {
    async fn enforce(&self, subject: &str, path: &str, method: &str) -> Result<bool, PolicyError> {
        if self.superuser.as_deref() == Some(subject) {
            return Ok(true);
        }
        let enforcer = self.enforcer.read().await;
        Ok(enforcer.enforce((subject, path, method))?)
    }

    async fn add_fact(&self, fact: Fact) -> Result<(), PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        apply_fact(&mut enforcer, &fact).await?;
        Ok(())
    }

    async fn remove_facts_for(&self, subject: &FactSubject) -> Result<(), PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        clear_subject(&mut enforcer, subject).await?;
        Ok(())
    }

    async fn replace_facts_for(
        &self,
        subject: &FactSubject,
        facts: Vec<Fact>,
    ) -> Result<(), PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        clear_subject(&mut enforcer, subject).await?;
        for fact in &facts {
            apply_fact(&mut enforcer, fact).await?;
        }
        Ok(())
    }

    async fn rebuild_role_links(&self) -> Result<(), PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer.build_role_links()?;
        Ok(())
    }

    async fn bulk_replace(&self, facts: FactSet) -> Result<(), PolicyError> {
        let fresh = build_enforcer(&facts.normalized()).await?;
        *self.enforcer.write().await = fresh;
        Ok(())
    }

    async fn snapshot(&self) -> FactSet {
        let enforcer = self.enforcer.read().await;
        let permissions = enforcer
            .get_policy()
            .into_iter()
            .filter_map(|rule| match rule.as_slice() {
                [role_id, path, method, ..] => Some(PermissionFact {
                    role_id: role_id.clone(),
                    path: path.clone(),
                    method: method.clone(),
                }),
                _ => None,
            })
            .collect();
        let groupings = enforcer
            .get_grouping_policy()
            .into_iter()
            .filter_map(|rule| match rule.as_slice() {
                [user_id, role_id, ..] => Some(GroupingFact {
                    user_id: user_id.clone(),
                    role_id: role_id.clone(),
                }),
                _ => None,
            })
            .collect();
        FactSet {
            permissions,
            groupings,
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission(role_id: &str, path: &str, method: &str) -> PermissionFact {
        PermissionFact {
            role_id: role_id.into(),
            path: path.into(),
            method: method.into(),
        }
    }

    fn grouping(user_id: &str, role_id: &str) -> GroupingFact {
        GroupingFact {
            user_id: user_id.into(),
            role_id: role_id.into(),
        }
    }

    #[tokio::test]
    async fn enforce_follows_groupings_and_key_match() {
        let facts = CasbinFactBase::new(None).await.expect("fact base");
        facts
            .bulk_replace(FactSet {
                permissions: vec![
                    permission("r1", "/api/v1/users", "GET"),
                    permission("r1", "/api/v1/users/:id", "PUT"),
                ],
                groupings: vec![grouping("u1", "r1")],
            })
            .await
            .expect("bulk");

        assert!(facts.enforce("u1", "/api/v1/users", "GET").await.expect("enforce"));
        assert!(facts.enforce("u1", "/api/v1/users/42", "PUT").await.expect("enforce"));
        assert!(!facts.enforce("u1", "/api/v1/users", "POST").await.expect("enforce"));
        assert!(!facts.enforce("u2", "/api/v1/users", "GET").await.expect("enforce"));
    }

    #[tokio::test]
    async fn replace_facts_for_only_touches_one_subject() {
        let facts = CasbinFactBase::new(None).await.expect("fact base");
        facts
            .bulk_replace(FactSet {
                permissions: vec![
                    permission("r1", "/a", "GET"),
                    permission("r2", "/b", "GET"),
                ],
                groupings: vec![grouping("u1", "r1"), grouping("u2", "r2")],
            })
            .await
            .expect("bulk");

        facts
            .replace_facts_for(
                &FactSubject::Role("r1".into()),
                vec![Fact::Permission(permission("r1", "/c", "POST"))],
            )
            .await
            .expect("replace");
        facts
            .remove_facts_for(&FactSubject::User("u2".into()))
            .await
            .expect("remove");

        let snapshot = facts.snapshot().await;
        assert_eq!(
            snapshot.permissions,
            vec![permission("r1", "/c", "POST"), permission("r2", "/b", "GET")]
        );
        assert_eq!(snapshot.groupings, vec![grouping("u1", "r1")]);
        assert!(!facts.enforce("u2", "/b", "GET").await.expect("enforce"));
    }

    #[tokio::test]
    async fn superuser_bypasses_facts() {
        let facts = CasbinFactBase::new(Some("root".into()))
            .await
            .expect("fact base");
        assert!(facts.enforce("root", "/anything", "DELETE").await.expect("enforce"));
        assert!(!facts.enforce("alice", "/anything", "DELETE").await.expect("enforce"));
    }
}
