//! Request authorization middleware.
//!
//! # Purpose
//! Every API request passes through [`authorize`] before reaching a handler:
//! 1. A bearer token, when present, is resolved to a subject. A token that
//!    does not resolve ends the request with an invalid-token error.
//! 2. Without a token, anonymous prefixes pass through with no identity.
//!    Debug mode substitutes the root identity; otherwise the request is
//!    rejected.
//! 3. Public prefixes skip enforcement. Everything else must pass
//!    `enforce(subject, path, method)` against the fact base.
//!
//! # Key invariants
//! - Fail closed: only an allowlist match or a true enforcement result lets
//!   a request through.
//! - The resolved [`Identity`] is stored in the request extensions.
use crate::api::error::ApiError;
use crate::app::AppState;
use crate::auth::rbac::FactBase;
use crate::auth::token::IdentityResolver;
use crate::config::{AuthConfig, RunMode};
use crate::manager::{ManagerError, ManagerResult};
use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

/// The authenticated subject of a request: a user record id or the root user name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::from(ManagerError::InvalidToken))
    }
}

/// Returns the bearer token of `headers`, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Clone)]
pub struct Authorizer {
    resolver: Arc<dyn IdentityResolver>,
    facts: Arc<dyn FactBase>,
    prefixes: AuthConfig,
    run_mode: RunMode,
    enforce: bool,
    root_user: String,
}

impl Authorizer {
    pub fn new(
        resolver: Arc<dyn IdentityResolver>,
        facts: Arc<dyn FactBase>,
        prefixes: AuthConfig,
        run_mode: RunMode,
        enforce: bool,
        root_user: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            facts,
            prefixes,
            run_mode,
            enforce,
            root_user: root_user.into(),
        }
    }

    fn is_public(&self, path: &str) -> bool {
        self.prefixes
            .public_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn is_anonymous(&self, path: &str) -> bool {
        self.prefixes
            .anonymous_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Decide one request. `Ok(None)` lets an anonymous request through.
    pub async fn decide(
        &self,
        token: Option<&str>,
        path: &str,
        method: &str,
    ) -> ManagerResult<Option<Identity>> {
        let subject = match token {
            Some(token) => match self.resolver.resolve_identity(token) {
                Ok(subject) => subject,
                Err(err) => {
                    tracing::debug!(error = %err, path, "bearer token rejected");
                    record_decision("invalid_token");
                    return Err(ManagerError::InvalidToken);
                }
            },
            None if self.is_anonymous(path) => {
                record_decision("anonymous");
                return Ok(None);
            }
            None if self.run_mode == RunMode::Debug => self.root_user.clone(),
            None => {
                record_decision("invalid_token");
                return Err(ManagerError::InvalidToken);
            }
        };

        if !self.enforce || self.is_public(path) {
            record_decision("public");
            return Ok(Some(Identity { subject }));
        }

        match self.facts.enforce(&subject, path, method).await {
            Ok(true) => {
                record_decision("allow");
                Ok(Some(Identity { subject }))
            }
            Ok(false) => {
                tracing::debug!(subject = %subject, path, method, "authorization denied");
                record_decision("deny");
                Err(ManagerError::NoPermission)
            }
            Err(err) => {
                record_decision("error");
                Err(ManagerError::PolicySync(err))
            }
        }
    }
}

fn record_decision(decision: &'static str) {
    metrics::counter!("console_authz_decisions_total", "decision" => decision).increment(1);
}

pub async fn authorize(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    let method = req.method().as_str().to_string();
    let identity = state
        .authorizer
        .decide(bearer_token(req.headers()), &path, &method)
        .await?;
    if let Some(identity) = identity {
        req.extensions_mut().insert(identity);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rbac::facts::{Fact, GroupingFact, PermissionFact};
    use crate::auth::rbac::CasbinFactBase;
    use crate::auth::token::JwtAuth;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn prefixes() -> AuthConfig {
        AuthConfig {
            public_prefixes: vec!["/api/v1/pub".into()],
            anonymous_prefixes: vec!["/api/v1/pub/login".into()],
        }
    }

    async fn authorizer(run_mode: RunMode) -> (Authorizer, Arc<JwtAuth>) {
        let tokens = Arc::new(JwtAuth::new("secret", Duration::from_secs(60)));
        let facts = Arc::new(CasbinFactBase::new(Some("root".into())).await.expect("facts"));
        facts
            .add_fact(Fact::Permission(PermissionFact {
                role_id: "r1".into(),
                path: "/api/v1/users".into(),
                method: "GET".into(),
            }))
            .await
            .expect("p");
        facts
            .add_fact(Fact::Grouping(GroupingFact {
                user_id: "u1".into(),
                role_id: "r1".into(),
            }))
            .await
            .expect("g");
        let authorizer = Authorizer::new(tokens.clone(), facts, prefixes(), run_mode, true, "root");
        (authorizer, tokens)
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn granted_subject_passes_enforcement() {
        let (authorizer, tokens) = authorizer(RunMode::Release).await;
        let token = tokens.generate("u1").expect("token").access_token;
        let identity = authorizer
            .decide(Some(&token), "/api/v1/users", "GET")
            .await
            .expect("allowed");
        assert_eq!(identity.map(|i| i.subject).as_deref(), Some("u1"));

        let err = authorizer
            .decide(Some(&token), "/api/v1/users", "DELETE")
            .await
            .expect_err("denied");
        assert!(matches!(err, ManagerError::NoPermission));
    }

    #[tokio::test]
    async fn unresolvable_token_fails_even_on_public_paths() {
        let (authorizer, _) = authorizer(RunMode::Release).await;
        let err = authorizer
            .decide(Some("garbage"), "/api/v1/pub/current/user", "GET")
            .await
            .expect_err("invalid");
        assert!(matches!(err, ManagerError::InvalidToken));
    }

    #[tokio::test]
    async fn missing_token_is_anonymous_or_rejected() {
        let (authorizer, _) = authorizer(RunMode::Release).await;
        let anonymous = authorizer
            .decide(None, "/api/v1/pub/login", "POST")
            .await
            .expect("anonymous");
        assert!(anonymous.is_none());

        let err = authorizer
            .decide(None, "/api/v1/users", "GET")
            .await
            .expect_err("rejected");
        assert!(matches!(err, ManagerError::InvalidToken));
    }

    #[tokio::test]
    async fn public_prefix_skips_enforcement_but_keeps_identity() {
        let (authorizer, tokens) = authorizer(RunMode::Release).await;
        let token = tokens.generate("nobody").expect("token").access_token;
        let identity = authorizer
            .decide(Some(&token), "/api/v1/pub/current/user", "GET")
            .await
            .expect("public");
        assert_eq!(identity.map(|i| i.subject).as_deref(), Some("nobody"));
    }

    #[tokio::test]
    async fn debug_mode_runs_as_root() {
        let (authorizer, _) = authorizer(RunMode::Debug).await;
        let identity = authorizer
            .decide(None, "/api/v1/roles", "DELETE")
            .await
            .expect("root");
        assert_eq!(identity.map(|i| i.subject).as_deref(), Some("root"));
    }
}
