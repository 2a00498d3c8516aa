//! Console access tokens.
//!
//! # Purpose
//! Mints and verifies the HS512 JWTs handed out by the login endpoint and
//! resolves them back to a user id for the authorization middleware.
//!
//! # Key invariants
//! - `sub` is the user's record id, or the configured root user name.
//! - Every token carries a random `jti`; logout blacklists that id until the
//!   token would have expired anyway.
//!
//! # Concurrency model
//! The blacklist sits behind a `RwLock`; verification takes the read side.
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use utoipa::ToSchema;

const LEEWAY_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConsoleClaims {
    sub: String,
    iat: i64,
    nbf: i64,
    exp: i64,
    jti: String,
}

/// Login response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenInfo {
    pub access_token: String,
    pub token_type: String,
    /// Expiry as unix seconds.
    pub expires_at: i64,
}

/// Resolves a bearer token to the subject the policy engine knows.
pub trait IdentityResolver: Send + Sync {
    fn resolve_identity(&self, token: &str) -> Result<String, TokenError>;
}

pub struct JwtAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expired: Duration,
    // jti -> exp
    blacklist: RwLock<HashMap<String, i64>>,
}

impl JwtAuth {
    pub fn new(signing_key: &str, expired: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(signing_key.as_bytes()),
            decoding: DecodingKey::from_secret(signing_key.as_bytes()),
            expired,
            blacklist: RwLock::new(HashMap::new()),
        }
    }

    pub fn generate(&self, subject: &str) -> Result<TokenInfo, TokenError> {
        let now = now_epoch_seconds();
        let exp = now + self.expired.as_secs() as i64;
        let claims = ConsoleClaims {
            sub: subject.to_string(),
            iat: now,
            nbf: now,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS512), &claims, &self.encoding)?;
        Ok(TokenInfo {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_at: exp,
        })
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Result<ConsoleClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = LEEWAY_SECS;
        validation.validate_exp = validate_exp;
        validation.validate_nbf = true;
        match jsonwebtoken::decode::<ConsoleClaims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(TokenError::Expired),
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => Err(TokenError::Invalid),
                _ => Err(TokenError::Jwt(err)),
            },
        }
    }

    /// Verify `token` and return its subject.
    pub fn parse_subject(&self, token: &str) -> Result<String, TokenError> {
        let claims = self.decode(token, true)?;
        let revoked = self
            .blacklist
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&claims.jti);
        if revoked {
            return Err(TokenError::Revoked);
        }
        if claims.sub.is_empty() {
            return Err(TokenError::Invalid);
        }
        Ok(claims.sub)
    }

    /// Revoke `token` until its natural expiry. Tokens that do not verify are ignored.
    pub fn destroy(&self, token: &str) -> Result<(), TokenError> {
        let claims = match self.decode(token, false) {
            Ok(claims) => claims,
            Err(TokenError::Invalid) => return Ok(()),
            Err(err) => return Err(err),
        };
        let now = now_epoch_seconds();
        let mut blacklist = self
            .blacklist
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        blacklist.retain(|_, exp| *exp + LEEWAY_SECS as i64 >= now);
        if claims.exp + LEEWAY_SECS as i64 >= now {
            blacklist.insert(claims.jti, claims.exp);
        }
        Ok(())
    }
}

impl IdentityResolver for JwtAuth {
    fn resolve_identity(&self, token: &str) -> Result<String, TokenError> {
        self.parse_subject(token)
    }
}

fn now_epoch_seconds() -> i64 {
    // If the clock is skewed backwards, clamp to zero to avoid panics.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_resolves_to_subject() {
        let auth = JwtAuth::new("secret", Duration::from_secs(60));
        let info = auth.generate("user-1").expect("token");
        assert_eq!(info.token_type, "Bearer");
        assert!(info.expires_at > now_epoch_seconds());
        assert_eq!(auth.resolve_identity(&info.access_token).expect("subject"), "user-1");
    }

    #[test]
    fn tokens_signed_with_another_key_are_invalid() {
        let issuer = JwtAuth::new("one", Duration::from_secs(60));
        let verifier = JwtAuth::new("two", Duration::from_secs(60));
        let info = issuer.generate("user-1").expect("token");
        assert!(matches!(
            verifier.parse_subject(&info.access_token),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            verifier.parse_subject("not-a-jwt"),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn destroyed_tokens_are_revoked() {
        let auth = JwtAuth::new("secret", Duration::from_secs(60));
        let info = auth.generate("user-1").expect("token");
        auth.destroy(&info.access_token).expect("destroy");
        assert!(matches!(
            auth.parse_subject(&info.access_token),
            Err(TokenError::Revoked)
        ));
        // Fresh tokens for the same subject are unaffected.
        let again = auth.generate("user-1").expect("token");
        assert!(auth.parse_subject(&again.access_token).is_ok());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let auth = JwtAuth::new("secret", Duration::from_secs(60));
        let now = now_epoch_seconds();
        let claims = ConsoleClaims {
            sub: "user-1".into(),
            iat: now - 600,
            nbf: now - 600,
            exp: now - 300,
            jti: "old".into(),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .expect("encode");
        assert!(matches!(auth.parse_subject(&token), Err(TokenError::Expired)));
    }
}
