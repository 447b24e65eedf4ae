//! Token issuance, validation, rotation, and revocation

use chrono::{Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::models::Role;

/// Distinguishes access from refresh tokens in claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims embedded in every token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (employee id)
    pub sub: Uuid,
    /// Employee email
    pub email: String,
    /// Role at issuance time
    pub role: Role,
    /// Token identifier, used for revocation
    pub jti: String,
    /// Access or refresh
    pub kind: TokenKind,
    /// Expiration timestamp (Unix epoch)
    pub exp: i64,
    /// Issued-at timestamp (Unix epoch)
    pub iat: i64,
}

/// An access/refresh token pair returned on login and refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Revoked token identifiers with expiry-based eviction
///
/// Entries live exactly as long as the token they revoke, so the set stays
/// bounded by the number of logouts within one token lifetime.
#[derive(Debug, Default)]
pub struct RevocationSet {
    revoked: DashMap<String, i64>,
}

impl RevocationSet {
    pub fn new() -> Self {
        Self {
            revoked: DashMap::new(),
        }
    }

    /// Revoke a token id until its natural expiry
    pub fn revoke(&self, jti: &str, expires_at: i64) {
        self.revoked.insert(jti.to_string(), expires_at);
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        match self.revoked.get(jti) {
            Some(entry) => *entry.value() > Utc::now().timestamp(),
            None => false,
        }
    }

    /// Drop entries whose tokens have expired on their own
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now().timestamp();
        let before = self.revoked.len();
        self.revoked.retain(|_, exp| *exp > now);
        before - self.revoked.len()
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

/// Issues and validates access/refresh tokens
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    revocations: RevocationSet,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.token_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.token_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_ttl_mins as i64),
            refresh_ttl: Duration::days(config.refresh_ttl_days as i64),
            revocations: RevocationSet::new(),
        }
    }

    /// Issue a fresh access/refresh pair
    pub fn issue_pair(&self, user_id: Uuid, email: &str, role: Role) -> Result<TokenPair> {
        let access = self.issue(user_id, email, role, TokenKind::Access)?;
        let refresh = self.issue(user_id, email, role, TokenKind::Refresh)?;

        Ok(TokenPair {
            access_token: access,
            refresh_token: refresh,
            expires_in: self.access_ttl.num_seconds() as u64,
        })
    }

    fn issue(&self, user_id: Uuid, email: &str, role: Role, kind: TokenKind) -> Result<String> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            role,
            jti: Uuid::new_v4().to_string(),
            kind,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(anyhow::anyhow!("token encoding failed: {e}")))
    }

    /// Validate a token of the expected kind, honoring revocation
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| Error::unauthenticated(format!("invalid token: {e}")))?;

        let claims = data.claims;
        if claims.kind != expected {
            return Err(Error::unauthenticated("wrong token kind"));
        }
        if self.revocations.is_revoked(&claims.jti) {
            return Err(Error::unauthenticated("token revoked"));
        }
        Ok(claims)
    }

    /// Revoke a token (logout path)
    pub fn revoke(&self, claims: &Claims) {
        self.revocations.revoke(&claims.jti, claims.exp);
    }

    /// Rotate a refresh token: verify it, revoke it, and issue a new pair
    pub fn rotate(&self, refresh_token: &str) -> Result<(Claims, TokenPair)> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        self.revocations.revoke(&claims.jti, claims.exp);

        let pair = self.issue_pair(claims.sub, &claims.email, claims.role)?;
        Ok((claims, pair))
    }

    pub fn revocations(&self) -> &RevocationSet {
        &self.revocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig {
            token_secret: "unit-test-secret-at-least-16b".to_string(),
            access_ttl_mins: 15,
            refresh_ttl_days: 30,
            lockout_threshold: 5,
        })
    }

    #[test]
    fn test_issue_and_verify_pair() {
        let svc = service();
        let user = Uuid::new_v4();
        let pair = svc.issue_pair(user, "a@example.com", Role::Manager).unwrap();

        let access = svc.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.sub, user);
        assert_eq!(access.role, Role::Manager);

        let refresh = svc.verify(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_ne!(access.jti, refresh.jti);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let svc = service();
        let pair = svc
            .issue_pair(Uuid::new_v4(), "a@example.com", Role::Employee)
            .unwrap();

        assert!(svc.verify(&pair.refresh_token, TokenKind::Access).is_err());
        assert!(svc.verify(&pair.access_token, TokenKind::Refresh).is_err());
    }

    #[test]
    fn test_logout_revokes_access_token() {
        let svc = service();
        let pair = svc
            .issue_pair(Uuid::new_v4(), "a@example.com", Role::Employee)
            .unwrap();

        let claims = svc.verify(&pair.access_token, TokenKind::Access).unwrap();
        svc.revoke(&claims);

        let err = svc.verify(&pair.access_token, TokenKind::Access).unwrap_err();
        assert_eq!(err.kind(), "unauthenticated");
    }

    #[test]
    fn test_refresh_rotation_invalidates_predecessor() {
        let svc = service();
        let pair = svc
            .issue_pair(Uuid::new_v4(), "a@example.com", Role::Employee)
            .unwrap();

        let (_, new_pair) = svc.rotate(&pair.refresh_token).unwrap();
        assert!(svc.verify(&new_pair.refresh_token, TokenKind::Refresh).is_ok());

        // The old refresh token no longer works
        assert!(svc.rotate(&pair.refresh_token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let svc = service();
        assert!(svc.verify("not-a-token", TokenKind::Access).is_err());
    }

    #[test]
    fn test_revocation_set_purge() {
        let set = RevocationSet::new();
        let now = Utc::now().timestamp();
        set.revoke("live", now + 600);
        set.revoke("dead", now - 600);

        assert!(set.is_revoked("live"));
        assert!(!set.is_revoked("dead"));

        let purged = set.purge_expired();
        assert_eq!(purged, 1);
        assert_eq!(set.len(), 1);
    }
}
