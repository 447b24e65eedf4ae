//! Identity and authorization
//!
//! This module covers the full credential lifecycle and access control:
//!
//! - [`password`] - Password policy, bcrypt hashing, reuse checks
//! - [`tokens`] - Access/refresh token issuance, rotation, revocation
//! - [`permissions`] - Role-based permission matrix
//! - [`ratelimit`] - Per-principal token-bucket rate limiting
//!
//! # Token model
//!
//! Short-lived access tokens (~15 min) pair with long-lived refresh tokens
//! (~30 days). Logout drops the access token's `jti` into a revocation set
//! whose entries expire with the token itself; refresh rotates the pair and
//! revokes the predecessor.

pub mod password;
pub mod permissions;
pub mod ratelimit;
pub mod tokens;

pub use password::{generate_reset_password, validate_password_policy, PasswordHasher};
pub use permissions::{Action, Actor};
pub use ratelimit::{EndpointClass, RateLimiters};
pub use tokens::{Claims, RevocationSet, TokenKind, TokenPair, TokenService};
