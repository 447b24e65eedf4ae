//! Password policy and hashing
//!
//! Hashes use bcrypt at the library's default cost. The policy requires at
//! least 8 characters with uppercase, lowercase, digit, and special
//! character, and rejects reuse of any of the last five hashes.

use bcrypt::{hash, verify, DEFAULT_COST};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};

const SPECIALS: &[u8] = b"!@#$%^&*()-_=+[]{};:,.<>?";
const RESET_PASSWORD_LEN: usize = 14;

/// Validate the password complexity policy, returning all failures
pub fn validate_password_policy(password: &str) -> Vec<String> {
    let mut failures = Vec::new();

    if password.len() < 8 {
        failures.push("must be at least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        failures.push("must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        failures.push("must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        failures.push("must contain a digit".to_string());
    }
    if !password.chars().any(|c| SPECIALS.contains(&(c as u8))) {
        failures.push("must contain a special character".to_string());
    }

    failures
}

/// Generate a random reset password satisfying the complexity policy
///
/// Administratively issued; the account is flagged `password_must_change`.
pub fn generate_reset_password() -> String {
    let mut rng = rand::thread_rng();

    let mut chars: Vec<u8> = vec![
        rng.gen_range(b'A'..=b'Z'),
        rng.gen_range(b'a'..=b'z'),
        rng.gen_range(b'0'..=b'9'),
        SPECIALS[rng.gen_range(0..SPECIALS.len())],
    ];
    while chars.len() < RESET_PASSWORD_LEN {
        let pool = match rng.gen_range(0..4) {
            0 => rng.gen_range(b'A'..=b'Z'),
            1 => rng.gen_range(b'a'..=b'z'),
            2 => rng.gen_range(b'0'..=b'9'),
            _ => SPECIALS[rng.gen_range(0..SPECIALS.len())],
        };
        chars.push(pool);
    }
    chars.shuffle(&mut rng);

    String::from_utf8(chars).expect("ascii password")
}

/// bcrypt-backed password hashing with reuse checks
#[derive(Debug, Clone, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash a password after validating the policy
    pub fn hash_new(&self, password: &str) -> Result<String> {
        let failures = validate_password_policy(password);
        if !failures.is_empty() {
            return Err(Error::Validation(
                failures
                    .into_iter()
                    .map(|m| crate::error::FieldError::new("password", m))
                    .collect(),
            ));
        }
        hash(password, DEFAULT_COST)
            .map_err(|e| Error::Internal(anyhow::anyhow!("bcrypt hash failed: {e}")))
    }

    /// Verify a password against a stored hash
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool> {
        verify(password, stored_hash)
            .map_err(|e| Error::Internal(anyhow::anyhow!("bcrypt verify failed: {e}")))
    }

    /// Check the candidate against the current hash and prior history
    ///
    /// Returns an error when the password matches any of them.
    pub fn check_reuse(
        &self,
        password: &str,
        current_hash: &str,
        history: &[String],
    ) -> Result<()> {
        if self.verify(password, current_hash)? {
            return Err(Error::validation(
                "password",
                "must differ from the current password",
            ));
        }
        for prior in history {
            if self.verify(password, prior)? {
                return Err(Error::validation(
                    "password",
                    "must differ from the last 5 passwords",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_accepts_compliant_password() {
        assert!(validate_password_policy("Str0ng!pass").is_empty());
    }

    #[test]
    fn test_policy_collects_all_failures() {
        let failures = validate_password_policy("short");
        assert_eq!(failures.len(), 4); // length, uppercase, digit, special
    }

    #[test]
    fn test_policy_individual_requirements() {
        assert!(!validate_password_policy("nouppercase1!").is_empty());
        assert!(!validate_password_policy("NOLOWERCASE1!").is_empty());
        assert!(!validate_password_policy("NoDigits!!").is_empty());
        assert!(!validate_password_policy("NoSpecials11").is_empty());
    }

    #[test]
    fn test_reset_password_meets_policy() {
        for _ in 0..20 {
            let password = generate_reset_password();
            assert!(password.len() >= 12);
            assert!(
                validate_password_policy(&password).is_empty(),
                "generated password failed policy: {password}"
            );
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new();
        let hashed = hasher.hash_new("Str0ng!pass").unwrap();

        assert!(hasher.verify("Str0ng!pass", &hashed).unwrap());
        assert!(!hasher.verify("Wr0ng!pass", &hashed).unwrap());
    }

    #[test]
    fn test_hash_rejects_weak_password() {
        let hasher = PasswordHasher::new();
        assert!(hasher.hash_new("weak").is_err());
    }

    #[test]
    fn test_reuse_detection() {
        let hasher = PasswordHasher::new();
        let current = hasher.hash_new("Curr3nt!pass").unwrap();
        let old = hasher.hash_new("0ldPass!word").unwrap();
        let history = vec![old];

        assert!(hasher.check_reuse("Curr3nt!pass", &current, &history).is_err());
        assert!(hasher.check_reuse("0ldPass!word", &current, &history).is_err());
        assert!(hasher.check_reuse("Fre5h!password", &current, &history).is_ok());
    }
}
