//! Password hashing for shopper accounts.
//!
//! Passwords are stored as hex `sha256(salt || password)` with a random
//! per-user salt. There are no sessions: login only checks credentials and
//! hands back the profile.

use sha2::{Digest, Sha256};

pub fn new_salt() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(salt: &str, password: &str, expected_hash: &str) -> bool {
    hash_password(salt, password) == expected_hash
}

/// Emails are compared case-insensitively, so they are stored lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
