use std::sync::OnceLock;

use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

/// Hash a password with Argon2id and a fresh random salt (PHC string format).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Check `password` against a stored hash.
///
/// With no stored hash (unknown account) a dummy hash is verified instead and
/// the result is always `false`, so both failure paths cost the same.
pub fn verify_password(password: &str, stored: Option<&str>) -> Result<bool> {
    let (hash, known) = match stored {
        Some(hash) => (hash, true),
        None => (dummy_hash()?, false),
    };

    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Corrupt password hash: {}", e))?;
    let matched = Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok();

    Ok(known && matched)
}

fn dummy_hash() -> Result<&'static str> {
    static DUMMY: OnceLock<String> = OnceLock::new();

    if let Some(hash) = DUMMY.get() {
        return Ok(hash);
    }
    let hash = hash_password("vehiclink-dummy-password")?;
    Ok(DUMMY.get_or_init(|| hash))
}
