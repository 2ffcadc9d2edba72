use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
#[cfg(test)]
use argon2::password_hash::{PasswordHash, PasswordVerifier};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::StoreError;

/// Argon2id with the crate's default cost parameters and a random salt.
pub fn hash_password(plain: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            StoreError::hash(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Runs [`hash_password`] off the async workers; hashing is deliberately slow.
pub async fn hash_password_blocking(plain: String) -> Result<String, StoreError> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .map_err(|e| StoreError::hash(format!("hashing task aborted: {e}")))?
}

#[cfg(test)]
pub fn verify_password(plain: &str, hash: &str) -> Result<bool, StoreError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        StoreError::hash(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
