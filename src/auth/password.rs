use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sha2::{Digest, Sha256};
use tracing::error;

/// Argon2 salt bytes taken from the digest of the user id.
const SALT_LEN: usize = 16;

/// Hashes `plain ‖ salt` with Argon2 (default work factor). The Argon2 salt is
/// derived from a digest of `salt`, so any id length is accepted and the same
/// inputs always yield the same PHC string.
pub fn hash_password(plain: &str, salt: &str) -> anyhow::Result<String> {
    let salt_string = argon2_salt(salt)?;
    let input = salted(plain, salt);
    let hash = Argon2::default()
        .hash_password(&input, &salt_string)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Constant-time check of `plain ‖ salt` against a stored hash.
pub fn verify_password(plain: &str, salt: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(&salted(plain, salt), &parsed)
        .is_ok())
}

fn argon2_salt(salt: &str) -> anyhow::Result<SaltString> {
    let digest = Sha256::digest(salt.as_bytes());
    SaltString::encode_b64(&digest[..SALT_LEN]).map_err(|e| {
        error!(error = %e, "argon2 salt encoding error");
        anyhow::anyhow!(e.to_string())
    })
}

fn salted(plain: &str, salt: &str) -> Vec<u8> {
    let mut input = Vec::with_capacity(plain.len() + salt.len());
    input.extend_from_slice(plain.as_bytes());
    input.extend_from_slice(salt.as_bytes());
    input
}
