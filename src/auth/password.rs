//! Argon2id password hashing (§9: "standardize on a memory-hard KDF, document
//! parameters, never fall back to a plain hash").

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password")]
    HashingError,
    #[error("failed to verify password")]
    VerificationError,
    #[error("stored hash is not a valid PHC string")]
    InvalidHashFormat,
}

/// OWASP-recommended Argon2id baseline: 19 MiB memory, 2 iterations, 1 degree of
/// parallelism, 32-byte output.
#[derive(Debug, Clone, Copy)]
pub struct PasswordConfig {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: 19_456,
            time_cost: 2,
            parallelism: 1,
            output_len: 32,
        }
    }
}

fn build_hasher(cfg: PasswordConfig) -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(
        cfg.memory_cost_kib,
        cfg.time_cost,
        cfg.parallelism,
        Some(cfg.output_len),
    )
    .map_err(|_| PasswordError::HashingError)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with_config(password, PasswordConfig::default())
}

pub fn hash_password_with_config(
    password: &str,
    cfg: PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hasher = build_hasher(cfg)?;
    let hash = hasher
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| PasswordError::HashingError)?;
    Ok(hash.to_string())
}

/// Verifies `password` against a stored PHC hash. Parameters are read back out of the
/// hash itself (PHC strings are self-describing), not from the caller's config, so a
/// verify always matches whatever parameters the hash was created with.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| PasswordError::InvalidHashFormat)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(_) => Err(PasswordError::VerificationError),
    }
}

/// A dummy hash verified against on an unknown account, so a lookup miss and a wrong
/// password take the same code path and (roughly) the same time — avoids an
/// account-enumeration oracle in `Authenticate` (§4.1). Generated once per process;
/// it does not need to be deterministic across restarts, only stable within one.
pub static DUMMY_HASH_FOR_TIMING: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    hash_password("dummy-password-for-timing-equalization")
        .expect("failed to generate dummy password hash")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }

    #[test]
    fn same_password_hashes_differently_each_time() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b, "salts must differ");
    }

    #[test]
    fn invalid_hash_format_is_rejected() {
        let err = verify_password("x", "not-a-phc-string").unwrap_err();
        assert!(matches!(err, PasswordError::InvalidHashFormat));
    }

    #[test]
    fn dummy_hash_is_parseable_for_timing_equalization() {
        assert!(!verify_password("anything", &DUMMY_HASH_FOR_TIMING).unwrap());
    }
}
