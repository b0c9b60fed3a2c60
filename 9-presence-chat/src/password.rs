use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::AuthError;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
        }
    }
}

/// Hashes and verifies passwords off the async executor.
#[derive(Clone)]
pub struct Hasher {
    argon2: Argon2<'static>,
}

impl Hasher {
    pub fn new(config: HashingConfig) -> Result<Self, AuthError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|err| AuthError::Hashing(err.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Produces a PHC-format hash with a fresh random salt.
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let argon2 = self.argon2.clone();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|err| AuthError::Hashing(err.to_string()))
        })
        .await
        .map_err(|err| AuthError::Hashing(err.to_string()))?
    }

    /// Checks `password` against a stored PHC hash.
    pub async fn verify(&self, password: &str, stored: &str) -> Result<(), AuthError> {
        let argon2 = self.argon2.clone();
        let password = password.to_string();
        let stored = stored.to_string();

        tokio::task::spawn_blocking(move || {
            let parsed =
                PasswordHash::new(&stored).map_err(|err| AuthError::Hashing(err.to_string()))?;
            argon2
                .verify_password(password.as_bytes(), &parsed)
                .map_err(|err| match err {
                    argon2::password_hash::Error::Password => AuthError::PasswordInvalid,
                    other => AuthError::Hashing(other.to_string()),
                })
        })
        .await
        .map_err(|err| AuthError::Hashing(err.to_string()))?
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> Hasher {
    Hasher::new(HashingConfig {
        memory_kib: 1024,
        iterations: 1,
    })
    .expect("cheap argon2 params")
}
