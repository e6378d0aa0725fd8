use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use scrypt::{Params, Scrypt};

use crate::error::{AppError, Result};

/// Salted scrypt hashing into PHC strings. The cost is fixed at construction;
/// verification reads the cost back from the stored hash, so raising it
/// later does not lock out existing accounts.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(log_n: u8) -> Result<Self> {
        let params = Params::new(
            log_n,
            Params::RECOMMENDED_R,
            Params::RECOMMENDED_P,
            Params::RECOMMENDED_LEN,
        )
        .map_err(|err| AppError::Config(format!("invalid scrypt cost {log_n}: {err}")))?;
        Ok(Self { params })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let phc =
            Scrypt.hash_password_customized(password.as_bytes(), None, None, self.params, &salt)?;
        Ok(phc.to_string())
    }

    pub fn verify(&self, password: &str, phc: &str) -> bool {
        let parsed_phc = match PasswordHash::new(phc) {
            Ok(p) => p,
            Err(err) => {
                tracing::error!("Invalid phc in DB: {:?}", err);
                return false;
            }
        };
        Scrypt.verify_password(password.as_bytes(), &parsed_phc).is_ok()
    }

    /// Same as [`hash`](Self::hash) but on the blocking pool, scrypt being
    /// deliberately slow.
    pub async fn hash_blocking(&self, password: String) -> Result<String> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    pub async fn verify_blocking(&self, password: String, phc: String) -> Result<bool> {
        let hasher = *self;
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&password, &phc)).await?)
    }
}
