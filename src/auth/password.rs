use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;

const DUMMY_PASSWORD: &str = "authgate-timing-equalizer";

/// Argon2id hashing with a fresh random salt per digest.
#[derive(Clone)]
pub struct Hasher {
    params: Params,
    dummy_digest: String,
}

impl Hasher {
    pub fn new(cfg: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        let mut hasher = Self {
            params,
            dummy_digest: String::new(),
        };
        hasher.dummy_digest = hasher.hash(DUMMY_PASSWORD)?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Checks `plain` against a PHC digest. A digest that does not parse is an error.
    pub fn verify(&self, plain: &str, digest: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(digest).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// Spends the same work as a real verification so unknown accounts
    /// cannot be told apart by response time.
    pub fn verify_dummy(&self, plain: &str) {
        let _ = self.verify(plain, &self.dummy_digest);
    }

    /// [`Hasher::hash`] on the blocking pool; Argon2 must not stall the async workers.
    pub async fn hash_blocking(&self, plain: &str) -> anyhow::Result<String> {
        let hasher = self.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .context("hash task panicked")?
    }

    pub async fn verify_blocking(&self, plain: &str, digest: &str) -> anyhow::Result<bool> {
        let hasher = self.clone();
        let (plain, digest) = (plain.to_owned(), digest.to_owned());
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &digest))
            .await
            .context("verify task panicked")?
    }

    pub async fn verify_dummy_blocking(&self, plain: &str) {
        let hasher = self.clone();
        let plain = plain.to_owned();
        if let Err(e) = tokio::task::spawn_blocking(move || hasher.verify_dummy(&plain)).await {
            error!(error = %e, "dummy verify task failed");
        }
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> Hasher {
    Hasher::new(&PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("test hasher")
}
