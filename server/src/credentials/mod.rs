//! Credential storage for registered users.
//!
//! The trait is synchronous; async callers run it on the blocking pool.
//! Implementations share state through `Arc`, so clones see the same users.

mod durable;
mod memory;

pub use durable::RedbCredentialStore;
pub use memory::MemoryCredentialStore;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Generated id, starting at 1.
    pub id: u64,
    pub username: String,
    /// Lowercase hex SHA-256 of the password.
    pub password_hash: String,
    /// Unix timestamp (seconds) of registration.
    pub created_at_secs: u64,
    /// Unix timestamp (seconds) of the latest login, if any.
    pub last_login_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("username already exists")]
    UsernameTaken,
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait CredentialStore: Clone + Send + Sync + 'static {
    /// Inserts a new user. Fails with `UsernameTaken` if the name exists;
    /// the check and the insert are one atomic step.
    fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        now_secs: u64,
    ) -> Result<UserRecord, CredentialError>;

    /// Looks a user up by name.
    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, CredentialError>;

    /// Stamps the user's last login.
    fn record_login(&self, username: &str, now_secs: u64) -> Result<(), CredentialError>;
}

pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}
